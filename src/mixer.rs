// src/mixer.rs

use crate::group::GroupTable;
use crate::track::{Channel, Track, TrackState};

/// Hard ceiling on any summed sample; matches the capture device headroom.
pub const MAX_SAMPLE_VALUE: f32 = 0.9 * f32::MAX;

/// Numeric overflow guard applied after every summation step.
#[inline]
pub fn limit(sample: f32) -> f32 {
    if sample.abs() > MAX_SAMPLE_VALUE {
        sample * 0.9
    } else {
        sample
    }
}

/// Sum the active group's tracks at their current positions, add the live
/// input, and write `n` frames into the mixdown buffers.
///
/// A track contributes only while `start_idx <= curr_idx < end_idx`; a track
/// whose position has run past its end without repeat is skipped without
/// being an error. Within the cycle each track is read flat from `curr_idx`,
/// stopping at `end_idx` (the position engine handles wrapping afterwards).
pub fn mix_down(
    tracks: &[Track],
    groups: &GroupTable,
    group: usize,
    in_l: Option<&[f32]>,
    in_r: Option<&[f32]>,
    out_l: &mut [f32],
    out_r: &mut [f32],
    n: usize,
) {
    for s in 0..n {
        let mut sum_l = 0.0f32;
        let mut sum_r = 0.0f32;

        for idx in groups.tracks(group) {
            let track = &tracks[idx];
            if track.state == TrackState::Off || track.state == TrackState::Mute {
                continue;
            }
            if track.curr_idx < track.start_idx || track.curr_idx >= track.end_idx {
                continue;
            }
            let i = track.curr_idx + s;
            if i < track.end_idx {
                sum_l = limit(sum_l + track.sample(Channel::Left, i));
                if track.is_stereo() {
                    sum_r = limit(sum_r + track.sample(Channel::Right, i));
                }
            }
        }

        if let Some(in_l) = in_l {
            sum_l = limit(sum_l + in_l[s]);
        }
        if let Some(in_r) = in_r {
            sum_r = limit(sum_r + in_r[s]);
        }

        out_l[s] = sum_l;
        out_r[s] = sum_r;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded_track(data: &[f32], state: TrackState) -> Track {
        let mut track = Track::new(1024, false);
        track.write(Channel::Left, 0, data);
        track.end_idx = data.len();
        track.state = state;
        track
    }

    fn run_mix(
        tracks: &[Track],
        groups: &GroupTable,
        in_l: Option<&[f32]>,
        n: usize,
    ) -> (Vec<f32>, Vec<f32>) {
        let mut out_l = vec![0.0; n];
        let mut out_r = vec![0.0; n];
        mix_down(tracks, groups, 0, in_l, None, &mut out_l, &mut out_r, n);
        (out_l, out_r)
    }

    #[test]
    fn sums_playing_tracks_and_live_input() {
        let tracks = vec![
            recorded_track(&[0.25; 64], TrackState::Playback),
            recorded_track(&[0.5; 64], TrackState::Playback),
        ];
        let mut groups = GroupTable::new();
        groups.add(0, 0);
        groups.add(0, 1);

        let live = [0.1; 64];
        let (out_l, _) = run_mix(&tracks, &groups, Some(&live), 64);
        for &s in &out_l {
            assert!((s - 0.85).abs() < 1e-6);
        }
    }

    #[test]
    fn muted_and_off_tracks_are_skipped() {
        let tracks = vec![
            recorded_track(&[0.5; 32], TrackState::Mute),
            recorded_track(&[0.25; 32], TrackState::Off),
            recorded_track(&[0.125; 32], TrackState::Playback),
        ];
        let mut groups = GroupTable::new();
        for t in 0..3 {
            groups.add(0, t);
        }

        let (out_l, _) = run_mix(&tracks, &groups, None, 32);
        assert!(out_l.iter().all(|&s| s == 0.125));
    }

    #[test]
    fn nonmember_tracks_are_skipped() {
        let tracks = vec![
            recorded_track(&[0.5; 32], TrackState::Playback),
            recorded_track(&[0.25; 32], TrackState::Playback),
        ];
        let mut groups = GroupTable::new();
        groups.add(0, 1);

        let (out_l, _) = run_mix(&tracks, &groups, None, 32);
        assert!(out_l.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn track_past_its_end_goes_silent() {
        let mut track = recorded_track(&[1.0; 32], TrackState::Playback);
        track.curr_idx = 32; // one past the recorded body
        let tracks = vec![track];
        let mut groups = GroupTable::new();
        groups.add(0, 0);

        let (out_l, _) = run_mix(&tracks, &groups, None, 16);
        assert!(out_l.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn track_contributes_only_up_to_its_end() {
        let mut track = recorded_track(&[1.0; 40], TrackState::Playback);
        track.curr_idx = 32;
        let tracks = vec![track];
        let mut groups = GroupTable::new();
        groups.add(0, 0);

        let (out_l, _) = run_mix(&tracks, &groups, None, 16);
        assert!(out_l[..8].iter().all(|&s| s == 1.0));
        assert!(out_l[8..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn summation_is_limited() {
        let loud = 0.8 * f32::MAX;
        let tracks = vec![
            recorded_track(&[loud; 16], TrackState::Playback),
            recorded_track(&[loud; 16], TrackState::Playback),
        ];
        let mut groups = GroupTable::new();
        groups.add(0, 0);
        groups.add(0, 1);

        let (out_l, _) = run_mix(&tracks, &groups, None, 16);
        for &s in &out_l {
            assert!(s.is_finite());
            assert_eq!(s, (loud + loud) * 0.9);
        }
    }

    #[test]
    fn stereo_tracks_feed_the_right_sum() {
        let mut track = Track::new(256, true);
        track.write(Channel::Left, 0, &[0.25; 16]);
        track.write(Channel::Right, 0, &[-0.25; 16]);
        track.end_idx = 16;
        track.state = TrackState::Playback;
        let tracks = vec![track];
        let mut groups = GroupTable::new();
        groups.add(0, 0);

        let mut out_l = vec![0.0; 16];
        let mut out_r = vec![0.0; 16];
        mix_down(&tracks, &groups, 0, None, None, &mut out_l, &mut out_r, 16);
        assert!(out_l.iter().all(|&s| s == 0.25));
        assert!(out_r.iter().all(|&s| s == -0.25));
    }
}
