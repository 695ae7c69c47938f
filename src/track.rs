// src/track.rs

use crate::mixer::limit;

/// Extra samples allocated past `max_idx` so the final cycle of a recording
/// that crosses the logical limit can land before the position engine clamps.
pub const CYCLE_SLACK: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    /// Empty track, available for recording.
    Off,
    Playback,
    Recording,
    /// Holds data but is skipped by the mixer.
    Mute,
}

/// A recordable loop of samples with its own playback position.
///
/// The channel buffers are allocated once, at engine construction, and never
/// grow afterwards. `start_idx..end_idx` is the recorded loop body;
/// `curr_idx` is the read/write position and may run past `end_idx` during
/// playback (the mixer then ignores the track until it wraps or realigns).
pub struct Track {
    left: Vec<f32>,
    right: Option<Vec<f32>>,
    max_idx: usize,
    pub curr_idx: usize,
    pub start_idx: usize,
    pub end_idx: usize,
    pub state: TrackState,
    pub repeat: bool,
}

impl Track {
    pub fn new(max_idx: usize, stereo: bool) -> Self {
        let capacity = max_idx + CYCLE_SLACK;
        Self {
            left: vec![0.0; capacity],
            right: stereo.then(|| vec![0.0; capacity]),
            max_idx,
            curr_idx: 0,
            start_idx: 0,
            end_idx: 0,
            state: TrackState::Off,
            repeat: false,
        }
    }

    pub fn max_idx(&self) -> usize {
        self.max_idx
    }

    pub fn is_stereo(&self) -> bool {
        self.right.is_some()
    }

    pub fn sample(&self, channel: Channel, idx: usize) -> f32 {
        self.buf(channel)[idx]
    }

    /// Copy `src` into the selected channel starting at absolute `offset`.
    /// Writing past the physical capacity is a programmer error and panics.
    pub fn write(&mut self, channel: Channel, offset: usize, src: &[f32]) {
        self.buf_mut(channel)[offset..offset + src.len()].copy_from_slice(src);
    }

    /// Mirror of `write`.
    pub fn read(&self, channel: Channel, offset: usize, dst: &mut [f32]) {
        dst.copy_from_slice(&self.buf(channel)[offset..offset + dst.len()]);
    }

    /// Sum `src` into the selected channel at `offset`, limiting each result.
    pub fn overdub(&mut self, channel: Channel, offset: usize, src: &[f32]) {
        let buf = self.buf_mut(channel);
        for (slot, s) in buf[offset..offset + src.len()].iter_mut().zip(src) {
            *slot = limit(*slot + s);
        }
    }

    /// Return the track to its freshly-constructed state. Sample data is left
    /// in place; the zeroed indices make it unreachable.
    pub fn reset(&mut self) {
        self.curr_idx = 0;
        self.start_idx = 0;
        self.end_idx = 0;
        self.state = TrackState::Off;
        self.repeat = false;
    }

    fn buf(&self, channel: Channel) -> &[f32] {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => self.right.as_deref().expect("mono track has no right channel"),
        }
    }

    fn buf_mut(&mut self, channel: Channel) -> &mut [f32] {
        match channel {
            Channel::Left => &mut self.left,
            Channel::Right => self.right.as_deref_mut().expect("mono track has no right channel"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::MAX_SAMPLE_VALUE;

    #[test]
    fn write_then_read_round_trips() {
        let mut track = Track::new(1024, true);
        let src: Vec<f32> = (0..128).map(|i| i as f32 / 128.0).collect();
        track.write(Channel::Left, 100, &src);

        let mut dst = vec![0.0; 128];
        track.read(Channel::Left, 100, &mut dst);
        assert_eq!(dst, src);

        // the right channel is untouched
        track.read(Channel::Right, 100, &mut dst);
        assert!(dst.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn overdub_sums_in_place() {
        let mut track = Track::new(256, false);
        track.write(Channel::Left, 0, &[0.25; 64]);
        track.overdub(Channel::Left, 0, &[0.5; 64]);

        let mut dst = vec![0.0; 64];
        track.read(Channel::Left, 0, &mut dst);
        assert!(dst.iter().all(|&s| (s - 0.75).abs() < f32::EPSILON));
    }

    #[test]
    fn overdub_limits_overflowing_sums() {
        let mut track = Track::new(256, false);
        let loud = 0.8 * f32::MAX;
        track.write(Channel::Left, 0, &[loud; 8]);
        track.overdub(Channel::Left, 0, &[loud; 8]);

        let mut dst = vec![0.0; 8];
        track.read(Channel::Left, 0, &mut dst);
        let expected = (0.8 * f32::MAX + 0.8 * f32::MAX) * 0.9;
        for &s in &dst {
            assert_eq!(s, expected);
            assert!(s.is_finite());
        }
    }

    #[test]
    fn overdub_below_threshold_is_untouched() {
        let mut track = Track::new(256, false);
        track.write(Channel::Left, 0, &[0.4; 4]);
        track.overdub(Channel::Left, 0, &[0.4; 4]);
        assert!(track.sample(Channel::Left, 0) <= MAX_SAMPLE_VALUE);
        assert_eq!(track.sample(Channel::Left, 0), 0.8);
    }

    #[test]
    fn capacity_includes_cycle_slack() {
        let mut track = Track::new(256, false);
        // a full cycle landing right at the logical limit must fit
        track.write(Channel::Left, 256 - 64, &[1.0; 128]);
        assert_eq!(track.sample(Channel::Left, 256 + 63), 1.0);
    }

    #[test]
    #[should_panic]
    fn write_past_capacity_panics() {
        let mut track = Track::new(256, false);
        track.write(Channel::Left, 256 + CYCLE_SLACK - 4, &[0.0; 8]);
    }

    #[test]
    fn reset_clears_state_and_indices() {
        let mut track = Track::new(256, false);
        track.state = TrackState::Playback;
        track.curr_idx = 10;
        track.start_idx = 5;
        track.end_idx = 20;
        track.repeat = true;

        track.reset();
        assert_eq!(track.state, TrackState::Off);
        assert_eq!(track.curr_idx, 0);
        assert_eq!(track.start_idx, 0);
        assert_eq!(track.end_idx, 0);
        assert!(!track.repeat);
    }
}
