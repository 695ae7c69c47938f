// src/engine.rs

use ringbuf::HeapConsumer;
use tracing::warn;

use crate::command::{ControlEvent, SharedControl};
use crate::group::GroupTable;
use crate::mixer;
use crate::track::{Channel, Track, TrackState};

pub const NUM_TRACKS: usize = 16;
pub const NUM_GROUPS: usize = 4;

/// Track reserved for latency calibration captures.
pub const CALIBRATION_TRACK: usize = 1;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemState {
    /// Bypass: input forwarded to output, no tracks advance.
    Passthrough,
    Playback,
    Recording,
    Overdubbing,
    /// Diagnostic recording into the fixed calibration track.
    Calibration,
}

impl From<u8> for SystemState {
    fn from(val: u8) -> Self {
        match val {
            0 => SystemState::Passthrough,
            1 => SystemState::Playback,
            2 => SystemState::Recording,
            3 => SystemState::Overdubbing,
            4 => SystemState::Calibration,
            _ => SystemState::Passthrough,
        }
    }
}

/// The root aggregate: all tracks, group membership, master positions and the
/// realtime process entry point.
///
/// Owned by the audio callback. The control thread never touches it directly;
/// it publishes `ControlEvent`s through the inbox and the engine applies them
/// at the next cycle boundary, so every mutation happens on the realtime
/// thread.
pub struct LooperEngine {
    pub(crate) tracks: Vec<Track>,
    pub(crate) groups: GroupTable,
    pub(crate) master_length: [usize; NUM_GROUPS],
    pub(crate) master_curr_idx: usize,
    pub(crate) selected_track: usize,
    pub(crate) selected_group: usize,
    pub(crate) state: SystemState,
    pub(crate) sample_limit: usize,
    pub(crate) shared: SharedControl,
    inbox: HeapConsumer<ControlEvent>,
    mix_l: Vec<f32>,
    mix_r: Vec<f32>,
    cycle_count: u64,
}

impl LooperEngine {
    pub fn new(
        inbox: HeapConsumer<ControlEvent>,
        shared: SharedControl,
        stereo: bool,
        sample_limit: usize,
    ) -> Self {
        let tracks = (0..NUM_TRACKS)
            .map(|_| Track::new(sample_limit, stereo))
            .collect();
        shared.publish_system_state(SystemState::Passthrough);
        Self {
            tracks,
            groups: GroupTable::new(),
            master_length: [0; NUM_GROUPS],
            master_curr_idx: 0,
            selected_track: 0,
            selected_group: 0,
            state: SystemState::Passthrough,
            sample_limit,
            shared,
            inbox,
            mix_l: vec![0.0; 512],
            mix_r: vec![0.0; 512],
            cycle_count: 0,
        }
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    /// Diagnostic entry into calibration and friends; not reachable from the
    /// command protocol.
    pub fn set_state(&mut self, state: SystemState) {
        self.state = state;
    }

    pub fn track(&self, idx: usize) -> &Track {
        &self.tracks[idx]
    }

    pub fn master_curr_idx(&self) -> usize {
        self.master_curr_idx
    }

    pub fn master_length(&self, group: usize) -> usize {
        self.master_length[group]
    }

    pub fn selected_track(&self) -> usize {
        self.selected_track
    }

    pub fn selected_group(&self) -> usize {
        self.selected_group
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// One audio cycle. `n` is the output length; input slices must cover at
    /// least `n` frames and nothing past `n` is ever written.
    ///
    /// Order within the cycle: drain at most one pending event, dispatch on
    /// the system state (recording paths fall through into the mixdown so the
    /// performer keeps hearing the other tracks), advance positions, then
    /// clear the single-use frame delays.
    pub fn process(
        &mut self,
        in_l: &[f32],
        in_r: Option<&[f32]>,
        out_l: &mut [f32],
        mut out_r: Option<&mut [f32]>,
    ) {
        let n = out_l.len();

        if let Some(event) = self.inbox.pop() {
            self.apply_event(event);
        }

        let rec_delay = self.shared.rec_frame_delay().min(n);
        let play_delay = self.shared.play_frame_delay().min(n);

        if self.mix_l.len() < n {
            self.mix_l.resize(n, 0.0);
            self.mix_r.resize(n, 0.0);
        }

        match self.state {
            SystemState::Passthrough => {
                out_l.copy_from_slice(&in_l[..n]);
                if let Some(out_r) = out_r.as_deref_mut() {
                    match in_r {
                        Some(in_r) => out_r.copy_from_slice(&in_r[..n]),
                        // mono in, simulated mono out
                        None => out_r.copy_from_slice(&in_l[..n]),
                    }
                }
            }
            _ => {
                match self.state {
                    SystemState::Overdubbing => {
                        let track = &mut self.tracks[self.selected_track];
                        let idx = track.curr_idx;
                        track.overdub(Channel::Left, idx, &in_l[rec_delay..n]);
                        if let Some(in_r) = in_r {
                            if track.is_stereo() {
                                track.overdub(Channel::Right, idx, &in_r[rec_delay..n]);
                            }
                        }
                    }
                    SystemState::Recording => {
                        let track = &mut self.tracks[self.selected_track];
                        let idx = track.curr_idx;
                        track.write(Channel::Left, idx, &in_l[rec_delay..n]);
                        if let Some(in_r) = in_r {
                            if track.is_stereo() {
                                track.write(Channel::Right, idx, &in_r[rec_delay..n]);
                            }
                        }
                    }
                    SystemState::Calibration => {
                        let track = &mut self.tracks[CALIBRATION_TRACK];
                        let idx = track.curr_idx;
                        track.write(Channel::Left, idx, &in_l[rec_delay..n]);
                    }
                    _ => {}
                }

                // A recording finalized this cycle still owes the input tail
                // captured before the stop command landed.
                if self.state == SystemState::Playback && play_delay > 0 {
                    let track = &mut self.tracks[self.selected_track];
                    let idx = track.curr_idx;
                    track.write(Channel::Left, idx, &in_l[..play_delay]);
                    if let Some(in_r) = in_r {
                        if track.is_stereo() {
                            track.write(Channel::Right, idx, &in_r[..play_delay]);
                        }
                    }
                }

                mixer::mix_down(
                    &self.tracks,
                    &self.groups,
                    self.selected_group,
                    Some(in_l),
                    in_r,
                    &mut self.mix_l,
                    &mut self.mix_r,
                    n,
                );
                out_l.copy_from_slice(&self.mix_l[..n]);
                if let Some(out_r) = out_r.as_deref_mut() {
                    if in_r.is_some() {
                        out_r.copy_from_slice(&self.mix_r[..n]);
                    } else {
                        out_r.copy_from_slice(&self.mix_l[..n]);
                    }
                }
            }
        }

        if self.state != SystemState::Passthrough {
            self.update_indices(n);
        }

        self.shared.clear_frame_delays();
        self.shared.publish_system_state(self.state);
        self.cycle_count += 1;
    }

    /// Advance the master index and every non-Off track of the active group.
    ///
    /// The recording track grows its end and the group's master length and is
    /// clamped at the sample limit (forcing playback when the buffer fills).
    /// Playback tracks wrap on repeat and realign when the master runs past
    /// the group length; the master itself resets only after all tracks have
    /// been updated so the whole group wraps coherently.
    pub(crate) fn update_indices(&mut self, n: usize) {
        let sg = self.selected_group;
        let st = self.selected_track;
        let recording = matches!(
            self.state,
            SystemState::Recording | SystemState::Overdubbing
        );
        let mut buffer_full = false;

        self.master_curr_idx = (self.master_curr_idx + n).min(self.sample_limit);

        for idx in 0..NUM_TRACKS {
            if !self.groups.contains(sg, idx) {
                continue;
            }
            let track = &mut self.tracks[idx];
            if track.state == TrackState::Off {
                continue;
            }
            // playback may run curr_idx past end_idx; the mixer then skips
            // the track until it wraps or realigns below
            track.curr_idx += n;

            if idx == st && recording {
                if track.curr_idx > self.sample_limit {
                    track.curr_idx = self.sample_limit;
                    buffer_full = true;
                }
                if track.curr_idx > track.end_idx {
                    track.end_idx = track.curr_idx;
                }
                if track.end_idx > self.master_length[sg] {
                    self.master_length[sg] = track.end_idx;
                }
            } else {
                if track.repeat && track.curr_idx > track.end_idx {
                    track.curr_idx = track.start_idx;
                }
                if self.master_curr_idx > self.master_length[sg] {
                    track.curr_idx = if track.repeat { track.start_idx } else { 0 };
                }
                track.curr_idx = track.curr_idx.min(self.sample_limit);
            }
        }

        if buffer_full {
            warn!(track = st, "track buffer full, forcing playback");
            self.state = SystemState::Playback;
        }

        if self.state == SystemState::Playback && self.master_curr_idx > self.master_length[sg] {
            self.master_curr_idx = 0;
        }
    }
}
