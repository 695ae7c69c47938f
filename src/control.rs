// src/control.rs

use tracing::info;

use crate::command::ControlEvent;
use crate::engine::{LooperEngine, SystemState, NUM_GROUPS, NUM_TRACKS};
use crate::track::TrackState;

impl LooperEngine {
    /// Apply one validated event. Events that are not legal in the current
    /// state are silently ignored.
    pub(crate) fn apply_event(&mut self, event: ControlEvent) {
        use ControlEvent::*;
        match self.state {
            SystemState::Passthrough => {
                if let RecordTrack { track, group } = event {
                    self.start_recording(track, group);
                }
            }
            SystemState::Playback => match event {
                SystemReset => self.reset_system(),
                RecordTrack { track, group } => self.start_recording(track, group),
                OverdubTrack { track } => self.start_overdubbing(track),
                PlayTrack { track, repeat } => self.update_repeat(track, repeat),
                MuteTrack { track } => self.mute_track(track),
                UnmuteTrack { track } => self.unmute_track(track),
                AddTrackToGroup { track, group } => self.groups.add(group, track),
                RemoveTrackFromGroup { track, group } => self.groups.remove(group, track),
                SetActiveGroup { group } => self.set_active_group(group),
            },
            SystemState::Recording => match event {
                SystemReset => self.reset_system(),
                // a stop always lands on the track being recorded, whatever
                // track number the command named
                PlayTrack { repeat, .. } => self.stop_recording(repeat),
                _ => {}
            },
            SystemState::Overdubbing => match event {
                SystemReset => self.reset_system(),
                PlayTrack { repeat, .. } => self.stop_overdubbing(repeat),
                _ => {}
            },
            SystemState::Calibration => {
                if event == SystemReset {
                    self.reset_system();
                }
            }
        }
    }

    /// Tracks in the active group holding recorded data.
    fn num_active_tracks(&self) -> usize {
        self.groups
            .tracks(self.selected_group)
            .filter(|&t| self.tracks[t].end_idx > 0)
            .count()
    }

    fn start_recording(&mut self, track: usize, group: usize) {
        if !self.groups.contains(group, track) {
            self.groups.add(group, track);
        }

        // A first recording, a new group, or re-recording the only current
        // track all restart the master timeline.
        let active = self.num_active_tracks();
        if active == 0
            || group != self.selected_group
            || (active == 1 && self.selected_track == track)
        {
            self.master_curr_idx = 0;
            self.master_length[group] = 0;
        }

        let master_curr_idx = self.master_curr_idx;
        let t = &mut self.tracks[track];
        t.repeat = false;
        t.end_idx = 0;
        t.curr_idx = master_curr_idx;
        t.start_idx = master_curr_idx;
        t.state = TrackState::Recording;

        self.selected_group = group;
        self.selected_track = track;
        self.state = SystemState::Recording;
        info!(track, group, "recording started");
    }

    /// Overdub leaves every index alone so no recorded data is lost.
    fn start_overdubbing(&mut self, track: usize) {
        if self.tracks[track].state != TrackState::Playback {
            return;
        }
        self.selected_track = track;
        self.tracks[track].state = TrackState::Recording;
        self.state = SystemState::Overdubbing;
        info!(track, "overdub started");
    }

    fn stop_recording(&mut self, repeat: Option<bool>) {
        let track = self.selected_track;
        let group = self.selected_group;
        let play_delay = self.shared.play_frame_delay();

        if repeat == Some(true) {
            self.tracks[track].repeat = true;
        }

        let max_idx = self.tracks[track].max_idx();
        let t = &mut self.tracks[track];
        t.end_idx = (t.curr_idx + play_delay).min(max_idx);

        if self.tracks[track].end_idx > self.master_length[group] {
            self.master_length[group] = self.tracks[track].end_idx;
            self.master_curr_idx = 0;
        }

        self.state = SystemState::Playback;
        self.tracks[track].state = TrackState::Playback;
        info!(track, play_delay, "recording stopped");
    }

    fn stop_overdubbing(&mut self, repeat: Option<bool>) {
        let track = self.selected_track;
        let group = self.selected_group;
        let play_delay = self.shared.play_frame_delay();

        if repeat == Some(true) {
            self.tracks[track].repeat = true;
        }

        // the loop body only grows, and only when the position has actually
        // run past it; an overdub that stopped mid-loop keeps its end
        let max_idx = self.tracks[track].max_idx();
        let t = &mut self.tracks[track];
        if t.end_idx < t.curr_idx {
            t.end_idx = (t.curr_idx + play_delay).min(max_idx);
        }

        if self.tracks[track].end_idx > self.master_length[group] {
            self.master_length[group] = self.tracks[track].end_idx;
            self.master_curr_idx = 0;
        }

        self.state = SystemState::Playback;
        self.tracks[track].state = TrackState::Playback;
        info!(track, "overdub stopped");
    }

    fn update_repeat(&mut self, track: usize, repeat: Option<bool>) {
        self.selected_track = track;
        if let Some(repeat) = repeat {
            let t = &mut self.tracks[track];
            if t.repeat != repeat {
                t.repeat = repeat;
                info!(track, repeat, "repeat updated");
            }
        }
    }

    fn mute_track(&mut self, track: usize) {
        if self.tracks[track].state == TrackState::Off {
            return;
        }
        self.selected_track = track;
        self.tracks[track].state = TrackState::Mute;
    }

    fn unmute_track(&mut self, track: usize) {
        if self.tracks[track].state == TrackState::Off {
            return;
        }
        self.selected_track = track;
        self.tracks[track].state = TrackState::Playback;
    }

    /// Switch the performing section: park every sounding track, then wake
    /// the new group's members from their loop starts.
    fn set_active_group(&mut self, group: usize) {
        self.selected_group = group;
        for track in self.tracks.iter_mut() {
            if track.state != TrackState::Off {
                track.state = TrackState::Mute;
            }
        }
        for idx in 0..NUM_TRACKS {
            if !self.groups.contains(group, idx) {
                continue;
            }
            let track = &mut self.tracks[idx];
            if track.state != TrackState::Off {
                track.state = TrackState::Playback;
                track.curr_idx = if track.repeat { track.start_idx } else { 0 };
            }
        }
        self.master_curr_idx = 0;
        info!(group, "active group set");
    }

    fn reset_system(&mut self) {
        self.master_length = [0; NUM_GROUPS];
        self.master_curr_idx = 0;
        self.selected_track = 0;
        self.selected_group = 0;
        for track in self.tracks.iter_mut() {
            track.reset();
        }
        self.groups.clear();
        self.state = SystemState::Passthrough;
        info!("system reset");
    }
}
