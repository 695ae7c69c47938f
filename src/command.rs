// src/command.rs

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::engine::SystemState;

/// A validated state change headed for the realtime thread.
///
/// The control thread publishes at most one of these per accepted command
/// into a capacity-one SPSC ring; the engine drains at most one per cycle,
/// at the cycle boundary, before any audio work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    RecordTrack { track: usize, group: usize },
    OverdubTrack { track: usize },
    /// Stops a recording, or updates repeat during playback. `repeat` is
    /// `None` when the command carried no repeat option.
    PlayTrack { track: usize, repeat: Option<bool> },
    MuteTrack { track: usize },
    UnmuteTrack { track: usize },
    AddTrackToGroup { track: usize, group: usize },
    RemoveTrackFromGroup { track: usize, group: usize },
    SetActiveGroup { group: usize },
    SystemReset,
}

/// Cells shared between the control thread and the realtime thread.
///
/// The frame delays are written by the producer before the matching event is
/// pushed into the inbox; the ring's release/acquire pair makes them visible
/// to the consumer. The engine zeroes both at the end of every cycle.
#[derive(Clone)]
pub struct SharedControl {
    rec_frame_delay: Arc<AtomicUsize>,
    play_frame_delay: Arc<AtomicUsize>,
    exit_now: Arc<AtomicBool>,
    system_state: Arc<AtomicU8>,
}

impl SharedControl {
    pub fn new() -> Self {
        Self {
            rec_frame_delay: Arc::new(AtomicUsize::new(0)),
            play_frame_delay: Arc::new(AtomicUsize::new(0)),
            exit_now: Arc::new(AtomicBool::new(false)),
            system_state: Arc::new(AtomicU8::new(SystemState::Passthrough as u8)),
        }
    }

    pub fn rec_frame_delay(&self) -> usize {
        self.rec_frame_delay.load(Ordering::Relaxed)
    }

    pub fn set_rec_frame_delay(&self, frames: usize) {
        self.rec_frame_delay.store(frames, Ordering::Relaxed);
    }

    pub fn play_frame_delay(&self) -> usize {
        self.play_frame_delay.load(Ordering::Relaxed)
    }

    pub fn set_play_frame_delay(&self, frames: usize) {
        self.play_frame_delay.store(frames, Ordering::Relaxed);
    }

    pub fn clear_frame_delays(&self) {
        self.rec_frame_delay.store(0, Ordering::Relaxed);
        self.play_frame_delay.store(0, Ordering::Relaxed);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_now.load(Ordering::Relaxed)
    }

    pub fn request_exit(&self) {
        self.exit_now.store(true, Ordering::Relaxed);
    }

    /// Last system state published by the engine; the control thread uses it
    /// to decide whether a play command is stopping a recording.
    pub fn system_state(&self) -> SystemState {
        self.system_state.load(Ordering::Relaxed).into()
    }

    pub fn publish_system_state(&self, state: SystemState) {
        self.system_state.store(state as u8, Ordering::Relaxed);
    }
}

impl Default for SharedControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks where the audio callback is within its current cycle so the
/// control thread can timestamp commands in frames.
#[derive(Clone)]
pub struct CycleClock {
    inner: Arc<ClockInner>,
}

struct ClockInner {
    epoch: Instant,
    cycle_start_ns: AtomicU64,
    cycle_frames: AtomicUsize,
    sample_rate: AtomicU32,
}

impl CycleClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ClockInner {
                epoch: Instant::now(),
                cycle_start_ns: AtomicU64::new(0),
                cycle_frames: AtomicUsize::new(0),
                sample_rate: AtomicU32::new(0),
            }),
        }
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.inner.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    /// Called by the audio callback at the top of each cycle.
    pub fn stamp(&self, nframes: usize) {
        let now = self.inner.epoch.elapsed().as_nanos() as u64;
        self.inner.cycle_frames.store(nframes, Ordering::Relaxed);
        self.inner.cycle_start_ns.store(now, Ordering::Relaxed);
    }

    /// Frames elapsed since the current cycle began, clamped to the cycle
    /// length. Zero until the first cycle has been stamped.
    pub fn frames_since_cycle_start(&self) -> usize {
        let sample_rate = self.inner.sample_rate.load(Ordering::Relaxed);
        let cycle_frames = self.inner.cycle_frames.load(Ordering::Relaxed);
        if sample_rate == 0 || cycle_frames == 0 {
            return 0;
        }
        let start = self.inner.cycle_start_ns.load(Ordering::Relaxed);
        let now = self.inner.epoch.elapsed().as_nanos() as u64;
        let elapsed_ns = now.saturating_sub(start);
        let frames = elapsed_ns as u128 * sample_rate as u128 / 1_000_000_000;
        (frames as usize).min(cycle_frames)
    }
}

impl Default for CycleClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_delays_are_single_use() {
        let shared = SharedControl::new();
        shared.set_rec_frame_delay(40);
        shared.set_play_frame_delay(17);
        assert_eq!(shared.rec_frame_delay(), 40);
        assert_eq!(shared.play_frame_delay(), 17);

        shared.clear_frame_delays();
        assert_eq!(shared.rec_frame_delay(), 0);
        assert_eq!(shared.play_frame_delay(), 0);
    }

    #[test]
    fn clock_clamps_to_cycle_length() {
        let clock = CycleClock::new();
        assert_eq!(clock.frames_since_cycle_start(), 0);

        clock.set_sample_rate(44_100);
        clock.stamp(128);
        std::thread::sleep(std::time::Duration::from_millis(20));
        // 20 ms at 44.1 kHz is far past one 128-frame cycle
        assert_eq!(clock.frames_since_cycle_start(), 128);
    }

    #[test]
    fn exit_flag_round_trips() {
        let shared = SharedControl::new();
        assert!(!shared.exit_requested());
        shared.request_exit();
        assert!(shared.exit_requested());
    }
}
