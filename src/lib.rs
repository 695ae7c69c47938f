// src/lib.rs
//
// Multi-track live audio looper. The realtime engine records a live input
// signal into grouped tracks, mixes them back with the input, and takes its
// state changes from a lock-free command inbox fed by a byte protocol.

pub mod audio_io;
pub mod command;
pub mod config;
pub mod control;
pub mod engine;
pub mod group;
pub mod mixer;
pub mod protocol;
pub mod track;
