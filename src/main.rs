// src/main.rs

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ringbuf::{HeapProducer, HeapRb};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use loopdeck::audio_io;
use loopdeck::command::{ControlEvent, CycleClock, SharedControl};
use loopdeck::config::Config;
use loopdeck::engine::{LooperEngine, SystemState};
use loopdeck::protocol::{self, Command, ACK, COMMAND_LEN, NAK};

#[derive(Parser, Debug)]
#[command(name = "loopdeck", about = "Multi-track live audio looper")]
struct Args {
    /// Path to a JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Input device name (overrides the settings file)
    #[arg(long)]
    input_device: Option<String>,
    /// Output device name (overrides the settings file)
    #[arg(long)]
    output_device: Option<String>,
    #[arg(long)]
    sample_rate: Option<u32>,
    #[arg(long)]
    buffer_size: Option<u32>,
    /// Force mono capture and mono track buffers
    #[arg(long)]
    mono: bool,
}

fn main() -> Result<()> {
    // stdout carries the protocol reply bytes, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if args.input_device.is_some() {
        config.input_device = args.input_device;
    }
    if args.output_device.is_some() {
        config.output_device = args.output_device;
    }
    if args.sample_rate.is_some() {
        config.sample_rate = args.sample_rate;
    }
    if args.buffer_size.is_some() {
        config.buffer_size = args.buffer_size;
    }
    if args.mono {
        config.stereo = false;
    }

    let shared = SharedControl::new();
    let clock = CycleClock::new();
    let (producer, consumer) = HeapRb::<ControlEvent>::new(1).split();
    let engine = LooperEngine::new(
        consumer,
        shared.clone(),
        config.stereo,
        config.sample_limit(),
    );

    let (_input_stream, _output_stream, sample_rate, buffer_size) =
        audio_io::run_streams(&config, engine, clock.clone())?;
    info!(
        sample_rate,
        buffer_size, "engine ready, reading commands from stdin"
    );

    control_loop(producer, &shared, &clock);

    info!("shutting down");
    Ok(())
}

/// Read six-byte commands from stdin, timestamp record/play boundaries
/// against the cycle clock, and publish validated events to the engine.
fn control_loop(mut producer: HeapProducer<ControlEvent>, shared: &SharedControl, clock: &CycleClock) {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut buf = [0u8; COMMAND_LEN];
    let mut len = 0usize;

    for byte in stdin.lock().bytes() {
        let byte = match byte {
            Ok(byte) => byte,
            Err(_) => break,
        };
        // stray terminators between commands keep the framing aligned
        if len == 0 && (byte == b'\r' || byte == b'\n') {
            continue;
        }
        buf[len] = byte;
        len += 1;
        if len < COMMAND_LEN {
            continue;
        }
        len = 0;

        // Note how far into the audio cycle the command landed, before the
        // engine gets to see the event.
        match buf[0] {
            b'r' | b'R' | b'o' | b'O' => {
                shared.set_rec_frame_delay(clock.frames_since_cycle_start());
            }
            b'p' | b'P' => {
                if matches!(
                    shared.system_state(),
                    SystemState::Recording | SystemState::Overdubbing
                ) {
                    shared.set_play_frame_delay(clock.frames_since_cycle_start());
                }
            }
            _ => {}
        }

        let reply = match protocol::parse(&buf) {
            Ok(Command::Event(event)) => {
                if producer.push(event).is_err() {
                    // commands are latched user intent; the unread
                    // predecessor wins
                    debug!(?event, "inbox full, command dropped");
                }
                ACK
            }
            Ok(Command::Quit) => {
                shared.request_exit();
                ACK
            }
            Err(err) => {
                warn!(%err, "rejected command");
                NAK
            }
        };
        stdout.write_all(&[reply]).ok();
        stdout.flush().ok();

        if shared.exit_requested() {
            break;
        }
    }
}
