// src/audio_io.rs

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, FromSample, Sample, SampleFormat, Stream, StreamConfig};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use tracing::{error, info};

use crate::command::CycleClock;
use crate::config::Config;
use crate::engine::LooperEngine;

/// Open the input and output streams and hand the engine to the output
/// callback. Returns the running streams plus the active sample rate and
/// buffer size.
pub fn run_streams(
    config: &Config,
    engine: LooperEngine,
    clock: CycleClock,
) -> Result<(Stream, Stream, u32, u32)> {
    let host = cpal::default_host();
    let input_device = if let Some(name) = &config.input_device {
        host.input_devices()?
            .find(|d| d.name().ok().as_ref() == Some(name))
            .ok_or_else(|| anyhow::anyhow!("Input device not found: {}", name))?
    } else {
        host.default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No default input device"))?
    };
    let output_device = if let Some(name) = &config.output_device {
        host.output_devices()?
            .find(|d| d.name().ok().as_ref() == Some(name))
            .ok_or_else(|| anyhow::anyhow!("Output device not found: {}", name))?
    } else {
        host.default_output_device()
            .ok_or_else(|| anyhow::anyhow!("No default output device"))?
    };
    info!("using input device: {}", input_device.name()?);
    info!("using output device: {}", output_device.name()?);

    let default_input_config = input_device.default_input_config()?;
    let default_output_config = output_device.default_output_config()?;
    let sample_format = default_output_config.sample_format();

    let mut input_config: StreamConfig = default_input_config.into();
    let mut output_config: StreamConfig = default_output_config.into();
    if let Some(sr) = config.sample_rate {
        input_config.sample_rate = cpal::SampleRate(sr);
        output_config.sample_rate = cpal::SampleRate(sr);
    }
    if let Some(bs) = config.buffer_size {
        input_config.buffer_size = BufferSize::Fixed(bs);
        output_config.buffer_size = BufferSize::Fixed(bs);
    }

    let sample_rate = output_config.sample_rate.0;
    clock.set_sample_rate(sample_rate);

    // a capture pair (or mono sample) per frame, a few seconds deep
    let input_rb = HeapRb::<f32>::new(sample_rate as usize * 4);
    let (input_producer, input_consumer) = input_rb.split();

    // stereo capture only works out when the device actually has two inputs
    let stereo_in = config.stereo && input_config.channels >= 2;

    let (input_stream, output_stream) = match sample_format {
        SampleFormat::F32 => run::<f32>(
            &input_device,
            &input_config,
            &output_device,
            &output_config,
            input_producer,
            input_consumer,
            stereo_in,
            engine,
            clock,
        )?,
        SampleFormat::I16 => run::<i16>(
            &input_device,
            &input_config,
            &output_device,
            &output_config,
            input_producer,
            input_consumer,
            stereo_in,
            engine,
            clock,
        )?,
        SampleFormat::U16 => run::<u16>(
            &input_device,
            &input_config,
            &output_device,
            &output_config,
            input_producer,
            input_consumer,
            stereo_in,
            engine,
            clock,
        )?,
        format => return Err(anyhow::anyhow!("Unsupported sample format {}", format)),
    };

    let buffer_size = match output_config.buffer_size {
        BufferSize::Fixed(size) => size,
        BufferSize::Default => 512,
    };
    info!(sample_rate, buffer_size, "streams running");

    Ok((input_stream, output_stream, sample_rate, buffer_size))
}

#[allow(clippy::too_many_arguments)]
fn run<T>(
    input_device: &Device,
    input_config: &StreamConfig,
    output_device: &Device,
    output_config: &StreamConfig,
    input_producer: HeapProducer<f32>,
    input_consumer: HeapConsumer<f32>,
    stereo_in: bool,
    engine: LooperEngine,
    clock: CycleClock,
) -> Result<(Stream, Stream)>
where
    T: Sample + cpal::SizedSample + FromSample<f32>,
    f32: FromSample<T>,
{
    let input_stream = build_input_stream::<T>(input_device, input_config, input_producer, stereo_in)?;
    let output_stream = build_output_stream::<T>(
        output_device,
        output_config,
        input_consumer,
        stereo_in,
        engine,
        clock,
    )?;
    input_stream.play()?;
    output_stream.play()?;
    Ok((input_stream, output_stream))
}

fn build_input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut producer: HeapProducer<f32>,
    stereo_in: bool,
) -> Result<Stream>
where
    T: Sample + cpal::SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let err_fn = |err| error!("input stream error: {}", err);

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for frame in data.chunks_exact(channels) {
                if stereo_in {
                    let l = f32::from_sample(frame[0]);
                    let r = f32::from_sample(frame[1]);
                    // on overrun the pair is dropped together to keep the
                    // interleaving intact
                    if producer.free_len() >= 2 {
                        producer.push(l).ok();
                        producer.push(r).ok();
                    }
                } else {
                    let mono = frame.iter().map(|s| f32::from_sample(*s)).sum::<f32>()
                        / channels as f32;
                    producer.push(mono).ok();
                }
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

fn build_output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapConsumer<f32>,
    stereo_in: bool,
    mut engine: LooperEngine,
    clock: CycleClock,
) -> Result<Stream>
where
    T: Sample + cpal::SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let err_fn = |err| error!("output stream error: {}", err);
    let per_frame = if stereo_in { 2 } else { 1 };

    let mut interleaved: Vec<f32> = Vec::new();
    let mut in_l: Vec<f32> = Vec::new();
    let mut in_r: Vec<f32> = Vec::new();
    let mut out_l: Vec<f32> = Vec::new();
    let mut out_r: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let n = data.len() / channels;
            clock.stamp(n);

            interleaved.resize(n * per_frame, 0.0);
            in_l.resize(n, 0.0);
            out_l.resize(n, 0.0);

            // bound capture latency to roughly one cycle
            let target = n * per_frame;
            if consumer.len() > target {
                consumer.skip(consumer.len() - target);
            }
            let read = consumer.pop_slice(&mut interleaved);
            interleaved[read..].fill(0.0);

            if stereo_in {
                in_r.resize(n, 0.0);
                for i in 0..n {
                    in_l[i] = interleaved[2 * i];
                    in_r[i] = interleaved[2 * i + 1];
                }
            } else {
                in_l.copy_from_slice(&interleaved[..n]);
            }

            if channels >= 2 {
                out_r.resize(n, 0.0);
                engine.process(
                    &in_l,
                    stereo_in.then_some(in_r.as_slice()),
                    &mut out_l,
                    Some(&mut out_r),
                );
            } else {
                engine.process(&in_l, stereo_in.then_some(in_r.as_slice()), &mut out_l, None);
            }

            for (i, frame) in data.chunks_mut(channels).enumerate() {
                for (ch, sample) in frame.iter_mut().enumerate() {
                    let value = if ch == 1 && channels >= 2 { out_r[i] } else { out_l[i] };
                    *sample = T::from_sample(value);
                }
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
