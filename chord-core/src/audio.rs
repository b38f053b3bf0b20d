//! # Audio Capture Module
//!
//! This module defines the audio blocks the pipeline consumes and the sources
//! that produce them: real-time capture using CPAL (Cross-Platform Audio
//! Library) and a scripted source that replays prepared blocks.
//!
//! ## Features
//! - Automatic audio device selection with mono downmix
//! - Sliding analysis blocks of `transform_size` samples every `hop_size` samples
//! - Non-blocking handoff from the capture callback to the analysis thread
//! - Deterministic replay and sine synthesis for tests and demos

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::Sender;

use crate::config::DetectorConfig;
use crate::error::ConfigError;

/// One block of mono samples as delivered by a capture callback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Vec<f32>,
    sample_rate: u32,
    timestamp: Duration,
}

impl AudioBlock {
    /// Creates a block.
    ///
    /// # Arguments
    /// * `samples` - Mono samples in [-1, 1]
    /// * `sample_rate` - Rate the samples were captured at, in Hz
    /// * `timestamp` - Capture time of the first sample, from session start
    ///
    /// # Errors
    /// * [`ConfigError::ZeroSampleRate`] if `sample_rate` is zero
    pub fn new(
        samples: Vec<f32>,
        sample_rate: u32,
        timestamp: Duration,
    ) -> Result<Self, ConfigError> {
        if sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        Ok(Self {
            samples,
            sample_rate,
            timestamp,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

/// A producer of audio blocks: the capture boundary of a detection session.
///
/// `start` must return promptly and deliver blocks from another context
/// without ever blocking on the consumer.
pub trait AudioSource {
    fn start(&mut self, sink: Sender<AudioBlock>) -> Result<()>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

/// Sums sine waves of equal `amplitude` at `frequencies`.
///
/// `start_sample` offsets the phase, so consecutive calls continue the same
/// waveform.
pub fn sine_mix(
    frequencies: &[f32],
    amplitude: f32,
    len: usize,
    sample_rate: u32,
    start_sample: usize,
) -> Vec<f32> {
    let rate = sample_rate as f64;
    (0..len)
        .map(|i| {
            let t = (start_sample + i) as f64 / rate;
            frequencies
                .iter()
                .map(|&f| (2.0 * std::f64::consts::PI * f as f64 * t).sin())
                .sum::<f64>() as f32
                * amplitude
        })
        .collect()
}

/// Builds `count` consecutive blocks of a steady tone, spaced by `hop` samples.
///
/// # Errors
/// * [`ConfigError::ZeroSampleRate`] if `sample_rate` is zero
pub fn tone_blocks(
    frequencies: &[f32],
    amplitude: f32,
    block_len: usize,
    hop: usize,
    sample_rate: u32,
    first_sample: usize,
    count: usize,
) -> Result<Vec<AudioBlock>, ConfigError> {
    (0..count)
        .map(|i| {
            let start = first_sample + i * hop;
            AudioBlock::new(
                sine_mix(frequencies, amplitude, block_len, sample_rate, start),
                sample_rate,
                samples_to_duration(start, sample_rate),
            )
        })
        .collect()
}

fn samples_to_duration(samples: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(samples as f64 / sample_rate.max(1) as f64)
}

/// Replays prepared blocks from a background thread.
///
/// Used as the capture double in tests and for the demo mode of the binary.
/// Unlike real capture it waits for queue space, so no block is ever dropped.
#[derive(Debug)]
pub struct ScriptedSource {
    blocks: Arc<Vec<AudioBlock>>,
    pace: Option<Duration>,
    running: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
}

impl ScriptedSource {
    /// Replays `blocks` as fast as the consumer takes them.
    pub fn new(blocks: Vec<AudioBlock>) -> Self {
        Self {
            blocks: Arc::new(blocks),
            pace: None,
            running: Arc::new(AtomicBool::new(false)),
            feeder: None,
        }
    }

    /// Sleeps `pace` between blocks, imitating a hardware cadence.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }
}

impl AudioSource for ScriptedSource {
    fn start(&mut self, sink: Sender<AudioBlock>) -> Result<()> {
        self.stop();
        self.running.store(true, Ordering::SeqCst);

        let blocks = Arc::clone(&self.blocks);
        let running = Arc::clone(&self.running);
        let pace = self.pace;
        self.feeder = Some(
            thread::Builder::new()
                .name("scripted-source".into())
                .spawn(move || {
                    for block in blocks.iter() {
                        if !running.load(Ordering::SeqCst) || sink.send(block.clone()).is_err() {
                            break;
                        }
                        if let Some(pace) = pace {
                            thread::sleep(pace);
                        }
                    }
                    running.store(false, Ordering::SeqCst);
                })
                .context("failed to spawn scripted source thread")?,
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(feeder) = self.feeder.take() {
            // The feeder may sit in a blocking send; the session drops the
            // receiver before stopping the source, which unblocks it.
            let _ = feeder.join();
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Turns interleaved device frames into overlapping mono blocks.
///
/// Frames are downmixed by averaging their channels. A block of `block_size`
/// samples is emitted every `hop_size` samples, stamped with the position of
/// its first sample. The position advances whether or not the receiver of a
/// block keeps it.
#[derive(Debug)]
pub struct BlockSlicer {
    channels: usize,
    block_size: usize,
    hop_size: usize,
    sample_rate: u32,
    buffer: Vec<f32>,
    emitted_samples: usize,
}

impl BlockSlicer {
    pub fn new(channels: usize, block_size: usize, hop_size: usize, sample_rate: u32) -> Self {
        let block_size = block_size.max(1);
        Self {
            channels: channels.max(1),
            block_size,
            hop_size: hop_size.clamp(1, block_size),
            sample_rate,
            buffer: Vec::with_capacity(block_size * 2),
            emitted_samples: 0,
        }
    }

    /// Appends one callback's worth of interleaved samples and hands every
    /// completed block to `emit`.
    pub fn push(&mut self, data: &[f32], mut emit: impl FnMut(AudioBlock)) {
        self.buffer.extend(
            data.chunks(self.channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );

        while self.buffer.len() >= self.block_size {
            emit(AudioBlock {
                samples: self.buffer[..self.block_size].to_vec(),
                sample_rate: self.sample_rate,
                timestamp: samples_to_duration(self.emitted_samples, self.sample_rate),
            });
            self.buffer.drain(..self.hop_size);
            self.emitted_samples += self.hop_size;
        }
    }
}

/// Captures from the default input device.
pub struct CpalSource {
    preferred_sample_rate: u32,
    block_size: usize,
    hop_size: usize,
    stream: Option<cpal::Stream>,
}

impl std::fmt::Debug for CpalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalSource")
            .field("block_size", &self.block_size)
            .field("hop_size", &self.hop_size)
            .field("running", &self.stream.is_some())
            .finish()
    }
}

impl CpalSource {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            preferred_sample_rate: config.preferred_sample_rate,
            block_size: config.transform_size,
            hop_size: config.hop_size.clamp(1, config.transform_size.max(1)),
            stream: None,
        }
    }
}

impl AudioSource for CpalSource {
    /// Starts audio capture from the default input device.
    ///
    /// This function:
    /// 1. Selects the default audio input device
    /// 2. Picks an f32 configuration near the preferred sample rate
    /// 3. Sets up a callback that downmixes to mono, slices sliding blocks and
    ///    hands them to `sink` without blocking
    fn start(&mut self, sink: Sender<AudioBlock>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;

        log::info!("Using audio input device: {}", device.name()?);

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, self.preferred_sample_rate)
            .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

        let rate = self.preferred_sample_rate.clamp(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
        );
        let config: cpal::StreamConfig = supported_config
            .with_sample_rate(cpal::SampleRate(rate))
            .into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels.max(1) as usize;

        log::info!("Selected sample rate: {} Hz, {} channel(s)", sample_rate, channels);

        let err_fn = |err| log::error!("An error occurred on the audio stream: {}", err);

        let mut slicer = BlockSlicer::new(channels, self.block_size, self.hop_size, sample_rate);

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                slicer.push(data, |block| {
                    // A full queue means analysis is behind; drop rather than wait.
                    let _ = sink.try_send(block);
                });
            },
            err_fn,
            None,
        )?;

        stream.play()?;

        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Error pausing stream: {}", e);
            }
            drop(stream);
            log::info!("Audio capture stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Only 32-bit float configurations are considered. Mono is preferred, then
/// the configuration whose rate range comes closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let supported = c.min_sample_rate().0..=c.max_sample_rate().0;
            let rate_distance = if supported.contains(&target_rate) {
                0
            } else {
                let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
                let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
                min_diff.min(max_diff)
            };
            (c.channels() != 1, rate_distance)
        })
}
