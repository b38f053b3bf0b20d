//! # Configuration Module
//!
//! All tunable constants of the detection pipeline live in [`DetectorConfig`].
//! The config is handed to the pipeline (or session) at construction and is
//! validated there, so a bad value fails fast instead of producing garbage.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest transform size the analyzer accepts.
pub const MIN_TRANSFORM_SIZE: usize = 16;

/// Tunable parameters for spectral analysis, pitch tracking and chord smoothing.
///
/// Every field has a default, so a partial JSON document deserializes into a
/// usable config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// FFT length in samples.
    pub transform_size: usize,
    /// New samples between two successive analysis blocks.
    pub hop_size: usize,
    /// Sample rate requested from the capture device.
    pub preferred_sample_rate: u32,
    /// Lowest fundamental searched for, in Hz.
    pub min_frequency: f32,
    /// Highest fundamental searched for, in Hz.
    pub max_frequency: f32,
    /// Minimum spectrum magnitude for a peak to become a pitch observation.
    pub peak_magnitude_threshold: f32,
    /// Pitch observations kept per block.
    pub max_pitches: usize,
    /// Harmonics combined in the harmonic product spectrum.
    pub harmonic_count: usize,
    /// Length of the moving-median frequency filter.
    pub median_window: usize,
    /// Cents from the locked note still considered "in lock".
    pub lock_tolerance_cents: f32,
    /// Cents past the tolerance that force an immediate note switch.
    pub hysteresis_cents: f32,
    /// Cosine similarity a chord template must exceed.
    pub similarity_threshold: f32,
    /// Consecutive matching observations needed to confirm a chord.
    pub confirmation_count: u32,
    /// Window during which a repeated confirmed chord is simply held.
    pub stability_duration_secs: f64,
    /// How long a confirmed chord survives blocks without any chord.
    pub clear_delay_secs: f64,
    /// Capacity of the capture to worker block queue.
    pub queue_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            transform_size: 4096,
            hop_size: 1024,
            preferred_sample_rate: 44_100,
            min_frequency: 60.0,
            max_frequency: 2000.0,
            peak_magnitude_threshold: 0.01,
            max_pitches: 6,
            harmonic_count: 5,
            median_window: 5,
            lock_tolerance_cents: 50.0,
            hysteresis_cents: 35.0,
            similarity_threshold: 0.5,
            confirmation_count: 5,
            stability_duration_secs: 2.0,
            clear_delay_secs: 2.5,
            queue_capacity: 8,
        }
    }
}

impl DetectorConfig {
    /// Checks every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transform_size < MIN_TRANSFORM_SIZE || self.transform_size % 2 != 0 {
            return Err(ConfigError::InvalidTransformSize {
                min: MIN_TRANSFORM_SIZE,
                got: self.transform_size,
            });
        }
        if self.hop_size == 0 || self.hop_size > self.transform_size {
            return Err(ConfigError::Invalid(format!(
                "hop size must be between 1 and {}, got {}",
                self.transform_size, self.hop_size
            )));
        }
        if self.preferred_sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if !(self.min_frequency > 0.0 && self.min_frequency < self.max_frequency)
            || !self.max_frequency.is_finite()
        {
            return Err(ConfigError::InvalidFrequencyRange {
                min: self.min_frequency,
                max: self.max_frequency,
            });
        }
        if !(self.peak_magnitude_threshold >= 0.0) {
            return Err(ConfigError::Invalid(
                "peak magnitude threshold must be non-negative".into(),
            ));
        }
        if self.harmonic_count == 0 || self.harmonic_count > self.transform_size / 4 {
            return Err(ConfigError::Invalid(format!(
                "harmonic count {} does not fit a {}-point spectrum",
                self.harmonic_count,
                self.transform_size / 2
            )));
        }
        if self.max_pitches == 0 || self.median_window == 0 || self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "max_pitches, median_window and queue_capacity must be at least 1".into(),
            ));
        }
        if !(self.lock_tolerance_cents > 0.0) || !(self.hysteresis_cents >= 0.0) {
            return Err(ConfigError::Invalid(
                "lock tolerance must be positive and hysteresis non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "similarity threshold must lie in [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.confirmation_count == 0 {
            return Err(ConfigError::Invalid(
                "confirmation count must be at least 1".into(),
            ));
        }
        for (name, secs) in [
            ("stability duration", self.stability_duration_secs),
            ("clear delay", self.clear_delay_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number of seconds, got {secs}"
                )));
            }
        }
        Ok(())
    }

    pub fn stability_duration(&self) -> Duration {
        Duration::from_secs_f64(self.stability_duration_secs)
    }

    pub fn clear_delay(&self) -> Duration {
        Duration::from_secs_f64(self.clear_delay_secs)
    }
}
