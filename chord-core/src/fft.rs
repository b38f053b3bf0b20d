//! # Fast Fourier Transform (FFT) Module
//!
//! This module turns a block of audio samples into a magnitude spectrum for
//! pitch detection and chroma extraction.
//!
//! ## Features
//! - High-performance FFT using RustFFT, planned once per analyzer
//! - Hann windowing for reduced spectral leakage
//! - Magnitudes scaled by `2 / N` so a bin approximates a sinusoid's amplitude
//! - Every buffer is allocated at construction and reused for each block

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::MIN_TRANSFORM_SIZE;
use crate::error::ConfigError;

/// A magnitude spectrum produced by [`SpectralAnalyzer::analyze`].
///
/// Holds `transform_size / 2` non-negative magnitudes together with the
/// sample rate and transform size that produced them, which fixes the bin
/// width at `sample_rate / transform_size`.
#[derive(Debug, Clone, Copy)]
pub struct SpectralFrame<'a> {
    magnitudes: &'a [f32],
    sample_rate: u32,
    transform_size: usize,
}

impl<'a> SpectralFrame<'a> {
    /// Wraps an existing magnitude spectrum, assuming it holds the first half
    /// of a `2 * magnitudes.len()` point transform.
    pub fn from_magnitudes(magnitudes: &'a [f32], sample_rate: u32) -> Self {
        Self {
            magnitudes,
            sample_rate,
            transform_size: magnitudes.len() * 2,
        }
    }

    pub fn magnitudes(&self) -> &'a [f32] {
        self.magnitudes
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    /// Width of one bin in Hz.
    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.transform_size as f32
    }

    /// Centre frequency of `bin` in Hz.
    pub fn frequency_of_bin(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_width()
    }

    /// Bin containing `frequency` (truncating), or `None` past the spectrum.
    pub fn bin_of_frequency(&self, frequency: f32) -> Option<usize> {
        if !(frequency >= 0.0) {
            return None;
        }
        let bin = (frequency / self.bin_width()) as usize;
        (bin < self.magnitudes.len()).then_some(bin)
    }

    /// Magnitude of the bin containing `frequency`, zero outside the spectrum.
    pub fn magnitude_at(&self, frequency: f32) -> f32 {
        self.bin_of_frequency(frequency)
            .map_or(0.0, |bin| self.magnitudes[bin])
    }

    /// Magnitude of the bin whose centre is nearest to `frequency`, zero
    /// outside the spectrum.
    pub fn nearest_magnitude(&self, frequency: f32) -> f32 {
        if !(frequency >= 0.0) {
            return 0.0;
        }
        let bin = (frequency / self.bin_width()).round() as usize;
        self.magnitudes.get(bin).copied().unwrap_or(0.0)
    }

    /// Index of the strongest bin, or `None` for an empty spectrum.
    pub fn peak_bin(&self) -> Option<usize> {
        self.magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(bin, _)| bin)
    }
}

/// Builds a symmetric Hann window of length `n`.
///
/// The Hann window tapers the block to zero at both edges, which keeps the
/// energy of a steady tone concentrated in a few bins.
fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// Converts sample blocks into magnitude spectra.
///
/// Input blocks shorter than the transform size are zero-padded at the end;
/// longer blocks keep only their first `transform_size` samples.
pub struct SpectralAnalyzer {
    transform_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl std::fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("transform_size", &self.transform_size)
            .finish_non_exhaustive()
    }
}

impl SpectralAnalyzer {
    /// Plans the transform and allocates every working buffer.
    ///
    /// # Errors
    /// * [`ConfigError::InvalidTransformSize`] if `transform_size` is odd or
    ///   smaller than [`MIN_TRANSFORM_SIZE`]
    pub fn new(transform_size: usize) -> Result<Self, ConfigError> {
        if transform_size < MIN_TRANSFORM_SIZE || transform_size % 2 != 0 {
            return Err(ConfigError::InvalidTransformSize {
                min: MIN_TRANSFORM_SIZE,
                got: transform_size,
            });
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(transform_size);
        let scratch_len = fft.get_inplace_scratch_len();

        Ok(Self {
            transform_size,
            fft,
            window: hann_window(transform_size),
            buffer: vec![Complex::new(0.0, 0.0); transform_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; transform_size / 2],
        })
    }

    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    /// Windows, transforms and scales one block of samples.
    ///
    /// The returned frame borrows the analyzer's magnitude buffer and is
    /// overwritten by the next call.
    ///
    /// # Arguments
    /// * `samples` - Audio samples; zero-padded or truncated to the transform size
    /// * `sample_rate` - Sample rate of this block in Hz
    pub fn analyze(&mut self, samples: &[f32], sample_rate: u32) -> SpectralFrame<'_> {
        let used = samples.len().min(self.transform_size);

        let windowed = samples[..used].iter().zip(&self.window);
        for (slot, (&sample, &w)) in self.buffer.iter_mut().zip(windowed) {
            *slot = Complex::new(sample * w, 0.0);
        }
        for slot in &mut self.buffer[used..] {
            *slot = Complex::new(0.0, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 2.0 / self.transform_size as f32;
        for (magnitude, c) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *magnitude = c.norm() * scale; // .norm() is sqrt(re^2 + im^2)
        }

        SpectralFrame {
            magnitudes: &self.magnitudes,
            sample_rate,
            transform_size: self.transform_size,
        }
    }
}
