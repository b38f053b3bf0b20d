//! # Pitch Detection Module
//!
//! This module finds fundamental frequencies in a magnitude spectrum using a
//! harmonic product spectrum (HPS).
//!
//! ## Features
//! - Log-domain HPS so products of many small magnitudes never underflow
//! - Strict local-maximum peak picking inside a frequency range
//! - Quadratic interpolation for sub-bin accuracy
//! - Octave error correction against the original spectrum

use crate::fft::SpectralFrame;

/// Added to every magnitude before taking its logarithm.
const LOG_EPSILON: f32 = 1e-10;

/// Number of candidates kept per block.
pub const MAX_CANDIDATES: usize = 10;

/// A sub-harmonic with at least this share of the peak's magnitude is taken
/// as the true fundamental.
const HARMONIC_CORRECTION_THRESHOLD: f32 = 0.2;

/// Octave correction never re-roots below this frequency.
const MIN_CORRECTED_FREQUENCY: f32 = 50.0;

/// A fundamental-frequency peak found in one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakCandidate {
    /// HPS bin the peak was found in.
    pub bin: usize,
    /// HPS value at that bin, used for ranking.
    pub magnitude: f32,
    /// Interpolated and octave-corrected frequency in Hz.
    pub frequency: f32,
}

/// Anything that can pull fundamental candidates out of a spectrum.
///
/// Implementations return candidates sorted by magnitude, strongest first,
/// with at most [`MAX_CANDIDATES`] entries.
pub trait PitchDetector: Send {
    fn detect_fundamentals(
        &mut self,
        frame: &SpectralFrame<'_>,
        min_freq: f32,
        max_freq: f32,
    ) -> Vec<PeakCandidate>;
}

/// Harmonic product spectrum fundamental detector.
///
/// Scratch buffers are sized once from the spectrum length and reused.
#[derive(Debug, Clone)]
pub struct HarmonicPitchDetector {
    harmonics: usize,
    log_spectrum: Vec<f32>,
    hps: Vec<f32>,
}

impl HarmonicPitchDetector {
    /// Creates a detector combining `harmonics` harmonics for spectra of
    /// `spectrum_len` bins.
    pub fn new(harmonics: usize, spectrum_len: usize) -> Self {
        let harmonics = harmonics.max(1);
        let hps_len = spectrum_len / harmonics;
        Self {
            harmonics,
            log_spectrum: Vec::with_capacity(spectrum_len),
            hps: Vec::with_capacity(hps_len),
        }
    }

    /// Computes the harmonic product spectrum of `spectrum`.
    ///
    /// `hps[k] = exp(sum over n in 1..=H of ln(spectrum[k * n] + eps))`, of
    /// length `spectrum.len() / H`. Empty when that length rounds to zero.
    pub fn harmonic_product_spectrum(&mut self, spectrum: &[f32]) -> &[f32] {
        let hps_len = spectrum.len() / self.harmonics;

        self.log_spectrum.clear();
        self.log_spectrum
            .extend(spectrum.iter().map(|&m| (m.max(0.0) + LOG_EPSILON).ln()));

        self.hps.clear();
        self.hps.extend_from_slice(&self.log_spectrum[..hps_len]);
        for harmonic in 2..=self.harmonics {
            for (k, acc) in self.hps.iter_mut().enumerate() {
                *acc += self.log_spectrum[k * harmonic];
            }
        }
        for acc in self.hps.iter_mut() {
            *acc = acc.exp();
        }

        &self.hps
    }
}

impl PitchDetector for HarmonicPitchDetector {
    /// Finds HPS peaks between `min_freq` and `max_freq`.
    ///
    /// # Returns
    /// * Up to [`MAX_CANDIDATES`] peaks, strongest HPS value first
    /// * An empty list for spectra too short to hold an HPS, or with no peaks
    fn detect_fundamentals(
        &mut self,
        frame: &SpectralFrame<'_>,
        min_freq: f32,
        max_freq: f32,
    ) -> Vec<PeakCandidate> {
        let spectrum = frame.magnitudes();
        let bin_width = frame.bin_width();
        if !(bin_width > 0.0) {
            return Vec::new();
        }

        self.harmonic_product_spectrum(spectrum);
        let hps = &self.hps;
        if hps.len() < 3 {
            return Vec::new();
        }

        let min_bin = ((min_freq / bin_width).ceil() as usize).max(1);
        let max_bin = ((max_freq / bin_width).floor() as usize).min(hps.len() - 2);
        if min_bin > max_bin {
            return Vec::new();
        }

        let mut candidates = Vec::with_capacity(MAX_CANDIDATES);
        for i in min_bin..=max_bin {
            let (alpha, beta, gamma) = (hps[i - 1], hps[i], hps[i + 1]);
            if !(beta > alpha && beta > gamma) {
                continue;
            }

            let denominator = alpha - 2.0 * beta + gamma;
            let offset = if denominator != 0.0 {
                0.5 * (alpha - gamma) / denominator
            } else {
                0.0
            };
            let frequency = (i as f32 + offset) * bin_width;

            candidates.push(PeakCandidate {
                bin: i,
                magnitude: beta,
                frequency: correct_octave_error(frequency, frame),
            });
        }

        candidates.sort_by(|a, b| {
            b.magnitude
                .partial_cmp(&a.magnitude)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(MAX_CANDIDATES);

        log::trace!("HPS found {} fundamental candidates", candidates.len());
        candidates
    }
}

/// Re-roots `frequency` at a sub-harmonic when the original spectrum shows
/// enough energy there.
///
/// Divisors 2 through 5 are tried in order. Whenever the spectrum magnitude at
/// `f / d` exceeds 20% of the magnitude at `f` (and `f / d` is at least 50 Hz),
/// the search restarts from `f / d`.
fn correct_octave_error(frequency: f32, frame: &SpectralFrame<'_>) -> f32 {
    let spectrum = frame.magnitudes();
    let bin_width = frame.bin_width();
    let mut frequency = frequency;

    'reroot: loop {
        let current_bin = (frequency / bin_width) as usize;
        let current_magnitude = spectrum.get(current_bin).copied().unwrap_or(0.0);

        for divisor in 2..=5 {
            let sub_frequency = frequency / divisor as f32;
            let sub_bin = current_bin / divisor;
            if sub_bin == 0
                || sub_bin >= spectrum.len()
                || sub_frequency < MIN_CORRECTED_FREQUENCY
            {
                continue;
            }
            if spectrum[sub_bin] > HARMONIC_CORRECTION_THRESHOLD * current_magnitude {
                frequency = sub_frequency;
                continue 'reroot;
            }
        }

        return frequency;
    }
}
