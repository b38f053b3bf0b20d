//! # Chroma Module
//!
//! Folds a magnitude spectrum into 12 pitch-class energies (C through B).
//! Nothing is carried between blocks.

use serde::Serialize;

use crate::fft::SpectralFrame;
use crate::tuning::{frequency_to_midi, Note};

/// Lowest bin frequency that contributes to the chroma vector.
pub const CHROMA_MIN_FREQUENCY: f32 = 20.0;
/// Highest bin frequency that contributes to the chroma vector.
pub const CHROMA_MAX_FREQUENCY: f32 = 5000.0;
/// Below this maximum the block is treated as having no pitched content.
pub const CHROMA_NOISE_FLOOR: f32 = 0.01;

/// Twelve pitch-class energies, index 0 = C.
///
/// Either all zero or normalized so the largest entry is exactly 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ChromaVector(pub [f32; 12]);

impl ChromaVector {
    pub fn zero() -> Self {
        Self([0.0; 12])
    }

    pub fn values(&self) -> &[f32; 12] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }

    pub fn max(&self) -> f32 {
        self.0.iter().copied().fold(0.0, f32::max)
    }

    pub fn get(&self, note: Note) -> f32 {
        self.0[note.semitone()]
    }

    /// Pitch class with the most energy, `None` when the vector is zero.
    pub fn dominant_note(&self) -> Option<Note> {
        if self.is_zero() {
            return None;
        }
        self.0
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| Note::from_semitone(i))
    }
}

/// Computes the chroma vector of one spectrum.
///
/// Each bin between 20 Hz and 5 kHz with positive magnitude adds its magnitude
/// to the pitch class of its centre frequency (nearest MIDI note, A4 = 440 Hz,
/// taken modulo 12).
///
/// # Returns
/// * A zero vector when the strongest pitch class is not above the noise floor
/// * Otherwise the energies divided by their maximum
pub fn compute_chroma(frame: &SpectralFrame<'_>) -> ChromaVector {
    let mut chroma = [0.0f32; 12];
    let bin_width = frame.bin_width();
    if !(bin_width > 0.0) || frame.is_empty() {
        return ChromaVector::zero();
    }

    let min_bin = (CHROMA_MIN_FREQUENCY / bin_width).ceil() as usize;
    let max_bin = ((CHROMA_MAX_FREQUENCY / bin_width).floor() as usize).min(frame.len() - 1);

    for bin in min_bin..=max_bin {
        let magnitude = frame.magnitudes()[bin];
        if !(magnitude > 0.0) {
            continue;
        }
        let pitch = frequency_to_midi(frame.frequency_of_bin(bin)).round() as i32;
        chroma[pitch.rem_euclid(12) as usize] += magnitude;
    }

    let max = chroma.iter().copied().fold(0.0, f32::max);
    if !(max > CHROMA_NOISE_FLOOR) {
        return ChromaVector::zero();
    }
    for value in chroma.iter_mut() {
        *value /= max;
    }
    ChromaVector(chroma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sine_mix;
    use crate::chord::{ChordIdentifier, ChordQuality, ChordRecognizer};
    use crate::fft::SpectralAnalyzer;

    #[test]
    fn test_silence_is_zero() {
        let spectrum = vec![0.0; 2048];
        let chroma = compute_chroma(&SpectralFrame::from_magnitudes(&spectrum, 44_100));
        assert!(chroma.is_zero());
        assert_eq!(chroma.dominant_note(), None);
    }

    #[test]
    fn test_energy_below_noise_floor_is_zero() {
        let mut spectrum = vec![0.0; 2048];
        spectrum[41] = 0.009; // ~440 Hz at 44.1 kHz / 4096
        let chroma = compute_chroma(&SpectralFrame::from_magnitudes(&spectrum, 44_100));
        assert_eq!(chroma, ChromaVector::zero());
    }

    #[test]
    fn test_single_bin_maps_to_its_pitch_class() {
        // One Hz per bin: 440 Hz is A.
        let mut spectrum = vec![0.0; 2048];
        spectrum[440] = 0.5;
        spectrum[262] = 0.25; // C4
        let chroma = compute_chroma(&SpectralFrame::from_magnitudes(&spectrum, 4096));
        assert_eq!(chroma.get(Note::A), 1.0);
        assert_eq!(chroma.get(Note::C), 0.5);
        assert_eq!(chroma.dominant_note(), Some(Note::A));
    }

    #[test]
    fn test_bins_outside_musical_range_are_ignored() {
        let mut spectrum = vec![0.0; 8192];
        spectrum[10] = 1.0; // 10 Hz
        spectrum[6000] = 1.0; // 6 kHz
        spectrum[1000] = 0.02; // 1 kHz, B
        let chroma = compute_chroma(&SpectralFrame::from_magnitudes(&spectrum, 16_384));
        assert_eq!(chroma.get(Note::B), 1.0);
        assert_eq!(chroma.0.iter().filter(|&&v| v > 0.0).count(), 1);
    }

    #[test]
    fn test_octave_independence() {
        let mut low = vec![0.0; 2048];
        low[220] = 0.3;
        let mut high = vec![0.0; 2048];
        high[880] = 0.7;
        let a = compute_chroma(&SpectralFrame::from_magnitudes(&low, 4096));
        let b = compute_chroma(&SpectralFrame::from_magnitudes(&high, 4096));
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_trivial_input_peaks_at_exactly_one() {
        let mut analyzer = SpectralAnalyzer::new(4096).unwrap();
        for freqs in [&[440.0][..], &[261.63, 311.13], &[98.0, 523.25, 1760.0]] {
            let signal = sine_mix(freqs, 0.3, 4096, 44_100, 0);
            let chroma = compute_chroma(&analyzer.analyze(&signal, 44_100));
            assert_eq!(chroma.max(), 1.0);
            assert!(chroma.0.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn test_c_major_triad_energy() {
        let mut analyzer = SpectralAnalyzer::new(8192).unwrap();
        let signal = sine_mix(&[261.63, 329.63, 392.0], 0.3, 8192, 44_100, 0);
        let chroma = compute_chroma(&analyzer.analyze(&signal, 44_100));

        for note in [Note::C, Note::E, Note::G] {
            assert!(chroma.get(note) > 0.5, "{note} = {}", chroma.get(note));
        }
        for (i, &v) in chroma.0.iter().enumerate() {
            if ![0, 4, 7].contains(&i) {
                assert!(v < 0.3, "pitch class {i} = {v}");
            }
        }
    }

    #[test]
    fn test_c_major_triad_across_sizes_and_rates() {
        // Higher notes spread over more bins, so the fold may peak on E or G
        // rather than the root. Recognition must not depend on which.
        let identifier = ChordIdentifier::default();
        for (size, rate) in [(4096, 44_100), (8192, 44_100), (4096, 48_000), (8192, 48_000)] {
            let mut analyzer = SpectralAnalyzer::new(size).unwrap();
            let signal = sine_mix(&[261.63, 329.63, 392.0], 0.3, size, rate, 0);
            let chroma = compute_chroma(&analyzer.analyze(&signal, rate));

            let dominant = chroma.dominant_note().unwrap();
            assert!(
                [Note::C, Note::E, Note::G].contains(&dominant),
                "{size} @ {rate} Hz: dominant {dominant}"
            );

            let chord = identifier.identify(&chroma).unwrap();
            assert_eq!((chord.root, chord.quality), (Note::C, ChordQuality::Major));
            assert!(chord.confidence > 0.5, "{size} @ {rate} Hz: {}", chord.confidence);
        }
    }
}
