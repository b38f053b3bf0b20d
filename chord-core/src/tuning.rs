//! # Musical Tuning Module
//!
//! Pitch classes and the equal-temperament conversions used throughout the
//! crate, all referenced to A4 = 440 Hz.
//!
//! ## Features
//! - The 12 pitch classes with names and semitone offsets
//! - Frequency to MIDI note number and back
//! - Cent deviation calculations
//! - Ideal frequency of a pitch class in the octave nearest a measurement

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference pitch for A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;
/// MIDI note number of A4.
pub const A4_MIDI: f32 = 69.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One of the 12 pitch classes, octave-independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Note {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

impl Note {
    pub const ALL: [Note; 12] = [
        Note::C,
        Note::CSharp,
        Note::D,
        Note::DSharp,
        Note::E,
        Note::F,
        Note::FSharp,
        Note::G,
        Note::GSharp,
        Note::A,
        Note::ASharp,
        Note::B,
    ];

    /// Semitones above C (0..=11).
    pub fn semitone(self) -> usize {
        self as usize
    }

    /// Pitch class for a semitone offset, wrapping modulo 12.
    pub fn from_semitone(semitone: usize) -> Self {
        Self::ALL[semitone % 12]
    }

    /// Pitch class of a MIDI note number, negative numbers included.
    pub fn from_midi(midi: i32) -> Self {
        Self::ALL[midi.rem_euclid(12) as usize]
    }

    /// Nearest pitch class to `frequency`, or `None` for non-positive input.
    pub fn from_frequency(frequency: f32) -> Option<Self> {
        if !(frequency > 0.0) || !frequency.is_finite() {
            return None;
        }
        Some(Self::from_midi(frequency_to_midi(frequency).round() as i32))
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[self.semitone()]
    }

    /// The pitch class `semitones` above (or below, when negative) this one.
    pub fn transpose(self, semitones: i32) -> Self {
        Self::from_midi(self.semitone() as i32 + semitones)
    }

    /// Frequency of this pitch class in the octave closest to `frequency`.
    pub fn nearest_frequency(self, frequency: f32) -> f32 {
        let midi = frequency_to_midi(frequency);
        let semitone = self.semitone() as f32;
        let octave = ((midi - semitone) / 12.0).round();
        midi_to_frequency(octave * 12.0 + semitone)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Continuous MIDI note number of `frequency` (69.0 = A4).
pub fn frequency_to_midi(frequency: f32) -> f32 {
    12.0 * (frequency / A4_FREQUENCY).log2() + A4_MIDI
}

/// Frequency in Hz of a (possibly fractional) MIDI note number.
pub fn midi_to_frequency(midi: f32) -> f32 {
    A4_FREQUENCY * 2.0_f32.powf((midi - A4_MIDI) / 12.0)
}

/// Octave number of the nearest note to `frequency` in scientific pitch
/// notation (C4 = middle C).
pub fn octave_of(frequency: f32) -> i32 {
    let midi = frequency_to_midi(frequency).round() as i32;
    midi.div_euclid(12) - 1
}

/// Calculates the deviation from a target frequency in cents.
///
/// Cents are a logarithmic unit of pitch measurement where:
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
/// - Positive values indicate sharpness, negative values indicate flatness
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_frequencies() {
        assert_eq!(Note::from_frequency(440.0), Some(Note::A));
        assert_eq!(Note::from_frequency(261.63), Some(Note::C));
        assert_eq!(Note::from_frequency(329.63), Some(Note::E));
        assert_eq!(Note::from_frequency(27.5), Some(Note::A));
        assert_eq!(Note::from_frequency(0.0), None);
        assert_eq!(Note::from_frequency(-10.0), None);
    }

    #[test]
    fn test_midi_round_trip() {
        assert!((frequency_to_midi(440.0) - 69.0).abs() < 1e-5);
        assert!((midi_to_frequency(60.0) - 261.6256).abs() < 1e-3);
        assert_eq!(Note::from_midi(60), Note::C);
        assert_eq!(Note::from_midi(-1), Note::B);
    }

    #[test]
    fn test_boundary_between_semitones() {
        // 49 cents above A stays A, 51 cents above goes to A#.
        assert_eq!(Note::from_frequency(440.0 * 2f32.powf(49.0 / 1200.0)), Some(Note::A));
        assert_eq!(Note::from_frequency(440.0 * 2f32.powf(51.0 / 1200.0)), Some(Note::ASharp));
    }

    #[test]
    fn test_transpose_wraps() {
        assert_eq!(Note::B.transpose(1), Note::C);
        assert_eq!(Note::C.transpose(-1), Note::B);
        assert_eq!(Note::C.transpose(19), Note::G);
    }

    #[test]
    fn test_nearest_frequency_picks_closest_octave() {
        assert!((Note::A.nearest_frequency(870.0) - 880.0).abs() < 1e-2);
        assert!((Note::A.nearest_frequency(225.0) - 220.0).abs() < 1e-2);
        // A locked note may differ from the nearest one.
        assert!((Note::ASharp.nearest_frequency(450.0) - 466.16).abs() < 1e-2);
    }

    #[test]
    fn test_cents_and_octaves() {
        assert!((calculate_cents_deviation(880.0, 440.0) - 1200.0).abs() < 1e-3);
        assert!((calculate_cents_deviation(440.0, 466.1638) + 100.0).abs() < 1e-2);
        assert_eq!(octave_of(261.63), 4);
        assert_eq!(octave_of(440.0), 4);
        assert_eq!(octave_of(110.0), 2);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Note::CSharp.to_string(), "C#");
        let semitones: Vec<usize> = Note::ALL.iter().map(|n| n.semitone()).collect();
        assert_eq!(semitones, (0..12).collect::<Vec<_>>());
    }
}
