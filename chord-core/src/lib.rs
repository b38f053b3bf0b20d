// chord-core/src/lib.rs

//! The core logic for the live chord detector.
//! This crate turns blocks of audio samples into pitch observations and
//! debounced chord names. It is completely headless: capture sits behind the
//! [`audio::AudioSource`] trait and results are published on latest-value
//! channels for whatever front end is listening.

pub mod audio;
pub mod chord;
pub mod chroma;
pub mod config;
pub mod error;
pub mod fft;
pub mod notify;
pub mod pipeline;
pub mod pitch;
pub mod session;
pub mod smoothing;
pub mod tracking;
pub mod tuning;

use serde::Serialize;

pub use chord::{ChordObservation, ChordQuality};
pub use config::DetectorConfig;
pub use error::ConfigError;
pub use pipeline::{Pipeline, PitchObservation};
pub use session::DetectionSession;
pub use tuning::Note;

/// Data for a spectrum display, produced for every processed block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationFrame {
    /// Magnitude spectrum of the block (`transform_size / 2` bins).
    pub spectrum: Vec<f32>,
    /// Pitches detected in the block, strongest first.
    pub pitches: Vec<PitchObservation>,
    pub sample_rate: u32,
}

impl VisualizationFrame {
    /// Width of one spectrum bin in Hz.
    pub fn bin_width(&self) -> f32 {
        if self.spectrum.is_empty() {
            return 0.0;
        }
        self.sample_rate as f32 / (2 * self.spectrum.len()) as f32
    }

    pub fn frequency_for_bin(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_width()
    }
}

/// Everything the pipeline reports for one block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    /// The smoothed chord, or `None` when nothing is confirmed.
    pub chord: Option<ChordObservation>,
    pub visualization: VisualizationFrame,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visualization_bin_frequencies() {
        let frame = VisualizationFrame {
            spectrum: vec![0.0; 2048],
            pitches: Vec::new(),
            sample_rate: 44_100,
        };
        assert!((frame.bin_width() - 44_100.0 / 4096.0).abs() < 1e-6);
        assert!((frame.frequency_for_bin(100) - 1076.66).abs() < 1e-2);

        let empty = VisualizationFrame {
            spectrum: Vec::new(),
            ..frame
        };
        assert_eq!(empty.bin_width(), 0.0);
    }
}
