//! # Pipeline Module
//!
//! Runs one audio block through every stage:
//! spectrum -> {fundamentals, chroma} -> {note lock, chord identification} ->
//! chord smoothing. The pipeline owns all scratch buffers and the two pieces
//! of session state (note lock, chord smoother); `reset` clears the latter.

use serde::Serialize;

use crate::audio::AudioBlock;
use crate::chord::{ChordIdentifier, ChordObservation, ChordRecognizer};
use crate::chroma::compute_chroma;
use crate::config::DetectorConfig;
use crate::error::ConfigError;
use crate::fft::{SpectralAnalyzer, SpectralFrame};
use crate::pitch::{HarmonicPitchDetector, PeakCandidate, PitchDetector};
use crate::smoothing::ChordSmoother;
use crate::tracking::NoteTracker;
use crate::tuning::{calculate_cents_deviation, octave_of, Note};
use crate::{AnalysisResult, VisualizationFrame};

/// Cents either side of the ideal frequency that count as in tune.
const IN_TUNE_CENTS: f32 = 5.0;

/// A detected pitch, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitchObservation {
    /// Frequency in Hz; median-smoothed for the block's strongest pitch.
    pub frequency: f32,
    /// Spectrum magnitude at the frequency.
    pub magnitude: f32,
    /// Assigned pitch class; hysteresis-locked for the strongest pitch.
    pub note: Note,
    /// `note` in the octave nearest `frequency`.
    pub ideal_frequency: f32,
    /// Deviation of `frequency` from `ideal_frequency`.
    pub cents_deviation: f32,
}

impl PitchObservation {
    pub fn new(frequency: f32, magnitude: f32, note: Note) -> Self {
        let ideal_frequency = note.nearest_frequency(frequency);
        Self {
            frequency,
            magnitude,
            note,
            ideal_frequency,
            cents_deviation: calculate_cents_deviation(frequency, ideal_frequency),
        }
    }

    pub fn magnitude_db(&self) -> f32 {
        20.0 * self.magnitude.max(1e-10).log10()
    }

    /// Octave of the ideal frequency, C4 = middle C.
    pub fn octave(&self) -> i32 {
        octave_of(self.ideal_frequency)
    }

    pub fn is_flat(&self) -> bool {
        self.cents_deviation < -IN_TUNE_CENTS
    }

    pub fn is_sharp(&self) -> bool {
        self.cents_deviation > IN_TUNE_CENTS
    }

    pub fn is_in_tune(&self) -> bool {
        self.cents_deviation.abs() <= IN_TUNE_CENTS
    }
}

/// The full per-block recognition pipeline.
pub struct Pipeline<D = HarmonicPitchDetector, R = ChordIdentifier> {
    config: DetectorConfig,
    analyzer: SpectralAnalyzer,
    detector: D,
    recognizer: R,
    tracker: NoteTracker,
    smoother: ChordSmoother,
}

impl Pipeline {
    /// Builds the production pipeline from `config`.
    ///
    /// # Errors
    /// * Any [`ConfigError`] reported by [`DetectorConfig::validate`]
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        let detector = HarmonicPitchDetector::new(config.harmonic_count, config.transform_size / 2);
        let recognizer = ChordIdentifier::new(config.similarity_threshold);
        Self::with_components(config, detector, recognizer)
    }
}

impl<D: PitchDetector, R: ChordRecognizer> Pipeline<D, R> {
    /// Builds a pipeline around custom detection and recognition stages.
    pub fn with_components(
        config: DetectorConfig,
        detector: D,
        recognizer: R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            analyzer: SpectralAnalyzer::new(config.transform_size)?,
            detector,
            recognizer,
            tracker: NoteTracker::new(
                config.median_window,
                config.lock_tolerance_cents,
                config.hysteresis_cents,
            ),
            smoother: ChordSmoother::new(
                config.confirmation_count,
                config.stability_duration(),
                config.clear_delay(),
            ),
            config,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn tracker(&self) -> &NoteTracker {
        &self.tracker
    }

    pub fn smoother(&self) -> &ChordSmoother {
        &self.smoother
    }

    /// Processes one block.
    ///
    /// Silence, noise and blocks of the wrong length are ordinary input: they
    /// produce an empty pitch list and no chord observation for this block.
    pub fn process(&mut self, block: &AudioBlock) -> AnalysisResult {
        let frame = self.analyzer.analyze(block.samples(), block.sample_rate());

        let candidates = self.detector.detect_fundamentals(
            &frame,
            self.config.min_frequency,
            self.config.max_frequency,
        );
        let chroma = compute_chroma(&frame);
        let pitches = observe_pitches(&mut self.tracker, &self.config, &frame, &candidates);

        let identified = self.recognizer.identify(&chroma).map(|chord| {
            let mut notes: Vec<Note> = pitches.iter().map(|p| p.note).collect();
            notes.sort();
            ChordObservation::new(chord, notes)
        });

        log::debug!(
            "block @ {:.3}s: {} candidates, {} pitches, identified {}",
            block.timestamp().as_secs_f64(),
            candidates.len(),
            pitches.len(),
            identified.as_ref().map_or_else(|| "nothing".to_string(), |c| c.short_name()),
        );

        let chord = self.smoother.update(identified, block.timestamp());

        AnalysisResult {
            chord,
            visualization: VisualizationFrame {
                spectrum: frame.magnitudes().to_vec(),
                pitches,
                sample_rate: block.sample_rate(),
            },
        }
    }

    /// Returns the note lock and chord smoother to their initial state.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.smoother.reset();
    }
}

/// Turns ranked fundamental candidates into pitch observations.
///
/// Candidates too weak in the spectrum are skipped. The first surviving
/// candidate goes through the median filter and note lock; the rest use the
/// nearest note. One observation per pitch class, at most `max_pitches`.
fn observe_pitches(
    tracker: &mut NoteTracker,
    config: &DetectorConfig,
    frame: &SpectralFrame<'_>,
    candidates: &[PeakCandidate],
) -> Vec<PitchObservation> {
    let mut pitches: Vec<PitchObservation> = Vec::with_capacity(config.max_pitches);

    for candidate in candidates {
        let magnitude = frame.nearest_magnitude(candidate.frequency);
        if magnitude < config.peak_magnitude_threshold {
            continue;
        }

        let assigned = if pitches.is_empty() {
            tracker.track(candidate.frequency)
        } else {
            Note::from_frequency(candidate.frequency).map(|note| (candidate.frequency, note))
        };
        let Some((frequency, note)) = assigned else {
            continue;
        };

        if pitches.iter().any(|p| p.note == note) {
            continue;
        }
        pitches.push(PitchObservation::new(frequency, magnitude, note));
        if pitches.len() == config.max_pitches {
            break;
        }
    }

    pitches
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::tone_blocks;
    use crate::chord::{ChordMatch, ChordQuality};
    use crate::chroma::ChromaVector;

    /// Reports fixed candidates regardless of the spectrum.
    struct FixedDetector(Vec<PeakCandidate>);

    impl PitchDetector for FixedDetector {
        fn detect_fundamentals(
            &mut self,
            _: &SpectralFrame<'_>,
            _: f32,
            _: f32,
        ) -> Vec<PeakCandidate> {
            self.0.clone()
        }
    }

    /// Names a fixed chord whenever the chroma is not all zero.
    struct FixedRecognizer(ChordMatch);

    impl ChordRecognizer for FixedRecognizer {
        fn identify(&self, chroma: &ChromaVector) -> Option<ChordMatch> {
            (!chroma.is_zero()).then_some(self.0)
        }
    }

    fn config() -> DetectorConfig {
        DetectorConfig {
            transform_size: 4096,
            hop_size: 4096,
            ..Default::default()
        }
    }

    fn candidate(frequency: f32) -> PeakCandidate {
        PeakCandidate {
            bin: 0,
            magnitude: 1.0,
            frequency,
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let bad = DetectorConfig {
            transform_size: 30,
            harmonic_count: 9,
            ..Default::default()
        };
        assert!(Pipeline::new(bad).is_err());
    }

    #[test]
    fn test_pitch_observation_display_values() {
        let sharp = PitchObservation::new(446.0, 0.2, Note::A);
        assert!((sharp.ideal_frequency - 440.0).abs() < 1e-2);
        assert!(sharp.is_sharp() && !sharp.is_in_tune());
        assert_eq!(sharp.octave(), 4);
        assert!((sharp.magnitude_db() - 20.0 * 0.2f32.log10()).abs() < 1e-4);
        assert_eq!(PitchObservation::new(0.0, 0.0, Note::C).magnitude_db(), -200.0);
        assert!(PitchObservation::new(436.0, 0.2, Note::A).is_flat());
    }

    #[test]
    fn test_pitches_deduplicated_and_thresholded() {
        // Three tones; the detector double also reports an octave duplicate
        // and a frequency with no energy behind it.
        let blocks = tone_blocks(&[220.0, 330.0, 440.0], 0.3, 4096, 4096, 44_100, 0, 1).unwrap();
        let detector = FixedDetector(vec![
            candidate(220.0),
            candidate(440.0),
            candidate(1234.0),
            candidate(330.0),
        ]);
        let mut pipeline =
            Pipeline::with_components(config(), detector, ChordIdentifier::default()).unwrap();

        let result = pipeline.process(&blocks[0]);
        let notes: Vec<Note> = result.visualization.pitches.iter().map(|p| p.note).collect();
        assert_eq!(notes, vec![Note::A, Note::E]);
        assert_eq!(pipeline.tracker().lock().locked().map(|l| l.note), Some(Note::A));
    }

    #[test]
    fn test_pitch_magnitude_read_from_nearest_bin() {
        // 0.9 bin above bin 20: the floor bin sits on the peak's shoulder.
        let bin_width = 44_100.0 / 4096.0;
        let frequency = 20.9 * bin_width;
        let blocks = tone_blocks(&[frequency], 0.03, 4096, 4096, 44_100, 0, 1).unwrap();
        let detector = FixedDetector(vec![candidate(frequency)]);
        let mut pipeline =
            Pipeline::with_components(config(), detector, ChordIdentifier::default()).unwrap();

        let visualization = pipeline.process(&blocks[0]).visualization;
        let spectrum = &visualization.spectrum;
        assert!(spectrum[20] < 0.01 && spectrum[21] > 0.01);
        assert_eq!(visualization.pitches.len(), 1);
        assert_eq!(visualization.pitches[0].magnitude, spectrum[21]);
    }

    #[test]
    fn test_max_pitches_truncates() {
        let blocks = tone_blocks(&[261.63, 329.63, 392.0], 0.3, 4096, 4096, 44_100, 0, 1).unwrap();
        let detector = FixedDetector(vec![candidate(261.63), candidate(329.63), candidate(392.0)]);
        let config = DetectorConfig {
            max_pitches: 2,
            ..config()
        };
        let mut pipeline =
            Pipeline::with_components(config, detector, ChordIdentifier::default()).unwrap();
        assert_eq!(pipeline.process(&blocks[0]).visualization.pitches.len(), 2);
    }

    #[test]
    fn test_visualization_carries_spectrum_and_rate() {
        let mut pipeline = Pipeline::new(config()).unwrap();
        let block = AudioBlock::new(vec![0.0; 4096], 48_000, Duration::ZERO).unwrap();
        let result = pipeline.process(&block);
        assert_eq!(result.visualization.spectrum.len(), 2048);
        assert_eq!(result.visualization.sample_rate, 48_000);
        assert!(result.visualization.pitches.is_empty());
        assert!(result.chord.is_none());
    }

    #[test]
    fn test_chord_confirmed_after_five_blocks_and_reset() {
        let chord = ChordMatch {
            root: Note::G,
            quality: ChordQuality::Major,
            confidence: 0.8,
        };
        let detector = FixedDetector(vec![]);
        let mut pipeline =
            Pipeline::with_components(config(), detector, FixedRecognizer(chord)).unwrap();
        let blocks = tone_blocks(&[392.0], 0.3, 4096, 4096, 44_100, 0, 6).unwrap();

        let outputs: Vec<_> = blocks.iter().map(|b| pipeline.process(b).chord).collect();
        assert!(outputs[..4].iter().all(Option::is_none));
        assert_eq!(outputs[4].as_ref().map(|c| c.short_name()), Some("G".to_string()));

        pipeline.reset();
        assert!(pipeline.smoother().current().is_none());
        assert!(pipeline.process(&blocks[5]).chord.is_none());
    }
}
