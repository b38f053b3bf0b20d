//! End-to-end recognition through the production pipeline.

use std::time::Duration;

use chord_core::audio::{sine_mix, tone_blocks, AudioBlock};
use chord_core::{ChordQuality, DetectorConfig, Note, Pipeline};

const SAMPLE_RATE: u32 = 44_100;
const BLOCK: usize = 8192;
const HOP: usize = 2048;

const C_MAJOR: [f32; 3] = [261.63, 329.63, 392.0];
const A_MINOR: [f32; 3] = [220.0, 261.63, 329.63];

fn config() -> DetectorConfig {
    DetectorConfig {
        transform_size: BLOCK,
        hop_size: HOP,
        ..Default::default()
    }
}

fn chord_names(pipeline: &mut Pipeline, blocks: &[AudioBlock]) -> Vec<Option<String>> {
    blocks
        .iter()
        .map(|b| pipeline.process(b).chord.map(|c| c.short_name()))
        .collect()
}

#[test]
fn test_c_major_triad_confirmed_on_fifth_block() {
    let mut pipeline = Pipeline::new(config()).unwrap();
    let blocks = tone_blocks(&C_MAJOR, 0.3, BLOCK, HOP, SAMPLE_RATE, 0, 8).unwrap();

    let names = chord_names(&mut pipeline, &blocks);
    assert!(names[..4].iter().all(Option::is_none), "{names:?}");
    assert!(names[4..].iter().all(|n| n.as_deref() == Some("C")), "{names:?}");

    let chord = pipeline.smoother().current().unwrap();
    assert_eq!(chord.root, Note::C);
    assert_eq!(chord.quality, ChordQuality::Major);
    assert!(chord.confidence > 0.5 && chord.confidence <= 1.0);
}

#[test]
fn test_progression_switches_after_confirmation() {
    let mut pipeline = Pipeline::new(config()).unwrap();
    let c = tone_blocks(&C_MAJOR, 0.3, BLOCK, HOP, SAMPLE_RATE, 0, 6).unwrap();
    let am = tone_blocks(&A_MINOR, 0.3, BLOCK, HOP, SAMPLE_RATE, 6 * HOP, 6).unwrap();

    chord_names(&mut pipeline, &c);
    let names = chord_names(&mut pipeline, &am);
    assert!(names[..4].iter().all(|n| n.as_deref() == Some("C")), "{names:?}");
    assert_eq!(names[4].as_deref(), Some("Am"));
}

#[test]
fn test_silence_holds_chord_then_clears() {
    let config = config();
    let clear_delay = config.clear_delay();
    let mut pipeline = Pipeline::new(config).unwrap();

    let chord = tone_blocks(&C_MAJOR, 0.3, BLOCK, HOP, SAMPLE_RATE, 0, 5).unwrap();
    chord_names(&mut pipeline, &chord);
    let confirmed_at = chord[4].timestamp();

    // Silence for well over the clear delay.
    let silence = tone_blocks(&[], 0.0, BLOCK, HOP, SAMPLE_RATE, 5 * HOP, 80).unwrap();
    let mut cleared = false;
    for block in &silence {
        let result = pipeline.process(block);
        assert!(result.visualization.pitches.is_empty());
        let expect_held = block.timestamp().saturating_sub(confirmed_at) < clear_delay;
        assert_eq!(result.chord.is_some(), expect_held, "at {:?}", block.timestamp());
        cleared |= !expect_held;
    }
    assert!(cleared);
}

#[test]
fn test_harmonic_tone_reports_fundamental() {
    let fundamental = 196.0; // G3
    let mut samples = vec![0.0; BLOCK];
    for n in 1..=6 {
        let partial = sine_mix(&[fundamental * n as f32], 0.5 / n as f32, BLOCK, SAMPLE_RATE, 0);
        for (s, p) in samples.iter_mut().zip(partial) {
            *s += p;
        }
    }
    let block = AudioBlock::new(samples, SAMPLE_RATE, Duration::ZERO).unwrap();

    let mut pipeline = Pipeline::new(config()).unwrap();
    let result = pipeline.process(&block);
    let strongest = &result.visualization.pitches[0];
    assert_eq!(strongest.note, Note::G);
    assert_eq!(strongest.octave(), 3);
    assert!((strongest.frequency - fundamental).abs() < result.visualization.bin_width());
    assert!(strongest.magnitude > config().peak_magnitude_threshold);
}

#[test]
fn test_short_and_empty_blocks_are_not_errors() {
    let mut pipeline = Pipeline::new(config()).unwrap();
    let empty = AudioBlock::new(Vec::new(), SAMPLE_RATE, Duration::ZERO).unwrap();
    let result = pipeline.process(&empty);
    assert!(result.chord.is_none());
    assert!(result.visualization.pitches.is_empty());
    assert_eq!(result.visualization.spectrum.len(), BLOCK / 2);

    let short = tone_blocks(&C_MAJOR, 0.3, 1000, 1000, SAMPLE_RATE, 0, 1).unwrap();
    assert!(pipeline.process(&short[0]).chord.is_none());
}

#[test]
fn test_result_serializes_to_json() {
    let mut pipeline = Pipeline::new(config()).unwrap();
    let blocks = tone_blocks(&C_MAJOR, 0.3, BLOCK, HOP, SAMPLE_RATE, 0, 5).unwrap();
    let last = blocks.iter().map(|b| pipeline.process(b)).last().unwrap();

    let json = serde_json::to_value(&last).unwrap();
    assert_eq!(json["chord"]["root"], "C");
    assert_eq!(json["chord"]["quality"], "Major");
    assert_eq!(json["visualization"]["sample_rate"], SAMPLE_RATE);
    assert_eq!(
        json["visualization"]["spectrum"].as_array().map(Vec::len),
        Some(BLOCK / 2)
    );
}

#[test]
fn test_independent_pipelines_do_not_share_state() {
    let mut first = Pipeline::new(config()).unwrap();
    let mut second = Pipeline::new(config()).unwrap();
    let blocks = tone_blocks(&C_MAJOR, 0.3, BLOCK, HOP, SAMPLE_RATE, 0, 5).unwrap();

    chord_names(&mut first, &blocks);
    assert!(first.smoother().current().is_some());
    assert!(second.smoother().current().is_none());
    assert!(second.process(&blocks[0]).chord.is_none());
}
