//! Synthetic chord progression for running without a microphone.

use std::time::Duration;

use chord_core::audio::{tone_blocks, AudioBlock, ScriptedSource};
use chord_core::{ConfigError, DetectorConfig};

const CHORD_SECS: f64 = 2.0;
const TAIL_SECS: f64 = 3.0;
const AMPLITUDE: f32 = 0.2;

/// C, Am, F, G7, then silence.
const PROGRESSION: [&[f32]; 4] = [
    &[261.63, 329.63, 392.00],
    &[220.00, 261.63, 329.63],
    &[174.61, 220.00, 261.63],
    &[196.00, 246.94, 293.66, 349.23],
];

const SILENCE: &[f32] = &[];

/// Builds the progression as sliding blocks shaped by `config`.
pub fn progression_blocks(config: &DetectorConfig) -> Result<Vec<AudioBlock>, ConfigError> {
    let rate = config.preferred_sample_rate;
    let hop = config.hop_size;
    let blocks_for = |secs: f64| ((secs * rate as f64) / hop as f64).ceil() as usize;

    let mut blocks = Vec::new();
    let mut next_sample = 0;
    let sections = PROGRESSION
        .iter()
        .map(|&chord| (chord, blocks_for(CHORD_SECS)))
        .chain(std::iter::once((SILENCE, blocks_for(TAIL_SECS))));
    for (frequencies, count) in sections {
        blocks.extend(tone_blocks(
            frequencies,
            AMPLITUDE,
            config.transform_size,
            hop,
            rate,
            next_sample,
            count,
        )?);
        next_sample += count * hop;
    }
    Ok(blocks)
}

/// A source replaying the progression at real-time pace.
pub fn source(config: &DetectorConfig) -> Result<ScriptedSource, ConfigError> {
    let hop_secs = config.hop_size as f64 / config.preferred_sample_rate as f64;
    let pace = Duration::from_secs_f64(hop_secs);
    Ok(ScriptedSource::new(progression_blocks(config)?).with_pace(pace))
}

#[cfg(test)]
mod tests {
    use chord_core::Pipeline;

    use super::*;

    #[test]
    fn test_progression_is_recognized_in_order() {
        let config = DetectorConfig {
            transform_size: 8192,
            hop_size: 4096,
            ..Default::default()
        };
        let blocks = progression_blocks(&config).unwrap();
        let mut pipeline = Pipeline::new(config).unwrap();

        let mut seen: Vec<String> = Vec::new();
        for block in &blocks {
            let name = pipeline
                .process(block)
                .chord
                .map_or_else(|| "-".to_string(), |c| c.short_name());
            if seen.last() != Some(&name) {
                seen.push(name);
            }
        }
        assert_eq!(seen, ["-", "C", "Am", "F", "G7", "-"]);
    }

    #[test]
    fn test_timestamps_follow_hops() {
        let config = DetectorConfig::default();
        let blocks = progression_blocks(&config).unwrap();
        let step = blocks[1].timestamp() - blocks[0].timestamp();
        let expected = config.hop_size as f64 / config.preferred_sample_rate as f64;
        assert!((step.as_secs_f64() - expected).abs() < 1e-6);
        assert!(blocks.iter().all(|b| b.samples().len() == config.transform_size));
    }
}
