//! Terminal formatting for chord changes.

use chord_core::{ChordObservation, PitchObservation};
use serde::Serialize;

/// Pitches shown after the chord name.
pub const SHOWN_PITCHES: usize = 4;

/// "C4 261.6 Hz +1c"
pub fn format_pitch(pitch: &PitchObservation) -> String {
    let cents = pitch.cents_deviation.round() as i32;
    format!(
        "{}{} {:.1} Hz {:+}c",
        pitch.note,
        pitch.octave(),
        pitch.frequency,
        cents
    )
}

/// "C Major (0.97)", or "-" when no chord is confirmed.
pub fn format_chord(chord: Option<&ChordObservation>) -> String {
    match chord {
        Some(chord) => format!("{} ({:.2})", chord.display_name(), chord.confidence),
        None => "-".to_string(),
    }
}

/// Chord followed by the strongest pitches, separated by `|`.
pub fn status_line(chord: Option<&ChordObservation>, pitches: &[PitchObservation]) -> String {
    let mut line = format_chord(chord);
    if !pitches.is_empty() {
        let shown: Vec<String> = pitches.iter().take(SHOWN_PITCHES).map(format_pitch).collect();
        line.push_str("  ");
        line.push_str(&shown.join(" | "));
    }
    line
}

/// Whether the displayed chord differs, by root and quality.
pub fn chord_changed(previous: Option<&ChordObservation>, next: Option<&ChordObservation>) -> bool {
    match (previous, next) {
        (Some(a), Some(b)) => !a.same_chord(b),
        (None, None) => false,
        _ => true,
    }
}

/// One line of `--json` output.
#[derive(Debug, Serialize)]
pub struct ChangeRecord<'a> {
    pub elapsed_secs: f64,
    pub chord: Option<&'a ChordObservation>,
    pub pitches: &'a [PitchObservation],
}
