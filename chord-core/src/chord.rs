//! # Chord Module
//!
//! Chord qualities, the static template bank, and template matching of chroma
//! vectors by cosine similarity.

use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::chroma::ChromaVector;
use crate::tuning::Note;

/// The chord qualities the identifier can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordQuality {
    Major,
    Minor,
    Dominant7,
}

impl ChordQuality {
    pub const ALL: [ChordQuality; 3] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::Dominant7,
    ];

    /// Semitone intervals above the root.
    pub fn intervals(self) -> &'static [usize] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Dominant7 => &[0, 4, 7, 10],
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ChordQuality::Major => "Major",
            ChordQuality::Minor => "Minor",
            ChordQuality::Dominant7 => "Dominant 7",
        }
    }

    /// Suffix used in lead-sheet notation ("", "m", "7").
    pub fn suffix(self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Dominant7 => "7",
        }
    }
}

/// A chord shape over one root, as a 12-slot binary pitch-class mask.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordTemplate {
    pub root: Note,
    pub quality: ChordQuality,
    pub mask: [f32; 12],
}

impl ChordTemplate {
    pub fn new(root: Note, quality: ChordQuality) -> Self {
        let mut mask = [0.0; 12];
        for &interval in quality.intervals() {
            mask[(root.semitone() + interval) % 12] = 1.0;
        }
        Self {
            root,
            quality,
            mask,
        }
    }

    /// The chord's pitch classes, root first.
    pub fn notes(&self) -> Vec<Note> {
        self.quality
            .intervals()
            .iter()
            .map(|&i| self.root.transpose(i as i32))
            .collect()
    }
}

/// Every root in every quality, built once on first use.
static TEMPLATES: Lazy<Vec<ChordTemplate>> = Lazy::new(|| {
    Note::ALL
        .iter()
        .flat_map(|&root| {
            ChordQuality::ALL
                .iter()
                .map(move |&quality| ChordTemplate::new(root, quality))
        })
        .collect()
});

/// The static template bank (12 roots x 3 qualities).
pub fn templates() -> &'static [ChordTemplate] {
    &TEMPLATES
}

/// Cosine similarity of two 12-slot vectors, zero if either has no length.
pub fn cosine_similarity(a: &[f32; 12], b: &[f32; 12]) -> f32 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator > 0.0 {
        dot / denominator
    } else {
        0.0
    }
}

/// Best template for one chroma vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChordMatch {
    pub root: Note,
    pub quality: ChordQuality,
    /// Cosine similarity with the template, in [0, 1].
    pub confidence: f32,
}

/// Anything that can name the chord behind a chroma vector.
pub trait ChordRecognizer: Send {
    fn identify(&self, chroma: &ChromaVector) -> Option<ChordMatch>;
}

/// Matches chroma vectors against the static template bank.
#[derive(Debug, Clone)]
pub struct ChordIdentifier {
    similarity_threshold: f32,
}

impl ChordIdentifier {
    pub fn new(similarity_threshold: f32) -> Self {
        Self {
            similarity_threshold,
        }
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }
}

impl Default for ChordIdentifier {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl ChordRecognizer for ChordIdentifier {
    /// Picks the most similar template.
    ///
    /// # Returns
    /// * `None` when the best similarity does not exceed the threshold
    /// * Otherwise the template's root and quality with the similarity as
    ///   confidence; ties go to the earlier template
    fn identify(&self, chroma: &ChromaVector) -> Option<ChordMatch> {
        let mut best: Option<(&ChordTemplate, f32)> = None;
        for template in templates() {
            let score = cosine_similarity(chroma.values(), &template.mask);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((template, score));
            }
        }

        let (template, score) = best?;
        (score > self.similarity_threshold).then_some(ChordMatch {
            root: template.root,
            quality: template.quality,
            confidence: score,
        })
    }
}

/// A chord as reported to the caller, before or after smoothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChordObservation {
    pub root: Note,
    pub quality: ChordQuality,
    pub confidence: f32,
    /// Distinct pitch classes heard in the block that produced it.
    pub notes: Vec<Note>,
}

impl ChordObservation {
    pub fn new(chord: ChordMatch, notes: Vec<Note>) -> Self {
        Self {
            root: chord.root,
            quality: chord.quality,
            confidence: chord.confidence,
            notes,
        }
    }

    /// Same root and quality, regardless of confidence or notes.
    pub fn same_chord(&self, other: &ChordObservation) -> bool {
        self.root == other.root && self.quality == other.quality
    }

    /// Full name, e.g. "C# Minor".
    pub fn display_name(&self) -> String {
        format!("{} {}", self.root, self.quality.display_name())
    }

    /// Lead-sheet name, e.g. "C#m".
    pub fn short_name(&self) -> String {
        format!("{}{}", self.root, self.quality.suffix())
    }

    /// Same quality one semitone down, with no confidence or notes.
    pub fn previous_chord(&self) -> ChordObservation {
        self.transposed(-1)
    }

    /// Same quality one semitone up, with no confidence or notes.
    pub fn next_chord(&self) -> ChordObservation {
        self.transposed(1)
    }

    fn transposed(&self, semitones: i32) -> ChordObservation {
        ChordObservation {
            root: self.root.transpose(semitones),
            quality: self.quality,
            confidence: 0.0,
            notes: Vec::new(),
        }
    }
}

impl fmt::Display for ChordObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}
