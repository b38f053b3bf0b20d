//! # Note Tracking Module
//!
//! Stateful note assignment for the strongest pitch of each block: a
//! moving-median filter removes single-block outliers, then a hysteresis lock
//! keeps the assigned note from flickering at semitone boundaries.
//!
//! Both pieces belong to one detection session and are cleared by `reset`.

use std::collections::VecDeque;

use crate::tuning::{calculate_cents_deviation, Note};

/// Upper bound of the lock confidence counter.
pub const MAX_LOCK_CONFIDENCE: u8 = 10;

/// Median of the last `window` frequencies.
#[derive(Debug, Clone)]
pub struct MedianFilter {
    window: usize,
    history: VecDeque<f32>,
    sorted: Vec<f32>,
}

impl MedianFilter {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            history: VecDeque::with_capacity(window),
            sorted: Vec::with_capacity(window),
        }
    }

    /// Records `frequency` and returns the median of the current history.
    ///
    /// With an even number of entries the upper middle value is returned, so
    /// the result is always an observed frequency.
    pub fn push(&mut self, frequency: f32) -> f32 {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(frequency);

        self.sorted.clear();
        self.sorted.extend(self.history.iter().copied());
        self.sorted.sort_by(|a, b| a.total_cmp(b));
        self.sorted[self.sorted.len() / 2]
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// The note currently held by a [`NoteLock`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockedNote {
    pub note: Note,
    /// Frequency of `note` in the octave nearest the observation that locked it.
    pub ideal_frequency: f32,
}

/// Hysteresis lock on a single note.
///
/// Observations within `tolerance_cents` of the locked note's ideal frequency
/// keep the lock and raise confidence. Observations further out switch at once
/// if they overshoot the tolerance by more than `hysteresis_cents`; smaller
/// overshoots only drain confidence, and the switch happens when it hits zero.
#[derive(Debug, Clone)]
pub struct NoteLock {
    tolerance_cents: f32,
    hysteresis_cents: f32,
    locked: Option<LockedNote>,
    confidence: u8,
}

impl NoteLock {
    pub fn new(tolerance_cents: f32, hysteresis_cents: f32) -> Self {
        Self {
            tolerance_cents,
            hysteresis_cents,
            locked: None,
            confidence: 0,
        }
    }

    pub fn locked(&self) -> Option<LockedNote> {
        self.locked
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    /// Assigns a note to `frequency`, updating the lock.
    ///
    /// # Returns
    /// * The locked note after this observation
    /// * `None` for a non-positive or non-finite frequency (lock untouched)
    pub fn assign(&mut self, frequency: f32) -> Option<Note> {
        let nearest = Note::from_frequency(frequency)?;

        let Some(locked) = self.locked else {
            return Some(self.lock_onto(nearest, frequency));
        };

        let deviation = calculate_cents_deviation(frequency, locked.ideal_frequency);
        if deviation.abs() <= self.tolerance_cents {
            self.confidence = (self.confidence + 1).min(MAX_LOCK_CONFIDENCE);
            return Some(locked.note);
        }

        let overshoot = deviation.abs() - self.tolerance_cents;
        if overshoot > self.hysteresis_cents {
            log::trace!("note lock: {} -> {} ({deviation:+.1} cents)", locked.note, nearest);
            return Some(self.lock_onto(nearest, frequency));
        }

        self.confidence = self.confidence.saturating_sub(1);
        if self.confidence == 0 {
            log::trace!("note lock: {} -> {} (confidence exhausted)", locked.note, nearest);
            return Some(self.lock_onto(nearest, frequency));
        }
        Some(locked.note)
    }

    fn lock_onto(&mut self, note: Note, frequency: f32) -> Note {
        self.locked = Some(LockedNote {
            note,
            ideal_frequency: note.nearest_frequency(frequency),
        });
        self.confidence = 1;
        note
    }

    pub fn reset(&mut self) {
        self.locked = None;
        self.confidence = 0;
    }
}

/// Median filter followed by the note lock.
#[derive(Debug, Clone)]
pub struct NoteTracker {
    median: MedianFilter,
    lock: NoteLock,
}

impl NoteTracker {
    pub fn new(median_window: usize, tolerance_cents: f32, hysteresis_cents: f32) -> Self {
        Self {
            median: MedianFilter::new(median_window),
            lock: NoteLock::new(tolerance_cents, hysteresis_cents),
        }
    }

    /// Smooths `frequency` and assigns the locked note to the smoothed value.
    ///
    /// # Returns
    /// * `(smoothed_frequency, note)`, or `None` for an unusable frequency
    pub fn track(&mut self, frequency: f32) -> Option<(f32, Note)> {
        if !(frequency > 0.0) || !frequency.is_finite() {
            return None;
        }
        let smoothed = self.median.push(frequency);
        self.lock.assign(smoothed).map(|note| (smoothed, note))
    }

    pub fn lock(&self) -> &NoteLock {
        &self.lock
    }

    pub fn reset(&mut self) {
        self.median.clear();
        self.lock.reset();
    }
}
