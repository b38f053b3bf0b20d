//! # Chord Smoothing Module
//!
//! Debounces per-block chord identifications into a stable output. A new chord
//! must be seen for `confirmation_count` consecutive blocks before it replaces
//! the displayed one, and a displayed chord survives short gaps with no chord.

use std::time::Duration;

use crate::chord::ChordObservation;

/// Debounce state machine over the per-block chord stream.
///
/// Time is the caller's block timestamp, so replaying the same blocks always
/// gives the same output.
#[derive(Debug, Clone)]
pub struct ChordSmoother {
    confirmation_count: u32,
    stability_duration: Duration,
    clear_delay: Duration,
    last_chord: Option<ChordObservation>,
    last_confirmed_at: Duration,
    candidate: Option<ChordObservation>,
    candidate_count: u32,
}

impl ChordSmoother {
    pub fn new(
        confirmation_count: u32,
        stability_duration: Duration,
        clear_delay: Duration,
    ) -> Self {
        Self {
            confirmation_count: confirmation_count.max(1),
            stability_duration,
            clear_delay,
            last_chord: None,
            last_confirmed_at: Duration::ZERO,
            candidate: None,
            candidate_count: 0,
        }
    }

    /// The chord currently displayed.
    pub fn current(&self) -> Option<&ChordObservation> {
        self.last_chord.as_ref()
    }

    /// The chord being confirmed and how many consecutive blocks it has had.
    pub fn candidate(&self) -> Option<(&ChordObservation, u32)> {
        self.candidate.as_ref().map(|c| (c, self.candidate_count))
    }

    /// Feeds one block's identification and returns the chord to display.
    ///
    /// # Arguments
    /// * `observation` - Chord identified in this block, if any
    /// * `now` - Timestamp of the block
    pub fn update(
        &mut self,
        observation: Option<ChordObservation>,
        now: Duration,
    ) -> Option<ChordObservation> {
        let elapsed = now.saturating_sub(self.last_confirmed_at);

        let Some(observation) = observation else {
            self.clear_candidate();
            if self.last_chord.is_some() && elapsed < self.clear_delay {
                return self.last_chord.clone();
            }
            if let Some(cleared) = self.last_chord.take() {
                log::debug!("chord cleared: {cleared}");
            }
            return None;
        };

        if let Some(last) = &self.last_chord {
            if last.same_chord(&observation) && elapsed < self.stability_duration {
                self.clear_candidate();
                return self.last_chord.clone();
            }
        }

        if self.candidate.as_ref().is_some_and(|c| c.same_chord(&observation)) {
            self.candidate_count += 1;
        } else {
            self.candidate_count = 1;
        }
        self.candidate = Some(observation);

        if self.candidate_count >= self.confirmation_count {
            if let Some(confirmed) = self.candidate.take() {
                self.confirm(confirmed, now);
            }
        }
        self.last_chord.clone()
    }

    fn confirm(&mut self, chord: ChordObservation, now: Duration) {
        log::debug!(
            "chord confirmed: {chord} (confidence {:.2})",
            chord.confidence
        );
        self.last_chord = Some(chord);
        self.last_confirmed_at = now;
        self.clear_candidate();
    }

    fn clear_candidate(&mut self) {
        self.candidate = None;
        self.candidate_count = 0;
    }

    pub fn reset(&mut self) {
        self.last_chord = None;
        self.last_confirmed_at = Duration::ZERO;
        self.clear_candidate();
    }
}
