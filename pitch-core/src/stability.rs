//! Stable-note detection: turns the continuous pitch into discrete
//! note-change events.

use crate::config::PipelineConfig;
use crate::tuning;

/// Emits a note once the pitch has sat close to it for enough frames.
///
/// A frame counts as stable when it is within `cents_threshold` of its
/// nearest note and its confidence is at least `confidence_threshold`.
/// A run of stable frames on the same note fires once; vibrato or a brief
/// excursion resets the run instead of firing a new note.
#[derive(Debug, Clone)]
pub struct StabilityDetector {
    cents_threshold: f64,
    confidence_threshold: f32,
    required_frames: u32,
    consecutive_stable: u32,
    run_note: Option<i32>,
    last_emitted: Option<i32>,
}

impl StabilityDetector {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            cents_threshold: config.stability_cents_threshold as f64,
            confidence_threshold: config.stability_confidence_threshold,
            required_frames: config.stability_required_frames.max(1),
            consecutive_stable: 0,
            run_note: None,
            last_emitted: None,
        }
    }

    /// Feeds one reported pitch. Returns the MIDI note to announce, if any.
    pub fn observe(&mut self, frequency_hz: f32, confidence: f32) -> Option<i32> {
        let (note, cents) = tuning::nearest_midi_note(frequency_hz as f64);
        let stable = cents.abs() <= self.cents_threshold && confidence >= self.confidence_threshold;

        if !stable {
            self.consecutive_stable = 0;
            self.run_note = None;
            return None;
        }

        if self.run_note == Some(note) {
            self.consecutive_stable = self.consecutive_stable.saturating_add(1);
        } else {
            self.run_note = Some(note);
            self.consecutive_stable = 1;
        }

        if self.consecutive_stable >= self.required_frames && self.last_emitted != Some(note) {
            self.last_emitted = Some(note);
            return Some(note);
        }
        None
    }

    pub fn consecutive_stable_frames(&self) -> u32 {
        self.consecutive_stable
    }

    pub fn last_emitted(&self) -> Option<i32> {
        self.last_emitted
    }

    pub fn reset(&mut self) {
        self.consecutive_stable = 0;
        self.run_note = None;
        self.last_emitted = None;
    }
}
