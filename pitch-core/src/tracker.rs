//! # Pitch Tracking Module
//!
//! Turns a noisy stream of per-frame pitch candidates into a continuous,
//! stabilized pitch. Works in the semitone domain so that octave errors,
//! median filtering and smoothing all treat musical intervals uniformly.
//!
//! Per voiced frame:
//! 1. Octave correction against the last stable pitch
//! 2. Median filter over the last `median_window_size` frames
//! 3. Exponential smoothing
//!
//! Unvoiced frames are bridged for `hangover_frames` frames by repeating
//! the last pitch; after that the tracker forgets everything.

use std::collections::VecDeque;

use crate::config::{OCTAVE_CORRECTION_CONFIDENCE_CEILING, PipelineConfig};
use crate::tuning;

/// Semitones per octave.
const OCTAVE: f64 = 12.0;

/// State carried between frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerState {
    pub last_stable_semitone: Option<f64>,
    pub hold_counter: u32,
    pub smoothed_semitone: Option<f64>,
    pub median_window: VecDeque<f64>,
}

impl TrackerState {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            median_window: VecDeque::with_capacity(capacity),
            ..Self::default()
        }
    }

    fn clear(&mut self) {
        self.last_stable_semitone = None;
        self.hold_counter = 0;
        self.smoothed_semitone = None;
        self.median_window.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.last_stable_semitone.is_none()
            && self.smoothed_semitone.is_none()
            && self.hold_counter == 0
            && self.median_window.is_empty()
    }
}

/// Stateful pitch post-processor.
///
/// Deterministic: the same sequence of frames always yields the same output.
#[derive(Debug, Clone)]
pub struct PitchTracker {
    energy_threshold: f32,
    confidence_threshold: f32,
    smoothing_alpha: f64,
    hangover_frames: u32,
    max_jump_semitones: f64,
    median_capacity: usize,
    state: TrackerState,
    median_scratch: Vec<f64>,
}

impl PitchTracker {
    pub fn new(config: &PipelineConfig) -> Self {
        let median_capacity = config.median_window_size.max(1);
        Self {
            energy_threshold: config.volume_threshold,
            confidence_threshold: config.pitch_confidence_threshold,
            smoothing_alpha: config.smoothing_alpha,
            hangover_frames: config.hangover_frames(),
            max_jump_semitones: config.max_jump_semitones_per_frame,
            median_capacity,
            state: TrackerState::with_capacity(median_capacity),
            median_scratch: Vec::with_capacity(median_capacity),
        }
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn hangover_frames(&self) -> u32 {
        self.hangover_frames
    }

    /// Minimum RMS for a frame to count as voiced.
    pub fn set_energy_threshold(&mut self, threshold: f32) {
        self.energy_threshold = threshold;
    }

    /// Forgets all history.
    pub fn reset(&mut self) {
        self.state.clear();
    }

    /// Processes one frame and returns the tracked pitch in Hz, if any.
    pub fn process_frame(
        &mut self,
        candidate_hz: Option<f32>,
        clarity_complement: f32,
        rms: f32,
    ) -> Option<f32> {
        let confidence = 1.0 - clarity_complement;
        let voiced_candidate = candidate_hz
            .filter(|hz| hz.is_finite() && *hz > 0.0)
            .filter(|_| rms >= self.energy_threshold && confidence >= self.confidence_threshold);

        match voiced_candidate {
            Some(hz) => Some(self.track_voiced(hz, confidence)),
            None => self.hold_or_release(),
        }
    }

    fn hold_or_release(&mut self) -> Option<f32> {
        if let Some(smoothed) = self.state.smoothed_semitone {
            if self.state.hold_counter < self.hangover_frames {
                self.state.hold_counter += 1;
                return Some(semitone_to_hz(smoothed));
            }
            log::trace!(
                "Tracker released after {} unvoiced frames",
                self.state.hold_counter
            );
        }
        self.state.clear();
        None
    }

    fn track_voiced(&mut self, candidate_hz: f32, confidence: f32) -> f32 {
        self.state.hold_counter = 0;

        let mut semitone = tuning::frequency_to_midi(candidate_hz as f64);
        if let Some(previous) = self.state.last_stable_semitone {
            semitone = self.correct_octave(semitone, previous, confidence as f64);
        }

        if self.state.median_window.len() == self.median_capacity {
            self.state.median_window.pop_front();
        }
        self.state.median_window.push_back(semitone);
        let median = self.median();

        let smoothed = match self.state.smoothed_semitone {
            Some(previous) => {
                self.smoothing_alpha * median + (1.0 - self.smoothing_alpha) * previous
            }
            None => median,
        };
        self.state.smoothed_semitone = Some(smoothed);
        self.state.last_stable_semitone = Some(smoothed);

        semitone_to_hz(smoothed)
    }

    /// Shifts `semitone` by whole octaves towards `previous` when the jump
    /// is too large to be trusted.
    fn correct_octave(&self, semitone: f64, previous: f64, confidence: f64) -> f64 {
        let diff = semitone - previous;
        if diff.abs() <= self.max_jump_semitones || confidence >= OCTAVE_CORRECTION_CONFIDENCE_CEILING {
            return semitone;
        }
        let octaves = (diff / OCTAVE).round();
        let corrected = semitone - octaves * OCTAVE;
        if (corrected - previous).abs() < diff.abs() {
            log::trace!(
                "Octave correction: {:.2} -> {:.2} (stable {:.2})",
                semitone,
                corrected,
                previous
            );
            corrected
        } else {
            semitone
        }
    }

    fn median(&mut self) -> f64 {
        self.median_scratch.clear();
        self.median_scratch.extend(self.state.median_window.iter().copied());
        self.median_scratch.sort_unstable_by(f64::total_cmp);
        let len = self.median_scratch.len();
        let mid = len / 2;
        if len % 2 == 0 {
            (self.median_scratch[mid - 1] + self.median_scratch[mid]) / 2.0
        } else {
            self.median_scratch[mid]
        }
    }
}

fn semitone_to_hz(semitone: f64) -> f32 {
    tuning::midi_to_frequency(semitone) as f32
}
