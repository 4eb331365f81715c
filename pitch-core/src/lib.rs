// pitch-core/src/lib.rs

//! The core logic for real-time vocal pitch monitoring.
//! This crate turns a live monophonic audio stream into a continuous,
//! denoised pitch estimate plus discrete "stable note" events. It is
//! completely headless and contains no presentation code.
//!
//! Data flows one way:
//! device → [`window`] → [`pitch`] (YIN) → [`tracker`] → onset debounce
//! and [`stability`] → [`PipelineEvent`]s on a channel.

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pitch;
pub mod stability;
pub mod tracker;
pub mod tuning;
pub mod window;

pub use audio::{AudioInput, CpalInput, HopReader, ReplayInput};
pub use capture::{CancelToken, CaptureLoop};
pub use config::PipelineConfig;
pub use error::{CaptureError, ConfigError};
pub use pipeline::{DebounceState, FramePipeline};
pub use pitch::{EstimationResult, YinEstimator};
pub use stability::StabilityDetector;
pub use tracker::{PitchTracker, TrackerState};

use serde::{Deserialize, Serialize};

/// A continuous pitch reading, emitted once per voiced hop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEvent {
    /// Smoothed fundamental frequency in Hz.
    pub frequency_hz: f32,
    /// Estimator confidence for the same hop, 0.0 to 1.0.
    pub confidence: f32,
    /// Stream position in milliseconds since the session started.
    pub timestamp_ms: u64,
}

/// A newly confirmed stable note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StableNoteEvent {
    /// MIDI note number (A4 = 69).
    pub midi_note: i32,
    /// The tracked frequency that confirmed the note.
    pub frequency_hz: f32,
    pub timestamp_ms: u64,
}

/// Everything the pipeline reports, on a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Pitch(PitchEvent),
    /// No pitch this hop: quiet, unvoiced, or still inside the onset debounce.
    Silence { timestamp_ms: u64 },
    StableNote(StableNoteEvent),
}

impl PipelineEvent {
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            PipelineEvent::Pitch(event) => event.timestamp_ms,
            PipelineEvent::Silence { timestamp_ms } => *timestamp_ms,
            PipelineEvent::StableNote(event) => event.timestamp_ms,
        }
    }

    /// The `(frequency, confidence)` pair of a per-hop reading.
    ///
    /// Silence maps to the `(-1.0, 0.0)` sentinel. Stable-note events are not
    /// per-hop readings and return `None`.
    pub fn pitch_reading(&self) -> Option<(f32, f32)> {
        match self {
            PipelineEvent::Pitch(event) => Some((event.frequency_hz, event.confidence)),
            PipelineEvent::Silence { .. } => Some((-1.0, 0.0)),
            PipelineEvent::StableNote(_) => None,
        }
    }

    pub fn is_silence(&self) -> bool {
        matches!(self, PipelineEvent::Silence { .. })
    }
}
