//! # Event Lines
//!
//! Formats pipeline events as console lines, either human readable or as
//! one JSON object per line.

use pitch_core::tuning::{nearest_midi_note, note_name};
use pitch_core::{PipelineEvent, PitchEvent, StableNoteEvent};

use super::cent_meter;

/// How events are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Turns events into output lines.
#[derive(Debug, Clone, Copy)]
pub struct EventFormatter {
    format: OutputFormat,
    show_silence: bool,
}

impl EventFormatter {
    pub fn new(format: OutputFormat, show_silence: bool) -> Self {
        Self {
            format,
            show_silence,
        }
    }

    /// The line to print for `event`, or `None` if it is filtered out.
    pub fn format(&self, event: &PipelineEvent) -> Option<String> {
        if event.is_silence() && !self.show_silence {
            return None;
        }
        match self.format {
            OutputFormat::Json => match serde_json::to_string(event) {
                Ok(line) => Some(line),
                Err(e) => {
                    log::error!("Failed to serialize event: {}", e);
                    None
                }
            },
            OutputFormat::Text => Some(match event {
                PipelineEvent::Pitch(pitch) => pitch_line(pitch),
                PipelineEvent::Silence { timestamp_ms } => {
                    format!("{:>8} ms  {:<4} {}", timestamp_ms, "--", cent_meter::render(None))
                }
                PipelineEvent::StableNote(note) => stable_note_line(note),
            }),
        }
    }
}

fn label(midi: i32) -> &'static str {
    note_name(midi).unwrap_or("?")
}

fn pitch_line(pitch: &PitchEvent) -> String {
    let (midi, cents) = nearest_midi_note(pitch.frequency_hz as f64);
    let cents = cents as f32;
    format!(
        "{:>8} ms  {:<4} {} {:+6.1} cents  {:8.2} Hz  conf {:.2}",
        pitch.timestamp_ms,
        label(midi),
        cent_meter::render(Some(cents)),
        cents,
        pitch.frequency_hz,
        pitch.confidence
    )
}

fn stable_note_line(note: &StableNoteEvent) -> String {
    format!(
        "{:>8} ms  ==> {} (MIDI {}, {:.2} Hz)",
        note.timestamp_ms,
        label(note.midi_note),
        note.midi_note,
        note.frequency_hz
    )
}
