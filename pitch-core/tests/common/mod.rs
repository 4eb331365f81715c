//! Signal generators shared by the integration tests.

#![allow(dead_code)]

use pitch_core::PipelineEvent;

pub const SAMPLE_RATE: u32 = 44100;

/// A sine tone as 16-bit PCM.
pub fn tone(freq: f32, amplitude: f32, seconds: f32) -> Vec<i16> {
    let len = (seconds * SAMPLE_RATE as f32) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            to_pcm(amplitude * (2.0 * std::f32::consts::PI * freq * t).sin())
        })
        .collect()
}

/// A sine tone whose amplitude falls linearly from `amplitude` to zero.
pub fn decaying_tone(freq: f32, amplitude: f32, seconds: f32, start_phase_samples: usize) -> Vec<i16> {
    let len = (seconds * SAMPLE_RATE as f32) as usize;
    (0..len)
        .map(|i| {
            let t = (i + start_phase_samples) as f32 / SAMPLE_RATE as f32;
            let envelope = amplitude * (1.0 - i as f32 / len as f32);
            to_pcm(envelope * (2.0 * std::f32::consts::PI * freq * t).sin())
        })
        .collect()
}

pub fn silence(seconds: f32) -> Vec<i16> {
    vec![0; (seconds * SAMPLE_RATE as f32) as usize]
}

fn to_pcm(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

pub fn stable_notes(events: &[PipelineEvent]) -> Vec<i32> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::StableNote(note) => Some(note.midi_note),
            _ => None,
        })
        .collect()
}
