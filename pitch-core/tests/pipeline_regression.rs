mod common;

use common::{SAMPLE_RATE, decaying_tone, silence, stable_notes, tone};
use pitch_core::{FramePipeline, PipelineConfig, PipelineEvent};

fn replay(samples: &[i16]) -> Vec<PipelineEvent> {
    let config = PipelineConfig::default();
    let mut pipeline = FramePipeline::new(&config).unwrap();
    let mut events = Vec::new();
    for hop in samples.chunks_exact(config.hop_size) {
        pipeline.process_hop(hop, |event| events.push(event));
    }
    events
}

/// Held tone, linear fade, then silence: the classic phrase ending.
fn phrase_ending(freq: f32) -> Vec<i16> {
    let held_len = (1.5 * SAMPLE_RATE as f32) as usize;
    let mut samples = tone(freq, 0.6, 1.5);
    samples.extend(decaying_tone(freq, 0.6, 0.5, held_len));
    samples.extend(silence(1.0));
    samples
}

fn semitone_distance(a: f32, b: f32) -> f32 {
    12.0 * (a / b).log2().abs()
}

#[test]
fn phrase_ending_has_no_pitch_spike() {
    let events = replay(&phrase_ending(440.0));

    let mut previous: Option<f32> = None;
    let mut voiced = 0;
    for event in &events {
        match event {
            PipelineEvent::Pitch(pitch) => {
                voiced += 1;
                if let Some(last) = previous {
                    let jump = semitone_distance(pitch.frequency_hz, last);
                    assert!(
                        jump <= 6.0,
                        "{} -> {} Hz at {} ms",
                        last,
                        pitch.frequency_hz,
                        pitch.timestamp_ms
                    );
                }
                previous = Some(pitch.frequency_hz);
            }
            PipelineEvent::Silence { .. } => previous = None,
            PipelineEvent::StableNote(_) => {}
        }
    }

    // 1.5 s held tone at 512-sample hops is ~129 hops.
    assert!(voiced > 100, "only {} voiced hops", voiced);
}

#[test]
fn phrase_ending_stays_on_the_note() {
    let events = replay(&phrase_ending(440.0));
    for event in &events {
        if let PipelineEvent::Pitch(pitch) = event {
            assert!(
                semitone_distance(pitch.frequency_hz, 440.0) < 1.0,
                "{} Hz at {} ms",
                pitch.frequency_hz,
                pitch.timestamp_ms
            );
        }
    }
    assert_eq!(stable_notes(&events), vec![69]);
}

#[test]
fn phrase_ending_finishes_silent() {
    let events = replay(&phrase_ending(440.0));
    let tail_ms = events.last().unwrap().timestamp_ms() - 500;
    assert!(
        events
            .iter()
            .filter(|event| event.timestamp_ms() > tail_ms)
            .all(PipelineEvent::is_silence)
    );
}

#[test]
fn low_voice_phrase_has_no_pitch_spike() {
    let events = replay(&phrase_ending(110.0));
    let pitches: Vec<f32> = events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Pitch(pitch) => Some(pitch.frequency_hz),
            _ => None,
        })
        .collect();
    assert!(!pitches.is_empty());
    for pair in pitches.windows(2) {
        assert!(semitone_distance(pair[0], pair[1]) <= 6.0, "{:?}", pair);
    }
}

#[test]
fn melody_produces_each_note_once() {
    // C4 E4 G4 with short gaps between them
    let mut samples = Vec::new();
    for freq in [261.63, 329.63, 392.0] {
        samples.extend(tone(freq, 0.5, 0.5));
        samples.extend(silence(0.2));
    }
    let events = replay(&samples);
    assert_eq!(stable_notes(&events), vec![60, 64, 67]);
}
