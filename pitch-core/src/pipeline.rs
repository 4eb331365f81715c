//! # Frame Pipeline Module
//!
//! The synchronous per-hop work of a capture session:
//! 1. Slide the analysis window by one hop
//! 2. Short-circuit silent windows
//! 3. Estimate (YIN) and track the pitch
//! 4. Debounce onsets and detect stable notes
//!
//! A `FramePipeline` is owned by exactly one thread and needs no locks.
//! Replaying the same hops always yields the same events.

use std::panic::{self, AssertUnwindSafe};

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::pitch::YinEstimator;
use crate::stability::StabilityDetector;
use crate::tracker::{PitchTracker, TrackerState};
use crate::window::SignalWindow;
use crate::{PipelineEvent, PitchEvent, StableNoteEvent};

/// Onset and note-change debounce counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceState {
    pub frames_with_pitch: u32,
    pub last_emitted_stable_midi: Option<i32>,
    pub consecutive_stable_frames: u32,
}

/// Per-hop processing chain from raw PCM to pipeline events.
#[derive(Debug)]
pub struct FramePipeline {
    config: PipelineConfig,
    window: SignalWindow,
    estimator: YinEstimator,
    tracker: PitchTracker,
    stability: StabilityDetector,
    frames_with_pitch: u32,
    hops_processed: u64,
    volume_threshold: f32,
    /// Makes the next analysis panic.
    #[cfg(test)]
    fail_next_analysis: bool,
}

impl FramePipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            window: SignalWindow::new(config.buffer_size),
            estimator: YinEstimator::new(config),
            tracker: PitchTracker::new(config),
            stability: StabilityDetector::new(config),
            frames_with_pitch: 0,
            hops_processed: 0,
            volume_threshold: config.volume_threshold,
            #[cfg(test)]
            fail_next_analysis: false,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn hops_processed(&self) -> u64 {
        self.hops_processed
    }

    pub fn volume_threshold(&self) -> f32 {
        self.volume_threshold
    }

    /// Changes the silence gate. The tracker's voicing energy threshold follows it.
    pub fn set_volume_threshold(&mut self, threshold: f32) {
        self.volume_threshold = threshold;
        self.tracker.set_energy_threshold(threshold);
    }

    pub fn debounce_state(&self) -> DebounceState {
        DebounceState {
            frames_with_pitch: self.frames_with_pitch,
            last_emitted_stable_midi: self.stability.last_emitted(),
            consecutive_stable_frames: self.stability.consecutive_stable_frames(),
        }
    }

    pub fn tracker_state(&self) -> &TrackerState {
        self.tracker.state()
    }

    /// Restores the state of a freshly created pipeline, including the
    /// window contents and the stream clock.
    pub fn reset(&mut self) {
        self.window.clear();
        self.hops_processed = 0;
        self.reset_tracking();
    }

    /// Processes one hop of 16-bit PCM and emits this hop's events.
    ///
    /// Every hop emits exactly one `Pitch` or `Silence` event, optionally
    /// followed by a `StableNote` event.
    pub fn process_hop<F>(&mut self, hop: &[i16], mut emit: F)
    where
        F: FnMut(PipelineEvent),
    {
        self.window.push_pcm(hop);
        self.hops_processed += 1;
        let timestamp_ms = self.config.hops_to_millis(self.hops_processed);

        let rms = self.window.rms();
        // Negated comparison so a NaN level also counts as silence.
        if !(rms >= self.volume_threshold) {
            self.reset_tracking();
            emit(PipelineEvent::Silence { timestamp_ms });
            return;
        }

        let Some((frequency_hz, confidence)) = self.estimate_and_track(rms, timestamp_ms) else {
            self.reset_tracking();
            emit(PipelineEvent::Silence { timestamp_ms });
            return;
        };

        self.frames_with_pitch = self.frames_with_pitch.saturating_add(1);
        if self.frames_with_pitch < self.config.min_contiguous_frames {
            emit(PipelineEvent::Silence { timestamp_ms });
            return;
        }

        emit(PipelineEvent::Pitch(PitchEvent {
            frequency_hz,
            confidence,
            timestamp_ms,
        }));

        if let Some(midi_note) = self.stability.observe(frequency_hz, confidence) {
            log::debug!("Stable note {} at {:.2} Hz ({} ms)", midi_note, frequency_hz, timestamp_ms);
            emit(PipelineEvent::StableNote(StableNoteEvent {
                midi_note,
                frequency_hz,
                timestamp_ms,
            }));
        }
    }

    /// Runs estimator and tracker on the current window.
    ///
    /// A panic in either is logged and downgraded to "no pitch" for this hop.
    fn estimate_and_track(&mut self, rms: f32, timestamp_ms: u64) -> Option<(f32, f32)> {
        let window = self.window.as_slice();
        let estimator = &mut self.estimator;
        let tracker = &mut self.tracker;
        #[cfg(test)]
        let fail = std::mem::take(&mut self.fail_next_analysis);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            #[cfg(test)]
            if fail {
                panic!("injected analysis fault");
            }
            let estimate = estimator.estimate(window, Some(rms));
            tracker
                .process_frame(estimate.pitch_hz, estimate.clarity_complement, estimate.rms)
                .map(|frequency| (frequency, estimate.confidence()))
        }));

        match outcome {
            Ok(tracked) => tracked,
            Err(_) => {
                log::warn!("Pitch analysis panicked at {} ms, treating hop as unvoiced", timestamp_ms);
                None
            }
        }
    }

    fn reset_tracking(&mut self) {
        self.tracker.reset();
        self.stability.reset();
        self.frames_with_pitch = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, amplitude: f32, seconds: f32, sample_rate: u32) -> Vec<i16> {
        let len = (seconds * sample_rate as f32) as usize;
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (amplitude * (2.0 * std::f32::consts::PI * freq * t).sin() * 32767.0) as i16
            })
            .collect()
    }

    fn run(pipeline: &mut FramePipeline, samples: &[i16]) -> Vec<PipelineEvent> {
        let hop_size = pipeline.config().hop_size;
        let mut events = Vec::new();
        for hop in samples.chunks_exact(hop_size) {
            pipeline.process_hop(hop, |event| events.push(event));
        }
        events
    }

    fn stable_notes(events: &[PipelineEvent]) -> Vec<i32> {
        events
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::StableNote(note) => Some(note.midi_note),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_zero_input_is_all_silence() {
        let mut pipeline = FramePipeline::new(&PipelineConfig::default()).unwrap();
        let events = run(&mut pipeline, &vec![0; 512 * 20]);
        assert_eq!(events.len(), 20);
        assert!(events.iter().all(|event| event.pitch_reading() == Some((-1.0, 0.0))));
        assert_eq!(pipeline.debounce_state(), DebounceState::default());
        assert!(pipeline.tracker_state().is_empty());
    }

    #[test]
    fn test_one_reading_per_hop() {
        let mut pipeline = FramePipeline::new(&PipelineConfig::default()).unwrap();
        let events = run(&mut pipeline, &tone(330.0, 0.5, 1.0, 44100));
        let readings = events.iter().filter(|e| e.pitch_reading().is_some()).count();
        assert_eq!(readings as u64, pipeline.hops_processed());
    }

    #[test]
    fn test_held_tone_reports_pitch_and_one_stable_note() {
        let mut pipeline = FramePipeline::new(&PipelineConfig::default()).unwrap();
        let events = run(&mut pipeline, &tone(440.0, 0.5, 1.0, 44100));

        let pitches: Vec<f32> = events
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::Pitch(pitch) => Some(pitch.frequency_hz),
                _ => None,
            })
            .collect();
        assert!(pitches.len() > 50);
        let last = *pitches.last().unwrap();
        assert!((last - 440.0).abs() < 2.0, "last pitch {} Hz", last);

        assert_eq!(stable_notes(&events), vec![69]);
        assert_eq!(pipeline.debounce_state().last_emitted_stable_midi, Some(69));
    }

    #[test]
    fn test_silence_after_tone_clears_state() {
        let mut pipeline = FramePipeline::new(&PipelineConfig::default()).unwrap();
        run(&mut pipeline, &tone(440.0, 0.5, 0.5, 44100));
        assert!(pipeline.debounce_state().frames_with_pitch > 0);

        // Enough zero hops to flush the whole window.
        let events = run(&mut pipeline, &vec![0; 2048 + 512]);
        assert!(events.last().unwrap().is_silence());
        assert_eq!(pipeline.debounce_state(), DebounceState::default());
        assert!(pipeline.tracker_state().is_empty());
    }

    #[test]
    fn test_onset_debounce_delays_first_pitch() {
        let samples = tone(262.0, 0.5, 0.5, 44100);
        let first_pitch = |min_contiguous_frames| {
            let config = PipelineConfig {
                min_contiguous_frames,
                ..PipelineConfig::default()
            };
            let mut pipeline = FramePipeline::new(&config).unwrap();
            run(&mut pipeline, &samples)
                .iter()
                .position(|event| matches!(event, PipelineEvent::Pitch(_)))
                .unwrap()
        };
        assert_eq!(first_pitch(6), first_pitch(1) + 5);
    }

    #[test]
    fn test_volume_threshold_gates_everything() {
        let mut pipeline = FramePipeline::new(&PipelineConfig::default()).unwrap();
        pipeline.set_volume_threshold(0.9);
        let events = run(&mut pipeline, &tone(440.0, 0.5, 0.5, 44100));
        assert!(events.iter().all(PipelineEvent::is_silence));
    }

    #[test]
    fn test_note_change_emits_new_stable_note() {
        let mut samples = tone(440.0, 0.5, 0.6, 44100);
        samples.extend(tone(493.88, 0.5, 0.6, 44100));
        let mut pipeline = FramePipeline::new(&PipelineConfig::default()).unwrap();
        let notes = stable_notes(&run(&mut pipeline, &samples));
        assert_eq!(notes.first(), Some(&69));
        assert_eq!(notes.last(), Some(&71));
        assert!(notes.windows(2).all(|pair| pair[0] != pair[1]));
    }

    #[test]
    fn test_timestamps_follow_stream_position() {
        let mut pipeline = FramePipeline::new(&PipelineConfig::default()).unwrap();
        let events = run(&mut pipeline, &vec![0; 512 * 3]);
        let stamps: Vec<u64> = events.iter().map(PipelineEvent::timestamp_ms).collect();
        assert_eq!(stamps, vec![11, 23, 34]);

        pipeline.reset();
        let events = run(&mut pipeline, &vec![0; 512]);
        assert_eq!(events[0].timestamp_ms(), 11);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let mut samples = tone(196.0, 0.4, 0.4, 44100);
        samples.extend(vec![0; 4096]);
        samples.extend(tone(392.0, 0.4, 0.4, 44100));

        let mut a = FramePipeline::new(&PipelineConfig::default()).unwrap();
        let mut b = FramePipeline::new(&PipelineConfig::default()).unwrap();
        assert_eq!(run(&mut a, &samples), run(&mut b, &samples));
    }

    #[test]
    fn test_analysis_panic_only_costs_one_hop() {
        let samples = tone(440.0, 0.5, 1.0, 44100);
        let (warmup, rest) = samples.split_at(512 * 60);
        let mut pipeline = FramePipeline::new(&PipelineConfig::default()).unwrap();
        let events = run(&mut pipeline, warmup);
        assert!(matches!(events.last(), Some(PipelineEvent::Pitch(_))));

        pipeline.fail_next_analysis = true;
        let events = run(&mut pipeline, &rest[..512]);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_silence());
        assert_eq!(pipeline.debounce_state().frames_with_pitch, 0);

        // The session carries on: pitch returns once the onset debounce refills.
        let events = run(&mut pipeline, &rest[512..512 * 4]);
        let (frequency, confidence) = events[2].pitch_reading().unwrap();
        assert!((frequency - 440.0).abs() < 5.0, "got {} Hz", frequency);
        assert!(confidence > 0.8);
        assert_eq!(pipeline.hops_processed(), 64);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = PipelineConfig {
            hop_size: 0,
            ..PipelineConfig::default()
        };
        assert!(FramePipeline::new(&config).is_err());
    }
}
