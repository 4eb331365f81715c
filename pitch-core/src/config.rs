//! Configuration parameters for the pitch pipeline

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// CMNDF value above which the estimator gives up even on its best lag.
pub const ABORT_CLARITY_COMPLEMENT: f64 = 0.45;

/// Confidence at or above which the tracker trusts a large jump as real.
pub const OCTAVE_CORRECTION_CONFIDENCE_CEILING: f64 = 0.95;

/// Pipeline configuration.
///
/// Every field can be overridden at construction. Deserializing a partial
/// document keeps the defaults for any field it leaves out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input sample rate in Hz (default: 44100)
    pub sample_rate: u32,

    /// Analysis window length in samples (default: 2048)
    pub buffer_size: usize,

    /// New samples consumed per processing step (default: 512)
    pub hop_size: usize,

    /// Lowest detectable pitch in Hz (default: 70.0)
    pub min_freq: f32,

    /// Highest detectable pitch in Hz (default: 1100.0)
    pub max_freq: f32,

    /// Weight of the newest median value in exponential smoothing (default: 0.35)
    /// Higher values follow the voice faster, lower values are steadier
    pub smoothing_alpha: f64,

    /// Maximum deviation from the nearest note, in cents, for a frame to
    /// count towards a stable note (default: 30.0)
    pub stability_cents_threshold: f32,

    /// Minimum confidence for a frame to count towards a stable note (default: 0.55)
    pub stability_confidence_threshold: f32,

    /// Consecutive stable frames needed before a note event fires (default: 3)
    pub stability_required_frames: u32,

    /// Minimum estimator confidence for the tracker to treat a frame as voiced (default: 0.5)
    pub pitch_confidence_threshold: f32,

    /// Voiced frames needed before pitch is reported at a phrase start (default: 3)
    pub min_contiguous_frames: u32,

    /// Window RMS below which a frame is treated as silence (default: 0.01)
    pub volume_threshold: f32,

    /// How long an unvoiced gap is bridged with the last pitch, in ms (default: 100)
    pub hangover_ms: f32,

    /// Length of the tracker's median filter in frames (default: 5)
    pub median_window_size: usize,

    /// Largest per-frame jump, in semitones, accepted without octave correction (default: 12.0)
    pub max_jump_semitones_per_frame: f64,

    /// YIN absolute threshold on the CMNDF (default: 0.12)
    pub yin_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 2048,
            hop_size: 512,
            min_freq: 70.0,
            max_freq: 1100.0,
            smoothing_alpha: 0.35,
            stability_cents_threshold: 30.0,
            stability_confidence_threshold: 0.55,
            stability_required_frames: 3,
            pitch_confidence_threshold: 0.5,
            min_contiguous_frames: 3,
            volume_threshold: 0.01,
            hangover_ms: 100.0,
            median_window_size: 5,
            max_jump_semitones_per_frame: 12.0,
            yin_threshold: 0.12,
        }
    }
}

impl PipelineConfig {
    /// Checks every field for range and consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(out_of_range("sample_rate", "positive", 0.0));
        }
        if self.buffer_size < 64 {
            return Err(out_of_range("buffer_size", "at least 64", self.buffer_size as f64));
        }
        if self.hop_size == 0 {
            return Err(out_of_range("hop_size", "positive", 0.0));
        }
        if self.hop_size > self.buffer_size {
            return Err(ConfigError::HopLargerThanWindow {
                hop_size: self.hop_size,
                buffer_size: self.buffer_size,
            });
        }
        for (field, value) in [("min_freq", self.min_freq), ("max_freq", self.max_freq)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(out_of_range(field, "a positive finite frequency", value as f64));
            }
        }
        if self.min_freq >= self.max_freq {
            return Err(ConfigError::InvertedFrequencyRange {
                min_freq: self.min_freq,
                max_freq: self.max_freq,
            });
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if self.max_freq > nyquist {
            return Err(out_of_range("max_freq", "at most the Nyquist frequency", self.max_freq as f64));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(out_of_range("smoothing_alpha", "in (0, 1]", self.smoothing_alpha));
        }
        let unit_fields = [
            ("stability_confidence_threshold", self.stability_confidence_threshold as f64),
            ("pitch_confidence_threshold", self.pitch_confidence_threshold as f64),
            ("volume_threshold", self.volume_threshold as f64),
            ("yin_threshold", self.yin_threshold),
        ];
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(out_of_range(field, "in [0, 1]", value));
            }
        }
        if !(self.stability_cents_threshold >= 0.0 && self.stability_cents_threshold <= 50.0) {
            return Err(out_of_range(
                "stability_cents_threshold",
                "in [0, 50]",
                self.stability_cents_threshold as f64,
            ));
        }
        if !(self.hangover_ms >= 0.0 && self.hangover_ms.is_finite()) {
            return Err(out_of_range("hangover_ms", "non-negative", self.hangover_ms as f64));
        }
        if self.median_window_size == 0 {
            return Err(out_of_range("median_window_size", "positive", 0.0));
        }
        if self.stability_required_frames == 0 {
            return Err(out_of_range("stability_required_frames", "positive", 0.0));
        }
        if !(self.max_jump_semitones_per_frame > 0.0) {
            return Err(out_of_range(
                "max_jump_semitones_per_frame",
                "positive",
                self.max_jump_semitones_per_frame,
            ));
        }
        Ok(())
    }

    /// Wall-clock length of one hop.
    pub fn hop_duration(&self) -> Duration {
        Duration::from_secs_f64(self.hop_size as f64 / self.sample_rate as f64)
    }

    /// Number of unvoiced frames bridged by the tracker.
    pub fn hangover_frames(&self) -> u32 {
        let hop_ms = self.hop_size as f64 * 1000.0 / self.sample_rate as f64;
        (self.hangover_ms as f64 / hop_ms).ceil() as u32
    }

    /// Inclusive lag search range `(min_lag, max_lag)` in samples.
    ///
    /// `min_lag` is never below 2 and `max_lag` never reaches past half the
    /// window, so the difference function always has a full overlap.
    /// The range may be empty (`min_lag >= max_lag`) for extreme settings.
    pub fn lag_bounds(&self) -> (usize, usize) {
        let sample_rate = self.sample_rate as f64;
        let min_lag = ((sample_rate / self.max_freq as f64).floor() as usize).max(2);
        let max_lag = ((sample_rate / self.min_freq as f64).ceil() as usize)
            .min((self.buffer_size / 2).saturating_sub(1));
        (min_lag, max_lag)
    }

    /// Stream position in milliseconds after `hops` processed hops.
    pub fn hops_to_millis(&self, hops: u64) -> u64 {
        hops * self.hop_size as u64 * 1000 / self.sample_rate as u64
    }
}

fn out_of_range(field: &'static str, expected: &'static str, value: f64) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        expected,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lag_bounds(), (40, 630));
    }

    #[test]
    fn test_hangover_frames_rounds_up() {
        let config = PipelineConfig::default();
        // 512 / 44100 s ~= 11.61 ms per hop
        assert_eq!(config.hangover_frames(), 9);

        let none = PipelineConfig {
            hangover_ms: 0.0,
            ..PipelineConfig::default()
        };
        assert_eq!(none.hangover_frames(), 0);
    }

    #[test]
    fn test_max_lag_is_clamped_to_half_window() {
        let config = PipelineConfig {
            min_freq: 20.0,
            ..PipelineConfig::default()
        };
        assert_eq!(config.lag_bounds().1, 1023);
    }

    #[test]
    fn test_rejects_inverted_range() {
        let config = PipelineConfig {
            min_freq: 800.0,
            max_freq: 400.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedFrequencyRange { .. })
        ));
    }

    #[test]
    fn test_rejects_hop_larger_than_window() {
        let config = PipelineConfig {
            hop_size: 4096,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HopLargerThanWindow { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_alpha() {
        let config = PipelineConfig {
            smoothing_alpha: 0.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "smoothing_alpha", .. })
        ));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "hop_size": 256, "yin_threshold": 0.1 }"#).unwrap();
        assert_eq!(config.hop_size, 256);
        assert_eq!(config.yin_threshold, 0.1);
        assert_eq!(config.buffer_size, 2048);
        assert_eq!(config.median_window_size, 5);
    }

    #[test]
    fn test_hops_to_millis() {
        let config = PipelineConfig::default();
        assert_eq!(config.hops_to_millis(0), 0);
        // 86 hops * 512 samples = 44032 samples ~= 998 ms
        assert_eq!(config.hops_to_millis(86), 998);
    }
}
