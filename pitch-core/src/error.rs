//! Error types for the pitch pipeline.

use thiserror::Error;

/// A configuration value is out of range or inconsistent with another one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
    #[error("min_freq ({min_freq} Hz) must be below max_freq ({max_freq} Hz)")]
    InvertedFrequencyRange { min_freq: f32, max_freq: f32 },
    #[error("hop_size ({hop_size}) must not exceed buffer_size ({buffer_size})")]
    HopLargerThanWindow { hop_size: usize, buffer_size: usize },
}

/// Errors raised while opening or reading an audio input.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no audio input device available")]
    NoDevice,
    #[error("input device does not support the requested format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to query input device: {0}")]
    DeviceQuery(String),
    #[error(transparent)]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),
    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("audio stream disconnected")]
    Disconnected,
    #[error("failed to spawn capture thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
