//! # Audio Input Module
//!
//! Sources of raw mono PCM for the capture loop.
//!
//! An [`AudioInput`] is the device handle: it is opened and released by the
//! capture loop's owner. Opening yields a [`HopReader`], the only part that
//! moves to the capture thread. Live cpal streams are not `Send` on every
//! platform, so they never leave the owner's thread.
//!
//! ## Inputs
//! - [`CpalInput`]: live capture from a system input device
//! - [`ReplayInput`]: replay of an in-memory recording, optionally in real time

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::config::PipelineConfig;
use crate::error::CaptureError;

/// Number of device callback chunks buffered between the audio callback
/// and the capture thread before new chunks are dropped.
const CHUNK_QUEUE_DEPTH: usize = 64;

/// Blocking reader of 16-bit mono PCM.
pub trait HopReader: Send + 'static {
    /// Reads up to `buf.len()` samples into `buf` and returns how many were
    /// written. `Ok(0)` means nothing arrived in time; the caller retries.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, CaptureError>;
}

/// An openable audio input device.
pub trait AudioInput {
    type Reader: HopReader;

    /// Opens and validates the device for `config`.
    fn open(&mut self, config: &PipelineConfig) -> Result<Self::Reader, CaptureError>;

    /// Releases the device. Safe to call when nothing is open.
    fn release(&mut self);
}

/// Live capture from a cpal input device.
pub struct CpalInput {
    device_name: Option<String>,
    stream: Option<cpal::Stream>,
}

impl CpalInput {
    /// Captures from the host's default input device.
    pub fn new() -> Self {
        Self {
            device_name: None,
            stream: None,
        }
    }

    /// Captures from the input device with the given name.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            stream: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn select_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        let device = match &self.device_name {
            None => host.default_input_device(),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| CaptureError::DeviceQuery(e.to_string()))?
                .find(|device| device.name().map(|name| &name == wanted).unwrap_or(false)),
        };
        device.ok_or(CaptureError::NoDevice)
    }
}

impl Default for CpalInput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioInput for CpalInput {
    type Reader = CpalReader;

    fn open(&mut self, config: &PipelineConfig) -> Result<CpalReader, CaptureError> {
        self.release();

        let device = self.select_device()?;
        let device_name = device
            .name()
            .map_err(|e| CaptureError::DeviceQuery(e.to_string()))?;
        log::info!("Using audio input device: {}", device_name);

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let supported = find_supported_config(configs, config.sample_rate).ok_or_else(|| {
            CaptureError::UnsupportedFormat(format!(
                "no i16 or f32 input stream at {} Hz",
                config.sample_rate
            ))
        })?;

        let sample_format = supported.sample_format();
        let channels = supported.channels().max(1) as usize;
        let stream_config: cpal::StreamConfig = supported
            .with_sample_rate(cpal::SampleRate(config.sample_rate))
            .into();
        log::info!(
            "Selected input stream: {} Hz, {} channel(s), {:?}",
            config.sample_rate,
            channels,
            sample_format
        );

        let (sender, receiver) = crossbeam_channel::bounded::<Vec<i16>>(CHUNK_QUEUE_DEPTH);
        let err_fn = |err: cpal::StreamError| log::error!("An error occurred on the audio stream: {}", err);

        let stream = match sample_format {
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    // First channel only; a full queue drops the chunk.
                    let chunk = data.iter().step_by(channels).copied().collect();
                    let _ = sender.try_send(chunk);
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let chunk = data
                        .iter()
                        .step_by(channels)
                        .map(|&sample| (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    let _ = sender.try_send(chunk);
                },
                err_fn,
                None,
            )?,
            other => {
                return Err(CaptureError::UnsupportedFormat(format!("{:?}", other)));
            }
        };

        stream.play()?;
        self.stream = Some(stream);

        Ok(CpalReader {
            receiver,
            pending: Vec::new(),
            pending_pos: 0,
            timeout: config.hop_duration(),
        })
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Error pausing audio stream: {}", e);
            }
            drop(stream);
            log::info!("Audio input released");
        }
    }
}

/// Capture-thread side of a [`CpalInput`].
pub struct CpalReader {
    receiver: Receiver<Vec<i16>>,
    pending: Vec<i16>,
    pending_pos: usize,
    timeout: Duration,
}

impl HopReader for CpalReader {
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, CaptureError> {
        let mut written = 0;
        while written < buf.len() {
            if self.pending_pos >= self.pending.len() {
                // Block for the first chunk only; return what we have after that.
                let next = if written == 0 {
                    match self.receiver.recv_timeout(self.timeout) {
                        Ok(chunk) => chunk,
                        Err(RecvTimeoutError::Timeout) => return Ok(0),
                        Err(RecvTimeoutError::Disconnected) => return Err(CaptureError::Disconnected),
                    }
                } else {
                    match self.receiver.try_recv() {
                        Ok(chunk) => chunk,
                        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                    }
                };
                self.pending = next;
                self.pending_pos = 0;
                continue;
            }

            let count = (buf.len() - written).min(self.pending.len() - self.pending_pos);
            buf[written..written + count]
                .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + count]);
            written += count;
            self.pending_pos += count;
        }
        Ok(written)
    }
}

/// Finds the best supported input configuration for the target sample rate.
///
/// Only ranges that contain `target_rate` and deliver `i16` or `f32`
/// samples qualify. Among those, mono beats multi-channel and `i16` beats
/// `f32`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .filter(|c| matches!(c.sample_format(), cpal::SampleFormat::I16 | cpal::SampleFormat::F32))
        .min_by_key(|c| (c.channels() != 1, c.sample_format() != cpal::SampleFormat::I16))
}

/// Replays an in-memory recording as if it were a device.
///
/// Every `open` restarts from the first sample. When paced, reads sleep for
/// the duration of the audio they return, like a live device would.
#[derive(Debug, Clone)]
pub struct ReplayInput {
    samples: Arc<[i16]>,
    paced: bool,
    open: bool,
    opens: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl ReplayInput {
    pub fn new(samples: impl Into<Arc<[i16]>>) -> Self {
        Self {
            samples: samples.into(),
            paced: false,
            open: false,
            opens: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Deliver samples no faster than real time.
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// How many times the input has been opened.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// How many times an open input has been released.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl AudioInput for ReplayInput {
    type Reader = ReplayReader;

    fn open(&mut self, config: &PipelineConfig) -> Result<ReplayReader, CaptureError> {
        config.validate()?;
        self.release();
        self.open = true;
        self.opens.fetch_add(1, Ordering::SeqCst);
        log::debug!("Replaying {} samples", self.samples.len());
        Ok(ReplayReader {
            samples: Arc::clone(&self.samples),
            position: 0,
            sample_rate: config.sample_rate,
            paced: self.paced,
        })
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Capture-thread side of a [`ReplayInput`].
#[derive(Debug)]
pub struct ReplayReader {
    samples: Arc<[i16]>,
    position: usize,
    sample_rate: u32,
    paced: bool,
}

impl HopReader for ReplayReader {
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, CaptureError> {
        let remaining = &self.samples[self.position..];
        let count = buf.len().min(remaining.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.position += count;
        if self.paced && count > 0 {
            thread::sleep(Duration::from_secs_f64(count as f64 / self.sample_rate as f64));
        }
        Ok(count)
    }
}
