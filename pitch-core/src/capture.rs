//! # Capture Loop Module
//!
//! Owns the real-time capture thread of one session.
//!
//! ## Architecture
//! - **Owner thread**: holds the device handle, starts and stops sessions
//! - **Capture thread**: reads hops, runs the [`FramePipeline`], sends events
//! - **Communication**: a crossbeam channel of [`PipelineEvent`]s out, a
//!   [`CancelToken`] and an atomic volume threshold in
//!
//! All pipeline state lives on the capture thread. Cancellation is checked
//! once per read, so `stop` takes effect within about one hop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::PipelineEvent;
use crate::audio::{AudioInput, HopReader};
use crate::config::PipelineConfig;
use crate::error::{CaptureError, ConfigError};
use crate::pipeline::FramePipeline;

/// How long `stop` waits for the capture thread before detaching it.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause after a read that returned nothing, so a dry or failing input
/// does not spin the capture thread.
const IDLE_BACKOFF: Duration = Duration::from_millis(2);

/// Cooperative cancellation flag shared with the capture thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Capture thread management.
#[derive(Debug)]
struct Worker {
    cancel: CancelToken,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Drives a [`FramePipeline`] from an [`AudioInput`] on a dedicated thread.
///
/// `start` and `stop` are idempotent. Each session starts from a fresh
/// pipeline, so nothing carries over from a previous session.
pub struct CaptureLoop<I: AudioInput> {
    config: PipelineConfig,
    input: I,
    events: Sender<PipelineEvent>,
    volume_threshold: Arc<AtomicU32>,
    join_timeout: Duration,
    worker: Option<Worker>,
}

impl<I: AudioInput> CaptureLoop<I> {
    pub fn new(
        config: PipelineConfig,
        input: I,
        events: Sender<PipelineEvent>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let volume_threshold = Arc::new(AtomicU32::new(config.volume_threshold.to_bits()));
        Ok(Self {
            config,
            input,
            events,
            volume_threshold,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            worker: None,
        })
    }

    /// Overrides how long `stop` waits for the capture thread.
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    /// True while a capture thread is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    pub fn volume_threshold(&self) -> f32 {
        f32::from_bits(self.volume_threshold.load(Ordering::Relaxed))
    }

    /// Changes the silence gate, effective from the next hop.
    ///
    /// The threshold is an RMS level in `[0, 1]`; anything else is rejected
    /// and the current value is kept.
    pub fn set_volume_threshold(&self, threshold: f32) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::OutOfRange {
                field: "volume_threshold",
                expected: "in [0, 1]",
                value: threshold as f64,
            });
        }
        self.volume_threshold
            .store(threshold.to_bits(), Ordering::Relaxed);
        log::debug!("Volume threshold set to {}", threshold);
        Ok(())
    }

    /// Opens the input and starts a capture session.
    ///
    /// Does nothing if a session is already running. If the input cannot be
    /// opened, a single `Silence` event is sent, no thread is started and the
    /// error is returned; calling `start` again retries.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            if self.is_running() {
                log::debug!("Capture already running");
                return Ok(());
            }
            log::warn!("Capture thread exited on its own, cleaning up before restart");
            self.stop();
        }

        let mut pipeline = FramePipeline::new(&self.config)?;
        pipeline.set_volume_threshold(self.volume_threshold());

        let reader = match self.input.open(&self.config) {
            Ok(reader) => reader,
            Err(e) => {
                log::warn!("Failed to open audio input: {}", e);
                let _ = self.events.send(PipelineEvent::Silence { timestamp_ms: 0 });
                return Err(e);
            }
        };

        let cancel = CancelToken::new();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let session = Session {
            pipeline,
            cancel: cancel.clone(),
            volume_threshold: Arc::clone(&self.volume_threshold),
            events: self.events.clone(),
        };

        let spawned = thread::Builder::new()
            .name("pitch-capture".into())
            .spawn(move || {
                session.run(reader);
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker {
                    cancel,
                    done_rx,
                    handle,
                });
                log::info!("Capture started");
                Ok(())
            }
            Err(e) => {
                self.input.release();
                Err(CaptureError::WorkerSpawn(e))
            }
        }
    }

    /// Stops the session and releases the input.
    ///
    /// Waits at most the join timeout for the capture thread. A thread that
    /// has not exited by then is detached and the input is released anyway.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.cancel.cancel();
        match worker.done_rx.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    log::error!("Capture thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // The thread handle is dropped here; only the log records the leak.
                log::warn!(
                    "Capture thread did not stop within {:?}, detaching it",
                    self.join_timeout
                );
            }
        }

        self.input.release();
        log::info!("Capture stopped");
    }
}

impl<I: AudioInput> Drop for CaptureLoop<I> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the capture thread owns for one session.
struct Session {
    pipeline: FramePipeline,
    cancel: CancelToken,
    volume_threshold: Arc<AtomicU32>,
    events: Sender<PipelineEvent>,
}

impl Session {
    fn run<R: HopReader>(mut self, mut reader: R) {
        log::info!("Capture thread running");
        let mut hop = vec![0i16; self.pipeline.config().hop_size];
        let mut filled = 0;
        let mut failing = false;

        while !self.cancel.is_cancelled() {
            let read = match reader.read(&mut hop[filled..]) {
                Ok(read) => {
                    if failing && read > 0 {
                        log::info!("Audio input recovered");
                        failing = false;
                    }
                    read
                }
                Err(e) => {
                    if !failing {
                        log::warn!("Audio read failed, skipping hop: {}", e);
                        failing = true;
                    }
                    filled = 0;
                    0
                }
            };

            if read == 0 {
                thread::sleep(IDLE_BACKOFF);
                continue;
            }

            filled += read;
            if filled < hop.len() {
                continue;
            }
            filled = 0;

            let threshold = f32::from_bits(self.volume_threshold.load(Ordering::Relaxed));
            if threshold != self.pipeline.volume_threshold() {
                self.pipeline.set_volume_threshold(threshold);
            }

            let events = &self.events;
            self.pipeline.process_hop(&hop, |event| {
                // A dropped receiver only means nobody is listening.
                let _ = events.send(event);
            });
        }

        log::info!(
            "Capture thread exiting after {} hops",
            self.pipeline.hops_processed()
        );
    }
}
