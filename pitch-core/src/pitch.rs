//! # Pitch Estimation Module
//!
//! Single-frame fundamental frequency estimation with the YIN algorithm,
//! tuned for the singing voice.
//!
//! ## Features
//! - Difference function and cumulative mean normalized difference (CMNDF)
//! - Absolute threshold search with a global-minimum fallback
//! - Parabolic interpolation for sub-sample lag accuracy
//! - Reusable scratch buffer: no allocation per call
//! - Flat or silent windows resolve to "no pitch", never to NaN

use crate::config::{ABORT_CLARITY_COMPLEMENT, PipelineConfig};

/// Relative slack on `[min_freq, max_freq]`. Interpolation can land a
/// tone sitting exactly on a bound slightly outside it.
const RANGE_TOLERANCE: f32 = 0.005;

/// Outcome of analysing one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimationResult {
    /// Detected fundamental in Hz, `None` when the frame carries no usable pitch.
    pub pitch_hz: Option<f32>,
    /// CMNDF value at the chosen lag, in `[0, 1]`. Lower is cleaner.
    pub clarity_complement: f32,
    /// RMS level of the analysed window.
    pub rms: f32,
}

impl EstimationResult {
    fn unvoiced(clarity_complement: f64, rms: f32) -> Self {
        Self {
            pitch_hz: None,
            clarity_complement: clarity_complement.clamp(0.0, 1.0) as f32,
            rms,
        }
    }

    /// `1 - clarity_complement`.
    pub fn confidence(&self) -> f32 {
        1.0 - self.clarity_complement
    }
}

/// YIN pitch estimator bound to one window length and frequency range.
#[derive(Debug, Clone)]
pub struct YinEstimator {
    sample_rate: f32,
    min_freq: f32,
    max_freq: f32,
    threshold: f64,
    min_lag: usize,
    max_lag: usize,
    /// Holds d(τ), then the CMNDF in place, for τ in `0..=max_lag`.
    scratch: Vec<f64>,
}

impl YinEstimator {
    pub fn new(config: &PipelineConfig) -> Self {
        let (min_lag, max_lag) = config.lag_bounds();
        Self {
            sample_rate: config.sample_rate as f32,
            min_freq: config.min_freq,
            max_freq: config.max_freq,
            threshold: config.yin_threshold,
            min_lag,
            max_lag,
            scratch: vec![0.0; max_lag + 1],
        }
    }

    /// Inclusive lag search range in samples.
    pub fn lag_bounds(&self) -> (usize, usize) {
        (self.min_lag, self.max_lag)
    }

    /// Estimates the pitch of `window`.
    ///
    /// `precomputed_rms` skips the level computation when the caller already
    /// has it for the same window.
    pub fn estimate(&mut self, window: &[f32], precomputed_rms: Option<f32>) -> EstimationResult {
        let rms = precomputed_rms.unwrap_or_else(|| rms(window));
        if !rms.is_finite() || rms <= 0.0 {
            return EstimationResult::unvoiced(1.0, rms.max(0.0));
        }

        let integration = window.len() / 2;
        let max_lag = self.max_lag.min(integration.saturating_sub(1));
        let min_lag = self.min_lag;
        if min_lag >= max_lag {
            return EstimationResult::unvoiced(1.0, rms);
        }

        // --- Difference function d(τ) over a fixed integration window ---
        let cmndf = &mut self.scratch[..=max_lag];
        cmndf[0] = 0.0;
        for tau in 1..=max_lag {
            let mut diff = 0.0f64;
            for (&a, &b) in window[..integration].iter().zip(&window[tau..tau + integration]) {
                let delta = (a - b) as f64;
                diff += delta * delta;
            }
            cmndf[tau] = diff;
        }

        // --- Cumulative mean normalized difference ---
        cmndf[0] = 1.0;
        let mut running_sum = 0.0f64;
        for (tau, value) in cmndf.iter_mut().enumerate().skip(1) {
            running_sum += *value;
            *value = if running_sum > 0.0 {
                *value * tau as f64 / running_sum
            } else {
                1.0
            };
        }

        // --- Absolute threshold: first dip, followed down to its local minimum ---
        let mut chosen = None;
        for tau in min_lag..=max_lag {
            if cmndf[tau] < self.threshold {
                let mut best = tau;
                while best < max_lag && cmndf[best + 1] < cmndf[best] {
                    best += 1;
                }
                chosen = Some(best);
                break;
            }
        }

        // --- Fallback: global minimum, unless even that is too noisy ---
        let tau = match chosen {
            Some(tau) => tau,
            None => {
                let mut best = min_lag;
                for tau in min_lag + 1..=max_lag {
                    if cmndf[tau] < cmndf[best] {
                        best = tau;
                    }
                }
                if !(cmndf[best] <= ABORT_CLARITY_COMPLEMENT) {
                    return EstimationResult::unvoiced(cmndf[best], rms);
                }
                best
            }
        };

        // --- Parabolic interpolation around the chosen lag ---
        let mut refined = tau as f64;
        if tau < max_lag {
            let y1 = cmndf[tau - 1];
            let y2 = cmndf[tau];
            let y3 = cmndf[tau + 1];
            let curvature = y1 - 2.0 * y2 + y3;
            if curvature.abs() > 1e-12 {
                let shift = (y1 - y3) / (2.0 * curvature);
                if shift.is_finite() && shift.abs() <= 1.0 {
                    refined += shift;
                }
            }
        }

        let clarity_complement = cmndf[tau];
        let frequency = (self.sample_rate as f64 / refined) as f32;
        let lowest = self.min_freq * (1.0 - RANGE_TOLERANCE);
        let highest = self.max_freq * (1.0 + RANGE_TOLERANCE);
        if !frequency.is_finite() || frequency < lowest || frequency > highest {
            return EstimationResult::unvoiced(clarity_complement, rms);
        }
        let frequency = frequency.clamp(self.min_freq, self.max_freq);

        log::trace!(
            "YIN lag {:.2} -> {:.2} Hz (cmndf {:.3}, rms {:.4})",
            refined,
            frequency,
            clarity_complement,
            rms
        );

        EstimationResult {
            pitch_hz: Some(frequency),
            clarity_complement: clarity_complement.clamp(0.0, 1.0) as f32,
            rms,
        }
    }
}

/// Root-mean-square level of a buffer.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    let energy: f64 = signal.iter().map(|&s| s as f64 * s as f64).sum();
    (energy / signal.len() as f64).sqrt() as f32
}
