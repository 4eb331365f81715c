//! Sliding analysis window over the most recent input samples.

/// Scale factor from 16-bit fixed point to `[-1, 1)`.
const I16_SCALE: f32 = 1.0 / 32768.0;

/// Fixed-length buffer of normalized samples.
///
/// New hops are appended at the end after shifting the existing contents
/// left by the hop length, so the window always holds the latest
/// `len()` samples in chronological order. The length never changes.
#[derive(Debug, Clone)]
pub struct SignalWindow {
    samples: Vec<f32>,
}

impl SignalWindow {
    /// Creates a window of `len` zeroed samples.
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    /// Shifts the window left by `hop.len()` and appends the hop,
    /// normalized from 16-bit PCM.
    ///
    /// A hop longer than the window keeps only its trailing samples.
    pub fn push_pcm(&mut self, hop: &[i16]) {
        let len = self.samples.len();
        let hop = &hop[hop.len().saturating_sub(len)..];
        let keep = len - hop.len();
        self.samples.copy_within(hop.len().., 0);
        for (dst, &src) in self.samples[keep..].iter_mut().zip(hop) {
            *dst = src as f32 * I16_SCALE;
        }
    }

    /// Root-mean-square level over the whole window.
    pub fn rms(&self) -> f32 {
        crate::pitch::rms(&self.samples)
    }

    /// Zeroes every sample.
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }
}
