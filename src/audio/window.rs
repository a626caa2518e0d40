use std::collections::VecDeque;

use super::FFT_SIZE;

/// Rolling window of the most recent mono samples.
///
/// The window always holds exactly `FFT_SIZE` samples; it starts out as
/// silence and every push evicts the oldest samples.
#[derive(Debug, Clone)]
pub struct AnalysisWindow {
    samples: VecDeque<f32>,
}

impl AnalysisWindow {
    pub fn new() -> Self {
        Self {
            samples: std::iter::repeat(0.0).take(FFT_SIZE).collect(),
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        // Only the tail of an oversized chunk can survive.
        let tail = &samples[samples.len().saturating_sub(FFT_SIZE)..];
        for &sample in tail {
            self.samples.pop_front();
            self.samples.push_back(sample);
        }
    }

    /// Copies the window, oldest sample first, into `out`.
    pub fn copy_into(&self, out: &mut [f32]) {
        debug_assert_eq!(out.len(), FFT_SIZE);
        for (dst, &src) in out.iter_mut().zip(self.samples.iter()) {
            *dst = src;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for AnalysisWindow {
    fn default() -> Self {
        Self::new()
    }
}
