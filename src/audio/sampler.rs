use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::Arc;

use super::{AnalysisWindow, FFT_SIZE, FREQUENCY_BIN_COUNT};
use crate::config::AnalyserConfig;

/// Reads byte snapshots out of an [`AnalysisWindow`], the way a browser
/// analyser node does.
///
/// The frequency view runs a Blackman-windowed FFT over the whole window,
/// smooths magnitudes across calls and maps decibels onto `0..=255`. The time
/// view encodes each sample as `128 * (1 + x)`, so byte 128 is silence.
///
/// Reads never block: with no new audio the snapshots describe whatever the
/// window held last.
pub struct SpectrumSampler {
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    samples: Vec<f32>,
    config: AnalyserConfig,
}

impl SpectrumSampler {
    pub fn new(config: AnalyserConfig) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        Self {
            fft,
            window: Self::blackman_window(FFT_SIZE),
            smoothed: vec![0.0; FREQUENCY_BIN_COUNT],
            buffer: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            samples: vec![0.0; FFT_SIZE],
            config,
        }
    }

    fn blackman_window(size: usize) -> Vec<f32> {
        let alpha = 0.16;
        let a0 = 0.5 * (1.0 - alpha);
        let a1 = 0.5;
        let a2 = 0.5 * alpha;

        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
                a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
            })
            .collect()
    }

    /// Smoothed magnitude spectrum as bytes, one per bin (`FFT_SIZE / 2`).
    pub fn frequency_snapshot(&mut self, window: &AnalysisWindow) -> Vec<u8> {
        window.copy_into(&mut self.samples);

        for ((slot, &sample), &w) in self
            .buffer
            .iter_mut()
            .zip(self.samples.iter())
            .zip(self.window.iter())
        {
            *slot = Complex::new(sample * w, 0.0);
        }

        self.fft.process(&mut self.buffer);

        let tau = self.config.smoothing_time_constant.clamp(0.0, 1.0);
        let min_db = self.config.min_decibels;
        let range = self.config.max_decibels - min_db;
        let scale = if range > 0.0 { 255.0 / range } else { 0.0 };

        self.buffer[..FREQUENCY_BIN_COUNT]
            .iter()
            .zip(self.smoothed.iter_mut())
            .map(|(bin, smoothed)| {
                let magnitude = bin.norm() / FFT_SIZE as f32;
                let next = tau * *smoothed + (1.0 - tau) * magnitude;
                *smoothed = if next.is_finite() { next } else { 0.0 };

                let db = 20.0 * smoothed.log10();
                ((db - min_db) * scale).floor().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Raw waveform as bytes centered on 128 (`FFT_SIZE` values).
    pub fn time_snapshot(&self, window: &AnalysisWindow) -> Vec<u8> {
        window
            .iter()
            .map(|&x| (128.0 * (1.0 + x)).floor().clamp(0.0, 255.0) as u8)
            .collect()
    }

    /// Forgets the smoothing history, e.g. when a new track starts.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}

impl Default for SpectrumSampler {
    fn default() -> Self {
        Self::new(AnalyserConfig::default())
    }
}
