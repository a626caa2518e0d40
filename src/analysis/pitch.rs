//! Fundamental frequency estimation over a time-domain byte snapshot.
//!
//! The first half of the snapshot is correlated against lagged copies of
//! itself. The search skips the zero-lag lobe (every lag from 1 up to where
//! the correlation first turns negative), takes the first lag at or above
//! `min_lag` whose normalized correlation clears the clarity threshold, climbs
//! to the local maximum and refines it with parabolic interpolation. The period found that way is
//! converted with `sample_rate / period`.
//!
//! Detectable range with the default lags (8..=1000) at 44.1 kHz is roughly
//! 44 Hz to 5.5 kHz.

use crate::audio::FFT_SIZE;
use crate::config::PitchConfig;
use crate::error::{check_snapshot_len, Error, Result};

/// Length of the reference segment that lagged copies are compared against.
const CORRELATION_WINDOW: usize = FFT_SIZE / 2;

pub struct PitchEstimator {
    config: PitchConfig,

    // Pre-allocated working buffers
    samples: Vec<f32>,
    energy: Vec<f64>,
    correlation: Vec<f32>,
}

impl PitchEstimator {
    pub fn new(config: PitchConfig) -> Self {
        Self {
            config,
            samples: vec![0.0; FFT_SIZE],
            energy: vec![0.0; FFT_SIZE + 1],
            correlation: vec![0.0; FFT_SIZE - CORRELATION_WINDOW + 1],
        }
    }

    /// Estimates the fundamental in Hz, or `None` when the snapshot is
    /// silent or has no clear periodicity.
    ///
    /// # Errors
    /// A snapshot that is not `FFT_SIZE` bytes long or a zero sample rate.
    pub fn estimate(&mut self, time_snapshot: &[u8], sample_rate: u32) -> Result<Option<f32>> {
        check_snapshot_len(time_snapshot, FFT_SIZE)?;
        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }

        for (dst, &byte) in self.samples.iter_mut().zip(time_snapshot) {
            *dst = (byte as f32 - 128.0) / 128.0;
        }

        // Running sum of squares: energy of any segment in O(1).
        for (i, &x) in self.samples.iter().enumerate() {
            self.energy[i + 1] = self.energy[i] + (x as f64) * (x as f64);
        }

        let reference_energy = self.segment_energy(0);
        let rms = (reference_energy / CORRELATION_WINDOW as f64).sqrt() as f32;
        if rms < self.config.min_rms {
            return Ok(None);
        }

        let min_lag = self.config.min_lag.max(1);
        let max_lag = self.config.max_lag.min(FFT_SIZE - CORRELATION_WINDOW - 1);
        if min_lag >= max_lag {
            return Ok(None);
        }

        // The zero-lag lobe is tracked from lag 1, below `min_lag`, so
        // short periods are not mistaken for lobe.
        self.correlation[0] = 1.0;
        for lag in 1..=(max_lag + 1) {
            let r = self.normalized_correlation(lag, reference_energy);
            self.correlation[lag] = r;
        }

        let Some(period) = self.find_period(min_lag, max_lag) else {
            return Ok(None);
        };

        let refined = self.parabolic_interpolation(period);
        Ok(Some(sample_rate as f32 / refined))
    }

    fn segment_energy(&self, start: usize) -> f64 {
        self.energy[start + CORRELATION_WINDOW] - self.energy[start]
    }

    fn normalized_correlation(&self, lag: usize, reference_energy: f64) -> f32 {
        let dot: f64 = self.samples[..CORRELATION_WINDOW]
            .iter()
            .zip(&self.samples[lag..lag + CORRELATION_WINDOW])
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();

        let denom = (reference_energy * self.segment_energy(lag)).sqrt();
        if denom <= f64::EPSILON {
            0.0
        } else {
            (dot / denom) as f32
        }
    }

    fn find_period(&self, min_lag: usize, max_lag: usize) -> Option<usize> {
        let mut past_zero_lobe = false;
        let mut best: Option<usize> = None;

        for lag in 1..=max_lag {
            let r = self.correlation[lag];

            if !past_zero_lobe {
                past_zero_lobe = r < 0.0;
                continue;
            }
            if lag < min_lag {
                continue;
            }

            match best {
                None if r > self.config.clarity_threshold => best = Some(lag),
                None => {}
                Some(b) if r > self.correlation[b] => best = Some(lag),
                Some(_) => break,
            }
        }

        best
    }

    fn parabolic_interpolation(&self, period: usize) -> f32 {
        let a = self.correlation[period - 1];
        let b = self.correlation[period];
        let c = self.correlation[period + 1];

        let denom = a - 2.0 * b + c;
        if denom.abs() < 1e-9 {
            return period as f32;
        }

        let offset = 0.5 * (a - c) / denom;
        if offset.abs() < 1.0 {
            period as f32 + offset
        } else {
            period as f32
        }
    }
}

impl Default for PitchEstimator {
    fn default() -> Self {
        Self::new(PitchConfig::default())
    }
}
