use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

use super::tempo::TempoAnalyzer;
use crate::audio::DecodedBuffer;
use crate::config::TempoConfig;
use crate::error::{Error, Result};

/// Neighbouring peaks each peak is paired with when measuring intervals.
const NEIGHBOURS: usize = 10;

const START_THRESHOLD: f32 = 0.95;
const LOWEST_THRESHOLD: f32 = 0.3;
const THRESHOLD_STEP: f32 = 0.05;

/// Whole-track tempo detection from the spacing of low-frequency peaks.
///
/// The track is low-passed so kicks and bass dominate, then a threshold is
/// lowered until enough peaks stand out. Intervals between each peak and its
/// next few neighbours vote for a tempo (folded into one octave), and the
/// mean of the most popular group wins.
pub struct PeakIntervalAnalyzer {
    config: TempoConfig,
}

impl PeakIntervalAnalyzer {
    pub fn new(config: TempoConfig) -> Self {
        Self { config }
    }

    /// Synchronous analysis; the async trait impl runs this on the blocking
    /// pool.
    pub fn detect(&self, buffer: &DecodedBuffer) -> Result<f32> {
        if buffer.sample_rate == 0 {
            return Err(Error::InvalidSampleRate(buffer.sample_rate));
        }
        let sample_rate = buffer.sample_rate as f32;

        let mut filtered = buffer.samples.clone();
        LowPass::new(sample_rate, self.config.cutoff_hz).process(&mut filtered);

        let peak = filtered.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
        if peak <= f32::EPSILON {
            return Err(Error::TempoAnalysis("track is silent".to_string()));
        }
        filtered.iter_mut().for_each(|x| *x /= peak);

        let peaks = self.find_peaks(&filtered, buffer.sample_rate);
        debug!("Tempo analysis found {} peaks", peaks.len());
        if peaks.len() < 2 {
            return Err(Error::TempoAnalysis(format!(
                "only {} peak(s) found",
                peaks.len()
            )));
        }

        let candidates = self.tempo_candidates(&peaks, sample_rate);
        self.most_common_tempo(&candidates)
            .ok_or_else(|| Error::TempoAnalysis("no tempo candidates".to_string()))
    }

    /// Lowers the threshold until `min_peaks` peaks are found (or the lowest
    /// threshold is reached). After a peak, the next quarter second is skipped.
    fn find_peaks(&self, data: &[f32], sample_rate: u32) -> Vec<usize> {
        let skip = (sample_rate / 4).max(1) as usize;
        let steps = ((START_THRESHOLD - LOWEST_THRESHOLD) / THRESHOLD_STEP).round() as usize;

        let mut peaks = Vec::new();
        for step in 0..=steps {
            let threshold = START_THRESHOLD - step as f32 * THRESHOLD_STEP;
            peaks = Self::peaks_above(data, threshold, skip);
            if peaks.len() >= self.config.min_peaks {
                break;
            }
        }
        peaks
    }

    fn peaks_above(data: &[f32], threshold: f32, skip: usize) -> Vec<usize> {
        let mut peaks = Vec::new();
        let mut i = 0;
        while i < data.len() {
            if data[i] > threshold {
                peaks.push(i);
                i += skip;
            } else {
                i += 1;
            }
        }
        peaks
    }

    fn tempo_candidates(&self, peaks: &[usize], sample_rate: f32) -> Vec<f32> {
        let mut candidates = Vec::new();
        for (i, &peak) in peaks.iter().enumerate() {
            for &next in peaks.iter().skip(i + 1).take(NEIGHBOURS) {
                let seconds = (next - peak) as f32 / sample_rate;
                if let Some(bpm) = self.fold_tempo(60.0 / seconds) {
                    candidates.push(bpm);
                }
            }
        }
        candidates
    }

    /// Folds a tempo into `[min_bpm, 2 * min_bpm)` by octaves.
    fn fold_tempo(&self, mut bpm: f32) -> Option<f32> {
        let low = self.config.min_bpm;
        if !bpm.is_finite() || bpm <= 0.0 || low <= 0.0 {
            return None;
        }
        while bpm < low {
            bpm *= 2.0;
        }
        while bpm >= low * 2.0 {
            bpm /= 2.0;
        }
        Some(bpm)
    }

    fn most_common_tempo(&self, candidates: &[f32]) -> Option<f32> {
        // (first member, sum, count)
        let mut groups: Vec<(f32, f32, usize)> = Vec::new();

        for &bpm in candidates {
            match groups
                .iter_mut()
                .find(|(anchor, _, _)| (anchor - bpm).abs() <= self.config.group_tolerance_bpm)
            {
                Some(group) => {
                    group.1 += bpm;
                    group.2 += 1;
                }
                None => groups.push((bpm, bpm, 1)),
            }
        }

        groups
            .iter()
            .max_by_key(|(_, _, count)| *count)
            .map(|(_, sum, count)| sum / *count as f32)
    }
}

impl Default for PeakIntervalAnalyzer {
    fn default() -> Self {
        Self::new(TempoConfig::default())
    }
}

#[async_trait]
impl TempoAnalyzer for PeakIntervalAnalyzer {
    async fn analyze(&self, buffer: Arc<DecodedBuffer>) -> Result<f32> {
        let analyzer = PeakIntervalAnalyzer::new(self.config.clone());
        tokio::task::spawn_blocking(move || analyzer.detect(&buffer))
            .await
            .map_err(|e| Error::TempoAnalysis(format!("analysis task failed: {}", e)))?
    }

    fn analyzer_type(&self) -> &'static str {
        "peak-interval"
    }
}

/// Second-order low-pass (RBJ cookbook, Q = 1/sqrt(2)).
struct LowPass {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl LowPass {
    fn new(sample_rate: f32, cutoff_hz: f32) -> Self {
        let cutoff = cutoff_hz.clamp(1.0, sample_rate * 0.45);
        let omega = 2.0 * std::f32::consts::PI * cutoff / sample_rate;
        let alpha = omega.sin() / (2.0 * std::f32::consts::FRAC_1_SQRT_2);
        let cos = omega.cos();
        let a0 = 1.0 + alpha;

        Self {
            b0: (1.0 - cos) / 2.0 / a0,
            b1: (1.0 - cos) / a0,
            b2: (1.0 - cos) / 2.0 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn process(&self, data: &mut [f32]) {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
        for sample in data.iter_mut() {
            let x0 = *sample;
            let y0 = self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
            *sample = y0;
        }
    }
}
