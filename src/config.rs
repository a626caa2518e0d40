use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunable parameters for the whole feature pipeline.
///
/// Every value defaults to the constant the visuals were designed around, so
/// `PipelineConfig::default()` reproduces the stock behavior. A JSON file with
/// any subset of the fields can override them:
///
/// ```json
/// { "color": { "blend": 0.2 }, "tempo": { "fallback_bpm": 90.0 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub analyser: AnalyserConfig,
    pub pitch: PitchConfig,
    pub color: ColorParams,
    pub tempo: TempoConfig,
}

/// Spectral analyser settings (the window size itself is fixed at 2048).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    /// Weight of the previous spectrum in the exponential smoothing (0.0-1.0)
    pub smoothing_time_constant: f32,
    /// Magnitude in dB mapped to byte 0
    pub min_decibels: f32,
    /// Magnitude in dB mapped to byte 255
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            smoothing_time_constant: 0.3,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    /// Shortest lag searched, in samples (upper frequency limit)
    pub min_lag: usize,
    /// Longest lag searched, in samples (lower frequency limit)
    pub max_lag: usize,
    /// Normalized correlation a lag must exceed to count as a period
    pub clarity_threshold: f32,
    /// RMS below which the window is treated as silence
    pub min_rms: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            min_lag: 8,
            max_lag: 1000,
            clarity_threshold: 0.9,
            min_rms: 0.01,
        }
    }
}

/// Constants of the pitch-to-color mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorParams {
    /// Interpolation weight toward the pitch-derived color
    pub blend: f32,
    pub brightness: f32,
    pub lightness: f32,
    /// Added to the red channel after blending
    pub red_nudge: f32,
    /// Subtracted from the blue channel after blending
    pub blue_nudge: f32,
    /// Exclusive lower bound on per-channel change
    pub gate_lo: f32,
    /// Exclusive upper bound on per-channel change
    pub gate_hi: f32,
}

impl Default for ColorParams {
    fn default() -> Self {
        Self {
            blend: 0.1,
            brightness: 0.6,
            lightness: 0.4,
            red_nudge: 0.1,
            blue_nudge: 0.01,
            gate_lo: 0.0,
            gate_hi: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Reported while no tempo has been resolved for the current track
    pub fallback_bpm: f32,
    /// Low-pass cutoff applied before peak picking
    pub cutoff_hz: f32,
    /// Peak count the threshold search aims for
    pub min_peaks: usize,
    /// Slowest tempo before folding (candidates are folded into [min, 2*min))
    pub min_bpm: f32,
    /// Width of a tempo histogram group
    pub group_tolerance_bpm: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            fallback_bpm: 60.0,
            cutoff_hz: 150.0,
            min_peaks: 30,
            min_bpm: 90.0,
            group_tolerance_bpm: 0.5,
        }
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
