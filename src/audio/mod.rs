pub mod capture;
pub mod decode;
pub mod sampler;
pub mod session;
pub mod window;

pub use capture::LiveCapture;
pub use decode::{decode_file, mix_to_mono};
pub use sampler::SpectrumSampler;
pub use session::{AudioSession, TrackId};
pub use window::AnalysisWindow;

use std::time::Duration;

/// Analysis window size in samples.
pub const FFT_SIZE: usize = 2048;

/// Number of frequency bins exposed by the analyser (half the window).
pub const FREQUENCY_BIN_COUNT: usize = FFT_SIZE / 2;

/// A fully decoded, mono-reduced track.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}
