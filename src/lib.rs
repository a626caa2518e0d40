//! Audio feature extraction for music visuals.
//!
//! Once per display frame a [`FramePipeline`] reads the rolling analysis
//! window of an [`AudioSession`] and produces a loudness value, a pitch
//! estimate and a smoothed color. Tempo is analyzed once per track in the
//! background and cached.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sonichue::{AudioSession, FramePipeline, PeakIntervalAnalyzer, PipelineConfig, TempoEstimator};
//!
//! # async fn run() -> sonichue::Result<()> {
//! let config = PipelineConfig::default();
//! let analyzer = Arc::new(PeakIntervalAnalyzer::new(config.tempo.clone()));
//! let mut pipeline = FramePipeline::new(&config, TempoEstimator::with_current_runtime(analyzer)?);
//!
//! let mut session = AudioSession::open("track.mp3")?;
//! loop {
//!     session.advance(Duration::from_millis(16));
//!     let frame = pipeline.tick(&session)?;
//!     println!("{:.1} {:?} {:?}", frame.loudness, frame.pitch, frame.color);
//! }
//! # }
//! ```

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;

pub use analysis::{
    estimate_loudness, Color, ColorMapper, PeakIntervalAnalyzer, PitchEstimator, TempoAnalyzer,
    TempoEstimator, TempoState,
};
pub use audio::{AudioSession, DecodedBuffer, LiveCapture, SpectrumSampler, TrackId};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::{FrameFeatures, FramePipeline};
