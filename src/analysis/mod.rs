pub mod beat;
pub mod color;
pub mod loudness;
pub mod pitch;
pub mod tempo;

pub use beat::PeakIntervalAnalyzer;
pub use color::{Color, ColorMapper};
pub use loudness::estimate_loudness;
pub use pitch::PitchEstimator;
pub use tempo::{TempoAnalyzer, TempoEstimator, TempoState};
