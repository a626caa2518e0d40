//! Error type shared by the audio session and the analysis components.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A snapshot did not have the fixed length the analysis window dictates.
    #[error("snapshot has {actual} bytes, expected {expected}")]
    SnapshotSize { expected: usize, actual: usize },

    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("tempo analysis failed: {0}")]
    TempoAnalysis(String),

    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("audio device: {0}")]
    Device(String),

    #[error("no tokio runtime available to schedule tempo analysis")]
    NoRuntime,

    #[error("config: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn check_snapshot_len(snapshot: &[u8], expected: usize) -> Result<()> {
    if snapshot.len() != expected {
        return Err(Error::SnapshotSize {
            expected,
            actual: snapshot.len(),
        });
    }
    Ok(())
}
