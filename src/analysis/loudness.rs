use crate::audio::FREQUENCY_BIN_COUNT;
use crate::error::{check_snapshot_len, Result};

/// Loudness proxy: the flat mean of every frequency bin byte.
///
/// No band weighting is applied; low and high bins count the same.
pub fn estimate_loudness(frequency_snapshot: &[u8]) -> Result<f32> {
    check_snapshot_len(frequency_snapshot, FREQUENCY_BIN_COUNT)?;

    let total: u32 = frequency_snapshot.iter().map(|&b| b as u32).sum();
    Ok(total as f32 / frequency_snapshot.len() as f32)
}
