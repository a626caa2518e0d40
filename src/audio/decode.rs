use log::info;
use rodio::{Decoder, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::DecodedBuffer;
use crate::error::{Error, Result};

/// Decodes an audio file (WAV, MP3, FLAC, OGG, M4A) into a mono buffer.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<DecodedBuffer> {
    let file = BufReader::new(File::open(&path)?);
    let source = Decoder::new(file).map_err(|e| Error::Decode(e.to_string()))?;

    let sample_rate = source.sample_rate();
    let channels = source.channels() as usize;
    if sample_rate == 0 {
        return Err(Error::InvalidSampleRate(sample_rate));
    }

    let interleaved: Vec<f32> = source.convert_samples::<f32>().collect();
    let samples = mix_to_mono(&interleaved, channels);

    info!(
        "Decoded {:?}: {} Hz, {} channel(s), {} samples",
        path.as_ref(),
        sample_rate,
        channels,
        samples.len()
    );

    Ok(DecodedBuffer::new(samples, sample_rate))
}

/// Averages interleaved frames down to one channel. A trailing partial frame
/// is dropped.
pub fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
