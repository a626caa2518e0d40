use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{decode_file, AnalysisWindow, DecodedBuffer};
use crate::error::{Error, Result};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one loaded track. Every `open` hands out a fresh id, so two
/// loads of the same file are still different tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(u64);

impl TrackId {
    pub fn next() -> Self {
        Self(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct LoadedTrack {
    id: TrackId,
    buffer: Arc<DecodedBuffer>,
    playhead: usize,
}

/// Owns the audio-side state the analysis reads from: the loaded track, the
/// looping playhead and the rolling analysis window.
pub struct AudioSession {
    track: Option<LoadedTrack>,
    sample_rate: u32,
    window: AnalysisWindow,
    // Fractional frames carried between `advance` calls.
    frame_remainder: f64,
}

impl AudioSession {
    /// A session with nothing loaded, fed through `push_samples`.
    pub fn live(sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }

        Ok(Self {
            track: None,
            sample_rate,
            window: AnalysisWindow::new(),
            frame_remainder: 0.0,
        })
    }

    /// Decodes `path` and makes it the current track.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let buffer = decode_file(&path)?;
        let session = Self::from_buffer(buffer)?;
        info!("Opened {:?} as track {}", path.as_ref(), session.track_id().map_or(0, |t| t.raw()));
        Ok(session)
    }

    pub fn from_buffer(buffer: DecodedBuffer) -> Result<Self> {
        let mut session = Self::live(buffer.sample_rate)?;
        session.load(buffer)?;
        Ok(session)
    }

    /// Replaces the current track, resetting the playhead and the window.
    pub fn load(&mut self, buffer: DecodedBuffer) -> Result<TrackId> {
        if buffer.sample_rate == 0 {
            return Err(Error::InvalidSampleRate(buffer.sample_rate));
        }

        let id = TrackId::next();
        info!(
            "Loaded track {} ({:.2}s at {} Hz)",
            id.raw(),
            buffer.duration().as_secs_f32(),
            buffer.sample_rate
        );

        self.sample_rate = buffer.sample_rate;
        self.window.clear();
        self.frame_remainder = 0.0;
        self.track = Some(LoadedTrack {
            id,
            buffer: Arc::new(buffer),
            playhead: 0,
        });

        Ok(id)
    }

    /// Drops the current track; the window falls back to silence.
    pub fn close(&mut self) {
        if let Some(track) = self.track.take() {
            info!("Closed track {}", track.id.raw());
        }
        self.window.clear();
        self.frame_remainder = 0.0;
    }

    /// Moves the playhead forward by `elapsed`, looping at the end of the
    /// track, and pushes the covered samples into the analysis window.
    pub fn advance(&mut self, elapsed: Duration) {
        let Some(track) = self.track.as_mut() else {
            return;
        };
        if track.buffer.is_empty() {
            return;
        }

        let exact = elapsed.as_secs_f64() * self.sample_rate as f64 + self.frame_remainder;
        let mut remaining = exact.floor() as usize;
        self.frame_remainder = exact - exact.floor();

        let len = track.buffer.len();
        // Anything older than one window would be evicted anyway.
        if remaining > len + super::FFT_SIZE {
            let skip = remaining - super::FFT_SIZE;
            track.playhead = (track.playhead + skip) % len;
            remaining = super::FFT_SIZE;
        }

        while remaining > 0 {
            let take = remaining.min(len - track.playhead);
            let end = track.playhead + take;
            self.window.push(&track.buffer.samples[track.playhead..end]);
            track.playhead = end % len;
            remaining -= take;
        }
    }

    /// Feeds externally captured mono samples into the window.
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.window.push(samples);
    }

    pub fn window(&self) -> &AnalysisWindow {
        &self.window
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn track_id(&self) -> Option<TrackId> {
        self.track.as_ref().map(|t| t.id)
    }

    pub fn buffer(&self) -> Option<&Arc<DecodedBuffer>> {
        self.track.as_ref().map(|t| &t.buffer)
    }

    pub fn playhead(&self) -> Option<usize> {
        self.track.as_ref().map(|t| t.playhead)
    }

    pub fn is_open(&self) -> bool {
        self.track.is_some()
    }
}
