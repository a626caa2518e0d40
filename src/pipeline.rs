use log::debug;
use serde::{Deserialize, Serialize};

use crate::analysis::{estimate_loudness, Color, ColorMapper, PitchEstimator, TempoEstimator};
use crate::audio::{AudioSession, SpectrumSampler, TrackId};
use crate::config::PipelineConfig;
use crate::error::Result;

/// Everything the display needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameFeatures {
    /// Mean frequency byte, 0.0-255.0
    pub loudness: f32,
    /// Fundamental in Hz, absent when unvoiced
    pub pitch: Option<f32>,
    pub color: Color,
    /// Resolved tempo, or the configured fallback while unknown
    pub tempo_bpm: f32,
    pub tempo_known: bool,
}

/// Per-frame driver: snapshots the session, estimates loudness and pitch,
/// advances the color and keeps the tempo request going for the current
/// track.
pub struct FramePipeline {
    sampler: SpectrumSampler,
    pitch: PitchEstimator,
    colors: ColorMapper,
    tempo: TempoEstimator,
    color: Color,
    fallback_bpm: f32,
    current_track: Option<TrackId>,
    frame_count: u64,
}

impl FramePipeline {
    pub fn new(config: &PipelineConfig, tempo: TempoEstimator) -> Self {
        Self {
            sampler: SpectrumSampler::new(config.analyser.clone()),
            pitch: PitchEstimator::new(config.pitch.clone()),
            colors: ColorMapper::new(config.color.clone()),
            tempo,
            color: Color::default(),
            fallback_bpm: config.tempo.fallback_bpm,
            current_track: None,
            frame_count: 0,
        }
    }

    /// Starts from `color` instead of black.
    pub fn with_initial_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn tick(&mut self, session: &AudioSession) -> Result<FrameFeatures> {
        self.follow_track(session.track_id());

        let frequency = self.sampler.frequency_snapshot(session.window());
        let time = self.sampler.time_snapshot(session.window());

        let loudness = estimate_loudness(&frequency)?;
        let pitch = self.pitch.estimate(&time, session.sample_rate())?;
        self.color = self.colors.next(&self.color, pitch);

        let tempo = match (session.track_id(), session.buffer()) {
            (Some(track), Some(buffer)) => self.tempo.request_tempo(track, buffer),
            _ => None,
        };

        self.frame_count += 1;
        if self.frame_count % 120 == 0 {
            debug!(
                "frame {}: loudness={:.1} pitch={:?} color=({:.3}, {:.3}, {:.3}) tempo={:?}",
                self.frame_count, loudness, pitch, self.color.r, self.color.g, self.color.b, tempo
            );
        }

        Ok(FrameFeatures {
            loudness,
            pitch,
            color: self.color,
            tempo_bpm: tempo.unwrap_or(self.fallback_bpm),
            tempo_known: tempo.is_some(),
        })
    }

    fn follow_track(&mut self, track: Option<TrackId>) {
        if track == self.current_track {
            return;
        }
        debug!("Track changed: {:?} -> {:?}", self.current_track, track);
        self.current_track = track;
        self.sampler.reset();
        self.tempo.invalidate();
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn tempo(&self) -> &TempoEstimator {
        &self.tempo
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{PeakIntervalAnalyzer, TempoState};
    use crate::audio::DecodedBuffer;
    use approx::assert_relative_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn sine(freq: f32, seconds: f32, sample_rate: u32) -> DecodedBuffer {
        let n = (seconds * sample_rate as f32) as usize;
        DecodedBuffer::new(
            (0..n)
                .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
                .collect(),
            sample_rate,
        )
    }

    fn pipeline() -> FramePipeline {
        let config = PipelineConfig::default();
        let tempo = TempoEstimator::with_current_runtime(Arc::new(PeakIntervalAnalyzer::new(
            config.tempo.clone(),
        )))
        .unwrap();
        FramePipeline::new(&config, tempo)
    }

    #[tokio::test]
    async fn closed_session_yields_silence() {
        let mut pipeline = pipeline().with_initial_color(Color::new(0.2, 0.4, 0.6));
        let session = AudioSession::live(44100).unwrap();

        let frame = pipeline.tick(&session).unwrap();
        assert_eq!(frame.loudness, 0.0);
        assert_eq!(frame.pitch, None);
        assert_eq!(frame.color, Color::new(0.2, 0.4, 0.6));
        assert_eq!(frame.tempo_bpm, 60.0);
        assert!(!frame.tempo_known);
        assert_eq!(pipeline.frame_count(), 1);
    }

    #[tokio::test]
    async fn tone_drives_pitch_and_color() {
        let mut pipeline = pipeline().with_initial_color(Color::new(0.5, 0.5, 0.5));
        let mut session = AudioSession::from_buffer(sine(441.0, 2.0, 44100)).unwrap();

        session.advance(Duration::from_millis(100));
        let frame = pipeline.tick(&session).unwrap();

        assert!(frame.loudness > 0.0);
        let pitch = frame.pitch.expect("tone should be voiced");
        assert_relative_eq!(pitch, 441.0, max_relative = 0.01);
        assert_ne!(frame.color, Color::new(0.5, 0.5, 0.5));
        assert_eq!(frame.color, pipeline.color());
    }

    #[tokio::test]
    async fn silent_track_tempo_stays_on_fallback() {
        let mut pipeline = pipeline();
        let session =
            AudioSession::from_buffer(DecodedBuffer::new(vec![0.0; 44100], 44100)).unwrap();
        let track = session.track_id().unwrap();

        let frame = pipeline.tick(&session).unwrap();
        assert_eq!(frame.tempo_bpm, 60.0);

        // Analysis of silence fails; the fallback remains.
        assert_eq!(pipeline.tempo().resolved(track).await, None);
        let frame = pipeline.tick(&session).unwrap();
        assert_eq!(frame.tempo_bpm, 60.0);
        assert!(!frame.tempo_known);
    }

    #[tokio::test]
    async fn loading_a_new_track_resets_tempo() {
        let mut pipeline = pipeline();
        let mut session = AudioSession::from_buffer(sine(100.0, 1.0, 8000)).unwrap();
        pipeline.tick(&session).unwrap();
        let first = session.track_id().unwrap();

        let second = session.load(sine(200.0, 1.0, 8000)).unwrap();
        pipeline.tick(&session).unwrap();

        assert_ne!(first, second);
        assert_ne!(pipeline.tempo().state(), TempoState::Pending(first));
        assert_eq!(pipeline.tempo().resolved(first).await, None);
    }
}
