use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sonichue::{
    AudioSession, Color, FrameFeatures, FramePipeline, LiveCapture, PeakIntervalAnalyzer,
    PipelineConfig, TempoEstimator,
};

#[derive(Parser)]
#[command(name = "sonichue")]
#[command(about = "Extract loudness, pitch, tempo and color from audio, frame by frame")]
struct Args {
    /// Audio file to analyze (WAV, MP3, OGG, FLAC, M4A)
    #[arg(required_unless_present = "live")]
    audio_file: Option<PathBuf>,

    /// Capture from the default input device for this many seconds instead
    #[arg(long)]
    live: Option<f32>,

    /// Display frame rate the pipeline is ticked at
    #[arg(long, default_value = "60")]
    fps: u32,

    /// Number of frames to process (defaults to one pass over the track)
    #[arg(long)]
    frames: Option<u64>,

    /// JSON file with pipeline parameter overrides
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Write every frame to this JSON report
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report {
    source: String,
    sample_rate: u32,
    fps: u32,
    tempo_bpm: Option<f32>,
    final_color: Color,
    frames: Vec<FrameFeatures>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let fps = args.fps.max(1);

    let analyzer = Arc::new(PeakIntervalAnalyzer::new(config.tempo.clone()));
    let tempo = TempoEstimator::with_current_runtime(analyzer)?;
    let mut pipeline = FramePipeline::new(&config, tempo);

    let report = match (args.live, &args.audio_file) {
        (Some(seconds), _) => run_live(&mut pipeline, &args, fps, seconds).await?,
        (None, Some(path)) => run_file(&mut pipeline, &args, fps, path).await?,
        (None, None) => anyhow::bail!("either an audio file or --live is required"),
    };

    info!("Processed {} frames", pipeline.frame_count());
    match report.tempo_bpm {
        Some(bpm) => info!("Tempo: {:.1} BPM", bpm),
        None => info!("Tempo: unknown (using {:.0} BPM)", config.tempo.fallback_bpm),
    }
    info!(
        "Final color: ({:.3}, {:.3}, {:.3})",
        report.final_color.r, report.final_color.g, report.final_color.b
    );

    if let Some(path) = &args.output {
        let writer = BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        serde_json::to_writer_pretty(writer, &report)?;
        info!("Report saved to {}", path.display());
    }

    Ok(())
}

async fn run_file(
    pipeline: &mut FramePipeline,
    args: &Args,
    fps: u32,
    path: &Path,
) -> Result<Report> {
    info!("Analyzing {}", path.display());
    let mut session =
        AudioSession::open(path).with_context(|| format!("opening {}", path.display()))?;

    let duration = session.buffer().map(|b| b.duration()).unwrap_or_default();
    let frame_count = args
        .frames
        .unwrap_or_else(|| (duration.as_secs_f64() * fps as f64).ceil() as u64);
    let frame_time = Duration::from_secs_f64(1.0 / fps as f64);

    let mut frames = Vec::with_capacity(frame_count as usize);
    for index in 0..frame_count {
        session.advance(frame_time);
        frames.push(pipeline.tick(&session)?);

        if index % fps as u64 == 0 {
            log_frame(index, frames.last());
        }
        // Let the background tempo analysis make progress between frames.
        tokio::task::yield_now().await;
    }

    let tempo_bpm = match session.track_id() {
        Some(track) => pipeline.tempo().resolved(track).await,
        None => None,
    };

    Ok(Report {
        source: path.display().to_string(),
        sample_rate: session.sample_rate(),
        fps,
        tempo_bpm,
        final_color: pipeline.color(),
        frames,
    })
}

async fn run_live(
    pipeline: &mut FramePipeline,
    args: &Args,
    fps: u32,
    seconds: f32,
) -> Result<Report> {
    let capture = LiveCapture::start()?;
    let mut session = AudioSession::live(capture.sample_rate())?;
    info!("Capturing for {:.1}s at {} fps", seconds, fps);

    let frame_count = args
        .frames
        .unwrap_or_else(|| (seconds.max(0.0) as f64 * fps as f64).ceil() as u64);
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps as f64));

    let mut frames = Vec::with_capacity(frame_count as usize);
    for index in 0..frame_count {
        ticker.tick().await;
        if capture.drain_into(&mut session) == 0 {
            warn!("No input received for frame {}", index);
        }
        frames.push(pipeline.tick(&session)?);

        if index % fps as u64 == 0 {
            log_frame(index, frames.last());
        }
    }

    Ok(Report {
        source: "live input".to_string(),
        sample_rate: session.sample_rate(),
        fps,
        tempo_bpm: None,
        final_color: pipeline.color(),
        frames,
    })
}

fn log_frame(index: u64, frame: Option<&FrameFeatures>) {
    if let Some(frame) = frame {
        info!(
            "frame {:>6}: loudness {:6.1}  pitch {:>9}  color ({:.3}, {:.3}, {:.3})  tempo {:.1}{}",
            index,
            frame.loudness,
            frame
                .pitch
                .map(|p| format!("{:.1} Hz", p))
                .unwrap_or_else(|| "-".to_string()),
            frame.color.r,
            frame.color.g,
            frame.color.b,
            frame.tempo_bpm,
            if frame.tempo_known { "" } else { " (fallback)" }
        );
    }
}
