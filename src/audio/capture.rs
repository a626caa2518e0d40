use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::Receiver;
use log::{info, warn};

use super::{mix_to_mono, AudioSession};
use crate::error::{Error, Result};

/// Live input from the default capture device.
///
/// The cpal callback mixes each buffer down to mono and hands it over a
/// channel; the frame loop drains the channel into an [`AudioSession`]
/// without ever blocking.
pub struct LiveCapture {
    _stream: Stream,
    receiver: Receiver<Vec<f32>>,
    sample_rate: u32,
}

impl LiveCapture {
    /// Opens the default input device and starts streaming from it.
    ///
    /// # Errors
    /// [`Error::Device`] when there is no input device or cpal refuses the
    /// device's default configuration.
    pub fn start() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| device_error("input device", "none available"))?;
        let supported = device
            .default_input_config()
            .map_err(|e| device_error("default input config", e))?;

        let config: StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = usize::from(config.channels);
        info!(
            "Capturing from {} ({} ch, {} Hz)",
            device.name().unwrap_or_else(|_| "unknown device".to_string()),
            channels,
            sample_rate
        );

        let (chunks, receiver) = crossbeam_channel::unbounded::<Vec<f32>>();
        let on_samples = move |data: &[f32], _: &cpal::InputCallbackInfo| {
            // Only fails once the capture, and with it the receiver, is gone.
            let _ = chunks.send(mix_to_mono(data, channels));
        };
        let stream = device
            .build_input_stream(&config, on_samples, |e| warn!("Input stream error: {}", e), None)
            .map_err(|e| device_error("input stream", e))?;
        stream.play().map_err(|e| device_error("stream start", e))?;

        Ok(Self {
            _stream: stream,
            receiver,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Moves every pending chunk into the session window. Returns the number
    /// of samples moved.
    pub fn drain_into(&self, session: &mut AudioSession) -> usize {
        drain_channel(&self.receiver, session)
    }
}

fn device_error(what: &str, cause: impl std::fmt::Display) -> Error {
    Error::Device(format!("{}: {}", what, cause))
}

fn drain_channel(receiver: &Receiver<Vec<f32>>, session: &mut AudioSession) -> usize {
    let mut moved = 0;
    while let Ok(chunk) = receiver.try_recv() {
        moved += chunk.len();
        session.push_samples(&chunk);
    }
    moved
}
