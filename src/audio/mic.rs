use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{InputCallbackInfo, StreamConfig};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::source::{AudioSource, SourceError};

/// Live microphone input. The capture callback downmixes to mono and keeps
/// the most recent samples in a bounded ring.
pub struct MicSource {
    stream: cpal::Stream,
    ring: Arc<Mutex<VecDeque<f32>>>,
    sample_rate: u32,
    device_name: String,
    capturing: bool,
    volume: f32,
}

impl MicSource {
    pub fn open(buffer_seconds: f32) -> Result<Self, SourceError> {
        let host = cpal::default_host();
        log::info!("cpal host: {}", host.id().name());
        let device = host
            .default_input_device()
            .ok_or_else(|| SourceError::MicUnavailable("no input device".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "(no name)".into());

        let supported = device
            .default_input_config()
            .map_err(|e| SourceError::MicUnavailable(e.to_string()))?;
        log::info!(
            "Microphone '{}': {} channels, {}Hz, {}",
            device_name,
            supported.channels(),
            supported.sample_rate().0,
            supported.sample_format()
        );

        let config = StreamConfig::from(supported);
        let channels = config.channels.max(1) as usize;
        let sample_rate = config.sample_rate.0;
        let capacity = ((sample_rate as f32 * buffer_seconds) as usize).max(1);

        let ring = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let writer = Arc::clone(&ring);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &InputCallbackInfo| {
                    let Ok(mut ring) = writer.lock() else {
                        return;
                    };
                    for frame in data.chunks(channels) {
                        if ring.len() == capacity {
                            ring.pop_front();
                        }
                        ring.push_back(frame.iter().sum::<f32>() / channels as f32);
                    }
                },
                |err| log::error!("Microphone stream error: {}", err),
                None,
            )
            .map_err(|e| SourceError::MicUnavailable(e.to_string()))?;
        stream
            .play()
            .map_err(|e| SourceError::MicUnavailable(e.to_string()))?;

        Ok(Self {
            stream,
            ring,
            sample_rate,
            device_name,
            capturing: true,
            volume: 1.0,
        })
    }
}

impl AudioSource for MicSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn fill_window(&self, out: &mut [f32]) {
        out.fill(0.0);
        let Ok(ring) = self.ring.lock() else {
            return;
        };
        let take = ring.len().min(out.len());
        let pad = out.len() - take;
        for (dst, &src) in out[pad..].iter_mut().zip(ring.iter().skip(ring.len() - take)) {
            *dst = src * self.volume;
        }
    }

    fn advance(&mut self, _seconds: f32) {}

    fn play(&mut self) {
        match self.stream.play() {
            Ok(()) => self.capturing = true,
            Err(e) => log::warn!("Failed to resume microphone: {}", e),
        }
    }

    fn pause(&mut self) {
        match self.stream.pause() {
            Ok(()) => self.capturing = false,
            Err(e) => log::warn!("Failed to pause microphone: {}", e),
        }
    }

    fn is_playing(&self) -> bool {
        self.capturing
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn is_live(&self) -> bool {
        true
    }

    fn stop(&mut self) {
        self.pause();
        if let Ok(mut ring) = self.ring.lock() {
            ring.clear();
        }
    }

    fn describe(&self) -> String {
        format!("microphone '{}'", self.device_name)
    }
}
