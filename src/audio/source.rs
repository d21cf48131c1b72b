use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::decode::{decode_audio, AudioData};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("microphone input requires the 'mic' feature. Rebuild with: cargo build --features mic")]
    MicDisabled,
    #[cfg(feature = "mic")]
    #[error("microphone unavailable: {0}")]
    MicUnavailable(String),
    #[error(transparent)]
    Decode(#[from] anyhow::Error),
}

/// Something that produces samples for the analyzer.
pub trait AudioSource {
    fn sample_rate(&self) -> u32;

    /// Copy the latest samples, ending at the current position, into `out`.
    /// Missing history is zero filled at the front.
    fn fill_window(&self, out: &mut [f32]);

    /// Move the playhead forward. Live sources ignore this.
    fn advance(&mut self, seconds: f32);

    fn play(&mut self);
    fn pause(&mut self);
    fn is_playing(&self) -> bool;

    fn is_paused(&self) -> bool {
        !self.is_playing()
    }

    fn set_volume(&mut self, volume: f32);

    /// Length in seconds, if the source has one.
    fn duration(&self) -> Option<f32> {
        None
    }

    /// Live inputs are not driven by the play/pause flag.
    fn is_live(&self) -> bool {
        false
    }

    /// Release whatever the source holds. Called once on teardown.
    fn stop(&mut self) {
        self.pause();
    }

    fn describe(&self) -> String;
}

/// A decoded song with a playhead.
///
/// `play` after the song has finished restarts it from the top.
pub struct SongSource {
    audio: Arc<AudioData>,
    name: String,
    playhead: f64,
    playing: bool,
    volume: f32,
}

impl SongSource {
    pub fn new(audio: Arc<AudioData>, name: impl Into<String>) -> Self {
        Self {
            audio,
            name: name.into(),
            playhead: 0.0,
            playing: false,
            volume: 1.0,
        }
    }

    /// Playhead in seconds.
    #[cfg(test)]
    fn position(&self) -> f32 {
        self.playhead as f32
    }

    pub fn finished(&self) -> bool {
        self.playhead >= self.audio.duration() as f64
    }

    fn playhead_index(&self) -> usize {
        ((self.playhead * self.audio.sample_rate as f64) as usize).min(self.audio.samples.len())
    }
}

impl AudioSource for SongSource {
    fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    fn fill_window(&self, out: &mut [f32]) {
        let end = self.playhead_index();
        let start = end.saturating_sub(out.len());
        let available = &self.audio.samples[start..end];
        let pad = out.len() - available.len();

        out[..pad].fill(0.0);
        for (dst, &src) in out[pad..].iter_mut().zip(available) {
            *dst = src * self.volume;
        }
    }

    fn advance(&mut self, seconds: f32) {
        if !self.playing || !(seconds > 0.0) {
            return;
        }
        self.playhead += seconds as f64;
        if self.finished() {
            self.playhead = self.audio.duration() as f64;
            self.playing = false;
            log::info!("Song finished: {}", self.name);
        }
    }

    fn play(&mut self) {
        if self.finished() {
            self.playhead = 0.0;
        }
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn duration(&self) -> Option<f32> {
        Some(self.audio.duration())
    }

    fn describe(&self) -> String {
        format!("song '{}'", self.name)
    }
}

/// Opens audio sources for a session. Decoding runs on a loader thread, so
/// implementations must be shareable.
pub trait SourceLoader: Send + Sync {
    fn decode(&self, path: &Path, mime: Option<&str>) -> Result<AudioData, SourceError>;

    fn open_mic(&self) -> Result<Box<dyn AudioSource>, SourceError>;
}

/// Loads songs from disk and, with the `mic` feature, opens the default
/// input device.
#[derive(Clone, Debug, Default)]
pub struct FileLoader {
    /// Seconds of capture history kept for the analyzer; 0 means one second.
    #[cfg(feature = "mic")]
    pub mic_buffer_seconds: f32,
}

impl SourceLoader for FileLoader {
    fn decode(&self, path: &Path, mime: Option<&str>) -> Result<AudioData, SourceError> {
        Ok(decode_audio(path, mime)?)
    }

    #[cfg(feature = "mic")]
    fn open_mic(&self) -> Result<Box<dyn AudioSource>, SourceError> {
        let seconds = if self.mic_buffer_seconds > 0.0 {
            self.mic_buffer_seconds
        } else {
            1.0
        };
        Ok(Box::new(super::mic::MicSource::open(seconds)?))
    }

    #[cfg(not(feature = "mic"))]
    fn open_mic(&self) -> Result<Box<dyn AudioSource>, SourceError> {
        Err(SourceError::MicDisabled)
    }
}

/// A file offered by a drop event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedFile {
    pub name: String,
    pub mime: String,
    pub path: PathBuf,
}

impl DroppedFile {
    pub fn is_audio(&self) -> bool {
        self.mime.starts_with("audio/")
    }
}

/// The first audio file of a drop; the rest are ignored.
pub fn first_audio_file(files: &[DroppedFile]) -> Option<&DroppedFile> {
    files.iter().find(|f| f.is_audio())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_song(len: usize, sample_rate: u32) -> SongSource {
        let audio = AudioData {
            samples: (0..len).map(|i| i as f32).collect(),
            sample_rate,
        };
        SongSource::new(Arc::new(audio), "ramp")
    }

    #[test]
    fn window_pads_before_start() {
        let mut song = ramp_song(100, 10);
        song.play();
        song.advance(0.3);
        let mut out = [9.0f32; 5];
        song.fill_window(&mut out);
        assert_eq!(out, [0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn paused_song_does_not_move() {
        let mut song = ramp_song(100, 10);
        song.advance(1.0);
        assert_eq!(song.position(), 0.0);
        song.play();
        song.advance(1.0);
        song.pause();
        song.advance(1.0);
        assert!((song.position() - 1.0).abs() < 1e-6);
        assert!(song.is_paused());
    }

    #[test]
    fn finishes_and_restarts() {
        let mut song = ramp_song(20, 10);
        song.play();
        song.advance(5.0);
        assert!(song.finished());
        assert!(!song.is_playing());
        let mut out = [0.0f32; 2];
        song.fill_window(&mut out);
        assert_eq!(out, [18.0, 19.0]);

        song.play();
        assert_eq!(song.position(), 0.0);
        assert!(song.is_playing());
    }

    #[test]
    fn volume_scales_window() {
        let mut song = ramp_song(100, 10);
        song.set_volume(0.5);
        song.play();
        song.advance(1.0);
        let mut out = [0.0f32; 2];
        song.fill_window(&mut out);
        assert_eq!(out, [4.0, 4.5]);
    }

    #[test]
    fn picks_first_audio_file() {
        let files = vec![
            DroppedFile {
                name: "notes.txt".into(),
                mime: "text/plain".into(),
                path: "notes.txt".into(),
            },
            DroppedFile {
                name: "a.mp3".into(),
                mime: "audio/mpeg".into(),
                path: "a.mp3".into(),
            },
            DroppedFile {
                name: "b.wav".into(),
                mime: "audio/wav".into(),
                path: "b.wav".into(),
            },
        ];
        assert_eq!(first_audio_file(&files).map(|f| f.name.as_str()), Some("a.mp3"));
        assert!(first_audio_file(&files[..1]).is_none());
    }

    #[cfg(not(feature = "mic"))]
    #[test]
    fn mic_needs_feature() {
        let loader = FileLoader::default();
        assert!(matches!(loader.open_mic(), Err(SourceError::MicDisabled)));
    }
}
