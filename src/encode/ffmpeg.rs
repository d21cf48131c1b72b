use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::{self, JoinHandle};

/// Bytes of ffmpeg's stderr kept for error reports.
const STDERR_TAIL: usize = 16 * 1024;

#[derive(Clone, Debug)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
}

pub struct FfmpegEncoder {
    child: Child,
    frame_len: usize,
    stderr: Option<JoinHandle<String>>,
}

impl FfmpegEncoder {
    /// Spawn ffmpeg reading raw RGBA frames from stdin. With `input_audio`
    /// the song is muxed in as AAC; without it the video is silent.
    pub fn new(output_path: &Path, input_audio: Option<&Path>, settings: &EncoderSettings) -> Result<Self> {
        let args = build_args(output_path, input_audio, settings);
        log::debug!("ffmpeg {:?}", args);

        let mut command = Command::new("ffmpeg");
        command.args(&args);
        let encoder = Self::spawn(command, settings.width as usize * settings.height as usize * 4)
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec
        );
        Ok(encoder)
    }

    /// Start `command` with piped stdin. Its stderr is drained on a thread
    /// so a chatty encoder can never stall on a full pipe.
    fn spawn(mut command: Command, frame_len: usize) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = match child.stderr.take() {
            Some(pipe) => Some(
                thread::Builder::new()
                    .name("ffmpeg-stderr".into())
                    .spawn(move || drain_tail(pipe))
                    .context("Failed to start ffmpeg stderr reader")?,
            ),
            None => None,
        };

        Ok(Self {
            child,
            frame_len,
            stderr,
        })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        if rgba_pixels.len() != self.frame_len {
            anyhow::bail!(
                "Frame is {} bytes, encoder expects {}",
                rgba_pixels.len(),
                self.frame_len
            );
        }
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        drop(self.child.stdin.take());

        let status = self.child.wait().context("Failed to wait for ffmpeg")?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            anyhow::bail!("FFmpeg exited with {}:\n{}", status, stderr);
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }
}

/// Read `pipe` to the end, keeping only the last `STDERR_TAIL` bytes.
fn drain_tail(mut pipe: ChildStderr) -> String {
    let mut tail: VecDeque<u8> = VecDeque::with_capacity(STDERR_TAIL);
    let mut buf = [0u8; 4096];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                tail.extend(&buf[..n]);
                let excess = tail.len().saturating_sub(STDERR_TAIL);
                tail.drain(..excess);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("Stopped reading ffmpeg stderr: {}", e);
                break;
            }
        }
    }
    String::from_utf8_lossy(tail.make_contiguous()).into_owned()
}

fn build_args(output_path: &Path, input_audio: Option<&Path>, settings: &EncoderSettings) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y".to_string(),
        "-hide_banner".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", settings.width, settings.height),
        "-framerate".into(), settings.fps.to_string(),
        "-i".into(), "pipe:0".into(),
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    if let Some(audio) = input_audio {
        args.push("-i".into());
        args.push(audio.as_os_str().to_owned());
    }

    args.extend(
        ["-c:v", settings.codec.as_str(), "-pix_fmt", settings.pix_fmt.as_str()]
            .into_iter()
            .map(OsString::from),
    );

    if let Some(br) = &settings.bitrate {
        args.extend([OsString::from("-b:v"), OsString::from(br)]);
    } else {
        args.extend([OsString::from("-crf"), OsString::from(settings.crf.to_string())]);
        args.extend([OsString::from("-preset"), OsString::from("medium")]);
    }

    if input_audio.is_some() {
        args.extend(
            ["-c:a", "aac", "-b:a", "192k", "-shortest"]
                .into_iter()
                .map(OsString::from),
        );
    }

    args.push(output_path.as_os_str().to_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EncoderSettings {
        EncoderSettings {
            width: 640,
            height: 360,
            fps: 30,
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            crf: 18,
            bitrate: None,
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn muxes_song_audio() {
        let args = strings(&build_args(
            Path::new("out.mp4"),
            Some(Path::new("song.mp3")),
            &settings(),
        ));
        assert!(args.windows(2).any(|w| w == ["-i", "song.mp3"]));
        assert!(args.windows(2).any(|w| w == ["-crf", "18"]));
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn silent_video_with_bitrate() {
        let mut s = settings();
        s.bitrate = Some("5M".into());
        let args = strings(&build_args(Path::new("mic.mp4"), None, &s));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
        assert!(args.windows(2).any(|w| w == ["-b:v", "5M"]));
        assert!(!args.contains(&"-crf".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        assert!(args.windows(2).any(|w| w == ["-video_size", "640x360"]));
    }

    #[cfg(unix)]
    fn shell(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        command
    }

    #[cfg(unix)]
    #[test]
    fn chatty_encoder_does_not_stall() {
        use std::sync::mpsc;
        use std::time::Duration;

        // ~300 KB of progress on stderr before the first read of stdin
        let script = "i=0; while [ $i -lt 3000 ]; do \
            echo 'frame= 1234 fps= 60 q=28.0 size= 1024kB time=00:00:41.13 bitrate= 204.0kbits/s' >&2; \
            i=$((i+1)); done; cat > /dev/null";
        let frame = vec![0u8; 64 * 64 * 4];
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = FfmpegEncoder::spawn(shell(script), frame.len()).and_then(|mut encoder| {
                for _ in 0..200 {
                    encoder.write_frame(&frame)?;
                }
                encoder.finish()
            });
            let _ = tx.send(result.map_err(|e| e.to_string()));
        });

        let result = rx
            .recv_timeout(Duration::from_secs(20))
            .expect("encoder stalled on a full stderr pipe");
        assert_eq!(result, Ok(()));
    }

    #[cfg(unix)]
    #[test]
    fn failure_reports_stderr_tail() {
        let script = "i=0; while [ $i -lt 2000 ]; do echo \"line $i of noise\" >&2; i=$((i+1)); done; \
            echo 'Unknown encoder libnope' >&2; cat > /dev/null; exit 3";
        let mut encoder = FfmpegEncoder::spawn(shell(script), 4).unwrap();
        encoder.write_frame(&[0, 0, 0, 255]).unwrap();
        assert!(encoder.write_frame(&[0; 8]).is_err());

        let err = encoder.finish().unwrap_err().to_string();
        assert!(err.contains("Unknown encoder libnope"), "{}", err);
        assert!(!err.contains("line 0 of noise"));
        assert!(err.len() < STDERR_TAIL + 256);
    }
}
