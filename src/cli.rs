use clap::Parser;
use std::path::PathBuf;

use crate::params::Scrubber;

#[derive(Parser, Debug)]
#[command(name = "circle", about = "Octave-band audio spectrum visualizer video generator")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: Option<PathBuf>,

    /// Visualize the default microphone instead of a song
    #[arg(long, conflicts_with = "input")]
    pub mic: bool,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// Preset name (see --list-presets)
    #[arg(short, long)]
    pub preset: Option<String>,

    /// List available presets and exit
    #[arg(long)]
    pub list_presets: bool,

    /// Parameters as a query string, e.g. "hue=120&view=linear"
    #[arg(long)]
    pub params: Option<String>,

    /// Write the final parameter query string to this file
    #[arg(long)]
    pub save_params: Option<PathBuf>,

    /// Sweep a parameter across its range over the course of the video
    #[arg(long)]
    pub scrub: Option<Scrubber>,

    /// Seconds to capture in --mic mode
    #[arg(long, default_value_t = 10.0)]
    pub duration: f32,

    /// Smoothing factor for audio analysis (0.0-1.0)
    #[arg(long, default_value_t = 0.8)]
    pub smoothing: f32,

    /// Font file for labels
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Download the label font from this URL
    #[arg(long)]
    pub font_url: Option<String>,

    /// Config file (default: circle.toml or ~/.config/circle/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
