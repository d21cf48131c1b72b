use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use circle::audio::source::FileLoader;
use circle::bands::BandTable;
use circle::cli::Cli;
use circle::config;
use circle::encode::ffmpeg::{EncoderSettings, FfmpegEncoder};
use circle::interaction::{Action, Pointer};
use circle::params::{ParamPatch, ParameterStore};
use circle::presets::loader;
use circle::render::canvas::{PixelCanvas, Surface};
use circle::render::text::{load_font_from_url, TextOverlay};
use circle::session::{FrameInput, Host, Session, SessionSettings};

/// Offline host: a fixed-size window, parameters from `--params`, and the
/// final query string written to `--save-params`.
struct RenderHost {
    size: (u32, u32),
    font: Option<Vec<u8>>,
    query: Option<String>,
    save_path: Option<PathBuf>,
}

impl RenderHost {
    fn text_overlay(&self) -> Option<TextOverlay> {
        match &self.font {
            Some(bytes) => match TextOverlay::from_bytes(bytes) {
                Ok(overlay) => Some(overlay),
                Err(err) => {
                    log::warn!("Labels disabled: {:#}", err);
                    None
                }
            },
            None => TextOverlay::system(),
        }
    }

    fn save(&self) -> Result<()> {
        let (Some(path), Some(query)) = (&self.save_path, &self.query) else {
            return Ok(());
        };
        std::fs::write(path, format!("{}\n", query))
            .with_context(|| format!("Failed to write parameters to {}", path.display()))?;
        log::info!("Saved parameters to {}", path.display());
        Ok(())
    }
}

impl Host for RenderHost {
    type Surface = PixelCanvas;

    fn window_size(&self) -> (u32, u32) {
        self.size
    }

    fn create_canvas(&mut self, width: u32, height: u32) -> PixelCanvas {
        PixelCanvas::new(width, height, self.text_overlay())
    }

    fn read_persisted(&self) -> Option<String> {
        self.query.clone()
    }

    fn write_persisted(&mut self, query: &str) {
        self.query = Some(query.to_string());
    }

    fn request_fullscreen(&mut self) {
        log::info!("Fullscreen has no effect when rendering to a file");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut cfg = config::Config::default();
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        if let Some(loaded) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }
    // Merge: config values apply only when CLI is at its default
    if cli.width == 1280 { cli.width = cfg.output.width; }
    if cli.height == 720 { cli.height = cfg.output.height; }
    if cli.fps == 30 { cli.fps = cfg.output.fps; }
    if cli.crf == 18 { cli.crf = cfg.output.crf; }
    if cli.codec == "libx264" { cli.codec = cfg.output.codec.clone(); }
    if cli.smoothing == 0.8 { cli.smoothing = cfg.audio.smoothing; }
    if cli.font.is_none() {
        cli.font = cfg.output.font.clone();
    }
    if cli.font_url.is_none() {
        cli.font_url = cfg.output.font_url.clone();
    }
    if cli.preset.is_none() {
        cli.preset = cfg.sketch.preset.clone();
    }

    if cli.list_presets {
        println!("Available presets:");
        for name in loader::list_presets() {
            match loader::load_preset(&name) {
                Ok(p) => println!("  {:<12} {:<20} {}", p.name, p.display_name, p.description),
                Err(_) => println!("  {}", name),
            }
        }
        return Ok(());
    }

    if cli.fps == 0 {
        anyhow::bail!("--fps must be positive");
    }
    let input = if cli.mic {
        None
    } else {
        let input = cli.input.clone().context("Input audio file is required (or pass --mic)")?;
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
        Some(input)
    };

    log::info!("circle - octave-band spectrum visualizer");
    match &input {
        Some(path) => log::info!("Input: {}", path.display()),
        None => log::info!("Input: microphone, {:.1}s", cli.duration),
    }
    log::info!("Output: {}", cli.output.display());
    log::info!("Resolution: {}x{} @ {}fps", cli.width, cli.height, cli.fps);

    // 1. Parameters and bands: defaults, then preset, then config
    let mut patch = ParamPatch::default();
    let mut bands = BandTable::new(cfg.bands.base_freq, cfg.bands.octaves, cfg.bands.steps)
        .context("Invalid [bands] configuration")?;
    if let Some(name) = &cli.preset {
        let preset = loader::load_preset(name)?;
        log::info!("Preset: {}", preset.display_name);
        patch.merge(&preset.params);
        let base = preset.bands.base_freq.unwrap_or(cfg.bands.base_freq);
        let octaves = preset.bands.octaves.unwrap_or(cfg.bands.octaves);
        let steps = preset.bands.steps.unwrap_or(cfg.bands.steps);
        bands = BandTable::new(base, octaves, steps)
            .with_context(|| format!("Invalid band layout in preset '{}'", name))?;
    }
    patch.merge(&cfg.sketch.param_patch());
    let params = ParameterStore::from_patch(&patch);
    log::info!("Bands: {} octaves x {} steps", bands.octaves(), bands.steps());

    // 2. Label font
    let font = match (&cli.font, &cli.font_url) {
        (Some(path), _) => Some(
            std::fs::read(path).with_context(|| format!("Failed to read font: {}", path.display()))?,
        ),
        (None, Some(url)) => match load_font_from_url(url) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                log::warn!("Failed to load font from URL: {:#}", err);
                None
            }
        },
        (None, None) => None,
    };

    // 3. Session
    let host = RenderHost {
        size: (cli.width, cli.height),
        font,
        query: cli.params.clone(),
        save_path: cli.save_params.clone(),
    };
    let settings = SessionSettings {
        bins: cfg.audio.bins,
        smoothing: cli.smoothing,
        volume: cfg.audio.volume,
        toolbar_width: cfg.sketch.toolbar_width(),
    };
    let source_loader = FileLoader::default();
    let mut session = Session::new(host, Arc::new(source_loader), params, bands, settings);

    match &input {
        Some(path) => {
            session = session.with_default_song(path.clone());
            session.set_song_mode();
        }
        None => session.set_mic_mode(),
    }
    log::info!("Decoding audio...");
    if !session.block_until_ready() {
        anyhow::bail!("Nothing to visualize; see the warnings above");
    }

    let duration = session
        .instance()
        .and_then(|i| i.source().duration())
        .unwrap_or(cli.duration);
    let total_frames = (duration * cli.fps as f32).ceil().max(1.0) as u64;
    log::info!("Total frames: {}, Duration: {:.1}s", total_frames, duration);

    // 4. Encoder
    log::info!("Starting FFmpeg encoder...");
    let mut encoder = FfmpegEncoder::new(
        &cli.output,
        input.as_deref(),
        &EncoderSettings {
            width: cli.width,
            height: cli.height,
            fps: cli.fps,
            codec: cli.codec.clone(),
            pix_fmt: cli.pix_fmt.clone(),
            crf: cli.crf,
            bitrate: cli.bitrate.clone(),
        },
    )?;

    if let Some(target) = cli.scrub {
        log::info!("Scrubbing {} across the video", target);
        session.apply(Action::StartScrub(target));
    }

    // 5. Render loop
    let pb = ProgressBar::new(total_frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let dt = 1.0 / cli.fps as f32;
    let content_width = cli.width as f32 - cfg.sketch.toolbar_width();
    let start = Instant::now();

    for frame_idx in 0..total_frames {
        let elapsed = Duration::from_secs_f64(frame_idx as f64 / cli.fps as f64);
        let now = if input.is_none() {
            // live input can't be rendered faster than it arrives
            let due = start + elapsed;
            let wait = due.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
            Instant::now()
        } else {
            start + elapsed
        };

        let pointer = match cli.scrub {
            Some(_) => {
                let progress = frame_idx as f32 / (total_frames - 1).max(1) as f32;
                Pointer::new(progress * content_width, cli.height as f32 / 2.0)
            }
            None => Pointer::default(),
        };

        session.tick(FrameInput {
            now,
            pointer,
            grid_key: false,
            dt,
        });
        let canvas = session.canvas().context("Sketch stopped while rendering")?;
        if canvas.size() != (cli.width, cli.height) {
            anyhow::bail!("Canvas size changed mid-render");
        }
        encoder.write_frame(canvas.pixels())?;
        pb.set_position(frame_idx + 1);
    }

    if cli.scrub.is_some() {
        session.apply(Action::StopScrub);
    }
    pb.finish_with_message("Rendering complete");

    // 6. Finish encoding
    log::info!("Finishing encoding...");
    encoder.finish()?;
    session.host().save()?;

    log::info!("Parameters: ?{}", session.params().serialize());
    log::info!("Done! Output: {}", cli.output.display());
    Ok(())
}
