use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::bands::{DEFAULT_BASE_FREQ, DEFAULT_OCTAVES, DEFAULT_STEPS};
use crate::params::ParamPatch;
use crate::render::shape::DEFAULT_TOOLBAR_WIDTH;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub sketch: SketchConfig,
    #[serde(default)]
    pub bands: BandsConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default)]
    pub font: Option<PathBuf>,
    #[serde(default)]
    pub font_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_bins")]
    pub bins: usize,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Debug, Default, Deserialize)]
pub struct SketchConfig {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub toolbar_width: Option<f32>,
    /// Raw parameter values, same keys as the query string.
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
pub struct BandsConfig {
    #[serde(default = "default_base_freq")]
    pub base_freq: f32,
    #[serde(default = "default_octaves")]
    pub octaves: usize,
    #[serde(default = "default_steps")]
    pub steps: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            font: None,
            font_url: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            smoothing: default_smoothing(),
            bins: default_bins(),
            volume: default_volume(),
        }
    }
}

impl Default for BandsConfig {
    fn default() -> Self {
        Self {
            base_freq: default_base_freq(),
            octaves: default_octaves(),
            steps: default_steps(),
        }
    }
}

impl SketchConfig {
    pub fn toolbar_width(&self) -> f32 {
        self.toolbar_width.unwrap_or(DEFAULT_TOOLBAR_WIDTH)
    }

    /// The `[sketch.params]` table as a patch. Keys that don't parse are
    /// skipped with a warning.
    pub fn param_patch(&self) -> ParamPatch {
        let mut patch = ParamPatch::default();
        for (key, value) in &self.params {
            let raw = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if let Err(err) = patch.set_raw(key, &raw) {
                log::warn!("Ignoring config parameter: {}", err);
            }
        }
        patch
    }
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 30 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_smoothing() -> f32 { crate::audio::analyzer::DEFAULT_SMOOTHING }
fn default_bins() -> usize { crate::audio::analyzer::DEFAULT_BINS }
fn default_volume() -> f32 { 1.0 }
fn default_base_freq() -> f32 { DEFAULT_BASE_FREQ }
fn default_octaves() -> usize { DEFAULT_OCTAVES }
fn default_steps() -> usize { DEFAULT_STEPS }

/// `--config`, else `circle.toml` in the working directory, else the user
/// config file.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("circle.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("circle").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("circle").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Option<Config> {
    match toml::from_str(content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::debug!("Config parse error: {}", err);
            None
        }
    }
}
