use std::path::{Path, PathBuf};
use thiserror::Error;

use super::embedded::embedded_presets;
use super::manifest::PresetManifest;

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("Preset '{name}' not found. Available presets: {available:?}")]
    NotFound { name: String, available: Vec<String> },
    #[error("Failed to parse preset '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to read preset {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// User presets live next to the config file, one JSON manifest per file.
pub fn find_presets_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("circle").join("presets"))
}

fn user_presets(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .filter_map(|path| {
            let name = path.file_stem()?.to_str()?.to_string();
            Some((name, path))
        })
        .collect()
}

/// Names of all presets, built-in and user, sorted and deduplicated.
pub fn list_presets() -> Vec<String> {
    list_presets_in(find_presets_dir().as_deref())
}

fn list_presets_in(user_dir: Option<&Path>) -> Vec<String> {
    let mut names: Vec<String> = embedded_presets()
        .iter()
        .map(|(name, _)| name.to_string())
        .collect();
    if let Some(dir) = user_dir {
        names.extend(user_presets(dir).into_iter().map(|(name, _)| name));
    }
    names.sort();
    names.dedup();
    names
}

/// Load a preset by name. A user preset shadows a built-in one with the
/// same name.
pub fn load_preset(name: &str) -> Result<PresetManifest, PresetError> {
    load_preset_in(name, find_presets_dir().as_deref())
}

fn load_preset_in(name: &str, user_dir: Option<&Path>) -> Result<PresetManifest, PresetError> {
    if let Some(dir) = user_dir {
        if let Some((_, path)) = user_presets(dir).into_iter().find(|(n, _)| n == name) {
            let json = std::fs::read_to_string(&path).map_err(|source| PresetError::Io {
                path: path.clone(),
                source,
            })?;
            log::debug!("Loading user preset from {}", path.display());
            return parse_preset(name, &json);
        }
    }

    let (_, json) = embedded_presets()
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| PresetError::NotFound {
            name: name.to_string(),
            available: list_presets_in(user_dir),
        })?;
    parse_preset(name, json)
}

pub fn parse_preset(name: &str, json: &str) -> Result<PresetManifest, PresetError> {
    serde_json::from_str(json).map_err(|source| PresetError::Parse {
        name: name.to_string(),
        source,
    })
}
