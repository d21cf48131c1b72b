use serde::Deserialize;

use crate::params::ParamPatch;

#[derive(Debug, Deserialize)]
pub struct PresetManifest {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: ParamPatch,
    #[serde(default)]
    pub bands: BandLayout,
}

/// Band table overrides. Unset fields keep the configured layout.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BandLayout {
    pub base_freq: Option<f32>,
    pub octaves: Option<usize>,
    pub steps: Option<usize>,
}
