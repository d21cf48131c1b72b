use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Keys written to the shareable query string, in order.
pub const PERSISTED_KEYS: [&str; 10] = [
    "grid",
    "mode",
    "view",
    "overlap",
    "sharpness",
    "gain",
    "hue",
    "sweep",
    "radius",
    "opacity",
];

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("unknown parameter '{0}'")]
    Unknown(String),
    #[error("invalid value '{value}' for parameter '{name}'")]
    Invalid { name: String, value: String },
}

/// Numeric parameters that can be scrubbed with the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scrubber {
    Sharpness,
    Gain,
    Hue,
    Sweep,
    Radius,
    Opacity,
}

impl Scrubber {
    pub const ALL: [Scrubber; 6] = [
        Scrubber::Sharpness,
        Scrubber::Gain,
        Scrubber::Hue,
        Scrubber::Sweep,
        Scrubber::Radius,
        Scrubber::Opacity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scrubber::Sharpness => "sharpness",
            Scrubber::Gain => "gain",
            Scrubber::Hue => "hue",
            Scrubber::Sweep => "sweep",
            Scrubber::Radius => "radius",
            Scrubber::Opacity => "opacity",
        }
    }

    pub fn range(self) -> (f32, f32) {
        match self {
            Scrubber::Sharpness => (1.0, 10.0),
            Scrubber::Gain => (0.6, 3.0),
            Scrubber::Hue => (0.0, 360.0),
            Scrubber::Sweep => (-40.0, 40.0),
            Scrubber::Radius => (0.0, 1.0),
            Scrubber::Opacity => (0.0, 1.0),
        }
    }

    pub fn default_value(self) -> f32 {
        match self {
            Scrubber::Sharpness => 3.0,
            Scrubber::Gain => 1.0,
            Scrubber::Hue => 240.0,
            Scrubber::Sweep => -10.0,
            Scrubber::Radius => 0.8,
            Scrubber::Opacity => 0.1,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Scrubber {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scrubber::ALL
            .iter()
            .copied()
            .find(|sc| sc.name() == s)
            .ok_or_else(|| ParamError::Unknown(s.to_string()))
    }
}

impl fmt::Display for Scrubber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the audio comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Song,
    Mic,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Song => "song",
            Mode::Mic => "mic",
        }
    }
}

impl FromStr for Mode {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "song" => Ok(Mode::Song),
            "mic" => Ok(Mode::Mic),
            other => Err(ParamError::Invalid {
                name: "mode".into(),
                value: other.into(),
            }),
        }
    }
}

/// Projection used by the shape renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Polar,
    Linear,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            View::Polar => "polar",
            View::Linear => "linear",
        }
    }
}

impl FromStr for View {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polar" => Ok(View::Polar),
            "linear" => Ok(View::Linear),
            other => Err(ParamError::Invalid {
                name: "view".into(),
                value: other.into(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    Grid,
    Overlap,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Scrubbable {
    value: f32,
    min: f32,
    max: f32,
}

impl Scrubbable {
    fn clamp(&self, v: f32) -> f32 {
        v.max(self.min).min(self.max)
    }
}

/// A partial parameter set, as restored from a query string, a preset
/// manifest or the `[sketch.params]` table of the config file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParamPatch {
    pub grid: Option<bool>,
    pub mode: Option<Mode>,
    pub view: Option<View>,
    pub overlap: Option<bool>,
    pub sharpness: Option<f32>,
    pub gain: Option<f32>,
    pub hue: Option<f32>,
    pub sweep: Option<f32>,
    pub radius: Option<f32>,
    pub opacity: Option<f32>,
}

impl ParamPatch {
    pub fn scrubber(&self, s: Scrubber) -> Option<f32> {
        match s {
            Scrubber::Sharpness => self.sharpness,
            Scrubber::Gain => self.gain,
            Scrubber::Hue => self.hue,
            Scrubber::Sweep => self.sweep,
            Scrubber::Radius => self.radius,
            Scrubber::Opacity => self.opacity,
        }
    }

    fn scrubber_mut(&mut self, s: Scrubber) -> &mut Option<f32> {
        match s {
            Scrubber::Sharpness => &mut self.sharpness,
            Scrubber::Gain => &mut self.gain,
            Scrubber::Hue => &mut self.hue,
            Scrubber::Sweep => &mut self.sweep,
            Scrubber::Radius => &mut self.radius,
            Scrubber::Opacity => &mut self.opacity,
        }
    }

    /// Parse one `key=value` pair. Values are read as JSON literals first;
    /// anything that isn't valid JSON is taken as a bare string.
    pub fn set_raw(&mut self, key: &str, raw: &str) -> Result<(), ParamError> {
        let value = parse_literal(raw);
        let invalid = || ParamError::Invalid {
            name: key.to_string(),
            value: raw.to_string(),
        };

        match key {
            "grid" => self.grid = Some(value.as_bool().ok_or_else(invalid)?),
            "overlap" => self.overlap = Some(value.as_bool().ok_or_else(invalid)?),
            "mode" => {
                let s = value.as_str().ok_or_else(invalid)?;
                self.mode = Some(s.parse()?);
            }
            "view" => {
                let s = value.as_str().ok_or_else(invalid)?;
                self.view = Some(s.parse()?);
            }
            other => {
                let scrubber: Scrubber = other.parse()?;
                let v = value
                    .as_f64()
                    .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                    .map(|v| v as f32)
                    .filter(|v| v.is_finite())
                    .ok_or_else(invalid)?;
                *self.scrubber_mut(scrubber) = Some(v);
            }
        }
        Ok(())
    }

    /// Values from `other` win where both are set.
    pub fn merge(&mut self, other: &ParamPatch) {
        self.grid = other.grid.or(self.grid);
        self.mode = other.mode.or(self.mode);
        self.view = other.view.or(self.view);
        self.overlap = other.overlap.or(self.overlap);
        for s in Scrubber::ALL {
            if let Some(v) = other.scrubber(s) {
                *self.scrubber_mut(s) = Some(v);
            }
        }
    }
}

fn parse_literal(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Current visual configuration of the sketch.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterStore {
    scrubbables: [Scrubbable; 6],
    grid: bool,
    overlap: bool,
    mode: Mode,
    view: View,
    playing: bool,
    scrubbing: Option<Scrubber>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        let scrubbables = Scrubber::ALL.map(|s| {
            let (min, max) = s.range();
            Scrubbable {
                value: s.default_value(),
                min,
                max,
            }
        });
        Self {
            scrubbables,
            grid: false,
            overlap: true,
            mode: Mode::Song,
            view: View::Polar,
            playing: true,
            scrubbing: None,
        }
    }
}

impl ParameterStore {
    pub fn from_patch(patch: &ParamPatch) -> Self {
        let mut store = Self::default();
        store.apply(patch);
        store
    }

    pub fn value(&self, s: Scrubber) -> f32 {
        self.scrubbables[s.index()].value
    }

    /// Set a numeric parameter, clamped to its range. Non-finite values are
    /// ignored.
    pub fn set_value(&mut self, s: Scrubber, value: f32) {
        if !value.is_finite() {
            log::debug!("Ignoring non-finite value for {}", s);
            return;
        }
        let slot = &mut self.scrubbables[s.index()];
        slot.value = slot.clamp(value);
    }

    pub fn start_scrub(&mut self, s: Scrubber) {
        if let Some(prev) = self.scrubbing.replace(s) {
            if prev != s {
                log::debug!("Scrub target {} replaced by {}", prev, s);
            }
        }
    }

    pub fn stop_scrub(&mut self) {
        self.scrubbing = None;
    }

    pub fn scrubbing(&self) -> Option<Scrubber> {
        self.scrubbing
    }

    /// Map the pointer position across the content area onto the range of
    /// the active scrub target. Returns true when the value changed.
    pub fn update_from_pointer(&mut self, pointer_x: f32, content_width: f32) -> bool {
        let Some(target) = self.scrubbing else {
            return false;
        };
        if !(content_width > 0.0) || !pointer_x.is_finite() {
            return false;
        }
        let slot = &mut self.scrubbables[target.index()];
        let next = slot.clamp(slot.min + pointer_x / content_width * (slot.max - slot.min));
        if next == slot.value {
            return false;
        }
        slot.value = next;
        true
    }

    pub fn flag(&self, t: Toggle) -> bool {
        match t {
            Toggle::Grid => self.grid,
            Toggle::Overlap => self.overlap,
        }
    }

    pub fn set_flag(&mut self, t: Toggle, on: bool) {
        match t {
            Toggle::Grid => self.grid = on,
            Toggle::Overlap => self.overlap = on,
        }
    }

    pub fn toggle(&mut self, t: Toggle) {
        let on = self.flag(t);
        self.set_flag(t, !on);
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn set_view(&mut self, view: View) {
        self.view = view;
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Set any persisted parameter by name from its string form.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<(), ParamError> {
        let mut patch = ParamPatch::default();
        patch.set_raw(name, raw)?;
        self.apply(&patch);
        Ok(())
    }

    pub fn apply(&mut self, patch: &ParamPatch) {
        if let Some(grid) = patch.grid {
            self.grid = grid;
        }
        if let Some(overlap) = patch.overlap {
            self.overlap = overlap;
        }
        if let Some(mode) = patch.mode {
            self.mode = mode;
        }
        if let Some(view) = patch.view {
            self.view = view;
        }
        for s in Scrubber::ALL {
            if let Some(v) = patch.scrubber(s) {
                self.set_value(s, v);
            }
        }
    }

    /// Flat `key=value&...` form used for shareable links.
    pub fn serialize(&self) -> String {
        PERSISTED_KEYS
            .iter()
            .map(|&key| {
                let value = match key {
                    "grid" => self.grid.to_string(),
                    "overlap" => self.overlap.to_string(),
                    "mode" => self.mode.as_str().to_string(),
                    "view" => self.view.as_str().to_string(),
                    other => match other.parse::<Scrubber>() {
                        Ok(s) => format!("{:.2}", self.value(s)),
                        Err(_) => String::new(),
                    },
                };
                format!("{}={}", key, value)
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Parse a query string into a patch. Unknown keys and malformed values
    /// are skipped, so the current value of that key is kept on `apply`.
    pub fn deserialize(query: &str) -> ParamPatch {
        let mut patch = ParamPatch::default();
        let query = query.trim().trim_start_matches('?');
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let Some((key, raw)) = pair.split_once('=') else {
                log::debug!("Ignoring query pair without value: {}", pair);
                continue;
            };
            if let Err(err) = patch.set_raw(key, raw) {
                log::debug!("Ignoring persisted parameter: {}", err);
            }
        }
        patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_store_is_polar_overlap() {
        let store = ParameterStore::default();
        assert_eq!(store.value(Scrubber::Sharpness), 3.0);
        assert_eq!(store.value(Scrubber::Hue), 240.0);
        assert_eq!(store.value(Scrubber::Sweep), -10.0);
        assert!(store.flag(Toggle::Overlap));
        assert!(!store.flag(Toggle::Grid));
        assert_eq!(store.view(), View::Polar);
        assert_eq!(store.mode(), Mode::Song);
        assert!(store.scrubbing().is_none());
    }

    #[test]
    fn scrub_maps_pointer_onto_range() {
        let mut store = ParameterStore::default();
        store.start_scrub(Scrubber::Hue);
        assert!(store.update_from_pointer(250.0, 1000.0));
        assert_eq!(store.value(Scrubber::Hue), 90.0);
        // same pointer, nothing to write
        assert!(!store.update_from_pointer(250.0, 1000.0));
        assert_eq!(store.value(Scrubber::Hue), 90.0);
    }

    #[test]
    fn scrub_clamps_to_range() {
        let mut store = ParameterStore::default();
        store.start_scrub(Scrubber::Gain);
        store.update_from_pointer(5000.0, 1000.0);
        assert_eq!(store.value(Scrubber::Gain), 3.0);
        store.update_from_pointer(-200.0, 1000.0);
        assert_eq!(store.value(Scrubber::Gain), 0.6);
    }

    #[test]
    fn only_one_scrub_target() {
        let mut store = ParameterStore::default();
        store.start_scrub(Scrubber::Gain);
        store.start_scrub(Scrubber::Opacity);
        store.update_from_pointer(500.0, 1000.0);
        assert_eq!(store.value(Scrubber::Gain), 1.0);
        assert_eq!(store.value(Scrubber::Opacity), 0.5);

        store.stop_scrub();
        assert!(!store.update_from_pointer(900.0, 1000.0));
        assert_eq!(store.value(Scrubber::Opacity), 0.5);
    }

    #[test]
    fn zero_width_content_is_ignored() {
        let mut store = ParameterStore::default();
        store.start_scrub(Scrubber::Radius);
        assert!(!store.update_from_pointer(10.0, 0.0));
        assert_eq!(store.value(Scrubber::Radius), 0.8);
    }

    #[test]
    fn serializes_with_two_decimals() {
        let mut store = ParameterStore::default();
        store.set_value(Scrubber::Gain, 1.236);
        let query = store.serialize();
        assert_eq!(
            query,
            "grid=false&mode=song&view=polar&overlap=true&sharpness=3.00&gain=1.24\
             &hue=240.00&sweep=-10.00&radius=0.80&opacity=0.10"
        );

        let mut restored = ParameterStore::default();
        restored.apply(&ParameterStore::deserialize(&query));
        assert!((restored.value(Scrubber::Gain) - 1.24).abs() < 1e-6);
        assert_eq!(restored.serialize(), query);
    }

    #[test]
    fn round_trip_of_every_key() {
        let mut store = ParameterStore::default();
        store.set_flag(Toggle::Grid, true);
        store.set_flag(Toggle::Overlap, false);
        store.set_mode(Mode::Mic);
        store.set_view(View::Linear);
        store.set_value(Scrubber::Sweep, 12.5);
        store.set_value(Scrubber::Opacity, 0.35);

        let query = store.serialize();
        let mut restored = ParameterStore::default();
        restored.apply(&ParameterStore::deserialize(&query));
        assert_eq!(restored.serialize(), query);
        assert_eq!(restored.view(), View::Linear);
        assert_eq!(restored.mode(), Mode::Mic);
        assert!(restored.flag(Toggle::Grid));
    }

    #[test]
    fn accepts_json_and_bare_strings() {
        let patch = ParameterStore::deserialize("?view=\"linear\"&mode=mic&grid=true&hue=\"45\"");
        assert_eq!(patch.view, Some(View::Linear));
        assert_eq!(patch.mode, Some(Mode::Mic));
        assert_eq!(patch.grid, Some(true));
        assert_eq!(patch.hue, Some(45.0));
    }

    #[test]
    fn malformed_values_keep_previous() {
        let mut store = ParameterStore::default();
        store.set_value(Scrubber::Gain, 2.0);
        let patch =
            ParameterStore::deserialize("gain=loud&view=sideways&grid=maybe&bogus=1&sharpness=&hue");
        store.apply(&patch);
        assert_eq!(store.value(Scrubber::Gain), 2.0);
        assert_eq!(store.view(), View::Polar);
        assert!(!store.flag(Toggle::Grid));
        assert_eq!(store.value(Scrubber::Sharpness), 3.0);
        assert_eq!(store.value(Scrubber::Hue), 240.0);
    }

    #[test]
    fn restored_numbers_are_clamped() {
        let mut store = ParameterStore::default();
        store.apply(&ParameterStore::deserialize("opacity=7&sweep=-99"));
        assert_eq!(store.value(Scrubber::Opacity), 1.0);
        assert_eq!(store.value(Scrubber::Sweep), -40.0);
    }

    #[test]
    fn set_by_name() {
        let mut store = ParameterStore::default();
        store.set("view", "linear").unwrap();
        assert_eq!(store.view(), View::Linear);
        assert_eq!(
            store.set("volume", "1"),
            Err(ParamError::Unknown("volume".into()))
        );
        assert!(store.set("overlap", "nope").is_err());
        store.toggle(Toggle::Overlap);
        assert!(!store.flag(Toggle::Overlap));
    }

    #[test]
    fn patch_merge_prefers_other() {
        let mut base = ParameterStore::deserialize("hue=10&gain=2");
        base.merge(&ParameterStore::deserialize("hue=20&view=linear"));
        assert_eq!(base.hue, Some(20.0));
        assert_eq!(base.gain, Some(2.0));
        assert_eq!(base.view, Some(View::Linear));
    }
}
