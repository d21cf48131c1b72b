use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::audio::decode::AudioData;
use crate::audio::sampler::SpectrumSampler;
use crate::audio::source::{first_audio_file, AudioSource, DroppedFile, SongSource, SourceError, SourceLoader};
use crate::bands::BandTable;
use crate::interaction::{hit_test, item_center, route_click, toolbar_items, Action, Control, Pointer, Toolbar};
use crate::params::{Mode, ParameterStore, Toggle};
use crate::render::canvas::{draw_scene, Surface};
use crate::render::shape::{render, Vertex, Viewport, DEFAULT_TOOLBAR_WIDTH};

const BACKGROUND: u8 = 51;
const TOOLBAR_TEXT_SIZE: f32 = 12.0;
const TOOLBAR_TEXT: [u8; 4] = [255, 255, 255, 200];
const TOOLBAR_ACTIVE: [u8; 4] = [255, 255, 255, 255];

/// The environment a session runs in: window, canvas factory, persisted
/// parameters and fullscreen.
pub trait Host {
    type Surface: Surface;

    fn window_size(&self) -> (u32, u32);
    fn create_canvas(&mut self, width: u32, height: u32) -> Self::Surface;
    fn read_persisted(&self) -> Option<String>;
    fn write_persisted(&mut self, query: &str);
    fn request_fullscreen(&mut self);
}

/// Where the next instance gets its audio.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceSpec {
    Song { path: PathBuf, mime: Option<String> },
    Mic,
}

impl SourceSpec {
    pub fn song(path: impl Into<PathBuf>) -> Self {
        SourceSpec::Song {
            path: path.into(),
            mime: None,
        }
    }

    fn describe(&self) -> String {
        match self {
            SourceSpec::Song { path, .. } => format!("song {}", path.display()),
            SourceSpec::Mic => "microphone".into(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    pub bins: usize,
    pub smoothing: f32,
    pub volume: f32,
    pub toolbar_width: f32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            bins: crate::audio::analyzer::DEFAULT_BINS,
            smoothing: crate::audio::analyzer::DEFAULT_SMOOTHING,
            volume: 1.0,
            toolbar_width: DEFAULT_TOOLBAR_WIDTH,
        }
    }
}

/// Per-frame input sampled by the host.
#[derive(Clone, Copy, Debug)]
pub struct FrameInput {
    pub now: Instant,
    pub pointer: Pointer,
    /// The grid shortcut key is held down.
    pub grid_key: bool,
    /// Seconds since the previous frame.
    pub dt: f32,
}

/// A running sketch: the sampler bound to its source, and the canvas it
/// draws into.
pub struct SketchInstance<S> {
    spec: SourceSpec,
    sampler: SpectrumSampler,
    canvas: S,
}

impl<S: Surface> SketchInstance<S> {
    pub fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    pub fn source(&self) -> &dyn AudioSource {
        self.sampler.source()
    }

    fn teardown(self) {
        log::info!("Stopping {}", self.spec.describe());
        self.sampler.teardown();
    }
}

struct PendingLoad {
    spec: SourceSpec,
    rx: Receiver<Result<AudioData, SourceError>>,
}

enum SessionState<S> {
    Uninitialized,
    Loading(PendingLoad),
    Running(SketchInstance<S>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Loading,
    Running,
}

pub struct Session<H: Host> {
    host: H,
    loader: Arc<dyn SourceLoader>,
    settings: SessionSettings,
    state: SessionState<H::Surface>,
    params: ParameterStore,
    bands: BandTable,
    toolbar: Toolbar,
    upload: Option<DroppedFile>,
    default_song: Option<PathBuf>,
    persisted: Option<String>,
}

impl<H: Host> Session<H> {
    /// Start from `params`, then layer whatever the host has persisted on
    /// top of it.
    pub fn new(
        host: H,
        loader: Arc<dyn SourceLoader>,
        mut params: ParameterStore,
        bands: BandTable,
        settings: SessionSettings,
    ) -> Self {
        let persisted = host.read_persisted();
        if let Some(query) = persisted.as_deref() {
            log::debug!("Restoring parameters from '{}'", query);
            params.apply(&ParameterStore::deserialize(query));
        }
        Self {
            host,
            loader,
            settings,
            state: SessionState::Uninitialized,
            params,
            bands,
            toolbar: Toolbar::default(),
            upload: None,
            default_song: None,
            persisted,
        }
    }

    /// Song used by song mode when nothing has been dropped.
    pub fn with_default_song(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_song = Some(path.into());
        self
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            SessionState::Uninitialized => Phase::Uninitialized,
            SessionState::Loading(_) => Phase::Loading,
            SessionState::Running(_) => Phase::Running,
        }
    }

    pub fn instance(&self) -> Option<&SketchInstance<H::Surface>> {
        match &self.state {
            SessionState::Running(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn canvas(&self) -> Option<&H::Surface> {
        self.instance().map(|i| &i.canvas)
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn toolbar(&self) -> &Toolbar {
        &self.toolbar
    }

    pub fn upload(&self) -> Option<&DroppedFile> {
        self.upload.as_ref()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Tear down whatever is running or loading, then bring up `spec`.
    /// Songs decode on a loader thread; the session stays `Loading` until
    /// `poll` or `block_until_ready` picks the result up.
    pub fn reconfigure(&mut self, spec: SourceSpec) {
        self.teardown();
        log::info!("Loading {}", spec.describe());

        match spec {
            SourceSpec::Mic => match self.loader.open_mic() {
                Ok(source) => self.start(spec, source),
                Err(err) => log::warn!("Failed to open microphone: {}", err),
            },
            SourceSpec::Song { ref path, ref mime } => {
                let (tx, rx) = mpsc::channel();
                let loader = Arc::clone(&self.loader);
                let (path, mime) = (path.clone(), mime.clone());
                let spawned = thread::Builder::new()
                    .name("circle-loader".into())
                    .spawn(move || {
                        let result = loader.decode(&path, mime.as_deref());
                        if tx.send(result).is_err() {
                            log::debug!("Discarding superseded load of {}", path.display());
                        }
                    });
                match spawned {
                    Ok(_) => self.state = SessionState::Loading(PendingLoad { spec, rx }),
                    Err(err) => log::warn!("Failed to start loader thread: {}", err),
                }
            }
        }
    }

    /// Pick up a finished load without waiting. Returns true when running.
    pub fn poll(&mut self) -> bool {
        if let SessionState::Loading(pending) = &self.state {
            match pending.rx.try_recv() {
                Ok(result) => self.finish_load(result),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    log::warn!("Loader for {} went away", pending.spec.describe());
                    self.state = SessionState::Uninitialized;
                }
            }
        }
        self.phase() == Phase::Running
    }

    /// Wait for an in-flight load. Returns true when running.
    pub fn block_until_ready(&mut self) -> bool {
        if let SessionState::Loading(pending) = &self.state {
            match pending.rx.recv() {
                Ok(result) => self.finish_load(result),
                Err(_) => {
                    log::warn!("Loader for {} went away", pending.spec.describe());
                    self.state = SessionState::Uninitialized;
                }
            }
        }
        self.phase() == Phase::Running
    }

    fn finish_load(&mut self, result: Result<AudioData, SourceError>) {
        let SessionState::Loading(pending) =
            std::mem::replace(&mut self.state, SessionState::Uninitialized)
        else {
            return;
        };
        match result {
            Ok(audio) => {
                let name = match &pending.spec {
                    SourceSpec::Song { path, .. } => path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string()),
                    SourceSpec::Mic => "microphone".into(),
                };
                log::info!(
                    "Loaded {}: {:.1}s at {} Hz",
                    name,
                    audio.duration(),
                    audio.sample_rate
                );
                let source = SongSource::new(Arc::new(audio), name);
                self.start(pending.spec, Box::new(source));
            }
            Err(err) => {
                log::warn!("Failed to load {}: {}", pending.spec.describe(), err);
            }
        }
    }

    fn start(&mut self, spec: SourceSpec, mut source: Box<dyn AudioSource>) {
        source.set_volume(self.settings.volume);
        if !source.is_live() && self.params.playing() {
            source.play();
        }
        let sampler = SpectrumSampler::new(source, self.settings.bins, self.settings.smoothing);
        let (width, height) = self.host.window_size();
        let canvas = self.host.create_canvas(width, height);
        log::debug!("Sketch running on {}x{} canvas", width, height);
        self.state = SessionState::Running(SketchInstance {
            spec,
            sampler,
            canvas,
        });
    }

    fn teardown(&mut self) {
        match std::mem::replace(&mut self.state, SessionState::Uninitialized) {
            SessionState::Running(instance) => instance.teardown(),
            SessionState::Loading(pending) => {
                log::debug!("Abandoning load of {}", pending.spec.describe());
            }
            SessionState::Uninitialized => {}
        }
    }

    fn song_spec(&self) -> Option<SourceSpec> {
        if let Some(file) = &self.upload {
            return Some(SourceSpec::Song {
                path: file.path.clone(),
                mime: Some(file.mime.clone()),
            });
        }
        self.default_song.clone().map(SourceSpec::song)
    }

    pub fn set_song_mode(&mut self) {
        self.params.set_mode(Mode::Song);
        self.params.set_playing(true);
        match self.song_spec() {
            Some(spec) => self.reconfigure(spec),
            None => {
                self.teardown();
                log::warn!("No song to play; drop an audio file");
            }
        }
    }

    pub fn set_mic_mode(&mut self) {
        self.params.set_mode(Mode::Mic);
        self.params.set_playing(false);
        self.reconfigure(SourceSpec::Mic);
    }

    pub fn apply(&mut self, action: Action) {
        log::debug!("Action: {:?}", action);
        match action {
            Action::StartScrub(s) => self.params.start_scrub(s),
            Action::StopScrub => self.params.stop_scrub(),
            Action::SetMode(Mode::Song) => self.set_song_mode(),
            Action::SetMode(Mode::Mic) => self.set_mic_mode(),
            Action::SetPlaying(playing) => self.params.set_playing(playing),
            Action::SetView(view) => self.params.set_view(view),
            Action::SetFlag(toggle, on) => self.params.set_flag(toggle, on),
            Action::Fullscreen => self.host.request_fullscreen(),
        }
        self.persist();
    }

    /// Route a click through the toolbar. Returns the control that was hit.
    pub fn on_click(&mut self, pointer: Pointer) -> Control {
        let viewport = self.viewport();
        let visible = self.toolbar.is_visible() || self.params.scrubbing().is_some();
        let control = hit_test(pointer, &self.params, &viewport, visible);
        let action = route_click(control, &self.params);
        self.apply(action);
        control
    }

    /// Take the first `audio/*` file of a drop and switch to it. Returns
    /// false, changing nothing, when the drop has no audio.
    pub fn on_drop(&mut self, files: &[DroppedFile]) -> bool {
        let Some(file) = first_audio_file(files) else {
            log::info!("Ignoring drop of {} file(s) with no audio", files.len());
            return false;
        };
        log::info!("Dropped {} ({})", file.name, file.mime);
        self.upload = Some(file.clone());
        self.set_song_mode();
        self.persist();
        true
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let SessionState::Running(instance) = &mut self.state {
            instance.canvas.resize(width, height);
        }
    }

    fn viewport(&self) -> Viewport {
        let (width, height) = match &self.state {
            SessionState::Running(instance) => instance.canvas.size(),
            _ => self.host.window_size(),
        };
        Viewport {
            width: width as f32,
            height: height as f32,
            toolbar_width: self.settings.toolbar_width,
        }
    }

    /// Advance one frame and draw it. Returns false when nothing is
    /// running.
    pub fn tick(&mut self, input: FrameInput) -> bool {
        self.poll();
        let viewport = self.viewport();
        let SessionState::Running(instance) = &mut self.state else {
            return false;
        };

        self.toolbar.on_pointer(input.pointer, input.now);
        self.params
            .update_from_pointer(input.pointer.x, viewport.content_width());

        let source = instance.sampler.source_mut();
        if !source.is_live() {
            if self.params.playing() && !source.is_playing() {
                source.play();
            } else if !self.params.playing() && !source.is_paused() {
                source.pause();
            }
        }
        source.advance(input.dt);
        instance.sampler.refresh();

        let show_grid = self.params.flag(Toggle::Grid) || input.grid_key;
        let scene = render(
            self.bands.bands(),
            &instance.sampler,
            &self.params,
            &viewport,
            show_grid,
        );

        let canvas = &mut instance.canvas;
        canvas.background(BACKGROUND);
        draw_scene(canvas, &scene);
        if self.toolbar.is_visible() || self.params.scrubbing().is_some() {
            draw_toolbar(canvas, &self.params, &viewport);
        }

        self.persist();
        true
    }

    fn persist(&mut self) {
        let query = self.params.serialize();
        if self.persisted.as_deref() != Some(query.as_str()) {
            log::trace!("Persisting '{}'", query);
            self.host.write_persisted(&query);
            self.persisted = Some(query);
        }
    }
}

fn draw_toolbar(canvas: &mut impl Surface, params: &ParameterStore, viewport: &Viewport) {
    let left = viewport.width - viewport.toolbar_width;
    let strip = [
        Vertex::new(left, 0.0),
        Vertex::new(viewport.width, 0.0),
        Vertex::new(viewport.width, viewport.height),
        Vertex::new(left, viewport.height),
    ];
    canvas.fill_shape(&strip, [BACKGROUND, BACKGROUND, BACKGROUND, 255]);

    let items = toolbar_items(params);
    for (i, item) in items.iter().enumerate() {
        let color = match (item.control, params.scrubbing()) {
            (Control::Scrubber(s), Some(active)) if s == active => TOOLBAR_ACTIVE,
            _ => TOOLBAR_TEXT,
        };
        let at = item_center(i, items.len(), viewport);
        canvas.text(&item.label, at, TOOLBAR_TEXT_SIZE, color);
    }
}
