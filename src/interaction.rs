use std::time::{Duration, Instant};

use crate::params::{Mode, ParameterStore, Scrubber, Toggle, View};
use crate::render::shape::{Vertex, Viewport};

/// How long the toolbar stays up once the pointer stops.
pub const HIDE_DELAY: Duration = Duration::from_millis(2500);
/// Height of one toolbar row in pixels.
pub const ROW_HEIGHT: f32 = 22.0;

const MOVE_THRESHOLD: f32 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pointer {
    pub x: f32,
    pub y: f32,
}

impl Pointer {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn manhattan(&self, other: Pointer) -> f32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolbarState {
    Hidden,
    Visible,
}

/// Shows the toolbar while the pointer moves and hides it again once the
/// pointer has been still for the hide delay.
///
/// Only one hide deadline exists at a time: movement clears it, stillness
/// arms it if it isn't armed already.
#[derive(Debug)]
pub struct Toolbar {
    state: ToolbarState,
    last: Pointer,
    hide_at: Option<Instant>,
    hide_delay: Duration,
}

impl Default for Toolbar {
    fn default() -> Self {
        Self::with_delay(HIDE_DELAY)
    }
}

impl Toolbar {
    pub fn with_delay(hide_delay: Duration) -> Self {
        Self {
            state: ToolbarState::Hidden,
            last: Pointer::default(),
            hide_at: None,
            hide_delay,
        }
    }

    /// Sample the pointer once per frame.
    pub fn on_pointer(&mut self, pointer: Pointer, now: Instant) -> ToolbarState {
        self.expire(now);

        let moved = pointer.manhattan(self.last) >= MOVE_THRESHOLD;
        self.last = pointer;

        if moved {
            if self.hide_at.take().is_some() {
                log::trace!("Pointer moved, hide timer cancelled");
            }
            if self.state == ToolbarState::Hidden {
                log::debug!("Toolbar shown");
            }
            self.state = ToolbarState::Visible;
        } else if self.state == ToolbarState::Visible && self.hide_at.is_none() {
            self.hide_at = Some(now + self.hide_delay);
        }

        self.state
    }

    fn expire(&mut self, now: Instant) {
        if let Some(deadline) = self.hide_at {
            if now >= deadline {
                self.hide_at = None;
                self.state = ToolbarState::Hidden;
                log::debug!("Toolbar hidden");
            }
        }
    }

    #[cfg(test)]
    fn state(&self) -> ToolbarState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state == ToolbarState::Visible
    }

    #[cfg(test)]
    fn hide_pending(&self) -> bool {
        self.hide_at.is_some()
    }
}

/// Something a click can land on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Content,
    Mode,
    PlayPause,
    View,
    Overlap,
    Grid,
    Scrubber(Scrubber),
    Fullscreen,
}

/// What the session should do in response to a click.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    StartScrub(Scrubber),
    StopScrub,
    SetMode(Mode),
    SetPlaying(bool),
    SetView(View),
    SetFlag(Toggle, bool),
    Fullscreen,
}

pub fn route_click(control: Control, params: &ParameterStore) -> Action {
    match control {
        Control::Content => Action::StopScrub,
        Control::Mode => Action::SetMode(match params.mode() {
            Mode::Song => Mode::Mic,
            Mode::Mic => Mode::Song,
        }),
        Control::PlayPause => Action::SetPlaying(!params.playing()),
        Control::View => Action::SetView(match params.view() {
            View::Polar => View::Linear,
            View::Linear => View::Polar,
        }),
        Control::Overlap => Action::SetFlag(Toggle::Overlap, !params.flag(Toggle::Overlap)),
        Control::Grid => Action::SetFlag(Toggle::Grid, !params.flag(Toggle::Grid)),
        Control::Scrubber(s) => Action::StartScrub(s),
        Control::Fullscreen => Action::Fullscreen,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolbarItem {
    pub control: Control,
    pub label: String,
}

/// Toolbar rows, top to bottom. Radius only applies to the polar view.
pub fn toolbar_items(params: &ParameterStore) -> Vec<ToolbarItem> {
    let item = |control, label: String| ToolbarItem { control, label };
    let mut items = vec![item(Control::Mode, format!("mode: {}", params.mode().as_str()))];

    if params.mode() == Mode::Song {
        let label = if params.playing() { "pause" } else { "play" };
        items.push(item(Control::PlayPause, label.into()));
    }

    items.push(item(Control::View, format!("view: {}", params.view().as_str())));
    let overlap = if params.flag(Toggle::Overlap) { "spread" } else { "overlap" };
    items.push(item(Control::Overlap, overlap.into()));
    let grid = if params.flag(Toggle::Grid) { "hide grid" } else { "show grid" };
    items.push(item(Control::Grid, grid.into()));

    for s in [
        Scrubber::Sharpness,
        Scrubber::Gain,
        Scrubber::Hue,
        Scrubber::Sweep,
        Scrubber::Opacity,
        Scrubber::Radius,
    ] {
        if s == Scrubber::Radius && params.view() != View::Polar {
            continue;
        }
        items.push(item(
            Control::Scrubber(s),
            format!("{}: {:.2}", s.name(), params.value(s)),
        ));
    }

    items.push(item(Control::Fullscreen, "fullscreen".into()));
    items
}

/// Center of toolbar row `index` out of `count`, rows stacked around the
/// vertical middle of the right-hand strip.
pub fn item_center(index: usize, count: usize, viewport: &Viewport) -> Vertex {
    let top = viewport.height / 2.0 - count as f32 * ROW_HEIGHT / 2.0;
    Vertex::new(
        viewport.width - viewport.toolbar_width / 2.0,
        top + (index as f32 + 0.5) * ROW_HEIGHT,
    )
}

/// Find the control under the pointer. A hidden toolbar can't be clicked.
pub fn hit_test(
    pointer: Pointer,
    params: &ParameterStore,
    viewport: &Viewport,
    toolbar_visible: bool,
) -> Control {
    if !toolbar_visible || pointer.x < viewport.width - viewport.toolbar_width {
        return Control::Content;
    }
    let items = toolbar_items(params);
    items
        .iter()
        .enumerate()
        .find(|(i, _)| {
            let center = item_center(*i, items.len(), viewport);
            (pointer.y - center.y).abs() <= ROW_HEIGHT / 2.0
        })
        .map(|(_, it)| it.control)
        .unwrap_or(Control::Content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn burst_then_stillness_hides_once() {
        let t0 = Instant::now();
        let mut toolbar = Toolbar::default();
        assert_eq!(toolbar.on_pointer(Pointer::new(0.0, 0.0), t0), ToolbarState::Hidden);

        for (i, x) in [5.0, 10.0, 15.0].iter().enumerate() {
            let state = toolbar.on_pointer(Pointer::new(*x, 0.0), t0 + ms(16 * (i as u64 + 1)));
            assert_eq!(state, ToolbarState::Visible);
        }
        assert!(!toolbar.hide_pending());

        let still = t0 + ms(64);
        toolbar.on_pointer(Pointer::new(15.0, 0.0), still);
        assert!(toolbar.hide_pending());

        // stillness on later frames doesn't push the deadline back
        toolbar.on_pointer(Pointer::new(15.0, 0.0), still + ms(1000));
        assert_eq!(
            toolbar.on_pointer(Pointer::new(15.0, 0.0), still + ms(2499)),
            ToolbarState::Visible
        );
        assert_eq!(
            toolbar.on_pointer(Pointer::new(15.0, 0.0), still + ms(2500)),
            ToolbarState::Hidden
        );
        assert!(!toolbar.hide_pending());
        assert_eq!(
            toolbar.on_pointer(Pointer::new(15.0, 0.0), still + ms(6000)),
            ToolbarState::Hidden
        );
    }

    #[test]
    fn movement_restarts_the_timer() {
        let t0 = Instant::now();
        let mut toolbar = Toolbar::default();
        toolbar.on_pointer(Pointer::new(10.0, 10.0), t0);
        toolbar.on_pointer(Pointer::new(10.0, 10.0), t0 + ms(100));
        assert!(toolbar.hide_pending());

        // moves again before the deadline
        toolbar.on_pointer(Pointer::new(10.5, 10.5), t0 + ms(2000));
        assert!(!toolbar.hide_pending());
        toolbar.on_pointer(Pointer::new(10.5, 10.5), t0 + ms(2100));

        assert!(toolbar.is_visible());
        assert_eq!(
            toolbar.on_pointer(Pointer::new(10.5, 10.5), t0 + ms(2700)),
            ToolbarState::Visible
        );
        assert_eq!(
            toolbar.on_pointer(Pointer::new(10.5, 10.5), t0 + ms(4600)),
            ToolbarState::Hidden
        );
    }

    #[test]
    fn sub_pixel_jitter_is_not_movement() {
        let t0 = Instant::now();
        let mut toolbar = Toolbar::default();
        toolbar.on_pointer(Pointer::new(0.0, 0.0), t0);
        toolbar.on_pointer(Pointer::new(0.4, 0.4), t0 + ms(16));
        assert_eq!(toolbar.state(), ToolbarState::Hidden);
    }

    #[test]
    fn clicks_route_to_actions() {
        let mut params = ParameterStore::default();
        assert_eq!(route_click(Control::Content, &params), Action::StopScrub);
        assert_eq!(
            route_click(Control::Scrubber(Scrubber::Hue), &params),
            Action::StartScrub(Scrubber::Hue)
        );
        assert_eq!(route_click(Control::Mode, &params), Action::SetMode(Mode::Mic));
        assert_eq!(route_click(Control::PlayPause, &params), Action::SetPlaying(false));
        assert_eq!(route_click(Control::View, &params), Action::SetView(View::Linear));
        assert_eq!(
            route_click(Control::Overlap, &params),
            Action::SetFlag(Toggle::Overlap, false)
        );
        params.set_flag(Toggle::Grid, true);
        assert_eq!(
            route_click(Control::Grid, &params),
            Action::SetFlag(Toggle::Grid, false)
        );
    }

    #[test]
    fn toolbar_lists_current_values() {
        let mut params = ParameterStore::default();
        let labels: Vec<String> = toolbar_items(&params).into_iter().map(|i| i.label).collect();
        assert_eq!(labels[0], "mode: song");
        assert_eq!(labels[1], "pause");
        assert!(labels.contains(&"sweep: -10.00".to_string()));
        assert!(labels.contains(&"radius: 0.80".to_string()));

        params.set_view(View::Linear);
        params.set_mode(Mode::Mic);
        let labels: Vec<String> = toolbar_items(&params).into_iter().map(|i| i.label).collect();
        assert!(!labels.iter().any(|l| l.starts_with("radius")));
        assert!(!labels.iter().any(|l| l == "pause" || l == "play"));
    }

    #[test]
    fn hit_test_finds_rows() {
        let params = ParameterStore::default();
        let viewport = Viewport::new(1000.0, 800.0);
        let items = toolbar_items(&params);

        for (i, item) in items.iter().enumerate() {
            let c = item_center(i, items.len(), &viewport);
            assert_eq!(
                hit_test(Pointer::new(c.x, c.y), &params, &viewport, true),
                item.control
            );
        }
        let c = item_center(0, items.len(), &viewport);
        assert_eq!(
            hit_test(Pointer::new(c.x, c.y), &params, &viewport, false),
            Control::Content
        );
        assert_eq!(
            hit_test(Pointer::new(300.0, c.y), &params, &viewport, true),
            Control::Content
        );
        assert_eq!(
            hit_test(Pointer::new(c.x, 5.0), &params, &viewport, true),
            Control::Content
        );
    }
}
