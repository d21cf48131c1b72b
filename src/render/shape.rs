use std::f32::consts::TAU;

use crate::audio::sampler::Spectrum;
use crate::bands::NOTE_NAMES;
use crate::params::{ParameterStore, Scrubber, Toggle, View};

pub const DEFAULT_TOOLBAR_WIDTH: f32 = 150.0;

const GRID_OPACITY: f32 = 0.2;
const POLAR_PADDING: f32 = 50.0;
const LINEAR_PLOT_HEIGHT: f32 = 400.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
}

impl Vertex {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    #[cfg(test)]
    fn distance(&self, other: Vertex) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Hue in degrees, saturation and lightness in `[0, 1]`, alpha in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hsla {
    pub h: f32,
    pub s: f32,
    pub l: f32,
    pub a: f32,
}

impl Hsla {
    pub fn to_rgba(self) -> [u8; 4] {
        let h = rotate_hue(self.h, 0.0) / 60.0;
        let s = self.s.clamp(0.0, 1.0);
        let l = self.l.clamp(0.0, 1.0);
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = l - c / 2.0;
        let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        let alpha = if self.a.is_finite() { self.a.clamp(0.0, 1.0) } else { 0.0 };
        [to_byte(r), to_byte(g), to_byte(b), (alpha * 255.0).round() as u8]
    }
}

/// Rotate a hue by `dh` degrees, staying in `[0, 360)`.
pub fn rotate_hue(h: f32, dh: f32) -> f32 {
    let x = (h + dh) % 360.0;
    let x = if x < 0.0 { x + 360.0 } else { x };
    // -1e-6 + 360 rounds to 360 in f32
    if x >= 360.0 || !x.is_finite() {
        0.0
    } else {
        x
    }
}

/// Window size and the strip reserved for the toolbar on either side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub toolbar_width: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            toolbar_width: DEFAULT_TOOLBAR_WIDTH,
        }
    }

    /// Width the pointer sweeps over while scrubbing.
    pub fn content_width(&self) -> f32 {
        self.width - self.toolbar_width
    }

    /// Largest square that fits the window.
    pub fn edge(&self) -> f32 {
        self.width.min(self.height)
    }

    pub fn content_rect(&self, view: View) -> Rect {
        let pad_y = match view {
            View::Polar => POLAR_PADDING,
            View::Linear => (self.height - LINEAR_PLOT_HEIGHT) / 2.0,
        };
        Rect {
            x: self.toolbar_width,
            y: pad_y,
            width: self.width - self.toolbar_width * 2.0,
            height: self.height - pad_y * 2.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BandShape {
    pub vertices: Vec<Vertex>,
    pub fill: Hsla,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GridMark {
    Guide { from: Vertex, to: Vertex },
    Label { text: &'static str, at: Vertex, size: f32 },
}

/// Note grid drawn just before the shape of band `band`.
#[derive(Clone, Debug, PartialEq)]
pub struct GridOverlay {
    pub band: usize,
    pub marks: Vec<GridMark>,
    pub color: Hsla,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    pub shapes: Vec<BandShape>,
    pub grids: Vec<GridOverlay>,
}

/// Turn the current spectrum into one filled shape per octave band.
pub fn render(
    bands: &[Vec<f32>],
    spectrum: &impl Spectrum,
    params: &ParameterStore,
    viewport: &Viewport,
    show_grid: bool,
) -> Scene {
    let mut scene = Scene::default();
    if bands.is_empty() {
        return scene;
    }

    let style = Style::from_params(params);
    let rect = viewport.content_rect(params.view());
    let octaves = bands.len() as f32;
    let mut hue = style.hue;
    let mut grid_pending = show_grid;

    match params.view() {
        View::Polar => {
            let octave_edge = if style.overlap {
                viewport.edge()
            } else {
                rect.width / octaves
            };
            let outer = octave_edge / 3.0;
            let inner = octave_edge / 6.0 * style.radius;

            for (j, band) in bands.iter().enumerate() {
                let Some(&first) = band.first() else {
                    continue;
                };
                let center = Vertex::new(
                    if style.overlap {
                        rect.x + rect.width / 2.0
                    } else {
                        rect.x + octave_edge * (j as f32 + 0.5)
                    },
                    rect.y + rect.height / 2.0,
                );

                if grid_pending {
                    scene
                        .grids
                        .push(polar_grid(scene.shapes.len(), center, outer, style.overlap));
                    grid_pending = !style.overlap;
                }

                let steps = band.len() as f32;
                let vertex = |freq: f32, i: usize| {
                    let r = style.amplitude(spectrum.energy_at(freq)) * (outer - inner) * style.gain
                        + inner;
                    let angle = i as f32 / steps * TAU;
                    Vertex::new(center.x + r * angle.cos(), center.y + r * angle.sin())
                };

                let mut vertices: Vec<Vertex> =
                    band.iter().enumerate().map(|(i, &f)| vertex(f, i)).collect();
                vertices.push(vertex(first, 0));

                scene.shapes.push(BandShape {
                    vertices,
                    fill: style.fill(hue),
                });
                hue = rotate_hue(hue, style.sweep);
            }
        }
        View::Linear => {
            let octave_width = if style.overlap {
                rect.width
            } else {
                rect.width / octaves
            };
            let bottom = rect.y + rect.height;

            for (j, band) in bands.iter().enumerate() {
                if band.is_empty() {
                    continue;
                }
                let x_offset = if style.overlap {
                    0.0
                } else {
                    octave_width * j as f32
                };

                if grid_pending {
                    scene
                        .grids
                        .push(linear_grid(
                            scene.shapes.len(),
                            &rect,
                            x_offset,
                            octave_width,
                            style.overlap,
                        ));
                    grid_pending = !style.overlap;
                }

                let spacing = if band.len() > 1 {
                    octave_width / (band.len() - 1) as f32
                } else {
                    0.0
                };
                let left = rect.x + x_offset;

                let mut vertices = Vec::with_capacity(band.len() + 3);
                vertices.push(Vertex::new(left, bottom));
                vertices.extend(band.iter().enumerate().map(|(i, &f)| {
                    let y = style.amplitude(spectrum.energy_at(f)) * rect.height * style.gain;
                    Vertex::new(left + spacing * i as f32, bottom - y)
                }));
                vertices.push(Vertex::new(left + octave_width, bottom));
                vertices.push(Vertex::new(left, bottom));

                scene.shapes.push(BandShape {
                    vertices,
                    fill: style.fill(hue),
                });
                hue = rotate_hue(hue, style.sweep);
            }
        }
    }

    scene
}

/// Parameter values read once per frame.
struct Style {
    sharpness: f32,
    gain: f32,
    hue: f32,
    sweep: f32,
    radius: f32,
    opacity: f32,
    overlap: bool,
}

impl Style {
    fn from_params(params: &ParameterStore) -> Self {
        Self {
            sharpness: params.value(Scrubber::Sharpness),
            gain: params.value(Scrubber::Gain),
            hue: params.value(Scrubber::Hue),
            sweep: params.value(Scrubber::Sweep),
            radius: params.value(Scrubber::Radius),
            opacity: params.value(Scrubber::Opacity),
            overlap: params.flag(Toggle::Overlap),
        }
    }

    /// `(energy / 255) ^ sharpness`, zero for anything that isn't a number.
    fn amplitude(&self, energy: f32) -> f32 {
        let a = (energy / 255.0).powf(self.sharpness);
        if a.is_finite() {
            a.max(0.0)
        } else {
            0.0
        }
    }

    fn fill(&self, hue: f32) -> Hsla {
        Hsla {
            h: hue.round(),
            s: 1.0,
            l: 0.5,
            a: self.opacity,
        }
    }
}

fn grid_color() -> Hsla {
    Hsla {
        h: 0.0,
        s: 0.0,
        l: 1.0,
        a: GRID_OPACITY,
    }
}

fn label_size(overlap: bool) -> f32 {
    if overlap {
        14.0
    } else {
        8.0
    }
}

fn polar_grid(band: usize, center: Vertex, radius: f32, overlap: bool) -> GridOverlay {
    let mut marks = Vec::with_capacity(NOTE_NAMES.len() * 2);
    for (i, &note) in NOTE_NAMES.iter().enumerate() {
        let angle = i as f32 / NOTE_NAMES.len() as f32 * TAU;
        let (sin, cos) = angle.sin_cos();
        marks.push(GridMark::Guide {
            from: center,
            to: Vertex::new(center.x + radius * cos, center.y + radius * sin),
        });
        if !note.is_empty() {
            marks.push(GridMark::Label {
                text: note,
                at: Vertex::new(center.x + radius * 1.1 * cos, center.y + radius * 1.1 * sin),
                size: label_size(overlap),
            });
        }
    }
    GridOverlay {
        band,
        marks,
        color: grid_color(),
    }
}

fn linear_grid(band: usize, rect: &Rect, x_offset: f32, width: f32, overlap: bool) -> GridOverlay {
    let intervals = (NOTE_NAMES.len() - 1) as f32;
    let top = rect.y;
    let bottom = rect.y + rect.height;
    let above = rect.y - 0.04 * rect.height;

    let mut marks = Vec::with_capacity(NOTE_NAMES.len() * 2);
    for (i, &note) in NOTE_NAMES.iter().enumerate() {
        let x = rect.x + x_offset + width / intervals * i as f32;
        marks.push(GridMark::Guide {
            from: Vertex::new(x, bottom),
            to: Vertex::new(x, top),
        });
        if !note.is_empty() {
            marks.push(GridMark::Label {
                text: note,
                at: Vertex::new(x, above),
                size: label_size(overlap),
            });
        }
    }
    GridOverlay {
        band,
        marks,
        color: grid_color(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::generate_bands;

    struct Constant(f32);

    impl Spectrum for Constant {
        fn energy_at(&self, _hz: f32) -> f32 {
            self.0
        }
    }

    fn full_circle_params() -> ParameterStore {
        let mut params = ParameterStore::default();
        params.set_value(Scrubber::Sharpness, 1.0);
        params.set_value(Scrubber::Gain, 1.0);
        params.set_value(Scrubber::Radius, 0.0);
        params
    }

    #[test]
    fn hue_rotation_wraps() {
        assert_eq!(rotate_hue(350.0, 20.0), 10.0);
        assert_eq!(rotate_hue(10.0, -20.0), 350.0);
        assert_eq!(rotate_hue(0.0, -720.0), 0.0);
        for h in [-1000.0f32, -360.0, -0.5, 0.0, 359.9, 360.0, 12345.6] {
            for dh in [-40.0f32, -1e-7, 0.0, 40.0, 1e6] {
                let r = rotate_hue(h, dh);
                assert!((0.0..360.0).contains(&r), "rotate_hue({}, {}) = {}", h, dh, r);
            }
        }
    }

    #[test]
    fn full_energy_draws_outer_circles() {
        let bands = generate_bands(27.5, 8, 24).unwrap();
        let viewport = Viewport::new(1200.0, 800.0);
        let scene = render(&bands, &Constant(255.0), &full_circle_params(), &viewport, false);

        let outer = viewport.edge() / 3.0;
        let rect = viewport.content_rect(View::Polar);
        let center = Vertex::new(rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);

        assert_eq!(scene.shapes.len(), 8);
        assert!(scene.grids.is_empty());
        for shape in &scene.shapes {
            assert_eq!(shape.vertices.len(), 25);
            assert_eq!(shape.vertices[0], shape.vertices[24]);
            for v in &shape.vertices {
                assert!((v.distance(center) - outer).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn silence_collapses_to_inner_radius() {
        let bands = generate_bands(27.5, 2, 12).unwrap();
        let viewport = Viewport::new(900.0, 900.0);
        let mut params = ParameterStore::default();
        params.set_value(Scrubber::Radius, 0.5);
        let scene = render(&bands, &Constant(0.0), &params, &viewport, false);

        let inner = viewport.edge() / 6.0 * 0.5;
        let rect = viewport.content_rect(View::Polar);
        let center = Vertex::new(rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);
        for v in &scene.shapes[0].vertices {
            assert!((v.distance(center) - inner).abs() < 1e-3);
        }
    }

    #[test]
    fn spread_bands_walk_across_the_content() {
        let bands = generate_bands(27.5, 4, 24).unwrap();
        let viewport = Viewport::new(1300.0, 700.0);
        let mut params = full_circle_params();
        params.set_flag(Toggle::Overlap, false);
        let scene = render(&bands, &Constant(255.0), &params, &viewport, true);

        let rect = viewport.content_rect(View::Polar);
        let edge = rect.width / 4.0;
        for (j, shape) in scene.shapes.iter().enumerate() {
            // step 0 sits at angle 0, to the right of the band center
            let first = shape.vertices[0];
            let cx = rect.x + edge * (j as f32 + 0.5);
            assert!((first.x - (cx + edge / 3.0)).abs() < 1e-3);
            assert!((first.y - (rect.y + rect.height / 2.0)).abs() < 1e-3);
        }
        // one grid per band when spread out
        assert_eq!(scene.grids.len(), 4);
        assert_eq!(scene.grids[3].band, 3);
    }

    #[test]
    fn overlapping_grid_is_drawn_once() {
        let bands = generate_bands(27.5, 8, 24).unwrap();
        let viewport = Viewport::new(1200.0, 800.0);
        let scene = render(&bands, &Constant(100.0), &ParameterStore::default(), &viewport, true);
        assert_eq!(scene.grids.len(), 1);

        let grid = &scene.grids[0];
        let guides = grid
            .marks
            .iter()
            .filter(|m| matches!(m, GridMark::Guide { .. }))
            .count();
        let labels: Vec<&str> = grid
            .marks
            .iter()
            .filter_map(|m| match m {
                GridMark::Label { text, size, .. } => {
                    assert_eq!(*size, 14.0);
                    Some(*text)
                }
                _ => None,
            })
            .collect();
        assert_eq!(guides, 12);
        assert_eq!(labels, vec!["A", "B", "C", "D", "E", "F", "G"]);
        assert_eq!(grid.color.a, 0.2);
    }

    #[test]
    fn sweep_rotates_each_band() {
        let bands = generate_bands(27.5, 3, 24).unwrap();
        let mut params = ParameterStore::default();
        params.set_value(Scrubber::Hue, 10.0);
        params.set_value(Scrubber::Sweep, -15.0);
        params.set_value(Scrubber::Opacity, 0.4);
        let scene = render(&bands, &Constant(50.0), &params, &Viewport::new(800.0, 600.0), false);

        let hues: Vec<f32> = scene.shapes.iter().map(|s| s.fill.h).collect();
        assert_eq!(hues, vec![10.0, 355.0, 340.0]);
        assert!(scene.shapes.iter().all(|s| s.fill.a == 0.4 && s.fill.s == 1.0));
    }

    #[test]
    fn linear_shapes_close_on_the_baseline() {
        let bands = generate_bands(27.5, 2, 24).unwrap();
        let viewport = Viewport::new(1000.0, 800.0);
        let mut params = full_circle_params();
        params.set_view(View::Linear);
        params.set_flag(Toggle::Overlap, false);
        let scene = render(&bands, &Constant(255.0), &params, &viewport, false);

        let rect = viewport.content_rect(View::Linear);
        assert_eq!(rect.height, 400.0);
        let bottom = rect.y + rect.height;
        let width = rect.width / 2.0;

        let second = &scene.shapes[1].vertices;
        assert_eq!(second.len(), 24 + 3);
        assert_eq!(second[0], Vertex::new(rect.x + width, bottom));
        assert_eq!(second[25], Vertex::new(rect.x + 2.0 * width, bottom));
        assert_eq!(second[26], second[0]);
        // full energy reaches the top of the plot
        assert!((second[1].y - rect.y).abs() < 1e-3);
        assert!((second[24].x - (rect.x + 2.0 * width)).abs() < 1e-3);
    }

    #[test]
    fn linear_grid_labels_sit_above_the_plot() {
        let bands = generate_bands(27.5, 2, 24).unwrap();
        let viewport = Viewport::new(1000.0, 800.0);
        let mut params = ParameterStore::default();
        params.set_view(View::Linear);
        let scene = render(&bands, &Constant(0.0), &params, &viewport, true);

        let rect = viewport.content_rect(View::Linear);
        let grid = &scene.grids[0];
        let xs: Vec<f32> = grid
            .marks
            .iter()
            .filter_map(|m| match m {
                GridMark::Guide { from, .. } => Some(from.x),
                _ => None,
            })
            .collect();
        assert_eq!(xs.len(), 12);
        assert_eq!(xs[0], rect.x);
        assert!((xs[11] - (rect.x + rect.width)).abs() < 1e-3);
        for m in &grid.marks {
            if let GridMark::Label { at, .. } = m {
                assert!((at.y - (rect.y - 16.0)).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn garbage_input_does_not_panic() {
        let bands = generate_bands(27.5, 2, 24).unwrap();
        let viewport = Viewport::new(0.0, 0.0);
        let scene = render(&bands, &Constant(f32::NAN), &ParameterStore::default(), &viewport, true);
        assert_eq!(scene.shapes.len(), 2);
        for shape in &scene.shapes {
            assert!(shape.vertices.iter().all(|v| v.is_finite()));
        }
        assert!(render(&[], &Constant(1.0), &ParameterStore::default(), &viewport, true)
            .shapes
            .is_empty());
    }

    #[test]
    fn empty_bands_are_skipped() {
        let band = generate_bands(27.5, 1, 12).unwrap().remove(0);
        let bands = vec![Vec::new(), band.clone(), Vec::new()];
        let viewport = Viewport::new(800.0, 600.0);

        for view in [View::Polar, View::Linear] {
            for overlap in [true, false] {
                let mut params = ParameterStore::default();
                params.set_view(view);
                params.set_flag(Toggle::Overlap, overlap);
                let scene = render(&bands, &Constant(80.0), &params, &viewport, true);

                assert_eq!(scene.shapes.len(), 1);
                assert!(scene.grids.iter().all(|g| g.band == 0));
                assert!(!scene.grids.is_empty());
                let alone = render(&[band.clone()], &Constant(80.0), &params, &viewport, true);
                assert_eq!(scene.shapes[0].fill, alone.shapes[0].fill);
            }
        }
        assert!(render(&[Vec::new()], &Constant(1.0), &ParameterStore::default(), &viewport, true)
            .shapes
            .is_empty());
    }

    #[test]
    fn hsla_to_rgba() {
        let blue = Hsla { h: 240.0, s: 1.0, l: 0.5, a: 1.0 };
        assert_eq!(blue.to_rgba(), [0, 0, 255, 255]);
        let red = Hsla { h: 360.0, s: 1.0, l: 0.5, a: 0.5 };
        assert_eq!(red.to_rgba(), [255, 0, 0, 128]);
        assert_eq!(grid_color().to_rgba(), [255, 255, 255, 51]);
    }
}
