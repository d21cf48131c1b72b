use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};

use super::shape::{GridMark, Scene, Vertex};
use super::text::TextOverlay;

pub type Rgba = [u8; 4];

/// Immediate-mode drawing surface the sketch renders into.
pub trait Surface {
    fn size(&self) -> (u32, u32);
    fn resize(&mut self, width: u32, height: u32);
    fn background(&mut self, gray: u8);
    fn fill_shape(&mut self, vertices: &[Vertex], color: Rgba);
    fn line(&mut self, from: Vertex, to: Vertex, color: Rgba);
    /// Draw `text` centered on `at`.
    fn text(&mut self, text: &str, at: Vertex, size: f32, color: Rgba);
}

/// Draw a scene, each band's grid just before the band itself.
pub fn draw_scene(surface: &mut impl Surface, scene: &Scene) {
    for (j, shape) in scene.shapes.iter().enumerate() {
        for grid in scene.grids.iter().filter(|g| g.band == j) {
            let color = grid.color.to_rgba();
            for mark in &grid.marks {
                match mark {
                    GridMark::Guide { from, to } => surface.line(*from, *to, color),
                    GridMark::Label { text, at, size } => surface.text(text, *at, *size, color),
                }
            }
        }
        surface.fill_shape(&shape.vertices, shape.fill.to_rgba());
    }
}

/// Software canvas backed by a tiny-skia pixmap. Shapes are filled with the
/// nonzero winding rule and no antialiasing; text goes through fontdue.
///
/// The pixmap stores premultiplied color. Every frame starts from an opaque
/// background, so the bytes handed out by `pixels` are plain RGBA.
pub struct PixelCanvas {
    width: u32,
    height: u32,
    pixmap: Option<Pixmap>,
    text: Option<TextOverlay>,
}

impl PixelCanvas {
    pub fn new(width: u32, height: u32, text: Option<TextOverlay>) -> Self {
        Self {
            width,
            height,
            pixmap: Pixmap::new(width, height),
            text,
        }
    }

    /// RGBA bytes, row major. Empty for a zero-sized canvas.
    pub fn pixels(&self) -> &[u8] {
        self.pixmap.as_ref().map(|p| p.data()).unwrap_or(&[])
    }

    #[cfg(test)]
    fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        let p = self.pixels().get(idx..idx + 4)?;
        Some([p[0], p[1], p[2], p[3]])
    }
}

fn paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = false;
    paint
}

impl Surface for PixelCanvas {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        log::debug!("Canvas resized to {}x{}", width, height);
        self.width = width;
        self.height = height;
        self.pixmap = Pixmap::new(width, height);
    }

    fn background(&mut self, gray: u8) {
        if let Some(pixmap) = self.pixmap.as_mut() {
            pixmap.fill(Color::from_rgba8(gray, gray, gray, 255));
        }
    }

    fn fill_shape(&mut self, vertices: &[Vertex], color: Rgba) {
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        if color[3] == 0 || vertices.len() < 3 || vertices.iter().any(|v| !v.is_finite()) {
            return;
        }

        let mut pb = PathBuilder::new();
        pb.move_to(vertices[0].x, vertices[0].y);
        for v in &vertices[1..] {
            pb.line_to(v.x, v.y);
        }
        pb.close();
        // all points coincide
        let Some(path) = pb.finish() else {
            return;
        };
        pixmap.fill_path(&path, &paint(color), FillRule::Winding, Transform::identity(), None);
    }

    fn line(&mut self, from: Vertex, to: Vertex, color: Rgba) {
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        if color[3] == 0 || !from.is_finite() || !to.is_finite() {
            return;
        }

        let mut pb = PathBuilder::new();
        pb.move_to(from.x, from.y);
        pb.line_to(to.x, to.y);
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width: 1.0,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint(color), &stroke, Transform::identity(), None);
    }

    fn text(&mut self, text: &str, at: Vertex, size: f32, color: Rgba) {
        let (Some(overlay), Some(pixmap)) = (self.text.as_ref(), self.pixmap.as_mut()) else {
            return;
        };
        if !at.is_finite() || text.is_empty() {
            return;
        }
        let width = overlay.measure_width(text, size) as f32;
        let x = at.x - width / 2.0;
        let y = at.y - size / 2.0;
        overlay.composite(
            pixmap.data_mut(),
            self.width,
            self.height,
            text,
            x.round() as i32,
            y.round() as i32,
            size,
            color,
        );
    }
}
