use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};
use std::path::Path;

/// Fonts tried when none is given on the command line.
const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct TextOverlay {
    font: Font,
}

impl TextOverlay {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| anyhow::anyhow!("Failed to parse font: {}", e))?;
        Ok(Self { font })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read font: {}", path.display()))?;
        Self::from_bytes(&bytes)
    }

    /// First usable font from the usual system locations.
    pub fn system() -> Option<Self> {
        SYSTEM_FONT_PATHS
            .iter()
            .map(Path::new)
            .filter(|p| p.exists())
            .find_map(|p| match Self::from_file(p) {
                Ok(overlay) => {
                    log::debug!("Using system font {}", p.display());
                    Some(overlay)
                }
                Err(err) => {
                    log::debug!("Skipping font {}: {:#}", p.display(), err);
                    None
                }
            })
    }

    /// Composite text onto an RGBA pixel buffer. `(x, y)` is the top-left
    /// corner of the text box and may lie outside the buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn composite(
        &self,
        pixels: &mut [u8],
        width: u32,
        height: u32,
        text: &str,
        x: i32,
        y: i32,
        size: f32,
        color: [u8; 4],
    ) {
        let mut cursor_x = x;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, size);
            let glyph_y = y + size as i32 - metrics.height as i32 - metrics.ymin;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }

                    let px = cursor_x + metrics.xmin + gx as i32;
                    let py = glyph_y + gy as i32;
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }

                    let idx = ((py as u32 * width + px as u32) * 4) as usize;
                    if idx + 3 >= pixels.len() {
                        continue;
                    }

                    let a = coverage as f32 / 255.0 * (color[3] as f32 / 255.0);
                    for c in 0..3 {
                        pixels[idx + c] = mix(color[c], pixels[idx + c], a);
                    }
                    pixels[idx + 3] = 255;
                }
            }

            cursor_x += metrics.advance_width.round() as i32;
        }
    }

    /// Measure the width of rendered text in pixels.
    pub fn measure_width(&self, text: &str, size: f32) -> u32 {
        let width: f32 = text
            .chars()
            .map(|ch| self.font.metrics(ch, size).advance_width)
            .sum();
        width.ceil() as u32
    }
}

/// Source-over for one channel, rounded to the nearest byte.
fn mix(src: u8, dst: u8, alpha: f32) -> u8 {
    (src as f32 * alpha + dst as f32 * (1.0 - alpha)).round() as u8
}

/// Download a font file.
pub fn load_font_from_url(url: &str) -> Result<Vec<u8>> {
    log::info!("Downloading font from {}", url);
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("Failed to request font: {}", url))?
        .error_for_status()
        .with_context(|| format!("Font request failed: {}", url))?;
    let bytes = response.bytes().context("Failed to read font body")?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_font() {
        assert!(TextOverlay::from_bytes(b"definitely not a font").is_err());
        assert!(TextOverlay::from_file(Path::new("/nonexistent/font.ttf")).is_err());
    }

    #[test]
    fn glyph_blend_rounds() {
        let half = 128.0 / 255.0;
        assert_eq!(mix(3, 0, half), 2);
        assert_eq!(mix(255, 0, half), 128);
        assert_eq!(mix(10, 200, 1.0), 10);
        assert_eq!(mix(10, 200, 0.0), 200);
    }

    #[test]
    fn system_font_draws_something() {
        let Some(overlay) = TextOverlay::system() else {
            // no fonts installed on this machine
            return;
        };
        let (w, h) = (64u32, 32u32);
        let mut pixels = vec![0u8; (w * h * 4) as usize];
        overlay.composite(&mut pixels, w, h, "A", 4, 4, 20.0, [255, 255, 255, 255]);
        assert!(pixels.chunks(4).any(|p| p[0] > 0));
        assert!(overlay.measure_width("AB", 20.0) > overlay.measure_width("A", 20.0));
    }
}
