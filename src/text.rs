use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fontdue::layout::{CoordinateSystem, GlyphRasterConfig, Layout, LayoutSettings};
use fontdue::{Font, FontSettings};
use tiny_skia::{Color, ColorU8, Paint, Pixmap, PremultipliedColorU8, Rect, Transform};

use crate::placement::{Point, Size};
use crate::text_atlas::{BitmapAtlas, GLYPH_ADVANCE, GLYPH_COLUMNS, GLYPH_ROWS};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub line_height: f32,
    pub color: Color,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            size: 16.0,
            line_height: 20.0,
            color: Color::BLACK,
        }
    }
}

#[derive(Debug, Clone)]
struct GlyphBitmap {
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

enum Face {
    Builtin,
    TrueType(Box<Font>),
}

/// Draws multi-line text into a raster. Line `n` starts `n * line_height`
/// pixels below the first line; there is no wrapping.
pub struct TextPainter {
    face: Face,
    glyph_cache: HashMap<GlyphRasterConfig, GlyphBitmap>,
}

impl std::fmt::Debug for TextPainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let face = match self.face {
            Face::Builtin => "builtin",
            Face::TrueType(_) => "truetype",
        };
        f.debug_struct("TextPainter")
            .field("face", &face)
            .field("cached_glyphs", &self.glyph_cache.len())
            .finish()
    }
}

impl Default for TextPainter {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TextPainter {
    pub fn builtin() -> Self {
        Self {
            face: Face::Builtin,
            glyph_cache: HashMap::new(),
        }
    }

    pub fn from_font_bytes(font_bytes: Vec<u8>) -> Result<Self> {
        let font = Font::from_bytes(font_bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font: {error}"))?;
        Ok(Self {
            face: Face::TrueType(Box::new(font)),
            glyph_cache: HashMap::new(),
        })
    }

    pub fn from_font_file(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read font file {}", path.display()))?;
        Self::from_font_bytes(bytes)
            .with_context(|| format!("invalid font file {}", path.display()))
    }

    /// Bounding size of `content` drawn with `style`; used as the intrinsic
    /// size of text overlays.
    pub fn measure(&self, content: &str, style: &TextStyle) -> Size {
        let lines = content.lines().collect::<Vec<_>>();
        if lines.is_empty() {
            return Size::default();
        }

        let (widest, glyph_height) = match &self.face {
            Face::Builtin => {
                let scale = builtin_scale(style.size) as f32;
                let widest = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
                (
                    widest as f32 * GLYPH_ADVANCE as f32 * scale,
                    GLYPH_ROWS as f32 * scale,
                )
            }
            Face::TrueType(font) => {
                let widest = lines
                    .iter()
                    .map(|line| {
                        line.chars()
                            .map(|ch| font.metrics(ch, style.size).advance_width)
                            .sum::<f32>()
                    })
                    .fold(0.0_f32, f32::max);
                (widest.ceil(), style.size.ceil())
            }
        };

        Size::new(
            widest,
            (lines.len() - 1) as f32 * style.line_height + glyph_height,
        )
    }

    pub fn draw(&mut self, target: &mut Pixmap, content: &str, origin: Point, style: &TextStyle) {
        let truetype = matches!(self.face, Face::TrueType(_));
        for (index, line) in content.lines().enumerate() {
            let y = origin.y + index as f32 * style.line_height;
            if truetype {
                self.draw_truetype_line(target, line, origin.x, y, style);
            } else {
                draw_builtin_line(target, &BitmapAtlas, line, origin.x, y, style);
            }
        }
    }

    fn draw_truetype_line(
        &mut self,
        target: &mut Pixmap,
        line: &str,
        x: f32,
        y: f32,
        style: &TextStyle,
    ) {
        let Face::TrueType(font) = &self.face else {
            return;
        };
        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x,
            y,
            max_width: None,
            max_height: None,
            horizontal_align: fontdue::layout::HorizontalAlign::Left,
            vertical_align: fontdue::layout::VerticalAlign::Top,
            line_height: 1.0,
            wrap_style: fontdue::layout::WrapStyle::Letter,
            wrap_hard_breaks: true,
        });
        layout.append(&[font.as_ref()], &fontdue::layout::TextStyle::new(line, style.size, 0));

        let color = style.color.to_color_u8();
        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let glyph_bitmap = self.glyph_cache.entry(glyph.key).or_insert_with(|| {
                let (_, bitmap) = font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    bitmap,
                }
            });
            blend_glyph(
                target,
                glyph.x.round() as i32,
                glyph.y.round() as i32,
                glyph_bitmap,
                color,
            );
        }
    }
}

fn builtin_scale(size: f32) -> u32 {
    ((size / GLYPH_ROWS as f32).round() as u32).max(1)
}

fn draw_builtin_line(
    target: &mut Pixmap,
    atlas: &BitmapAtlas,
    line: &str,
    x: f32,
    y: f32,
    style: &TextStyle,
) {
    let scale = builtin_scale(style.size);
    let cell = scale as f32;
    let mut paint = Paint::default();
    paint.set_color(style.color);
    paint.anti_alias = false;

    for (index, ch) in line.chars().enumerate() {
        let glyph_x = x + (index as u32 * GLYPH_ADVANCE * scale) as f32;
        for row in 0..GLYPH_ROWS {
            for col in 0..GLYPH_COLUMNS {
                if !atlas.sample(ch, col, row) {
                    continue;
                }
                let Some(rect) = Rect::from_xywh(
                    glyph_x + col as f32 * cell,
                    y + row as f32 * cell,
                    cell,
                    cell,
                ) else {
                    continue;
                };
                target.fill_rect(rect, &paint, Transform::identity(), None);
            }
        }
    }
}

fn blend_glyph(target: &mut Pixmap, x: i32, y: i32, glyph: &GlyphBitmap, color: ColorU8) {
    let width = target.width() as i32;
    let height = target.height() as i32;
    let pixels = target.pixels_mut();

    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= height {
            continue;
        }
        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= width {
                continue;
            }
            let coverage = glyph.bitmap[row * glyph.width + col];
            if coverage == 0 {
                continue;
            }
            let alpha = ((u16::from(coverage) * u16::from(color.alpha())) / 255) as u8;
            let idx = (py * width + px) as usize;
            pixels[idx] = source_over(pixels[idx], color, alpha);
        }
    }
}

fn source_over(dst: PremultipliedColorU8, color: ColorU8, alpha: u8) -> PremultipliedColorU8 {
    let a = u16::from(alpha);
    let inv = 255 - a;
    let channel = |src: u8, dst: u8| ((u16::from(src) * a + u16::from(dst) * inv) / 255) as u8;
    let out_alpha = (a + (u16::from(dst.alpha()) * inv) / 255).min(255) as u8;
    PremultipliedColorU8::from_rgba(
        channel(color.red(), dst.red()).min(out_alpha),
        channel(color.green(), dst.green()).min(out_alpha),
        channel(color.blue(), dst.blue()).min(out_alpha),
        out_alpha,
    )
    .unwrap_or(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_ink(target: &Pixmap, x0: u32, y0: u32, x1: u32, y1: u32) -> bool {
        (y0..y1).any(|y| (x0..x1).any(|x| target.pixel(x, y).map_or(false, |p| p.alpha() > 0)))
    }

    #[test]
    fn builtin_text_draws_each_line_one_line_height_apart() {
        let mut target = Pixmap::new(200, 80).unwrap();
        let mut painter = TextPainter::builtin();
        let style = TextStyle {
            size: 16.0,
            line_height: 40.0,
            color: Color::BLACK,
        };

        painter.draw(&mut target, "AB\nCD", Point::new(10.0, 5.0), &style);

        assert!(has_ink(&target, 10, 5, 40, 21));
        assert!(has_ink(&target, 10, 45, 40, 61));
        assert!(!has_ink(&target, 0, 22, 200, 44));
    }

    #[test]
    fn measure_accounts_for_lines_and_widest_line() {
        let painter = TextPainter::builtin();
        let style = TextStyle {
            size: 16.0,
            line_height: 20.0,
            color: Color::BLACK,
        };

        let size = painter.measure("Approved\nOK", &style);
        assert_eq!(size.width, 8.0 * 6.0 * 2.0);
        assert_eq!(size.height, 20.0 + 16.0);
        assert!(painter.measure("", &style).is_empty());
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let error = TextPainter::from_font_bytes(b"not a font".to_vec()).unwrap_err();
        assert!(error.to_string().contains("failed to parse font"));
    }

    #[test]
    fn source_over_keeps_color_within_alpha() {
        let dst = PremultipliedColorU8::from_rgba(40, 40, 40, 128).unwrap();
        let out = source_over(dst, ColorU8::from_rgba(255, 0, 0, 255), 200);
        assert!(out.red() <= out.alpha());
        assert!(out.alpha() >= 200);
    }
}
