use anyhow::{Context, anyhow, bail};
use fontdue::Font;
use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Card width in pixels, a bit narrower than the 1080 px frame.
pub const CARD_WIDTH: u32 = 500;

const WRAP_SLACK: f32 = 4.0;
const LEFT_RIGHT_PADDING: u32 = 8;
const TOP_PADDING: u32 = 10;
const BOTTOM_PADDING: u32 = 20;
const CORNER_RADIUS: u32 = 15;
const CARD_BACKGROUND: Rgba<u8> = Rgba([245, 245, 245, 255]);
const TITLE_COLOR: [u8; 4] = [0, 0, 0, 255];

const FALLBACK_FONTS: [&str; 3] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
];

/// The rendered title-and-logo image shown during the intro segment.
#[derive(Debug)]
pub struct OverlayCard {
    pub path: PathBuf,
    pub height: u32,
}

/// Load the configured title font, degrading to a known system font with a
/// warning when the file is missing.
pub fn load_title_font(path: &Path) -> anyhow::Result<Font> {
    match fs::read(path) {
        Ok(bytes) => Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| anyhow!("invalid font {}: {}", path.display(), e)),
        Err(_) => {
            warn!(
                "Title font not found at {}; falling back to a system font",
                path.display()
            );
            for candidate in FALLBACK_FONTS {
                if Path::new(candidate).exists() {
                    let bytes = fs::read(candidate)?;
                    return Font::from_bytes(bytes, fontdue::FontSettings::default())
                        .map_err(|e| anyhow!("invalid fallback font {}: {}", candidate, e));
                }
            }
            bail!("no usable title font found");
        }
    }
}

/// Wrap words so each line's measured width stays within `max_width`. A word
/// wider than the whole line is kept on its own line rather than dropped.
pub fn wrap_words(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", line, word)
        };
        if line.is_empty() || measure(&candidate) <= max_width {
            line = candidate;
        } else {
            lines.push(line);
            line = word.to_string();
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

pub fn line_width(font: &Font, size: f32, text: &str) -> f32 {
    text.chars().map(|c| font.metrics(c, size).advance_width).sum()
}

pub fn line_height(font: &Font, size: f32) -> u32 {
    let h = font
        .horizontal_line_metrics(size)
        .map(|m| m.new_line_size)
        .unwrap_or(size * 1.2);
    h.ceil().max(1.0) as u32
}

/// Total card height: resized logo, wrapped text block, fixed paddings.
pub fn card_height(logo_height: u32, line_height: u32, line_count: usize) -> u32 {
    logo_height + line_height * line_count as u32 + TOP_PADDING + BOTTOM_PADDING
}

pub fn render_card(
    title: &str,
    font: &Font,
    font_size: f32,
    logo_path: &Path,
    out_path: &Path,
) -> anyhow::Result<OverlayCard> {
    let logo = image::open(logo_path)
        .with_context(|| format!("failed to open logo {}", logo_path.display()))?
        .to_rgba8();
    if logo.width() == 0 {
        bail!("logo image {} has zero width", logo_path.display());
    }
    let logo_h = (logo.height() as u64 * CARD_WIDTH as u64 / logo.width() as u64) as u32;
    let logo = imageops::resize(&logo, CARD_WIDTH, logo_h.max(1), FilterType::Lanczos3);

    let lines = wrap_words(title, CARD_WIDTH as f32 - WRAP_SLACK, |s| {
        line_width(font, font_size, s)
    });
    let line_h = line_height(font, font_size);
    let height = card_height(logo.height(), line_h, lines.len());

    let mut img = RgbaImage::from_pixel(CARD_WIDTH, height, CARD_BACKGROUND);
    imageops::overlay(&mut img, &logo, 0, 0);

    let mut y = (logo.height() + TOP_PADDING) as f32;
    for line in &lines {
        draw_line(&mut img, font, font_size, LEFT_RIGHT_PADDING as f32, y, line);
        y += line_h as f32;
    }

    apply_rounded_mask(&mut img, CORNER_RADIUS);
    img.save(out_path)
        .with_context(|| format!("failed to save card to {}", out_path.display()))?;

    Ok(OverlayCard {
        path: out_path.to_path_buf(),
        height,
    })
}

fn draw_line(img: &mut RgbaImage, font: &Font, size: f32, x: f32, y: f32, text: &str) {
    let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
    layout.reset(&LayoutSettings {
        x,
        y,
        ..LayoutSettings::default()
    });
    layout.append(&[font], &TextStyle::new(text, size, 0));

    for glyph in layout.glyphs() {
        if glyph.width == 0 || glyph.height == 0 {
            continue;
        }
        let (_, bitmap) = font.rasterize_config(glyph.key);
        for (i, coverage) in bitmap.iter().enumerate() {
            if *coverage == 0 {
                continue;
            }
            let px = glyph.x as i64 + (i % glyph.width) as i64;
            let py = glyph.y as i64 + (i / glyph.width) as i64;
            if px < 0 || py < 0 || px >= img.width() as i64 || py >= img.height() as i64 {
                continue;
            }
            blend_pixel(img, px as u32, py as u32, TITLE_COLOR, *coverage);
        }
    }
}

fn blend_pixel(img: &mut RgbaImage, x: u32, y: u32, color: [u8; 4], coverage: u8) {
    let dst = img.get_pixel_mut(x, y);
    let a = coverage as u32;
    let inv = 255 - a;
    for c in 0..3 {
        dst[c] = ((color[c] as u32 * a + dst[c] as u32 * inv) / 255) as u8;
    }
}

/// Zero out the alpha of every pixel outside a rounded rectangle covering
/// the whole image.
pub(crate) fn apply_rounded_mask(img: &mut RgbaImage, radius: u32) {
    let (w, h) = (img.width(), img.height());
    let r = radius.min(w / 2).min(h / 2) as i64;
    if r == 0 {
        return;
    }
    let r2 = r * r;
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let cx = if x < r {
                Some(r - 1)
            } else if x >= w as i64 - r {
                Some(w as i64 - r)
            } else {
                None
            };
            let cy = if y < r {
                Some(r - 1)
            } else if y >= h as i64 - r {
                Some(h as i64 - r)
            } else {
                None
            };
            if let (Some(cx), Some(cy)) = (cx, cy) {
                let dx = x - cx;
                let dy = y - cy;
                if dx * dx + dy * dy > r2 {
                    img.get_pixel_mut(x as u32, y as u32)[3] = 0;
                }
            }
        }
    }
}
