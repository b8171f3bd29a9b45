//! Annotator - snapshot bounding-box rendering
//!
//! ## Responsibilities
//!
//! - Resolve the notification rectangle scale (fractional vs 0-1000)
//! - Draw a stroked detection box at the configured width/color
//! - Draw the detection-target label with a filled background
//! - Re-encode the result as JPEG
//!
//! Annotation failure is never fatal: callers always get a usable
//! buffer back, worst case the original one.

pub mod font;

use crate::decoder::TargetRect;
use crate::error::{Error, Result};
use font::{glyph_bits, GLYPH_ADVANCE, GLYPH_HEIGHT};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};

type RgbImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Padding around the label text inside its background
const LABEL_PAD: i32 = 2;

/// Annotation settings
#[derive(Debug, Clone)]
pub struct AnnotatorConfig {
    pub enabled: bool,
    pub line_width: u32,
    pub box_color: Rgb<u8>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            line_width: 2,
            box_color: Rgb([255, 0, 0]),
        }
    }
}

/// Parse a `#RRGGBB` hex color
pub fn parse_hex_color(value: &str) -> Option<Rgb<u8>> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Rgb([r, g, b]))
}

/// Rectangle in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Scale a notification rectangle to pixels
///
/// Heuristic: any of the four values above 1 means the whole rect is
/// on the 0-1000 normalized scale; otherwise it is fractional. A rect
/// sitting exactly on the 0/1 boundary is taken as fractional.
pub fn resolve_pixel_rect(rect: &TargetRect, width: u32, height: u32) -> PixelRect {
    let values = [rect.x, rect.y, rect.w, rect.h];
    let divisor = if values.iter().any(|v| *v > 1.0) {
        1000.0
    } else {
        1.0
    };

    PixelRect {
        x: (rect.x / divisor * width as f64).round() as i32,
        y: (rect.y / divisor * height as f64).round() as i32,
        w: (rect.w / divisor * width as f64).round() as i32,
        h: (rect.h / divisor * height as f64).round() as i32,
    }
}

/// Snapshot annotator
pub struct Annotator {
    config: AnnotatorConfig,
}

impl Annotator {
    pub fn new(config: AnnotatorConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Draw the detection box and label onto a JPEG buffer
    ///
    /// Falls back to the unmodified input on any failure.
    pub fn annotate(&self, jpeg: &[u8], rect: &TargetRect, label: Option<&str>) -> Vec<u8> {
        match self.try_annotate(jpeg, rect, label) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!(error = %e, "Annotation failed, keeping original image");
                jpeg.to_vec()
            }
        }
    }

    fn try_annotate(&self, jpeg: &[u8], rect: &TargetRect, label: Option<&str>) -> Result<Vec<u8>> {
        let mut image = image::load_from_memory(jpeg)?.to_rgb8();
        let (width, height) = image.dimensions();

        let px = resolve_pixel_rect(rect, width, height);
        if px.w <= 0 || px.h <= 0 {
            return Err(Error::Annotation(format!(
                "Degenerate rectangle {:?}",
                rect
            )));
        }

        let (left, top) = (px.x, px.y);
        let (right, bottom) = (px.x + px.w - 1, px.y + px.h - 1);
        for inset in 0..self.config.line_width as i32 {
            draw_rectangle(
                &mut image,
                left + inset,
                top + inset,
                right - inset,
                bottom - inset,
                self.config.box_color,
            );
        }

        if let Some(text) = label {
            self.draw_labeled_tag(&mut image, text, px);
        }

        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, 90).encode_image(&image)?;
        Ok(buffer)
    }

    /// Label background sits just above the box, pushed below the top
    /// edge when it would clip and pulled left off the right edge
    fn draw_labeled_tag(&self, image: &mut RgbImage, text: &str, px: PixelRect) {
        let width = image.width() as i32;
        let text_width = text.chars().count() as i32 * GLYPH_ADVANCE as i32;
        let tag_w = text_width + 2 * LABEL_PAD;
        let tag_h = GLYPH_HEIGHT as i32 + 2 * LABEL_PAD;

        let mut tag_x = px.x;
        let mut tag_y = px.y - tag_h;
        if tag_y < 0 {
            tag_y = px.y + self.config.line_width as i32;
        }
        if tag_x + tag_w > width {
            tag_x = width - tag_w;
        }
        tag_x = tag_x.max(0);

        fill_rect(
            image,
            tag_x,
            tag_y,
            tag_x + tag_w - 1,
            tag_y + tag_h - 1,
            self.config.box_color,
        );
        draw_text(
            image,
            tag_x + LABEL_PAD,
            tag_y + LABEL_PAD,
            text,
            Rgb([255, 255, 255]),
        );
    }
}

fn draw_rectangle(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for x in left..=right {
        *image.get_pixel_mut(x as u32, top as u32) = color;
        *image.get_pixel_mut(x as u32, bottom as u32) = color;
    }
    for y in top..=bottom {
        *image.get_pixel_mut(left as u32, y as u32) = color;
        *image.get_pixel_mut(right as u32, y as u32) = color;
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for y in top..=bottom {
        for x in left..=right {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

fn draw_text(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;

    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col;
                        if px >= 0 && px < width {
                            *image.get_pixel_mut(px as u32, py as u32) = color;
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> TargetRect {
        TargetRect { x, y, w, h }
    }

    fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([32, 64, 96]));
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, 95)
            .encode_image(&image)
            .unwrap();
        buffer
    }

    #[test]
    fn normalized_1000_and_fractional_rects_agree() {
        let from_1000 = resolve_pixel_rect(&rect(500.0, 500.0, 100.0, 100.0), 1000, 1000);
        let from_fraction = resolve_pixel_rect(&rect(0.5, 0.5, 0.1, 0.1), 1000, 1000);

        let expected = PixelRect {
            x: 500,
            y: 500,
            w: 100,
            h: 100,
        };
        assert_eq!(from_1000, expected);
        assert_eq!(from_fraction, expected);
    }

    #[test]
    fn rect_on_unit_boundary_counts_as_fractional() {
        let px = resolve_pixel_rect(&rect(1.0, 1.0, 1.0, 1.0), 200, 100);
        assert_eq!(
            px,
            PixelRect {
                x: 200,
                y: 100,
                w: 200,
                h: 100
            }
        );
    }

    #[test]
    fn single_large_value_switches_whole_rect_to_1000_scale() {
        let px = resolve_pixel_rect(&rect(2.0, 500.0, 100.0, 100.0), 1000, 1000);
        assert_eq!(px.x, 2);
        assert_eq!(px.y, 500);
    }

    #[test]
    fn annotate_draws_box_at_resolved_position() {
        let annotator = Annotator::new(AnnotatorConfig::default());
        let jpeg = sample_jpeg(64, 64);
        let out = annotator.annotate(&jpeg, &rect(0.25, 0.25, 0.5, 0.5), Some("human"));

        let decoded = image::load_from_memory(&out).unwrap().to_rgb8();
        // Top edge of the box at (16,16); JPEG is lossy, check dominance
        let pixel = decoded.get_pixel(20, 16);
        assert!(pixel[0] > 150, "expected red stroke, got {:?}", pixel);
        assert!(pixel[1] < 100 && pixel[2] < 100);
    }

    #[test]
    fn undecodable_image_falls_back_to_original() {
        let annotator = Annotator::new(AnnotatorConfig::default());
        let out = annotator.annotate(b"not a jpeg", &rect(0.1, 0.1, 0.5, 0.5), None);
        assert_eq!(out, b"not a jpeg");
    }

    #[test]
    fn zero_size_rect_falls_back_to_original() {
        let annotator = Annotator::new(AnnotatorConfig::default());
        let jpeg = sample_jpeg(32, 32);
        let out = annotator.annotate(&jpeg, &rect(0.5, 0.5, 0.0, 0.0), None);
        assert_eq!(out, jpeg);
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_hex_color("#00FF00"), Some(Rgb([0, 255, 0])));
        assert_eq!(parse_hex_color("ff8800"), Some(Rgb([255, 136, 0])));
        assert_eq!(parse_hex_color("#short"), None);
    }
}
