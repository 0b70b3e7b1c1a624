//! Annotated image rendering
//!
//! Draws detection outlines and "<text> (<confidence>)" labels onto a copy
//! of a frame, colored by the role each detection plays in the comparison.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, info, warn};

use super::Detection;
use crate::config::AnnotationConfig;
use crate::verification::Role;

pub const REFERENCE_COLOR: Rgb<u8> = Rgb([220, 38, 38]);

pub const SAMPLE_COLOR: Rgb<u8> = Rgb([22, 163, 74]);

pub const UNASSIGNED_COLOR: Rgb<u8> = Rgb([37, 99, 235]);

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Padding around label text, in pixels
const LABEL_PADDING: u32 = 2;

const SYSTEM_FONTS: [&str; 5] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\msyh.ttc",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Color for a detection's role. Total over every role value.
pub fn role_color(role: Option<Role>) -> Rgb<u8> {
    match role {
        Some(Role::Reference) => REFERENCE_COLOR,
        Some(Role::Sample) => SAMPLE_COLOR,
        None => UNASSIGNED_COLOR,
    }
}

/// Label drawn next to a detection
pub fn label_text(detection: &Detection) -> String {
    format!("{} ({:.2})", detection.text, detection.confidence)
}

/// Renders detections onto images
pub struct Annotator {
    font: Option<FontVec>,
    font_scale: f32,
    line_thickness: u32,
}

impl Annotator {
    /// Create an annotator, loading the configured font or the first
    /// available system font. Without a font only label boxes are drawn.
    pub fn new(config: &AnnotationConfig) -> Self {
        let font = match &config.font_path {
            Some(path) => load_font(path).or_else(|| {
                warn!("Could not load label font {:?}, trying system fonts", path);
                system_font()
            }),
            None => system_font(),
        };

        Self {
            font,
            font_scale: config.font_scale.max(1.0),
            line_thickness: config.line_thickness.max(1),
        }
    }

    /// Annotator that never renders glyphs
    pub fn without_font(line_thickness: u32, font_scale: f32) -> Self {
        Self {
            font: None,
            font_scale: font_scale.max(1.0),
            line_thickness: line_thickness.max(1),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw every detection onto a copy of `image`, in iteration order.
    /// Later boxes may cover earlier ones. `image` itself is not modified.
    pub fn annotate<'a, I>(&self, image: &RgbImage, detections: I) -> RgbImage
    where
        I: IntoIterator<Item = (&'a Detection, Option<Role>)>,
    {
        let mut canvas = image.clone();

        for (detection, role) in detections {
            let color = role_color(role);
            self.draw_outline(&mut canvas, &detection.polygon, color);
            self.draw_label(&mut canvas, detection, color);
        }

        canvas
    }

    fn draw_outline(&self, canvas: &mut RgbImage, polygon: &[(f32, f32)], color: Rgb<u8>) {
        if polygon.len() < 2 {
            return;
        }

        let t = self.line_thickness as i32;
        for dy in 0..t {
            for dx in 0..t {
                let (ox, oy) = ((dx - t / 2) as f32, (dy - t / 2) as f32);
                for i in 0..polygon.len() {
                    let (x0, y0) = polygon[i];
                    let (x1, y1) = polygon[(i + 1) % polygon.len()];
                    draw_line_segment_mut(canvas, (x0 + ox, y0 + oy), (x1 + ox, y1 + oy), color);
                }
            }
        }
    }

    fn draw_label(&self, canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
        let text = label_text(detection);
        let scale = PxScale::from(self.font_scale);

        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, &text),
            // rough fixed advance when no glyphs are available
            None => (
                (text.chars().count() as f32 * self.font_scale * 0.55).ceil() as u32,
                self.font_scale.ceil() as u32,
            ),
        };

        let box_w = text_w + 2 * LABEL_PADDING;
        let box_h = text_h + 2 * LABEL_PADDING;
        let (x, y) = label_anchor(detection, box_h);

        draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(box_w.max(1), box_h.max(1)), color);

        if let Some(font) = &self.font {
            let pad = LABEL_PADDING as i32;
            draw_text_mut(canvas, TEXT_COLOR, x + pad, y + pad, scale, font, &text);
        }
    }
}

/// Top-left of the label box: above the polygon's min-x/min-y corner,
/// pushed down to the image top when there is no room above.
fn label_anchor(detection: &Detection, box_h: u32) -> (i32, i32) {
    let (min_x, min_y) = detection.top_left();
    let x = min_x.round() as i32;
    let y = (min_y.round() as i32 - box_h as i32 - 1).max(0);
    (x, y)
}

fn load_font(path: &Path) -> Option<FontVec> {
    let data = std::fs::read(path).ok()?;
    FontVec::try_from_vec(data).ok()
}

fn system_font() -> Option<FontVec> {
    for path in SYSTEM_FONTS {
        if let Some(font) = load_font(Path::new(path)) {
            info!("Loaded label font: {}", path);
            return Some(font);
        }
    }

    debug!("No system font found, labels are drawn without text");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotator() -> Annotator {
        Annotator::without_font(2, 16.0)
    }

    fn background() -> RgbImage {
        RgbImage::from_pixel(200, 120, Rgb([240, 240, 240]))
    }

    #[test]
    fn test_label_format() {
        let d = Detection::rect(0.0, 0.0, 5.0, 5.0, "ACME-100", 0.954);
        assert_eq!(label_text(&d), "ACME-100 (0.95)");

        let d = Detection::rect(0.0, 0.0, 5.0, 5.0, "", 1.0);
        assert_eq!(label_text(&d), " (1.00)");
    }

    #[test]
    fn test_role_colors_distinct() {
        let colors = [
            role_color(Some(Role::Reference)),
            role_color(Some(Role::Sample)),
            role_color(None),
        ];
        assert_ne!(colors[0], colors[1]);
        assert_ne!(colors[1], colors[2]);
        assert_ne!(colors[0], colors[2]);
    }

    #[test]
    fn test_annotate_does_not_mutate_input() {
        let source = background();
        let snapshot = source.as_raw().clone();
        let d = Detection::rect(20.0, 40.0, 100.0, 30.0, "LOT 44B", 0.9);

        let annotated = annotator().annotate(&source, [(&d, Some(Role::Reference))]);

        assert_eq!(source.as_raw(), &snapshot);
        assert_ne!(annotated.as_raw(), &snapshot);
        assert_eq!(annotated.dimensions(), source.dimensions());
    }

    #[test]
    fn test_outline_uses_role_color() {
        let d = Detection::rect(20.0, 60.0, 100.0, 30.0, "X", 0.9);

        let reference = annotator().annotate(&background(), [(&d, Some(Role::Reference))]);
        assert_eq!(*reference.get_pixel(70, 90), REFERENCE_COLOR);

        let sample = annotator().annotate(&background(), [(&d, Some(Role::Sample))]);
        assert_eq!(*sample.get_pixel(70, 90), SAMPLE_COLOR);

        let none = annotator().annotate(&background(), [(&d, None)]);
        assert_eq!(*none.get_pixel(70, 90), UNASSIGNED_COLOR);
    }

    #[test]
    fn test_label_sits_above_polygon() {
        let d = Detection::rect(20.0, 60.0, 100.0, 30.0, "X", 0.9);
        let annotated = annotator().annotate(&background(), [(&d, Some(Role::Sample))]);

        // label box ends above the top edge of the polygon
        assert_eq!(*annotated.get_pixel(22, 50), SAMPLE_COLOR);
        // interior of the polygon stays untouched
        assert_eq!(*annotated.get_pixel(70, 75), Rgb([240, 240, 240]));
    }

    #[test]
    fn test_label_clamped_at_top_edge() {
        let d = Detection::rect(10.0, 2.0, 50.0, 20.0, "TOP", 0.5);
        assert_eq!(label_anchor(&d, 20).1, 0);
        let (x, _) = label_anchor(&d, 20);
        assert_eq!(x, 10);
    }

    #[test]
    fn test_later_detections_drawn_over_earlier() {
        let first = Detection::rect(20.0, 60.0, 100.0, 30.0, "A", 0.9);
        let second = Detection::rect(20.0, 60.0, 100.0, 30.0, "B", 0.9);

        let annotated = annotator().annotate(
            &background(),
            [(&first, Some(Role::Reference)), (&second, Some(Role::Sample))],
        );
        assert_eq!(*annotated.get_pixel(70, 90), SAMPLE_COLOR);
    }

    #[test]
    fn test_empty_detections_returns_copy() {
        let source = background();
        let annotated = annotator().annotate(&source, std::iter::empty());
        assert_eq!(annotated, source);
    }
}
