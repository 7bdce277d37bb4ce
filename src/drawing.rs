//! Rendering of detections onto images.

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use crate::common::Detection;

const PALETTE_SIZE: usize = 20;
const BOX_THICKNESS: i32 = 2;
const LABEL_HEIGHT: f32 = 14.;
const LABEL_PADDING: i32 = 2;

pub fn load_font(path: &str) -> Result<FontVec> {
    let data = std::fs::read(path).with_context(|| format!("reading font {path}"))?;
    FontVec::try_from_vec(data).map_err(|e| anyhow::anyhow!("invalid font {path}: {e}"))
}

/// Colour assigned to a class, the same for every call.
pub fn class_colour(class_id: usize) -> Rgb<u8> {
    // spread neighbouring ids around the hue circle
    let slot = (class_id * 7) % PALETTE_SIZE;
    hsv_to_rgb(slot as f32 * 360. / PALETTE_SIZE as f32, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    Rgb([
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    ])
}

fn text_colour(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luma > 140. { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
}

pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.0}%", detection.get_label(), detection.confidence * 100.)
}

/// Draws a box and a label tag for every detection.
///
/// Without a font the tag is drawn as a plain coloured block sized for the text.
pub fn draw_detections(img: &mut RgbImage, detections: &[Detection], font: Option<&FontVec>) {
    let scale = PxScale::from(LABEL_HEIGHT);

    for detection in detections {
        let (x, y, w, h) = detection.bbox.as_xy_wh_i32();
        if w <= 0 || h <= 0 {
            continue;
        }
        let colour = class_colour(detection.class_id);

        for t in 0..BOX_THICKNESS {
            let rect = Rect::at(x + t, y + t).of_size((w - 2 * t).max(1) as u32, (h - 2 * t).max(1) as u32);
            draw_hollow_rect_mut(img, rect, colour);
        }

        let text = label_text(detection);
        let (tw, th) = match font {
            Some(font) => text_size(scale, font, &text),
            None => ((text.chars().count() as f32 * LABEL_HEIGHT * 0.6) as u32, LABEL_HEIGHT as u32),
        };
        let tag_w = tw as i32 + 2 * LABEL_PADDING;
        let tag_h = th as i32 + 2 * LABEL_PADDING;

        // above the box when there is room, otherwise inside its top edge
        let tag_y = if y >= tag_h { y - tag_h } else { y };
        draw_filled_rect_mut(img, Rect::at(x, tag_y).of_size(tag_w.max(1) as u32, tag_h.max(1) as u32), colour);

        if let Some(font) = font {
            draw_text_mut(img, text_colour(colour), x + LABEL_PADDING, tag_y + LABEL_PADDING, scale, font, &text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colours_are_stable_per_class() {
        assert_eq!(class_colour(3), class_colour(3));
        assert_eq!(class_colour(3), class_colour(3 + PALETTE_SIZE));
        assert_ne!(class_colour(0), class_colour(1));
    }

    #[test]
    fn label_includes_percentage() {
        let d = Detection::default().with_label("person").with_confidence(0.876);
        assert_eq!(label_text(&d), "person 88%");
    }

    #[test]
    fn draws_box_outline() {
        let mut img = RgbImage::new(100, 100);
        let d = Detection::default()
            .with_x1y1_x2y2(20., 30., 60., 80.)
            .with_class_id(2)
            .with_confidence(0.5);
        draw_detections(&mut img, &[d], None);

        let colour = class_colour(2);
        assert_eq!(*img.get_pixel(40, 30), colour);
        assert_eq!(*img.get_pixel(21, 50), colour);
        assert_eq!(*img.get_pixel(40, 55), Rgb([0, 0, 0]));
    }

    #[test]
    fn skips_degenerate_boxes() {
        let mut img = RgbImage::new(50, 50);
        let d = Detection::default().with_x1y1_x2y2(10., 10., 10., 40.).with_confidence(0.9);
        draw_detections(&mut img, &[d], None);
        assert!(img.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
