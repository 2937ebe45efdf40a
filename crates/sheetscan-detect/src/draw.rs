//! Thick outlines on the annotation overlay.
//!
//! `imageproc` draws one-pixel outlines; thickness is built by repetition.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use nalgebra::Point2;

pub const MARK_COLOR: Rgb<u8> = Rgb([255, 0, 255]);

pub(crate) fn circle(img: &mut RgbImage, center: Point2<i32>, radius: i32, color: Rgb<u8>, thickness: u32) {
    let t = thickness.max(1) as i32;
    for k in 0..t {
        let r = radius - (t - 1) / 2 + k;
        if r >= 0 {
            draw_hollow_circle_mut(img, (center.x, center.y), r, color);
        }
    }
}

pub(crate) fn polyline(
    img: &mut RgbImage,
    points: &[Point2<f32>],
    closed: bool,
    color: Rgb<u8>,
    thickness: u32,
) {
    if points.len() < 2 {
        return;
    }
    let t = thickness.max(1) as i32;
    let segments = points.len() - usize::from(!closed);
    for i in 0..segments {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        for dy in 0..t {
            for dx in 0..t {
                let (ox, oy) = ((dx - (t - 1) / 2) as f32, (dy - (t - 1) / 2) as f32);
                draw_line_segment_mut(img, (a.x + ox, a.y + oy), (b.x + ox, b.y + oy), color);
            }
        }
    }
}

pub(crate) fn rect(
    img: &mut RgbImage,
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    color: Rgb<u8>,
    thickness: u32,
) {
    for k in 0..thickness.max(1) as i32 {
        let (w, h) = (width - 2 * k, height - 2 * k);
        if w <= 0 || h <= 0 {
            break;
        }
        draw_hollow_rect_mut(img, Rect::at(left + k, top + k).of_size(w as u32, h as u32), color);
    }
}
