//! Fill fraction of a rotated rectangle on a binary image.

use image::GrayImage;

use crate::geometry::{line_4connected, round_point, RotatedRect};

/// Fraction of non-zero pixels inside `region`, in `[0, 1]`.
///
/// The rectangle is rasterized as a grid aligned with its own edges: a
/// 4-connected walk along one edge picks the column starts and a second walk
/// runs down each column. On rotated rectangles this can skip isolated pixels,
/// which does not matter for the large solid regions it is used on. Pixels
/// outside the image are not sampled at all. Returns `0.0` when nothing was
/// sampled.
pub fn filled_fraction(image: &GrayImage, region: &RotatedRect) -> f32 {
    let corners = region.corners().map(round_point);
    let across_start = corners[0];
    let across_end = corners[1];
    let down = corners[3] - corners[0];

    let (w, h) = (image.width() as i64, image.height() as i64);
    let mut seen = 0_usize;
    let mut filled = 0_usize;
    for column_start in line_4connected(across_start, across_end) {
        for p in line_4connected(column_start, column_start + down) {
            let (x, y) = (p.x as i64, p.y as i64);
            if x < 0 || y < 0 || x >= w || y >= h {
                continue;
            }
            seen += 1;
            if image.get_pixel(x as u32, y as u32).0[0] != 0 {
                filled += 1;
            }
        }
    }

    if seen == 0 {
        0.0
    } else {
        filled as f32 / seen as f32
    }
}
