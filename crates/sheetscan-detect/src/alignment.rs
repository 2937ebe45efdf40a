//! De-skew and crop from two printed alignment marks.
//!
//! Marks are solid quadrilaterals on the thresholded cache. The leftmost and
//! rightmost accepted marks give the tilt; the scan is rotated level about
//! its centre and cropped to a box anchored at the leftmost mark whose sides
//! are multiples of the mark distance.

use image::{imageops, GrayImage, Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::geometry::arc_length;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use sheetscan_core::{
    filled_fraction, is_convex, rotate_point, round_point, DiagnosticSink, Normalizer,
    ParameterSet, RotatedRect,
};

use crate::DetectError;

/// Validated alignment parameters. Sizes are normalized.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// Polygon approximation tolerance as a fraction of the contour perimeter.
    pub tolerance: f32,
    /// Bounds on the short side of a mark.
    pub min_width: f32,
    pub max_width: f32,
    /// Bounds on the long side of a mark.
    pub min_height: f32,
    pub max_height: f32,
    /// Share of set pixels a mark needs; marks are printed solid.
    pub min_filled: f32,
    pub crop: CropOffsets,
}

/// Crop box sides as multiples of the mark distance, measured from the
/// leftmost mark. Signs are not restricted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropOffsets {
    pub bottom: f32,
    pub top: f32,
    pub left: f32,
    pub right: f32,
}

impl AlignmentConfig {
    pub fn from_params(params: &ParameterSet, sink: &dyn DiagnosticSink) -> Result<Self, DetectError> {
        let tolerance = params.require_non_negative("alignment-approx-tollerance", sink)?;
        let min_width = params.require_non_negative("alignment-min-width", sink)?;
        let max_width = params.require_non_negative("alignment-max-width", sink)?;
        let min_height = params.require_non_negative("alignment-min-height", sink)?;
        let max_height = params.require_non_negative("alignment-max-height", sink)?;
        let min_filled = params.require_non_negative("alignment-min-filled", sink)?;
        let crop = CropOffsets {
            bottom: params.require_float("crop-offset-fraction-bottom", sink)?,
            top: params.require_float("crop-offset-fraction-top", sink)?,
            left: params.require_float("crop-offset-fraction-left", sink)?,
            right: params.require_float("crop-offset-fraction-right", sink)?,
        };
        Ok(Self {
            tolerance,
            min_width,
            max_width,
            min_height,
            max_height,
            min_filled,
            crop,
        })
    }
}

/// An accepted mark.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMark {
    /// Centre of the mark's bounding rectangle, in pixels.
    pub center: Point2<i32>,
    /// The approximated quadrilateral.
    pub outline: Vec<Point2<f32>>,
    pub bounds: RotatedRect,
}

/// Find every contour on `cache` that passes the mark filter.
pub fn find_marks(
    cache: &GrayImage,
    basis: &Normalizer,
    cfg: &AlignmentConfig,
    sink: &dyn DiagnosticSink,
) -> Vec<AlignmentMark> {
    let contours = find_contours::<i32>(cache);
    sink.debug(format!("{} contours on the processed cache", contours.len()));

    let mut marks = Vec::new();
    for contour in &contours {
        let perimeter = arc_length(&contour.points, true) as f32;
        let points: Vec<Point2<f32>> = contour
            .points
            .iter()
            .map(|p| Point2::new(p.x as f32, p.y as f32))
            .collect();
        let outline = approximate_closed(&points, cfg.tolerance * perimeter);
        if outline.len() != 4 || !is_convex(&outline) {
            continue;
        }
        let Some(bounds) = RotatedRect::min_area(&outline) else {
            continue;
        };

        let height = basis.normalize(bounds.long_side());
        let width = basis.normalize(bounds.short_side());
        if width < cfg.min_width
            || width > cfg.max_width
            || height < cfg.min_height
            || height > cfg.max_height
        {
            continue;
        }
        if filled_fraction(cache, &bounds) < cfg.min_filled {
            continue;
        }

        marks.push(AlignmentMark {
            center: round_point(bounds.center),
            outline,
            bounds,
        });
    }
    sink.debug(format!("{} alignment marks accepted", marks.len()));
    marks
}

/// Douglas–Peucker simplification of a closed curve.
///
/// The curve is split at its first point and the point farthest from it and
/// each half is simplified on its own. A tolerance of zero keeps every
/// vertex.
pub fn approximate_closed(points: &[Point2<f32>], epsilon: f32) -> Vec<Point2<f32>> {
    if points.len() < 3 || epsilon <= 0.0 {
        return points.to_vec();
    }
    let start = points[0];
    let far = points
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            let da = (**a - start).norm_squared();
            let db = (**b - start).norm_squared();
            da.total_cmp(&db)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    if far == 0 {
        return vec![start];
    }

    let mut first_half = points[..=far].to_vec();
    let mut second_half = points[far..].to_vec();
    second_half.push(start);

    let mut keep_first = vec![false; first_half.len()];
    let mut keep_second = vec![false; second_half.len()];
    douglas_peucker(&first_half, epsilon, &mut keep_first);
    douglas_peucker(&second_half, epsilon, &mut keep_second);

    first_half = retain_marked(first_half, &keep_first);
    second_half = retain_marked(second_half, &keep_second);
    // Both halves end where the other begins.
    first_half.pop();
    second_half.pop();
    first_half.extend(second_half);
    first_half
}

fn retain_marked(points: Vec<Point2<f32>>, keep: &[bool]) -> Vec<Point2<f32>> {
    points
        .into_iter()
        .zip(keep)
        .filter_map(|(p, &k)| k.then_some(p))
        .collect()
}

fn douglas_peucker(points: &[Point2<f32>], epsilon: f32, keep: &mut [bool]) {
    let last = points.len() - 1;
    keep[0] = true;
    keep[last] = true;
    let mut stack = vec![(0, last)];
    while let Some((a, b)) = stack.pop() {
        if b <= a + 1 {
            continue;
        }
        let (mut worst, mut worst_d) = (a, -1.0_f32);
        for i in a + 1..b {
            let d = segment_distance(points[i], points[a], points[b]);
            if d > worst_d {
                worst = i;
                worst_d = d;
            }
        }
        if worst_d > epsilon {
            keep[worst] = true;
            stack.push((a, worst));
            stack.push((worst, b));
        }
    }
}

fn segment_distance(p: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    let ab = b - a;
    let len = ab.norm();
    if len <= f32::EPSILON {
        return (p - a).norm();
    }
    ab.perp(&(p - a)).abs() / len
}

/// Integer crop rectangle in the rotated scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl CropBox {
    /// Non-empty and entirely inside a `width × height` image.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x >= 0
            && self.y >= 0
            && self.x + self.width <= width as i64
            && self.y + self.height <= height as i64
    }
}

/// Everything needed to apply an alignment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignmentPlan {
    /// Tilt of the line through the reference marks.
    pub angle_rad: f32,
    /// Leftmost and rightmost marks before rotation.
    pub first: Point2<i32>,
    pub last: Point2<i32>,
    pub crop: CropBox,
}

/// Work out rotation and crop for a `width × height` scan.
pub fn plan(
    marks: &[AlignmentMark],
    width: u32,
    height: u32,
    offsets: &CropOffsets,
    sink: &dyn DiagnosticSink,
) -> Result<AlignmentPlan, DetectError> {
    let (Some(first), Some(last)) = (
        marks.iter().min_by_key(|m| m.center.x),
        marks.iter().rev().max_by_key(|m| m.center.x),
    ) else {
        let err = DetectError::NoAlignmentMarksFound;
        sink.critical(err.to_string());
        return Err(err);
    };
    let (first, last) = (first.center, last.center);

    let delta = last - first;
    let angle_rad = (delta.y as f32).atan2(delta.x as f32);
    sink.debug(format!("sheet tilted by {} degrees", angle_rad.to_degrees()));

    let center = Point2::new(width as f32 / 2.0, height as f32 / 2.0);
    let to_f32 = |p: Point2<i32>| Point2::new(p.x as f32, p.y as f32);
    let first_level = rotate_point(to_f32(first), center, -angle_rad);
    let last_level = rotate_point(to_f32(last), center, -angle_rad);
    let distance = (last_level - first_level).norm();

    let crop = CropBox {
        x: (first_level.x - distance * offsets.left) as i64,
        y: (first_level.y - distance * offsets.top) as i64,
        width: (distance * (offsets.left + offsets.right)) as i64,
        height: (distance * (offsets.bottom + offsets.top)) as i64,
    };
    if !crop.fits(width, height) {
        let err = DetectError::CropOutOfBounds {
            x: crop.x,
            y: crop.y,
            width: crop.width,
            height: crop.height,
            image_width: width,
            image_height: height,
        };
        sink.critical(err.to_string());
        return Err(err);
    }

    Ok(AlignmentPlan {
        angle_rad,
        first,
        last,
        crop,
    })
}

/// Rotate `img` level and crop it according to `plan`.
pub fn apply(img: &RgbImage, plan: &AlignmentPlan) -> RgbImage {
    let rotated;
    let level = if plan.angle_rad == 0.0 {
        img
    } else {
        rotated = rotate_about_center(img, -plan.angle_rad, Interpolation::Bilinear, Rgb([0, 0, 0]));
        &rotated
    };
    let c = plan.crop;
    imageops::crop_imm(level, c.x as u32, c.y as u32, c.width as u32, c.height as u32).to_image()
}
