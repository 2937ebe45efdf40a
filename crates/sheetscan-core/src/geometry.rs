//! Planar helpers: rotated rectangles, point rotation and pixel line walks.

use nalgebra::{Point2, Rotation2, Vector2};
use serde::{Deserialize, Serialize};

/// Rectangle of `width × height` rotated by `angle_deg` about `center`.
///
/// `width` runs along the direction `angle_deg` and `height` along its
/// perpendicular (image coordinates, y down).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotatedRect {
    pub center: Point2<f32>,
    pub width: f32,
    pub height: f32,
    pub angle_deg: f32,
}

impl RotatedRect {
    pub fn new(center: Point2<f32>, width: f32, height: f32, angle_deg: f32) -> Self {
        Self {
            center,
            width,
            height,
            angle_deg,
        }
    }

    /// Axis-aligned rectangle from its top-left corner.
    pub fn axis_aligned(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self::new(
            Point2::new(left + width / 2.0, top + height / 2.0),
            width,
            height,
            0.0,
        )
    }

    pub fn long_side(&self) -> f32 {
        self.width.max(self.height)
    }

    pub fn short_side(&self) -> f32 {
        self.width.min(self.height)
    }

    /// Corners ordered bottom-left, top-left, top-right, bottom-right for an
    /// unrotated rectangle. Consecutive corners share an edge.
    pub fn corners(&self) -> [Point2<f32>; 4] {
        let (sin, cos) = self.angle_deg.to_radians().sin_cos();
        let u = Vector2::new(cos, sin) * (self.width * 0.5);
        let v = Vector2::new(-sin, cos) * (self.height * 0.5);
        let c = self.center;
        [c - u + v, c - u - v, c + u - v, c + u + v]
    }

    /// Minimum-area enclosing rectangle of a convex polygon.
    ///
    /// One side of the optimal rectangle is collinear with a polygon edge, so
    /// every edge direction is tried. Returns `None` for an empty polygon and a
    /// zero-size rectangle when all vertices coincide.
    pub fn min_area(polygon: &[Point2<f32>]) -> Option<Self> {
        let first = *polygon.first()?;
        let mut best: Option<(f32, RotatedRect)> = None;

        for (i, &a) in polygon.iter().enumerate() {
            let b = polygon[(i + 1) % polygon.len()];
            let edge = b - a;
            let len = edge.norm();
            if len <= f32::EPSILON {
                continue;
            }
            let u = edge / len;
            let v = Vector2::new(-u.y, u.x);

            let (mut u_min, mut u_max) = (f32::INFINITY, f32::NEG_INFINITY);
            let (mut v_min, mut v_max) = (f32::INFINITY, f32::NEG_INFINITY);
            for p in polygon {
                let d = *p - first;
                let pu = d.dot(&u);
                let pv = d.dot(&v);
                u_min = u_min.min(pu);
                u_max = u_max.max(pu);
                v_min = v_min.min(pv);
                v_max = v_max.max(pv);
            }

            let area = (u_max - u_min) * (v_max - v_min);
            if best.as_ref().is_some_and(|(a, _)| *a <= area) {
                continue;
            }
            let center = first + u * ((u_min + u_max) * 0.5) + v * ((v_min + v_max) * 0.5);
            let rect = RotatedRect::new(
                center,
                u_max - u_min,
                v_max - v_min,
                u.y.atan2(u.x).to_degrees(),
            );
            best = Some((area, rect));
        }

        Some(
            best.map(|(_, rect)| rect)
                .unwrap_or_else(|| RotatedRect::new(first, 0.0, 0.0, 0.0)),
        )
    }
}

/// Rotate `point` about `center` by `angle_rad` (counter-clockwise in a
/// y-up frame).
pub fn rotate_point(point: Point2<f32>, center: Point2<f32>, angle_rad: f32) -> Point2<f32> {
    center + Rotation2::new(angle_rad) * (point - center)
}

/// Round a point to whole pixels, half to even.
pub fn round_point(p: Point2<f32>) -> Point2<i32> {
    Point2::new(p.x.round_ties_even() as i32, p.y.round_ties_even() as i32)
}

/// Pixels on the 4-connected digital line from `start` to `end`, both ends
/// included.
///
/// Every step moves one pixel horizontally or vertically, whichever keeps
/// the walk closer to the ideal segment, so a line visits
/// `|dx| + |dy| + 1` pixels.
pub fn line_4connected(start: Point2<i32>, end: Point2<i32>) -> Vec<Point2<i32>> {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let sx = dx.signum();
    let sy = dy.signum();
    let steps = dx.unsigned_abs() + dy.unsigned_abs();

    // Signed distance of (x, y) from the segment, scaled by its length.
    let deviation = |x: i32, y: i32| -> i64 {
        (x - start.x) as i64 * dy as i64 - (y - start.y) as i64 * dx as i64
    };

    let mut out = Vec::with_capacity(steps as usize + 1);
    let (mut x, mut y) = (start.x, start.y);
    out.push(Point2::new(x, y));
    for _ in 0..steps {
        let can_x = x != end.x;
        let can_y = y != end.y;
        let step_x = match (can_x, can_y) {
            (true, false) => true,
            (false, true) => false,
            _ => deviation(x + sx, y).abs() <= deviation(x, y + sy).abs(),
        };
        if step_x {
            x += sx;
        } else {
            y += sy;
        }
        out.push(Point2::new(x, y));
    }
    out
}

/// Signed area test for a closed polygon: true when every turn has the same
/// orientation. Collinear turns are tolerated; degenerate polygons with no
/// turn at all are not convex.
pub fn is_convex(polygon: &[Point2<f32>]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0_f32;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let c = polygon[(i + 2) % n];
        let cross = (b - a).perp(&(c - b));
        if cross == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}
