//! Candidate bubble discovery with a gradient Hough transform.

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use serde::{Deserialize, Serialize};
use sheetscan_core::{DiagnosticSink, Normalizer, ParameterSet};

use crate::DetectError;

/// Smoothing applied before gradients are taken; matches the blur `canny`
/// uses internally so gradient directions agree with the edge map.
const GRADIENT_SIGMA: f32 = 1.4;

/// Circle-finding parameters. Distances are normalized.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HoughConfig {
    /// Upper Canny threshold; the lower one is half of it.
    pub edge_threshold: f32,
    /// Votes a centre needs to be accepted.
    pub accumulator_threshold: f32,
    pub min_distance: f32,
    pub min_radius: f32,
    /// `0` means unbounded (the image size).
    pub max_radius: f32,
}

impl HoughConfig {
    pub fn from_params(params: &ParameterSet, sink: &dyn DiagnosticSink) -> Result<Self, DetectError> {
        Ok(Self {
            edge_threshold: params.require_non_negative("circle-edge-detection-thresh", sink)?,
            accumulator_threshold: params.require_non_negative("circle-accumulator-thresh", sink)?,
            min_distance: params.require_non_negative("circle-min-distance", sink)?,
            min_radius: params.require_non_negative("circle-min-radius", sink)?,
            max_radius: params.require_non_negative("circle-max-radius", sink)?,
        })
    }

    /// The same limits in whole pixels for an image of the given basis.
    pub fn to_pixels(&self, basis: &Normalizer) -> HoughLimits {
        HoughLimits {
            edge_threshold: self.edge_threshold,
            accumulator_threshold: self.accumulator_threshold,
            min_distance: basis.to_pixels(self.min_distance).max(0) as u32,
            min_radius: basis.to_pixels(self.min_radius).max(0) as u32,
            max_radius: basis.to_pixels(self.max_radius).max(0) as u32,
        }
    }
}

/// Pixel-space limits for [`hough_circles`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HoughLimits {
    pub edge_threshold: f32,
    pub accumulator_threshold: f32,
    pub min_distance: u32,
    pub min_radius: u32,
    pub max_radius: u32,
}

/// A circle in pixels, `(x, y, r)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HoughCircle {
    pub x: f32,
    pub y: f32,
    pub r: f32,
    pub votes: u32,
}

/// Find circles in `img`.
///
/// Every edge pixel votes along its gradient, in both directions, for
/// centres between `min_radius` and `max_radius` away. Centres are local
/// maxima of the 3×3-summed accumulator above the accumulator threshold,
/// visited strongest first and dropped when closer than `min_distance` to an
/// accepted centre. The radius is the best-supported edge distance.
pub fn hough_circles(img: &GrayImage, limits: &HoughLimits) -> Vec<HoughCircle> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }
    // Radii past the diagonal cannot reach an edge pixel.
    let diagonal = (w as f32).hypot(h as f32).ceil() as u32;
    let min_r = limits.min_radius;
    let max_r = if limits.max_radius == 0 {
        w.max(h)
    } else {
        limits.max_radius.min(diagonal)
    };
    if max_r < min_r {
        return Vec::new();
    }

    let edges = canny(img, limits.edge_threshold / 2.0, limits.edge_threshold);
    let smoothed = gaussian_blur_f32(img, GRADIENT_SIGMA);
    let gx = horizontal_sobel(&smoothed);
    let gy = vertical_sobel(&smoothed);

    let (wu, hu) = (w as usize, h as usize);
    let mut acc = vec![0_u32; wu * hu];
    let mut edge_points = Vec::new();
    for (x, y, p) in edges.enumerate_pixels() {
        if p.0[0] == 0 {
            continue;
        }
        edge_points.push((x as f32, y as f32));
        let vx = gx.get_pixel(x, y).0[0] as f32;
        let vy = gy.get_pixel(x, y).0[0] as f32;
        let mag = vx.hypot(vy);
        if mag == 0.0 {
            continue;
        }
        let (ux, uy) = (vx / mag, vy / mag);
        for sign in [1.0_f32, -1.0] {
            for r in min_r..=max_r {
                let cx = (x as f32 + sign * r as f32 * ux).round();
                let cy = (y as f32 + sign * r as f32 * uy).round();
                if cx < 0.0 || cy < 0.0 || cx >= w as f32 || cy >= h as f32 {
                    break;
                }
                acc[cy as usize * wu + cx as usize] += 1;
            }
        }
    }

    let summed = box3_sum(&acc, wu, hu);
    let mut candidates: Vec<usize> = (0..wu * hu)
        .filter(|&i| summed[i] as f32 > limits.accumulator_threshold && is_peak(&summed, wu, hu, i))
        .collect();
    candidates.sort_by(|a, b| summed[*b].cmp(&summed[*a]));

    let min_dist = limits.min_distance.max(1) as f32;
    let mut found: Vec<HoughCircle> = Vec::new();
    for idx in candidates {
        let (cx, cy) = refine_centre(&acc, wu, hu, idx);
        let too_close = found
            .iter()
            .any(|c| (c.x - cx).hypot(c.y - cy) < min_dist);
        if too_close {
            continue;
        }
        let Some((r, support)) = estimate_radius(&edge_points, cx, cy, min_r, max_r) else {
            continue;
        };
        if (support as f32) < limits.accumulator_threshold {
            continue;
        }
        found.push(HoughCircle {
            x: cx,
            y: cy,
            r,
            votes: summed[idx],
        });
    }
    found
}

fn box3_sum(acc: &[u32], w: usize, h: usize) -> Vec<u32> {
    let mut out = vec![0_u32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut s = 0;
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    s += acc[ny * w + nx];
                }
            }
            out[y * w + x] = s;
        }
    }
    out
}

/// Strict maximum against earlier neighbours (raster order), non-strict
/// against later ones, so a plateau yields exactly one peak.
fn is_peak(summed: &[u32], w: usize, h: usize, i: usize) -> bool {
    let (x, y) = (i % w, i / w);
    let v = summed[i];
    for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
            let j = ny * w + nx;
            if j == i {
                continue;
            }
            let n = summed[j];
            if (j < i && n >= v) || (j > i && n > v) {
                return false;
            }
        }
    }
    true
}

/// Vote-weighted centroid of the 3×3 neighbourhood.
fn refine_centre(acc: &[u32], w: usize, h: usize, i: usize) -> (f32, f32) {
    let (x, y) = (i % w, i / w);
    let (mut sx, mut sy, mut total) = (0.0_f32, 0.0_f32, 0.0_f32);
    for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
            let v = acc[ny * w + nx] as f32;
            sx += v * nx as f32;
            sy += v * ny as f32;
            total += v;
        }
    }
    if total == 0.0 {
        (x as f32, y as f32)
    } else {
        (sx / total, sy / total)
    }
}

/// Radius with the most edge pixels within half a pixel either side of it
/// (three one-pixel bins), and that support.
fn estimate_radius(
    edge_points: &[(f32, f32)],
    cx: f32,
    cy: f32,
    min_r: u32,
    max_r: u32,
) -> Option<(f32, u32)> {
    let bins = max_r as usize + 2;
    let mut count = vec![0_u32; bins];
    let mut dist_sum = vec![0.0_f32; bins];
    for &(x, y) in edge_points {
        let d = (x - cx).hypot(y - cy);
        if d < min_r as f32 || d > max_r as f32 {
            continue;
        }
        let bin = d.round() as usize;
        count[bin] += 1;
        dist_sum[bin] += d;
    }

    let mut best: Option<(usize, u32)> = None;
    for r in min_r as usize..=max_r as usize {
        let lo = r.saturating_sub(1);
        let hi = (r + 1).min(bins - 1);
        let support: u32 = count[lo..=hi].iter().sum();
        if support > 0 && best.is_none_or(|(_, s)| support > s) {
            best = Some((r, support));
        }
    }
    let (r, support) = best?;
    let lo = r.saturating_sub(1);
    let hi = (r + 1).min(bins - 1);
    let radius = dist_sum[lo..=hi].iter().sum::<f32>() / support as f32;
    Some((radius, support))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    fn disk_scene() -> GrayImage {
        let mut img = GrayImage::from_pixel(200, 150, Luma([255]));
        draw_filled_circle_mut(&mut img, (100, 75), 20, Luma([0]));
        img
    }

    fn limits() -> HoughLimits {
        HoughLimits {
            edge_threshold: 100.0,
            accumulator_threshold: 30.0,
            min_distance: 20,
            min_radius: 10,
            max_radius: 30,
        }
    }

    #[test]
    fn finds_single_disk() {
        let circles = hough_circles(&disk_scene(), &limits());
        assert_eq!(circles.len(), 1, "{circles:?}");
        let c = circles[0];
        assert!((c.x - 100.0).abs() <= 3.0, "{c:?}");
        assert!((c.y - 75.0).abs() <= 3.0, "{c:?}");
        assert!((c.r - 20.0).abs() <= 3.0, "{c:?}");
    }

    #[test]
    fn blank_image_has_no_circles() {
        let img = GrayImage::from_pixel(64, 64, Luma([255]));
        assert!(hough_circles(&img, &limits()).is_empty());
    }

    #[test]
    fn inverted_radius_range_is_empty() {
        let mut l = limits();
        l.min_radius = 40;
        l.max_radius = 30;
        assert!(hough_circles(&disk_scene(), &l).is_empty());
    }

    #[test]
    fn huge_radius_limits_are_clamped_to_the_image() {
        let mut l = limits();
        l.max_radius = 99_999_999;
        let circles = hough_circles(&disk_scene(), &l);
        assert!(!circles.is_empty());
        assert!(circles.iter().all(|c| c.r <= 251.0), "{circles:?}");

        l.min_radius = 99_999_000;
        assert!(hough_circles(&disk_scene(), &l).is_empty());
    }

    #[test]
    fn config_converts_to_pixels() {
        let cfg = HoughConfig {
            edge_threshold: 100.0,
            accumulator_threshold: 30.0,
            min_distance: 0.1,
            min_radius: 0.05,
            max_radius: 0.15,
        };
        let px = cfg.to_pixels(&Normalizer::new(200));
        assert_eq!((px.min_distance, px.min_radius, px.max_radius), (20, 10, 30));
    }

    #[test]
    fn plateau_has_one_peak() {
        let summed = vec![0, 5, 5, 0, 0, 0];
        let peaks: Vec<usize> = (0..6).filter(|&i| is_peak(&summed, 3, 2, i)).collect();
        assert_eq!(peaks, vec![1]);
    }
}
