//! Width-relative ("normalized") coordinates.
//!
//! Every normalized quantity (x, y and radius alike) is a pixel value divided
//! by the image width. The vertical axis is not scaled separately, so on a
//! portrait scan valid `y` values run past `1.0`.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Converts between pixels and normalized units for one image width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normalizer {
    width: u32,
}

impl Normalizer {
    pub fn new(width: u32) -> Self {
        Self { width }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Pixel value to normalized units. A zero-width basis maps everything
    /// to `0.0`.
    #[inline]
    pub fn normalize(&self, pixels: f32) -> f32 {
        if self.width == 0 {
            return 0.0;
        }
        pixels / self.width as f32
    }

    #[inline]
    pub fn denormalize(&self, normalized: f32) -> f32 {
        normalized * self.width as f32
    }

    /// Normalized value to whole pixels, rounding half to even.
    #[inline]
    pub fn to_pixels(&self, normalized: f32) -> i32 {
        self.denormalize(normalized).round_ties_even() as i32
    }
}

/// A circle in normalized units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CircleDescriptor {
    pub x: f32,
    pub y: f32,
    pub r: f32,
}

/// A circle in whole pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelCircle {
    pub center: Point2<i32>,
    pub radius: i32,
}

impl CircleDescriptor {
    pub fn new(x: f32, y: f32, r: f32) -> Self {
        Self { x, y, r }
    }

    /// Circle inscribed in a normalized bounding box, as layout documents
    /// store bubbles.
    pub fn from_bounds(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            x: left + width / 2.0,
            y: top + height / 2.0,
            r: width.min(height) / 2.0,
        }
    }

    /// Normalize a pixel-space circle.
    pub fn from_pixels(x: f32, y: f32, r: f32, basis: &Normalizer) -> Self {
        Self {
            x: basis.normalize(x),
            y: basis.normalize(y),
            r: basis.normalize(r),
        }
    }

    pub fn to_pixels(&self, basis: &Normalizer) -> PixelCircle {
        PixelCircle {
            center: Point2::new(basis.to_pixels(self.x), basis.to_pixels(self.y)),
            radius: basis.to_pixels(self.r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn descriptor_maps_to_pixels_on_wide_image() {
        let basis = Normalizer::new(1000);
        let px = CircleDescriptor::new(0.5, 0.5, 0.05).to_pixels(&basis);
        assert_eq!(px.center, Point2::new(500, 500));
        assert_eq!(px.radius, 50);
    }

    #[test]
    fn normalize_inverts_denormalize() {
        for width in [1_u32, 7, 640, 1000, 4961] {
            let basis = Normalizer::new(width);
            for x in [0.0_f32, 0.013, 0.25, 0.5, 0.999, 1.4] {
                assert_relative_eq!(basis.normalize(basis.denormalize(x)), x, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn pixel_rounding_is_half_to_even() {
        let basis = Normalizer::new(4);
        assert_eq!(basis.to_pixels(0.625), 2);
        assert_eq!(basis.to_pixels(0.875), 4);
        assert_eq!(basis.to_pixels(0.7), 3);
    }

    #[test]
    fn zero_width_basis_never_divides_by_zero() {
        assert_eq!(Normalizer::new(0).normalize(12.0), 0.0);
    }

    #[test]
    fn bounds_become_inscribed_circle() {
        let c = CircleDescriptor::from_bounds(0.1, 0.2, 0.04, 0.06);
        assert_relative_eq!(c.x, 0.12, epsilon = 1e-6);
        assert_relative_eq!(c.y, 0.23, epsilon = 1e-6);
        assert_relative_eq!(c.r, 0.02, epsilon = 1e-6);
    }
}
