//! Bubble fill classification on a thresholded cache.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use sheetscan_core::{count_nonzero, CircleDescriptor, DiagnosticSink, Normalizer, ParameterSet};

use crate::DetectError;

/// Outcome of classifying one bubble.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillState {
    Filled,
    Empty,
}

impl FillState {
    pub fn is_filled(self) -> bool {
        self == FillState::Filled
    }
}

/// Query parameters for classification.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FillConfig {
    /// Minimum share of set pixels for a bubble to count as filled.
    pub fraction: f32,
}

impl FillConfig {
    pub fn from_params(params: &ParameterSet, sink: &dyn DiagnosticSink) -> Result<Self, DetectError> {
        let fraction = params.require_float("fraction", sink)?;
        if !(0.0..=1.0).contains(&fraction) {
            let err = DetectError::InvalidFraction {
                config: params.name().to_string(),
                value: fraction,
            };
            sink.critical(err.to_string());
            return Err(err);
        }
        Ok(Self { fraction })
    }
}

/// Share of set pixels in the square of side `2r` around the circle centre.
///
/// The square is clipped to the image. `None` when nothing is left after
/// clipping.
pub fn fill_ratio(
    cache: &GrayImage,
    basis: &Normalizer,
    circle: &CircleDescriptor,
    sink: &dyn DiagnosticSink,
) -> Option<f64> {
    let px = circle.to_pixels(basis);
    let (w, h) = (cache.width() as i64, cache.height() as i64);
    let left = px.center.x as i64 - px.radius as i64;
    let top = px.center.y as i64 - px.radius as i64;
    let side = 2 * px.radius as i64;

    let x0 = left.clamp(0, w);
    let y0 = top.clamp(0, h);
    let x1 = (left + side).clamp(0, w);
    let y1 = (top + side).clamp(0, h);
    if x1 <= x0 || y1 <= y0 {
        sink.warning(format!(
            "detection region of circle ({}, {}, {}) lies outside the image",
            circle.x, circle.y, circle.r
        ));
        return None;
    }
    if x0 != left || y0 != top || x1 != left + side || y1 != top + side {
        sink.debug("detection region clipped to the image");
    }

    let (rw, rh) = ((x1 - x0) as u32, (y1 - y0) as u32);
    let set = count_nonzero(cache, x0 as u32, y0 as u32, rw, rh);
    Some(set as f64 / (rw as f64 * rh as f64))
}

/// A region with no pixels inside the image is empty whatever the fraction.
pub fn classify(
    cache: &GrayImage,
    basis: &Normalizer,
    circle: &CircleDescriptor,
    cfg: &FillConfig,
    sink: &dyn DiagnosticSink,
) -> FillState {
    match fill_ratio(cache, basis, circle, sink) {
        Some(ratio) if ratio >= cfg.fraction as f64 => FillState::Filled,
        _ => FillState::Empty,
    }
}
