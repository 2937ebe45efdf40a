//! Detection pipeline for bubble-sheet scans.
//!
//! A [`DetectionSurface`] owns one scan. Setting it up with a
//! [`ParameterSet`](sheetscan_core::ParameterSet) builds a thresholded
//! processed cache and returns a [`Session`]; the session is then handed to
//! one of the three algorithm families:
//! - threshold-fraction: classify bubbles as filled or empty,
//! - contour-alignment: level and crop the scan from printed marks,
//! - Hough circles: find candidate bubbles.
//!
//! Every failure is a [`DetectError`]; validation problems are also reported
//! to the surface's diagnostics sink.

mod algorithm;
mod alignment;
mod draw;
mod error;
mod hough;
mod preprocess;
mod surface;
mod threshold_fraction;

pub use algorithm::Algorithm;
pub use alignment::{
    apply as apply_alignment, approximate_closed, find_marks, plan as plan_alignment,
    AlignmentConfig, AlignmentMark, AlignmentPlan, CropBox, CropOffsets,
};
pub use draw::MARK_COLOR;
pub use error::DetectError;
pub use hough::{hough_circles, HoughCircle, HoughConfig, HoughLimits};
pub use preprocess::{
    adaptive_threshold_mean, blur, channel_from_params, channel_view, preprocess,
    PreprocessConfig, DEFAULT_BLOCK_SIZE,
};
pub use surface::{AlignmentOutcome, DetectionSurface, Session};
pub use threshold_fraction::{classify, fill_ratio, FillConfig, FillState};
