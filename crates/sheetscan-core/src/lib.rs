//! Core types and utilities for bubble-sheet scanning.
//!
//! This crate holds everything the detection pipeline builds on without
//! owning an image of its own:
//! - parameter sets loaded from named configuration blocks,
//! - width-relative coordinates and circle descriptors,
//! - rotated rectangles and the fill-fraction sampler,
//! - the injected diagnostics sink and a minimal logger.

mod channels;
mod coords;
mod diagnostics;
mod fill_fraction;
mod geometry;
mod logger;
mod params;

pub use channels::{count_nonzero, extract_channel, to_gray, SCAN_CHANNELS};
pub use coords::{CircleDescriptor, Normalizer, PixelCircle};
pub use diagnostics::{
    CollectingSink, Diagnostic, DiagnosticSink, LogSink, NullSink, Severity, DIAGNOSTIC_TARGET,
};
pub use fill_fraction::filled_fraction;
pub use geometry::{is_convex, line_4connected, rotate_point, round_point, RotatedRect};
pub use params::{legacy_is_numeric, AlgorithmKind, NumericClass, ParamError, ParameterSet};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_str};
