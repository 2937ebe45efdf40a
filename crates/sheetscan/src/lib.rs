//! High-level facade for the `sheetscan-*` workspace.
//!
//! This crate provides:
//! - re-exports of the parameter, geometry and detection crates,
//! - a JSON job description ([`ScanJobConfig`]) and report ([`ScanReport`]),
//! - [`run_scan`], which loads a scan and runs alignment, circle finding and
//!   bubble classification as the job asks.
//!
//! ## Quickstart
//!
//! ```no_run
//! use sheetscan::core::{CircleDescriptor, LogSink, ParameterSet};
//! use sheetscan::detect::DetectionSurface;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let params = ParameterSet::from_file(
//!     "config/detection-algorithms.xml",
//!     "Basic Threshold-Fraction Filter",
//!     &LogSink,
//! )?;
//! let mut surface = DetectionSurface::new();
//! surface.load("scan.png")?;
//! let session = surface.setup(&params)?;
//! let state = surface.classify(&session, &CircleDescriptor::new(0.2, 0.3, 0.01), &params)?;
//! println!("bubble is {state:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `sheetscan::core`: parameter sets, coordinates, geometry, diagnostics.
//! - `sheetscan::detect`: the detection surface and the algorithm families.
//! - `sheetscan::run_scan`: end-to-end helper driven by [`ScanJobConfig`].

pub use sheetscan_core as core;
pub use sheetscan_detect as detect;

pub use sheetscan_core::{AlgorithmKind, CircleDescriptor, ParamError, ParameterSet};
pub use sheetscan_detect::{DetectError, DetectionSurface, FillState, Session};

mod io;
mod run;

pub use io::{BubbleBounds, BubbleResult, DiagnosticRecord, IoError, ScanJobConfig, ScanReport};
pub use run::{load_params, run_scan, RunError, EMPTY_COLOR, FILLED_COLOR};
