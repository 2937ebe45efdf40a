//! Dispatch from a declared [`AlgorithmKind`] to an algorithm family.

use sheetscan_core::{AlgorithmKind, DiagnosticSink, ParameterSet};

use crate::preprocess::PreprocessConfig;
use crate::DetectError;

/// One algorithm family together with its validated setup parameters.
///
/// Every family prepares its cache the same way today; the variants exist so
/// that a kind without a family can only be rejected in one place.
#[derive(Clone, Debug, PartialEq)]
pub enum Algorithm {
    ThresholdFraction(PreprocessConfig),
    ContourAlignment(PreprocessConfig),
    HoughCircles(PreprocessConfig),
}

impl Algorithm {
    /// Select the family for `params.kind()` and validate its setup
    /// parameters.
    pub fn from_params(params: &ParameterSet, sink: &dyn DiagnosticSink) -> Result<Self, DetectError> {
        let build: fn(PreprocessConfig) -> Algorithm = match params.kind() {
            AlgorithmKind::ThresholdFraction => Algorithm::ThresholdFraction,
            AlgorithmKind::ContourAlignment => Algorithm::ContourAlignment,
            AlgorithmKind::HoughCircles => Algorithm::HoughCircles,
            AlgorithmKind::Unknown => {
                let err = DetectError::UnhandledKind {
                    kind: params.kind(),
                    operation: "setup",
                };
                sink.critical(err.to_string());
                return Err(err);
            }
        };
        Ok(build(PreprocessConfig::from_params(params, sink)?))
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Algorithm::ThresholdFraction(_) => AlgorithmKind::ThresholdFraction,
            Algorithm::ContourAlignment(_) => AlgorithmKind::ContourAlignment,
            Algorithm::HoughCircles(_) => AlgorithmKind::HoughCircles,
        }
    }

    pub fn preprocess(&self) -> &PreprocessConfig {
        match self {
            Algorithm::ThresholdFraction(cfg)
            | Algorithm::ContourAlignment(cfg)
            | Algorithm::HoughCircles(cfg) => cfg,
        }
    }
}

/// Reject an operation that only one family implements.
pub(crate) fn require_kind(
    params: &ParameterSet,
    expected: AlgorithmKind,
    operation: &'static str,
    sink: &dyn DiagnosticSink,
) -> Result<(), DetectError> {
    if params.kind() == expected {
        return Ok(());
    }
    let err = DetectError::UnhandledKind {
        kind: params.kind(),
        operation,
    };
    sink.critical(err.to_string());
    Err(err)
}
