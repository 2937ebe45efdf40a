use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ParamError;

/// Algorithm family a parameter set targets.
///
/// The string forms are the `type` attribute values found in existing
/// configuration files and must not change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmKind {
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
    #[serde(rename = "THRESH_FRAC")]
    ThresholdFraction,
    #[serde(rename = "THRESH_CONTOUR")]
    ContourAlignment,
    #[serde(rename = "THRESH_HCIRCLES")]
    HoughCircles,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 4] = [
        AlgorithmKind::Unknown,
        AlgorithmKind::ThresholdFraction,
        AlgorithmKind::ContourAlignment,
        AlgorithmKind::HoughCircles,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlgorithmKind::Unknown => "UNKNOWN",
            AlgorithmKind::ThresholdFraction => "THRESH_FRAC",
            AlgorithmKind::ContourAlignment => "THRESH_CONTOUR",
            AlgorithmKind::HoughCircles => "THRESH_HCIRCLES",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmKind {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlgorithmKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParamError::UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_through_its_name() {
        for kind in AlgorithmKind::ALL {
            assert_eq!(kind.to_string().parse::<AlgorithmKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_spelling_is_rejected() {
        let err = "thresh_frac".parse::<AlgorithmKind>().unwrap_err();
        assert!(matches!(err, ParamError::UnknownKind(ref s) if s == "thresh_frac"));
    }

    #[test]
    fn serde_uses_legacy_names() {
        let json = serde_json::to_string(&AlgorithmKind::HoughCircles).unwrap();
        assert_eq!(json, "\"THRESH_HCIRCLES\"");
    }
}
