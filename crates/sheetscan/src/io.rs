//! JSON job configuration and scan report.

use serde::{Deserialize, Serialize};
use sheetscan_core::{CircleDescriptor, Diagnostic, Severity};
use sheetscan_detect::{AlignmentOutcome, FillState};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn default_detection_document() -> String {
    "config/detection-algorithms.xml".to_string()
}

fn default_alignment_document() -> String {
    "config/alignment-algorithms.xml".to_string()
}

fn default_circle_document() -> String {
    "config/circle-algorithms.xml".to_string()
}

fn default_png_level() -> u8 {
    6
}

/// A bubble given by its normalized bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BubbleBounds {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl From<BubbleBounds> for CircleDescriptor {
    fn from(b: BubbleBounds) -> Self {
        CircleDescriptor::from_bounds(b.left, b.top, b.width, b.height)
    }
}

/// One scan to process.
///
/// Each step runs only when its algorithm name is given: `alignment` names a
/// block in `alignment_document`, `circle_finder` one in `circle_document`
/// and `detection` one in `detection_document`. Relative paths are taken
/// from the directory of the job file (see [`Self::resolve_relative_to`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJobConfig {
    pub image_path: String,
    #[serde(default = "default_detection_document")]
    pub detection_document: String,
    #[serde(default = "default_alignment_document")]
    pub alignment_document: String,
    #[serde(default = "default_circle_document")]
    pub circle_document: String,
    #[serde(default)]
    pub alignment: Option<String>,
    #[serde(default)]
    pub circle_finder: Option<String>,
    #[serde(default)]
    pub detection: Option<String>,
    /// Circles to classify. When both this and `bubbles` are empty, the
    /// circles found by `circle_finder` are classified instead.
    #[serde(default)]
    pub circles: Vec<CircleDescriptor>,
    #[serde(default)]
    pub bubbles: Vec<BubbleBounds>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub aligned_path: Option<String>,
    #[serde(default)]
    pub annotated_path: Option<String>,
    #[serde(default)]
    pub cache_path: Option<String>,
    /// PNG compression level, 0–9.
    #[serde(default = "default_png_level")]
    pub png_level: u8,
}

impl ScanJobConfig {
    /// A job with default documents and no steps.
    pub fn new(image_path: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            detection_document: default_detection_document(),
            alignment_document: default_alignment_document(),
            circle_document: default_circle_document(),
            alignment: None,
            circle_finder: None,
            detection: None,
            circles: Vec::new(),
            bubbles: Vec::new(),
            output_path: None,
            aligned_path: None,
            annotated_path: None,
            cache_path: None,
            png_level: default_png_level(),
        }
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("sheetscan_report.json"))
    }

    /// Rebase every relative path in the job onto `base`, normally the
    /// directory holding the job file.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let rebase = |path: &mut String| {
            if Path::new(path.as_str()).is_relative() {
                *path = base.join(path.as_str()).to_string_lossy().into_owned();
            }
        };
        rebase(&mut self.image_path);
        rebase(&mut self.detection_document);
        rebase(&mut self.alignment_document);
        rebase(&mut self.circle_document);
        for path in [
            &mut self.output_path,
            &mut self.aligned_path,
            &mut self.annotated_path,
            &mut self.cache_path,
        ]
        .into_iter()
        .flatten()
        {
            rebase(path);
        }
    }

    /// Explicit circles followed by the circles of every bubble box.
    pub fn listed_circles(&self) -> Vec<CircleDescriptor> {
        self.circles
            .iter()
            .copied()
            .chain(self.bubbles.iter().copied().map(CircleDescriptor::from))
            .collect()
    }
}

/// Classification of one bubble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleResult {
    pub circle: CircleDescriptor,
    #[serde(default)]
    pub state: Option<FillState>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A diagnostic in serializable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub severity: Severity,
    pub location: String,
    pub message: String,
}

impl From<&Diagnostic> for DiagnosticRecord {
    fn from(d: &Diagnostic) -> Self {
        Self {
            severity: d.severity,
            location: format!("{}:{}", d.location.file(), d.location.line()),
            message: d.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub image_path: String,
    pub config_path: String,
    /// Size of the scan after any alignment.
    #[serde(default)]
    pub image_size: Option<[u32; 2]>,
    #[serde(default)]
    pub alignment: Option<AlignmentOutcome>,
    #[serde(default)]
    pub circles_found: Vec<CircleDescriptor>,
    #[serde(default)]
    pub bubbles: Vec<BubbleResult>,
    #[serde(default)]
    pub diagnostics: Vec<DiagnosticRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ScanReport {
    /// An empty report for `cfg`.
    pub fn new(cfg: &ScanJobConfig, config_path: &Path) -> Self {
        Self {
            image_path: cfg.image_path.clone(),
            config_path: config_path.to_string_lossy().into_owned(),
            image_size: None,
            alignment: None,
            circles_found: Vec::new(),
            bubbles: Vec::new(),
            diagnostics: Vec::new(),
            error: None,
        }
    }

    pub fn filled_count(&self) -> usize {
        self.bubbles
            .iter()
            .filter(|b| b.state.is_some_and(FillState::is_filled))
            .count()
    }

    /// Record a failure of the whole run.
    pub fn set_error(&mut self, err: impl std::fmt::Display) {
        self.error = Some(err.to_string());
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
