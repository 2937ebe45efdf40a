//! End-to-end scan of one sheet.

use std::path::Path;
use std::sync::Arc;

use image::Rgb;
use sheetscan_core::{DiagnosticSink, ParamError, ParameterSet};
use sheetscan_detect::{DetectError, DetectionSurface, FillState};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::io::{BubbleResult, IoError, ScanJobConfig, ScanReport};

/// Outline colour of a bubble classified as filled.
pub const FILLED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Outline colour of a bubble classified as empty.
pub const EMPTY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Io(#[from] IoError),
}

/// Load the block `name` of the document at `path`.
///
/// A missing block is an error here: the job asked for it by name.
pub fn load_params(
    path: impl AsRef<Path>,
    name: &str,
    sink: &dyn DiagnosticSink,
) -> Result<ParameterSet, ParamError> {
    let params = ParameterSet::from_file(path, name, sink)?;
    sink.debug(format!("{params}"));
    Ok(params)
}

/// Run every step `cfg` asks for: align, find circles, classify, save.
///
/// Classification failures of single bubbles are recorded in the report;
/// anything else aborts the run.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(cfg, config_path, sink), fields(image = %cfg.image_path))
)]
pub fn run_scan(
    cfg: &ScanJobConfig,
    config_path: &Path,
    sink: Arc<dyn DiagnosticSink>,
) -> Result<ScanReport, RunError> {
    let mut report = ScanReport::new(cfg, config_path);
    let mut surface = DetectionSurface::new().with_sink(Arc::clone(&sink));
    surface.load(&cfg.image_path)?;

    if let Some(name) = &cfg.alignment {
        let params = load_params(&cfg.alignment_document, name, sink.as_ref())?;
        let session = surface.setup(&params)?;
        report.alignment = Some(surface.align(session, &params)?);
    }

    if let Some(name) = &cfg.circle_finder {
        let params = load_params(&cfg.circle_document, name, sink.as_ref())?;
        let session = surface.setup(&params)?;
        report.circles_found = surface.find_circles(Some(&session), &params)?;
    }

    if let Some(name) = &cfg.detection {
        let params = load_params(&cfg.detection_document, name, sink.as_ref())?;
        let session = surface.setup(&params)?;
        let mut circles = cfg.listed_circles();
        if circles.is_empty() {
            circles = report.circles_found.clone();
        }
        let states = surface.classify_all(&session, &circles, &params);
        for (circle, state) in circles.into_iter().zip(states) {
            let result = match state {
                Ok(state) => {
                    let color = match state {
                        FillState::Filled => FILLED_COLOR,
                        FillState::Empty => EMPTY_COLOR,
                    };
                    surface.annotate_circle(&circle, color, 2)?;
                    BubbleResult {
                        circle,
                        state: Some(state),
                        error: None,
                    }
                }
                Err(err) => BubbleResult {
                    circle,
                    state: None,
                    error: Some(err.to_string()),
                },
            };
            report.bubbles.push(result);
        }
        sink.info(format!(
            "{} of {} bubbles filled",
            report.filled_count(),
            report.bubbles.len()
        ));
    }

    report.image_size = surface.sheet_image().map(|s| [s.width(), s.height()]);
    save_outputs(&surface, cfg, sink.as_ref())?;
    Ok(report)
}

fn save_outputs(
    surface: &DetectionSurface,
    cfg: &ScanJobConfig,
    sink: &dyn DiagnosticSink,
) -> Result<(), RunError> {
    if let Some(path) = &cfg.aligned_path {
        surface.save_sheet_image(path, cfg.png_level)?;
    }
    if let Some(path) = &cfg.annotated_path {
        surface.save_annotated(path, cfg.png_level)?;
    }
    if let Some(path) = &cfg.cache_path {
        if surface.processed_cache().is_some() {
            surface.save_processed_cache(path, cfg.png_level)?;
        } else {
            sink.warning(format!("no processed cache to save to \"{path}\""));
        }
    }
    Ok(())
}
