//! The detection surface: one scan, its processed cache and its annotation
//! overlay.
//!
//! Phases are explicit. [`DetectionSurface::setup`] returns a [`Session`] and
//! every query takes one, so querying a cache that was never built, or one
//! that a later `setup` or `align` replaced, is reported as
//! [`DetectError::WrongPhase`] instead of reading stale pixels.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{GrayImage, ImageBuffer, ImageEncoder, Pixel, PixelWithColorType, Rgb, RgbImage};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use sheetscan_core::{AlgorithmKind, CircleDescriptor, DiagnosticSink, LogSink, Normalizer, ParameterSet};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::algorithm::{require_kind, Algorithm};
use crate::alignment::{self, AlignmentConfig, CropBox};
use crate::draw::{self, MARK_COLOR};
use crate::hough::{hough_circles, HoughConfig};
use crate::preprocess::{channel_from_params, channel_view, preprocess};
use crate::threshold_fraction::{self, FillConfig, FillState};
use crate::DetectError;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Proof that [`DetectionSurface::setup`] built the current processed cache.
///
/// A session is bound to the surface that issued it, to the cache it built
/// and to the algorithm kind it was built for.
#[derive(Debug)]
pub struct Session {
    surface: u64,
    generation: u64,
    kind: AlgorithmKind,
}

impl Session {
    pub fn kind(&self) -> AlgorithmKind {
        self.kind
    }
}

/// What a successful alignment did to the scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentOutcome {
    /// Size of the aligned scan, which is the new normalization basis.
    pub width: u32,
    pub height: u32,
    /// Rotation applied to level the sheet, in degrees.
    pub angle_deg: f32,
    /// Centres of every accepted mark before rotation, in pixels.
    pub marks: Vec<Point2<i32>>,
    pub crop: CropBox,
}

pub struct DetectionSurface {
    id: u64,
    generation: u64,
    sheet: Option<RgbImage>,
    annotated: Option<RgbImage>,
    cache: Option<GrayImage>,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for DetectionSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DetectionSurface {
    /// Deep copy under a new identity; sessions issued by `self` are not
    /// accepted by the copy.
    fn clone(&self) -> Self {
        Self {
            id: next_id(),
            generation: self.generation,
            sheet: self.sheet.clone(),
            annotated: self.annotated.clone(),
            cache: self.cache.clone(),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl std::fmt::Debug for DetectionSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionSurface")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("sheet", &self.sheet.as_ref().map(|i| i.dimensions()))
            .field("cache", &self.cache.as_ref().map(|i| i.dimensions()))
            .finish()
    }
}

impl DetectionSurface {
    /// An empty surface reporting through [`LogSink`].
    pub fn new() -> Self {
        Self {
            id: next_id(),
            generation: 0,
            sheet: None,
            annotated: None,
            cache: None,
            sink: Arc::new(LogSink),
        }
    }

    /// A surface already holding `sheet`.
    pub fn from_image(sheet: RgbImage) -> Self {
        let mut surface = Self::new();
        surface.annotated = Some(sheet.clone());
        surface.sheet = Some(sheet);
        surface
    }

    /// Replace the diagnostics sink.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn sink(&self) -> &dyn DiagnosticSink {
        self.sink.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.sheet.is_some()
    }

    pub fn sheet_image(&self) -> Option<&RgbImage> {
        self.sheet.as_ref()
    }

    pub fn annotated(&self) -> Option<&RgbImage> {
        self.annotated.as_ref()
    }

    pub fn processed_cache(&self) -> Option<&GrayImage> {
        self.cache.as_ref()
    }

    /// Normalization basis of the current scan.
    pub fn normalizer(&self) -> Option<Normalizer> {
        self.sheet.as_ref().map(|s| Normalizer::new(s.width()))
    }

    /// Read a scan from disk.
    ///
    /// On success the overlay is reset, the cache is dropped and every
    /// outstanding session becomes stale. On failure nothing changes.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), DetectError> {
        let path = path.as_ref();
        let sheet = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(err) => {
                self.sink
                    .critical(format!("failed to load sheet image \"{}\": {err}", path.display()));
                return Err(err.into());
            }
        };
        let (w, h) = sheet.dimensions();
        self.annotated = Some(sheet.clone());
        self.sheet = Some(sheet);
        self.cache = None;
        self.generation += 1;
        self.sink
            .info(format!("loaded sheet image \"{}\" ({w}x{h})", path.display()));
        Ok(())
    }

    fn loaded_sheet(&self, operation: &'static str) -> Result<&RgbImage, DetectError> {
        self.sheet.as_ref().ok_or_else(|| {
            self.sink
                .critical(format!("{operation}: {}", DetectError::ImageNotLoaded));
            DetectError::ImageNotLoaded
        })
    }

    /// Build the processed cache for `params.kind()`.
    ///
    /// The cache is replaced only when every parameter validates; a failed
    /// setup leaves the cache and outstanding sessions as they were.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, params), fields(name = params.name(), kind = %params.kind()))
    )]
    pub fn setup(&mut self, params: &ParameterSet) -> Result<Session, DetectError> {
        let algorithm = Algorithm::from_params(params, self.sink.as_ref())?;
        let sheet = self.loaded_sheet("setup")?;
        let cache = preprocess(sheet, algorithm.preprocess());

        self.cache = Some(cache);
        self.generation += 1;
        self.sink.info(format!(
            "processed cache ready for \"{}\" ({})",
            params.name(),
            algorithm.kind()
        ));
        Ok(Session {
            surface: self.id,
            generation: self.generation,
            kind: algorithm.kind(),
        })
    }

    /// The cache `session` refers to, if it is still the current one.
    fn session_cache(
        &self,
        session: &Session,
        params: &ParameterSet,
        operation: &'static str,
    ) -> Result<&GrayImage, DetectError> {
        let reason = if session.surface != self.id {
            Some("session was issued by another surface".to_string())
        } else if session.generation != self.generation {
            Some("session is stale; the processed cache was rebuilt since".to_string())
        } else if session.kind != params.kind() {
            Some(format!(
                "session was set up for {} but the parameters are {}",
                session.kind,
                params.kind()
            ))
        } else {
            None
        };
        if let Some(reason) = reason {
            let err = DetectError::WrongPhase { operation, reason };
            self.sink.critical(err.to_string());
            return Err(err);
        }
        self.cache.as_ref().ok_or_else(|| {
            let err = DetectError::WrongPhase {
                operation,
                reason: "no processed cache".to_string(),
            };
            self.sink.critical(err.to_string());
            err
        })
    }

    /// Decide whether one bubble is filled.
    pub fn classify(
        &self,
        session: &Session,
        circle: &CircleDescriptor,
        params: &ParameterSet,
    ) -> Result<FillState, DetectError> {
        let sink = self.sink.as_ref();
        require_kind(params, AlgorithmKind::ThresholdFraction, "classify", sink)?;
        let cache = self.session_cache(session, params, "classify")?;
        let cfg = FillConfig::from_params(params, sink)?;
        let basis = Normalizer::new(cache.width());
        Ok(threshold_fraction::classify(cache, &basis, circle, &cfg, sink))
    }

    /// [`classify`](Self::classify) for each circle in turn.
    pub fn classify_all(
        &self,
        session: &Session,
        circles: &[CircleDescriptor],
        params: &ParameterSet,
    ) -> Vec<Result<FillState, DetectError>> {
        circles
            .iter()
            .map(|circle| self.classify(session, circle, params))
            .collect()
    }

    /// Find bubbles with the Hough transform.
    ///
    /// With a session the processed cache is searched; without one, the
    /// channel (or grayscale) view of the scan selected by `params`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, session, params), fields(name = params.name()))
    )]
    pub fn find_circles(
        &self,
        session: Option<&Session>,
        params: &ParameterSet,
    ) -> Result<Vec<CircleDescriptor>, DetectError> {
        let sink = self.sink.as_ref();
        require_kind(params, AlgorithmKind::HoughCircles, "find_circles", sink)?;
        let cfg = HoughConfig::from_params(params, sink)?;

        let view;
        let img = match session {
            Some(session) => self.session_cache(session, params, "find_circles")?,
            None => {
                let sheet = self.loaded_sheet("find_circles")?;
                view = channel_view(sheet, channel_from_params(params, sink)?);
                &view
            }
        };

        let basis = Normalizer::new(img.width());
        let limits = cfg.to_pixels(&basis);
        sink.debug(format!("hough limits in pixels: {limits:?}"));
        let circles: Vec<CircleDescriptor> = hough_circles(img, &limits)
            .into_iter()
            .map(|c| CircleDescriptor::from_pixels(c.x, c.y, c.r, &basis))
            .collect();
        sink.info(format!("found {} circles", circles.len()));
        Ok(circles)
    }

    /// Level and crop the scan using its printed alignment marks.
    ///
    /// Consumes `session`: a successful alignment changes the normalization
    /// basis, drops the cache and makes every session stale. On failure the
    /// scan, overlay and cache are left as they were.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, session, params), fields(name = params.name()))
    )]
    pub fn align(&mut self, session: Session, params: &ParameterSet) -> Result<AlignmentOutcome, DetectError> {
        let sink = self.sink.as_ref();
        require_kind(params, AlgorithmKind::ContourAlignment, "align", sink)?;
        let cache = self.session_cache(&session, params, "align")?;
        let cfg = AlignmentConfig::from_params(params, sink)?;
        let sheet = self.loaded_sheet("align")?;
        let (w, h) = sheet.dimensions();

        let marks = alignment::find_marks(cache, &Normalizer::new(w), &cfg, sink);
        let plan = alignment::plan(&marks, w, h, &cfg.crop, sink)?;

        let mut overlay = self.annotated.clone().unwrap_or_else(|| sheet.clone());
        for mark in &marks {
            draw::polyline(&mut overlay, &mark.outline, true, MARK_COLOR, 2);
        }
        let centres: Vec<Point2<f32>> = marks
            .iter()
            .map(|m| Point2::new(m.center.x as f32, m.center.y as f32))
            .collect();
        draw::polyline(&mut overlay, &centres, true, MARK_COLOR, 1);

        let aligned = alignment::apply(sheet, &plan);
        let overlay = alignment::apply(&overlay, &plan);
        let outcome = AlignmentOutcome {
            width: aligned.width(),
            height: aligned.height(),
            angle_deg: plan.angle_rad.to_degrees(),
            marks: marks.iter().map(|m| m.center).collect(),
            crop: plan.crop,
        };

        self.sheet = Some(aligned);
        self.annotated = Some(overlay);
        self.cache = None;
        self.generation += 1;
        self.sink.info(format!(
            "aligned sheet: rotated {:.3} degrees, cropped to {}x{}",
            outcome.angle_deg, outcome.width, outcome.height
        ));
        Ok(outcome)
    }

    fn overlay_mut(&mut self, operation: &'static str) -> Result<(&mut RgbImage, Normalizer), DetectError> {
        let Some(sheet) = self.sheet.as_ref() else {
            self.sink
                .critical(format!("{operation}: {}", DetectError::ImageNotLoaded));
            return Err(DetectError::ImageNotLoaded);
        };
        let basis = Normalizer::new(sheet.width());
        let overlay = self.annotated.get_or_insert_with(|| sheet.clone());
        Ok((overlay, basis))
    }

    pub fn annotate_circle(
        &mut self,
        circle: &CircleDescriptor,
        color: Rgb<u8>,
        thickness: u32,
    ) -> Result<(), DetectError> {
        let (overlay, basis) = self.overlay_mut("annotate_circle")?;
        let px = circle.to_pixels(&basis);
        draw::circle(overlay, px.center, px.radius, color, thickness);
        Ok(())
    }

    pub fn annotate_circles<'a>(
        &mut self,
        circles: impl IntoIterator<Item = (&'a CircleDescriptor, Rgb<u8>)>,
        thickness: u32,
    ) -> Result<(), DetectError> {
        for (circle, color) in circles {
            self.annotate_circle(circle, color, thickness)?;
        }
        Ok(())
    }

    /// Outline a rectangle given in normalized coordinates.
    pub fn annotate_rect(
        &mut self,
        left: f32,
        top: f32,
        width: f32,
        height: f32,
        color: Rgb<u8>,
        thickness: u32,
    ) -> Result<(), DetectError> {
        let (overlay, basis) = self.overlay_mut("annotate_rect")?;
        draw::rect(
            overlay,
            basis.to_pixels(left),
            basis.to_pixels(top),
            basis.to_pixels(width),
            basis.to_pixels(height),
            color,
            thickness,
        );
        Ok(())
    }

    /// Discard every drawing by copying the scan onto the overlay again.
    pub fn reset_annotations(&mut self) -> Result<(), DetectError> {
        let sheet = self.loaded_sheet("reset_annotations")?;
        self.annotated = Some(sheet.clone());
        Ok(())
    }

    /// Write the scan as PNG; `level` 0–9 trades speed for size.
    pub fn save_sheet_image(&self, path: impl AsRef<Path>, level: u8) -> Result<(), DetectError> {
        let img = self.loaded_sheet("save_sheet_image")?;
        self.save(img, path.as_ref(), level, "sheet image")
    }

    pub fn save_annotated(&self, path: impl AsRef<Path>, level: u8) -> Result<(), DetectError> {
        let Some(img) = self.annotated.as_ref() else {
            self.sink
                .critical(format!("save_annotated: {}", DetectError::ImageNotLoaded));
            return Err(DetectError::ImageNotLoaded);
        };
        self.save(img, path.as_ref(), level, "annotated image")
    }

    pub fn save_processed_cache(&self, path: impl AsRef<Path>, level: u8) -> Result<(), DetectError> {
        let Some(img) = self.cache.as_ref() else {
            let err = DetectError::WrongPhase {
                operation: "save_processed_cache",
                reason: "no processed cache".to_string(),
            };
            self.sink.critical(err.to_string());
            return Err(err);
        };
        self.save(img, path.as_ref(), level, "processed cache")
    }

    fn save<P>(
        &self,
        img: &ImageBuffer<P, Vec<u8>>,
        path: &Path,
        level: u8,
        what: &str,
    ) -> Result<(), DetectError>
    where
        P: Pixel<Subpixel = u8> + PixelWithColorType,
    {
        match write_png(img, path, level) {
            Ok(()) => {
                self.sink
                    .debug(format!("saved {what} to \"{}\"", path.display()));
                Ok(())
            }
            Err(err) => {
                self.sink.critical(format!(
                    "failed to save {what} \"{}\": {err}",
                    path.display()
                ));
                Err(err)
            }
        }
    }
}

fn write_png<P>(img: &ImageBuffer<P, Vec<u8>>, path: &Path, level: u8) -> Result<(), DetectError>
where
    P: Pixel<Subpixel = u8> + PixelWithColorType,
{
    let compression = match level {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    };
    let writer = BufWriter::new(File::create(path)?);
    let encoder = PngEncoder::new_with_quality(writer, compression, FilterType::Adaptive);
    encoder.write_image(img.as_raw(), img.width(), img.height(), P::COLOR_TYPE)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use sheetscan_core::{CollectingSink, Severity};

    fn params(kind: AlgorithmKind, entries: &[(&str, &str)]) -> ParameterSet {
        let mut p = ParameterSet::with_kind("test", kind);
        for (k, v) in entries {
            p.set(*k, v, &sheetscan_core::NullSink);
        }
        p
    }

    fn half_dark() -> RgbImage {
        RgbImage::from_fn(100, 80, |x, _| if x < 50 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) })
    }

    #[test]
    fn empty_surface_rejects_setup() {
        let mut surface = DetectionSurface::new();
        let p = params(AlgorithmKind::ThresholdFraction, &[("threshold", "5")]);
        assert!(matches!(surface.setup(&p), Err(DetectError::ImageNotLoaded)));
        assert!(surface.normalizer().is_none());
    }

    #[test]
    fn failed_setup_keeps_previous_session() {
        let sink = Arc::new(CollectingSink::new());
        let mut surface = DetectionSurface::from_image(half_dark()).with_sink(sink.clone());
        let good = params(AlgorithmKind::ThresholdFraction, &[("threshold", "5"), ("fraction", "0.5")]);
        let session = surface.setup(&good).unwrap();
        let before = surface.processed_cache().cloned();

        let bad = params(AlgorithmKind::ThresholdFraction, &[]);
        assert!(surface.setup(&bad).is_err());
        assert_eq!(surface.processed_cache().cloned(), before);
        assert!(sink.count_at_least(Severity::Critical) >= 1);

        let circle = CircleDescriptor::new(0.75, 0.4, 0.1);
        assert!(surface.classify(&session, &circle, &good).is_ok());
    }

    #[test]
    fn later_setup_makes_session_stale() {
        let mut surface = DetectionSurface::from_image(half_dark());
        let p = params(AlgorithmKind::ThresholdFraction, &[("threshold", "5"), ("fraction", "0.5")]);
        let first = surface.setup(&p).unwrap();
        let second = surface.setup(&p).unwrap();
        let circle = CircleDescriptor::new(0.25, 0.4, 0.1);
        assert!(matches!(
            surface.classify(&first, &circle, &p),
            Err(DetectError::WrongPhase { .. })
        ));
        assert!(surface.classify(&second, &circle, &p).is_ok());
    }

    #[test]
    fn clone_rejects_sessions_of_its_source() {
        let mut surface = DetectionSurface::from_image(half_dark());
        let p = params(AlgorithmKind::ThresholdFraction, &[("threshold", "5"), ("fraction", "0.5")]);
        let session = surface.setup(&p).unwrap();
        let copy = surface.clone();
        let circle = CircleDescriptor::new(0.25, 0.4, 0.1);
        assert_eq!(copy.processed_cache(), surface.processed_cache());
        assert!(matches!(
            copy.classify(&session, &circle, &p),
            Err(DetectError::WrongPhase { .. })
        ));
    }

    #[test]
    fn classify_requires_threshold_fraction_kind() {
        let mut surface = DetectionSurface::from_image(half_dark());
        let p = params(AlgorithmKind::HoughCircles, &[("threshold", "5")]);
        let session = surface.setup(&p).unwrap();
        let circle = CircleDescriptor::new(0.25, 0.4, 0.1);
        assert!(matches!(
            surface.classify(&session, &circle, &p),
            Err(DetectError::UnhandledKind {
                operation: "classify",
                ..
            })
        ));
    }

    #[test]
    fn annotations_reset_to_sheet() {
        let mut surface = DetectionSurface::from_image(RgbImage::new(40, 40));
        let circle = CircleDescriptor::new(0.5, 0.5, 0.25);
        surface.annotate_circle(&circle, Rgb([0, 255, 0]), 1).unwrap();
        surface
            .annotate_rect(0.1, 0.1, 0.5, 0.5, Rgb([255, 0, 0]), 1)
            .unwrap();
        assert_ne!(surface.annotated(), surface.sheet_image());
        surface.reset_annotations().unwrap();
        assert_eq!(surface.annotated(), surface.sheet_image());
    }

    #[test]
    fn annotating_empty_surface_fails() {
        let mut surface = DetectionSurface::new();
        let circle = CircleDescriptor::new(0.5, 0.5, 0.25);
        assert!(matches!(
            surface.annotate_circle(&circle, MARK_COLOR, 1),
            Err(DetectError::ImageNotLoaded)
        ));
    }

    #[test]
    fn cache_saves_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.png");
        let mut surface = DetectionSurface::from_image(half_dark());
        assert!(surface.save_processed_cache(&path, 6).is_err());

        let p = params(AlgorithmKind::ThresholdFraction, &[("threshold", "5")]);
        surface.setup(&p).unwrap();
        surface.save_processed_cache(&path, 9).unwrap();
        let back = image::open(&path).unwrap().to_luma8();
        assert_eq!(&back, surface.processed_cache().unwrap());
        assert_eq!(back.get_pixel(0, 0), &Luma([255]));
    }
}
