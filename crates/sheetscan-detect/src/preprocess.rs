//! Shared cache preparation: channel selection, blur, adaptive threshold and
//! optional inversion.
//!
//! All three algorithm families build their processed cache with this step.

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};
use sheetscan_core::{extract_channel, to_gray, DiagnosticSink, ParamError, ParameterSet, SCAN_CHANNELS};

use crate::DetectError;

pub const DEFAULT_BLOCK_SIZE: u32 = 75;

/// Validated preprocessing parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Channel to extract (B, G, R order); grayscale when `None`.
    pub channel: Option<u8>,
    /// Gaussian kernel size in pixels; no blur when `None`.
    pub preblur: Option<f32>,
    /// Offset below the local mean a pixel may sit and still be set.
    pub threshold: f32,
    /// Side of the square neighbourhood the local mean is taken over.
    pub block_size: u32,
    pub invert: bool,
}

impl PreprocessConfig {
    /// Validate the `channel`, `preblur`, `threshold`, `threshold-block-size`
    /// and `invert` entries.
    pub fn from_params(params: &ParameterSet, sink: &dyn DiagnosticSink) -> Result<Self, DetectError> {
        let channel = channel_from_params(params, sink)?;

        let preblur = params.optional_non_negative("preblur", sink)?;
        if preblur.is_none() {
            sink.debug("no preblur specified; using unblurred image");
        }

        let threshold = params.require_non_negative("threshold", sink)?;

        let block_size = match params.optional_int("threshold-block-size", sink)? {
            None => DEFAULT_BLOCK_SIZE,
            Some(size) if size >= 3 && size % 2 == 1 => size as u32,
            Some(size) => {
                let err = ParamError::InvalidRange {
                    config: params.name().to_string(),
                    key: "threshold-block-size".to_string(),
                    value: size as f64,
                    expected: "an odd integer of at least 3",
                };
                sink.critical(err.to_string());
                return Err(err.into());
            }
        };

        let invert = params.has("invert");
        sink.debug(if invert { "inverting image" } else { "not inverting image" });

        Ok(Self {
            channel,
            preblur,
            threshold,
            block_size,
            invert,
        })
    }
}

/// Validate the optional `channel` entry against the scan's channel count.
pub fn channel_from_params(
    params: &ParameterSet,
    sink: &dyn DiagnosticSink,
) -> Result<Option<u8>, DetectError> {
    match params.optional_int("channel", sink)? {
        Some(channel) if (0..SCAN_CHANNELS as i32).contains(&channel) => {
            sink.debug(format!("extracting channel {channel}"));
            Ok(Some(channel as u8))
        }
        Some(channel) => {
            let err = DetectError::InvalidChannel {
                config: params.name().to_string(),
                channel,
                channels: SCAN_CHANNELS,
            };
            sink.critical(err.to_string());
            Err(err)
        }
        None => {
            sink.debug("no channel specified; converting to grayscale");
            Ok(None)
        }
    }
}

/// The single-channel view a configuration selects, without thresholding.
pub fn channel_view(src: &RgbImage, channel: Option<u8>) -> GrayImage {
    match channel.and_then(|c| extract_channel(src, c)) {
        Some(view) => view,
        None => to_gray(src),
    }
}

/// Build a processed cache from a scan.
pub fn preprocess(src: &RgbImage, cfg: &PreprocessConfig) -> GrayImage {
    let mut img = channel_view(src, cfg.channel);
    if let Some(preblur) = cfg.preblur {
        img = blur(&img, preblur);
    }
    img = adaptive_threshold_mean(&img, cfg.block_size, cfg.threshold);
    if cfg.invert {
        imageops::invert(&mut img);
    }
    img
}

/// Gaussian blur with a `size × size` kernel; sizes below 2 leave the image
/// unchanged.
pub fn blur(img: &GrayImage, size: f32) -> GrayImage {
    let k = size.trunc();
    if k <= 1.0 || img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let sigma = 0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8;
    gaussian_blur_f32(img, sigma)
}

/// Binary adaptive threshold against the mean of a `block × block`
/// neighbourhood (borders replicated).
///
/// A pixel becomes 255 when `src - mean > -ceil(offset)`, else 0.
pub fn adaptive_threshold_mean(src: &GrayImage, block: u32, offset: f32) -> GrayImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let mean = box_mean(src, block.max(1) | 1);
    let delta = offset.ceil() as i32;
    GrayImage::from_fn(w, h, |x, y| {
        let s = src.get_pixel(x, y).0[0] as i32;
        let m = mean[(y * w + x) as usize] as i32;
        Luma([if s - m > -delta { 255 } else { 0 }])
    })
}

/// Rounded mean over an odd `block × block` window with replicated borders.
fn box_mean(src: &GrayImage, block: u32) -> Vec<u8> {
    let (w, h) = (src.width() as usize, src.height() as usize);
    let r = (block / 2) as i64;

    // Window sums along one axis of a clamped sequence.
    let window_sums = |len: usize, value: &dyn Fn(usize) -> u64, out: &mut Vec<u64>| {
        out.clear();
        let at = |i: i64| value(i.clamp(0, len as i64 - 1) as usize);
        let mut sum: u64 = (-r..=r).map(|i| at(i)).sum();
        out.push(sum);
        for i in 1..len as i64 {
            sum = sum + at(i + r) - at(i - r - 1);
            out.push(sum);
        }
    };

    let mut rows = vec![0_u64; w * h];
    let mut scratch = Vec::with_capacity(w.max(h));
    for y in 0..h {
        window_sums(w, &|x| src.get_pixel(x as u32, y as u32).0[0] as u64, &mut scratch);
        rows[y * w..(y + 1) * w].copy_from_slice(&scratch);
    }

    let area = (block as f64) * (block as f64);
    let mut out = vec![0_u8; w * h];
    for x in 0..w {
        window_sums(h, &|y| rows[y * w + x], &mut scratch);
        for (y, sum) in scratch.iter().enumerate() {
            out[y * w + x] = (*sum as f64 / area).round() as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use sheetscan_core::{AlgorithmKind, CollectingSink, Severity};

    fn params(entries: &[(&str, &str)]) -> ParameterSet {
        let sink = CollectingSink::new();
        let mut p = ParameterSet::with_kind("prep", AlgorithmKind::ThresholdFraction);
        for (k, v) in entries {
            p.set(*k, v, &sink);
        }
        p
    }

    #[test]
    fn reads_full_configuration() {
        let sink = CollectingSink::new();
        let cfg = PreprocessConfig::from_params(
            &params(&[("channel", "1"), ("preblur", "5"), ("threshold", "50")]),
            &sink,
        )
        .unwrap();
        assert_eq!(cfg.channel, Some(1));
        assert_eq!(cfg.preblur, Some(5.0));
        assert_eq!(cfg.threshold, 50.0);
        assert_eq!(cfg.block_size, DEFAULT_BLOCK_SIZE);
        assert!(!cfg.invert);
        assert_eq!(sink.count_at_least(Severity::Warning), 0);
    }

    #[test]
    fn missing_threshold_is_fatal() {
        let err = PreprocessConfig::from_params(&params(&[("preblur", "3")]), &CollectingSink::new())
            .unwrap_err();
        assert!(matches!(err, DetectError::Param(ParamError::MissingParameter { ref key, .. }) if key == "threshold"));
    }

    #[test]
    fn channel_out_of_range() {
        let err = PreprocessConfig::from_params(
            &params(&[("channel", "3"), ("threshold", "1")]),
            &CollectingSink::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DetectError::InvalidChannel { channel: 3, .. }));
        let err = PreprocessConfig::from_params(
            &params(&[("channel", "-1"), ("threshold", "1")]),
            &CollectingSink::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DetectError::InvalidChannel { channel: -1, .. }));
    }

    #[test]
    fn even_block_size_is_rejected() {
        let err = PreprocessConfig::from_params(
            &params(&[("threshold", "1"), ("threshold-block-size", "10")]),
            &CollectingSink::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DetectError::Param(ParamError::InvalidRange { .. })));
    }

    #[test]
    fn invert_is_presence_only() {
        let cfg = PreprocessConfig::from_params(
            &params(&[("threshold", "1"), ("invert", "false")]),
            &CollectingSink::new(),
        )
        .unwrap();
        assert!(cfg.invert);
    }

    #[test]
    fn uniform_image_thresholds_to_white() {
        let img = GrayImage::from_pixel(9, 7, Luma([120]));
        let out = adaptive_threshold_mean(&img, 5, 0.0);
        assert!(out.pixels().all(|p| p.0[0] == 0));
        let out = adaptive_threshold_mean(&img, 5, 0.5);
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn dark_spot_is_separated_from_background() {
        let mut img = GrayImage::from_pixel(21, 21, Luma([200]));
        img.put_pixel(10, 10, Luma([0]));
        let out = adaptive_threshold_mean(&img, 7, 5.0);
        assert_eq!(out.get_pixel(10, 10).0[0], 0);
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
        assert_eq!(out.get_pixel(12, 10).0[0], 255);
    }

    #[test]
    fn pipeline_inverts_last() {
        let mut src = RgbImage::from_pixel(30, 30, Rgb([255, 255, 255]));
        for y in 10..20 {
            for x in 10..20 {
                src.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let mut cfg = PreprocessConfig {
            channel: None,
            preblur: None,
            threshold: 10.0,
            block_size: 15,
            invert: false,
        };
        let plain = preprocess(&src, &cfg);
        cfg.invert = true;
        let inverted = preprocess(&src, &cfg);
        assert_eq!(plain.get_pixel(15, 15).0[0], 0);
        assert_eq!(inverted.get_pixel(15, 15).0[0], 255);
        assert_eq!(inverted.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn small_blur_is_identity() {
        let img = GrayImage::from_fn(5, 5, |x, y| Luma([(x * 40 + y) as u8]));
        assert_eq!(blur(&img, 1.9), img);
        assert_ne!(blur(&img, 5.0), img);
    }
}
