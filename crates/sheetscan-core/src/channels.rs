//! Channel selection and pixel counting on scans.

use image::{GrayImage, Luma, RgbImage};

/// Number of colour channels of a scan.
pub const SCAN_CHANNELS: u8 = 3;

/// Extract one channel of a scan as a gray image.
///
/// Channel indices follow the B, G, R order existing configuration files were
/// written against: `0` is blue, `2` is red. Returns `None` past the last
/// channel.
pub fn extract_channel(src: &RgbImage, channel: u8) -> Option<GrayImage> {
    if channel >= SCAN_CHANNELS {
        return None;
    }
    let rgb_index = (SCAN_CHANNELS - 1 - channel) as usize;
    Some(GrayImage::from_fn(src.width(), src.height(), |x, y| {
        Luma([src.get_pixel(x, y).0[rgb_index]])
    }))
}

/// Luma conversion with 0.299 / 0.587 / 0.114 weights, rounded.
pub fn to_gray(src: &RgbImage) -> GrayImage {
    GrayImage::from_fn(src.width(), src.height(), |x, y| {
        let [r, g, b] = src.get_pixel(x, y).0;
        let v = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Non-zero pixels in the `width × height` window at `(left, top)`.
///
/// The window must lie inside the image.
pub fn count_nonzero(img: &GrayImage, left: u32, top: u32, width: u32, height: u32) -> u64 {
    let mut count = 0;
    for y in top..top + height {
        for x in left..left + width {
            if img.get_pixel(x, y).0[0] != 0 {
                count += 1;
            }
        }
    }
    count
}
