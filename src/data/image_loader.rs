// ============================================================
// Layer 4 — Image Preprocessing
// ============================================================
// Turns an image file into the float layout the backbone CNN
// expects.
//
// Steps:
//   1. Decode (JPEG/PNG/...) with the image crate
//   2. Convert to 8-bit RGB (drops alpha, expands greyscale)
//   3. Resize to size × size with bilinear filtering
//   4. Scale every value from [0, 255] to [-1, 1]
//   5. Lay out channels-first: [3, size, size]
//
// Reference: image crate documentation

use anyhow::{Context, Result};
use image::imageops::FilterType;
use std::path::Path;

/// Number of colour channels fed to the backbone
pub const CHANNELS: usize = 3;

/// Load and preprocess one image into a flat channels-first buffer
/// of length 3 * size * size.
pub fn load_image(path: &Path, size: u32) -> Result<Vec<f32>> {
    let decoded = image::open(path)
        .with_context(|| format!("Cannot decode image '{}'", path.display()))?;

    let rgb     = decoded.to_rgb8();
    let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);

    let plane  = (size * size) as usize;
    let mut out = vec![0.0f32; CHANNELS * plane];

    // HWC (interleaved) → CHW (planar)
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..CHANNELS {
            out[c * plane + i] = scale_pixel(pixel.0[c]);
        }
    }

    Ok(out)
}

/// [0, 255] → [-1, 1]
fn scale_pixel(v: u8) -> f32 {
    v as f32 / 127.5 - 1.0
}
