//! Multichannel Sobel edge magnitude and the low-gradient mask built from it.

use crate::DetectError;
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// Single-channel `f32` image.
pub type MagnitudeImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Scale applied to the raw 3×3 Sobel responses.
const SOBEL_SCALE: f32 = 1.0 / 16.0;

/// `sqrt(Σ_c (∂x I_c)² + (∂y I_c)²)` over the three color channels.
///
/// A single-channel step of height `d` produces a magnitude of `d / 4` on the
/// two pixels straddling it.
pub fn edge_magnitude(image: &RgbImage) -> Result<MagnitudeImage, DetectError> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(DetectError::EmptyImage);
    }

    let mut sum_sq = vec![0.0f32; w as usize * h as usize];
    for c in 0..3 {
        let channel = GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[c]]));
        let gx = horizontal_sobel(&channel);
        let gy = vertical_sobel(&channel);
        for ((acc, &dx), &dy) in sum_sq.iter_mut().zip(gx.as_raw()).zip(gy.as_raw()) {
            let dx = dx as f32 * SOBEL_SCALE;
            let dy = dy as f32 * SOBEL_SCALE;
            *acc += dx * dx + dy * dy;
        }
    }

    Ok(MagnitudeImage::from_fn(w, h, |x, y| {
        Luma([sum_sq[(y * w + x) as usize].sqrt()])
    }))
}

/// 255 where `magnitude <= threshold`, 0 elsewhere.
pub fn low_gradient_mask(magnitude: &MagnitudeImage, threshold: f32) -> GrayImage {
    GrayImage::from_fn(magnitude.width(), magnitude.height(), |x, y| {
        if magnitude.get_pixel(x, y).0[0] <= threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}
