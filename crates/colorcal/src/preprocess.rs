//! Downscale and blur a camera image before detection.

use image::imageops::{self, FilterType};
use image::RgbImage;
use log::debug;
use serde::{Deserialize, Serialize};

/// How a camera image is conditioned before it reaches the detector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// Longer side after downscaling, in pixels. `0` keeps the input size.
    /// Images are never upscaled.
    pub max_dimension: u32,
    /// Gaussian blur sigma in pixels; `<= 0` disables blurring.
    pub blur_sigma: f32,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            max_dimension: 500,
            blur_sigma: 3.0,
        }
    }
}

impl PreprocessParams {
    /// Pass images through untouched.
    pub fn none() -> Self {
        Self {
            max_dimension: 0,
            blur_sigma: 0.0,
        }
    }
}

/// Output size for a `width × height` image whose longer side must not
/// exceed `max_dimension`.
pub fn target_size(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longer = width.max(height);
    if max_dimension == 0 || longer <= max_dimension {
        return (width, height);
    }
    let scale = max_dimension as f64 / longer as f64;
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

pub fn preprocess(image: &RgbImage, params: &PreprocessParams) -> RgbImage {
    let (w, h) = target_size(image.width(), image.height(), params.max_dimension);
    let resized = if (w, h) != image.dimensions() {
        debug!(
            "downscaling {}x{} -> {w}x{h}",
            image.width(),
            image.height()
        );
        // Triangle widens its support when shrinking, which averages like an
        // area filter.
        imageops::resize(image, w, h, FilterType::Triangle)
    } else {
        image.clone()
    };

    if params.blur_sigma > 0.0 {
        imageops::blur(&resized, params.blur_sigma)
    } else {
        resized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn longer_side_is_capped() {
        assert_eq!(target_size(1000, 400, 500), (500, 200));
        assert_eq!(target_size(300, 1200, 500), (125, 500));
        assert_eq!(target_size(320, 240, 500), (320, 240));
        assert_eq!(target_size(5000, 1, 500), (500, 1));
        assert_eq!(target_size(2000, 1000, 0), (2000, 1000));
    }

    #[test]
    fn passthrough_keeps_pixels() {
        let img = RgbImage::from_fn(7, 5, |x, y| Rgb([x as u8 * 30, y as u8 * 40, 9]));
        assert_eq!(preprocess(&img, &PreprocessParams::none()), img);
    }

    #[test]
    fn downscales_large_images() {
        let img = RgbImage::from_pixel(1200, 600, Rgb([80, 120, 200]));
        let out = preprocess(
            &img,
            &PreprocessParams {
                max_dimension: 300,
                blur_sigma: 0.0,
            },
        );
        assert_eq!(out.dimensions(), (300, 150));
        assert_eq!(out.get_pixel(150, 75).0, [80, 120, 200]);
    }

    #[test]
    fn blur_softens_a_step() {
        let img = RgbImage::from_fn(40, 10, |x, _| {
            if x < 20 {
                Rgb([0, 0, 0])
            } else {
                Rgb([200, 200, 200])
            }
        });
        let out = preprocess(
            &img,
            &PreprocessParams {
                max_dimension: 0,
                blur_sigma: 2.0,
            },
        );
        assert_eq!(out.dimensions(), img.dimensions());
        let edge = out.get_pixel(20, 5).0[0];
        assert!(edge > 0 && edge < 200, "{edge}");
        assert_eq!(out.get_pixel(2, 5).0[0], 0);
    }
}
