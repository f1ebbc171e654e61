//! End-to-end calibration: find the checker in a camera image and in a
//! reference image, then fit the color transform between them.

use crate::preprocess::{preprocess, PreprocessParams};
use colorcal_checker::{ColorCheckerDetection, ColorCheckerDetector, ColorCheckerParams, DetectError};
use colorcal_core::{
    mean_absolute_error, median_absolute_deviation, rms_error, ColorGrid, ColorTransform,
    TransformError,
};
use image::RgbImage;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum CalibrateError {
    #[error("color checker not found in camera image: {0}")]
    Camera(#[source] DetectError),
    #[error("color checker not found in reference image: {0}")]
    Reference(#[source] DetectError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CalibrateError {
    /// The checker was missing from one of the images.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Camera(_) | Self::Reference(_))
    }
}

/// Everything a calibration run is configured with.
///
/// Only the camera image is preprocessed; the reference is assumed to be a
/// clean rendering or a photo taken at a usable size.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    #[serde(default)]
    pub preprocess: PreprocessParams,
    #[serde(default)]
    pub detector: ColorCheckerParams,
}

impl CalibrationParams {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibrateError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibrateError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Deviation between two patch grids, per channel value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    /// Average L1 error.
    pub mean_absolute: f32,
    /// L2 norm divided by `sqrt(n)`.
    pub rms: f32,
    pub median_absolute: f32,
}

impl ErrorStats {
    pub fn between(a: &ColorGrid, b: &ColorGrid) -> Result<Self, TransformError> {
        Ok(Self {
            mean_absolute: mean_absolute_error(a.as_image(), b.as_image())?,
            rms: rms_error(a.as_image(), b.as_image())?,
            median_absolute: median_absolute_deviation(a.as_image(), b.as_image())?,
        })
    }
}

/// Camera-vs-reference error before and after correction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub before: ErrorStats,
    pub after: ErrorStats,
}

/// Result of [`calibrate`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Calibration {
    /// Detection in the preprocessed camera image.
    pub camera: ColorCheckerDetection,
    pub reference: ColorCheckerDetection,
    /// Maps camera colors onto reference colors.
    pub transform: ColorTransform,
    /// Camera patch colors after applying `transform`.
    pub adjusted: ColorGrid,
    pub report: ErrorReport,
}

impl Calibration {
    /// Apply the fitted transform to a copy of `image`.
    pub fn correct(&self, image: &RgbImage) -> RgbImage {
        let mut out = image.clone();
        self.transform.apply(&mut out);
        out
    }
}

/// Debug drawings of both detections.
///
/// `camera` holds the preprocessed camera image, `reference` the reference
/// image, each annotated by the detector.
#[derive(Clone, Debug, Default)]
pub struct CalibrationCanvases {
    pub camera: RgbImage,
    pub reference: RgbImage,
}

/// Preprocess `camera`, detect the checker in both images and fit the
/// camera → reference color transform.
pub fn calibrate(
    camera: &RgbImage,
    reference: &RgbImage,
    params: &CalibrationParams,
) -> Result<Calibration, CalibrateError> {
    calibrate_with_canvases(camera, reference, params, None)
}

/// [`calibrate`], also filling `canvases` with annotated copies of the
/// images the detector saw.
///
/// Both images are searched even when the first one fails, so the canvases
/// and the log cover both.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(camera, reference, params, canvases),
        fields(camera_width = camera.width(), camera_height = camera.height())
    )
)]
pub fn calibrate_with_canvases(
    camera: &RgbImage,
    reference: &RgbImage,
    params: &CalibrationParams,
    canvases: Option<&mut CalibrationCanvases>,
) -> Result<Calibration, CalibrateError> {
    let camera = preprocess(camera, &params.preprocess);
    let detector = ColorCheckerDetector::new(params.detector.clone());

    let (camera_found, reference_found) = match canvases {
        Some(canvases) => {
            canvases.camera = camera.clone();
            canvases.reference = reference.clone();
            (
                detector.detect_with_canvas(&camera, Some(&mut canvases.camera)),
                detector.detect_with_canvas(reference, Some(&mut canvases.reference)),
            )
        }
        None => (detector.detect(&camera), detector.detect(reference)),
    };

    if let Err(err) = &camera_found {
        error!("no color checker in camera image: {err}");
    }
    if let Err(err) = &reference_found {
        error!("no color checker in reference image: {err}");
    }
    let camera_found = camera_found.map_err(CalibrateError::Camera)?;
    let reference_found = reference_found.map_err(CalibrateError::Reference)?;

    let transform = ColorTransform::fit(&camera_found.colors, &reference_found.colors)?;
    let mut adjusted = camera_found.colors.clone();
    transform.apply_to_grid(&mut adjusted);

    let report = ErrorReport {
        before: ErrorStats::between(&camera_found.colors, &reference_found.colors)?,
        after: ErrorStats::between(&adjusted, &reference_found.colors)?,
    };
    info!(
        "uncorrected checker: L1 {:.3}, L2 {:.3}, MAD {:.1}",
        report.before.mean_absolute, report.before.rms, report.before.median_absolute
    );
    info!(
        "adjusted checker: L1 {:.3}, L2 {:.3}, MAD {:.1}",
        report.after.mean_absolute, report.after.rms, report.after.median_absolute
    );

    Ok(Calibration {
        camera: camera_found,
        reference: reference_found,
        transform,
        adjusted,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let params: CalibrationParams =
            serde_json::from_str(r#"{"preprocess": {"blur_sigma": 0.0}}"#).expect("parse");
        assert_eq!(params.preprocess.max_dimension, 500);
        assert_eq!(params.preprocess.blur_sigma, 0.0);
        assert_eq!(params.detector, ColorCheckerParams::default());
    }

    #[test]
    fn config_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("params.json");
        let params = CalibrationParams {
            preprocess: PreprocessParams::none(),
            detector: ColorCheckerParams::axis_aligned(),
        };
        params.write_json(&path).expect("write");
        assert_eq!(CalibrationParams::load_json(&path).expect("load"), params);
    }

    #[test]
    fn missing_config_is_an_io_error() {
        let err = CalibrationParams::load_json("/nonexistent/colorcal.json").unwrap_err();
        assert!(matches!(err, CalibrateError::Io(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn blank_camera_image_is_reported() {
        let blank = RgbImage::from_pixel(120, 80, image::Rgb([90, 90, 90]));
        let err = calibrate(&blank, &blank, &CalibrationParams::default()).unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, CalibrateError::Camera(_)));
    }
}
