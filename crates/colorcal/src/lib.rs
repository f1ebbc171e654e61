//! High-level facade crate for the `colorcal-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core types and the color checker detector
//! - an end-to-end [`calibrate`] helper: preprocess the camera image, find
//!   the checker in both images, fit the affine color transform and report
//!   the error before and after correction
//! - the `colorcal` command-line tool (feature `cli`)
//!
//! ## Quickstart
//!
//! ```no_run
//! use colorcal::{calibrate, CalibrationParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = image::open("camera.jpg")?.to_rgb8();
//! let reference = image::open("reference.png")?.to_rgb8();
//!
//! let calibration = calibrate(&camera, &reference, &CalibrationParams::default())?;
//! println!("MAD after correction: {}", calibration.report.after.median_absolute);
//!
//! let corrected = calibration.correct(&camera);
//! corrected.save("corrected.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `colorcal::core`: patch grids, the color transform and its metrics,
//!   homographies, least squares, logger setup.
//! - `colorcal::checker`: the color checker detector and its stages.
//! - `colorcal::preprocess`: downscale and blur before detection.

pub use colorcal_checker as checker;
pub use colorcal_core as core;

pub use colorcal_checker::{
    find_color_checker, ColorCheckerDetection, ColorCheckerDetector, ColorCheckerParams,
    DetectError,
};
pub use colorcal_core::{ColorGrid, ColorTransform, TransformError};

mod calibrate;
pub mod preprocess;

pub use calibrate::{
    calibrate, calibrate_with_canvases, CalibrateError, Calibration, CalibrationCanvases,
    CalibrationParams, ErrorReport, ErrorStats,
};
pub use preprocess::PreprocessParams;
