//! Core types for color calibration.
//!
//! Everything here is independent of how a color target was found: patch
//! grids, the affine color transform and its error metrics, planar
//! homographies, and the small least-squares accumulator they share.

mod color_grid;
mod color_transform;
mod homography;
mod logger;
mod lstsq;

pub use color_grid::{big_checker, error_checker, render_swatch, ColorGrid};
pub use color_transform::{
    mean_absolute_error, median_absolute_deviation, rms_error, ColorTransform, TransformError,
};
pub use homography::{homography_from_4pt, warp_perspective_rgb, Homography};
pub use lstsq::{NormalEquations, SolveMethod};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, parse_level};
