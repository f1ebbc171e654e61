//! Color checker detection pipeline.
//!
//! The stages live in the sibling modules (`magnitude`, `contour`, `square`,
//! `rectify`, `grid`); this module owns the parameters, the error type and the
//! detector that chains them.

mod error;
mod params;
mod pipeline;
mod result;

pub use error::DetectError;
pub use params::{ColorCheckerParams, RectifierKind, SquareParams};
pub use pipeline::{find_color_checker, ColorCheckerDetector};
pub use result::ColorCheckerDetection;
