//! Detection of color checker targets: a `rows × cols` grid of solid colored
//! squares separated by a uniform background.
//!
//! Pipeline:
//! - multichannel Sobel magnitude, thresholded into a low-gradient mask,
//! - border tracing, polygon simplification and subpixel edge refinement,
//! - square test and median-size filtering,
//! - joint projective (or rotation-only) rectification of all squares,
//! - cell assignment, quadratic cell → image fit and color sampling.
//!
//! ```no_run
//! use colorcal_checker::{ColorCheckerDetector, ColorCheckerParams};
//!
//! let image = image::open("checker.png").unwrap().to_rgb8();
//! let detector = ColorCheckerDetector::new(ColorCheckerParams::default());
//! match detector.detect(&image) {
//!     Ok(found) => println!("{:?}", found.colors.get(0, 0)),
//!     Err(err) => eprintln!("{err}"),
//! }
//! ```

pub mod contour;
pub mod debug;
mod detector;
pub mod grid;
pub mod magnitude;
pub mod rectify;
pub mod square;

pub use detector::{
    find_color_checker, ColorCheckerDetection, ColorCheckerDetector, ColorCheckerParams,
    DetectError, RectifierKind, SquareParams,
};
pub use grid::{CellPolynomial, GridSquare};
pub use square::Square;
