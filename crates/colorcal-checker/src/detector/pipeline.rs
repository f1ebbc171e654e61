use super::{ColorCheckerDetection, ColorCheckerParams, DetectError};
use crate::contour::{find_raw_contours, simplify_contour};
use crate::debug::{draw_axes, draw_candidate, draw_contours, draw_samples};
use crate::grid::{index_squares, predict_centers, sample_colors};
use crate::magnitude::{edge_magnitude, low_gradient_mask};
use crate::rectify::rectify;
use crate::square::{classify, retain_median_consistent, Square};
use colorcal_core::ColorGrid;
use image::RgbImage;
use log::{debug, warn};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Contour-based detector for a grid of colored squares.
#[derive(Clone, Debug, Default)]
pub struct ColorCheckerDetector {
    params: ColorCheckerParams,
}

impl ColorCheckerDetector {
    pub fn new(params: ColorCheckerParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &ColorCheckerParams {
        &self.params
    }

    /// Locate the target and sample its patch colors.
    pub fn detect(&self, image: &RgbImage) -> Result<ColorCheckerDetection, DetectError> {
        self.detect_with_canvas(image, None)
    }

    /// [`Self::detect`], drawing contours, square candidates, grid axes and
    /// sample points onto `canvas` when one is given.
    ///
    /// Failures are logged at `warn` level before being returned.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, image, canvas), fields(width = image.width(), height = image.height()))
    )]
    pub fn detect_with_canvas(
        &self,
        image: &RgbImage,
        canvas: Option<&mut RgbImage>,
    ) -> Result<ColorCheckerDetection, DetectError> {
        let result = self.run(image, canvas);
        if let Err(err) = &result {
            warn!("color checker not found: {err}");
        }
        result
    }

    /// Edge mask → contours → square test. Returns every accepted square,
    /// before any size filtering.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, image, canvas))
    )]
    pub fn find_squares(
        &self,
        image: &RgbImage,
        mut canvas: Option<&mut RgbImage>,
    ) -> Result<Vec<Square>, DetectError> {
        let p = &self.params;
        let magnitude = edge_magnitude(image)?;
        let mask = low_gradient_mask(&magnitude, p.gradient_threshold);
        let contours = find_raw_contours(&mask);
        if contours.is_empty() {
            return Err(DetectError::NoContours);
        }
        if let Some(c) = canvas.as_deref_mut() {
            draw_contours(c, &contours);
        }

        let mut squares = Vec::new();
        for contour in &contours {
            let polygon = simplify_contour(contour, p.approx_epsilon, p.refine_edges);
            let Some((check, square)) = classify(&polygon, &p.square) else {
                continue;
            };
            if let Some(c) = canvas.as_deref_mut() {
                draw_candidate(c, &square.corners, check);
            }
            if check.accepted() {
                squares.push(square);
            }
        }
        debug!(
            "{} squares among {} contours",
            squares.len(),
            contours.len()
        );
        if squares.is_empty() {
            return Err(DetectError::NoSquares {
                contours: contours.len(),
            });
        }
        Ok(squares)
    }

    fn run(
        &self,
        image: &RgbImage,
        mut canvas: Option<&mut RgbImage>,
    ) -> Result<ColorCheckerDetection, DetectError> {
        let p = &self.params;
        if p.rows == 0 || p.cols == 0 {
            return Err(DetectError::InvalidLayout {
                rows: p.rows,
                cols: p.cols,
            });
        }

        let found = self.find_squares(image, canvas.as_deref_mut())?;
        let total = found.len();
        let (squares, median) =
            retain_median_consistent(found, |s| s.size, p.image_size_tolerance);
        debug!(
            "median square size {median:.1}px, picked {} of {total} squares",
            squares.len()
        );
        if squares.is_empty() {
            return Err(DetectError::NoConsistentSquares { median });
        }

        let ortho_from_image = rectify(&squares, p.rectifier)?;
        let (cells, polynomial) = index_squares(&squares, &ortho_from_image, p)?;
        let centers = predict_centers(&polynomial, p.rows, p.cols, image.width(), image.height())?;
        let colors = sample_colors(image, &centers, p.rows, p.cols, p.sample_radius);

        if let Some(c) = canvas {
            if let Some(image_from_ortho) = ortho_from_image.inverse() {
                draw_axes(c, &cells, &image_from_ortho);
            }
            draw_samples(c, &centers, colors.colors());
        }

        Ok(ColorCheckerDetection {
            colors,
            centers,
            squares: cells,
            polynomial,
            ortho_from_image,
        })
    }
}

/// Detect with `params` and return only the patch colors.
pub fn find_color_checker(
    image: &RgbImage,
    params: &ColorCheckerParams,
) -> Result<ColorGrid, DetectError> {
    ColorCheckerDetector::new(params.clone())
        .detect(image)
        .map(|d| d.colors)
}
