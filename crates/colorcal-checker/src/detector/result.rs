use crate::grid::{CellPolynomial, GridSquare};
use colorcal_core::{warp_perspective_rgb, ColorGrid, Homography};
use image::RgbImage;
use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};

/// Output of a successful color checker detection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColorCheckerDetection {
    /// Patch colors in row-major order.
    pub colors: ColorGrid,
    /// Predicted image centre of every cell, row-major.
    pub centers: Vec<Point2<f32>>,
    /// Squares that fed the cell polynomial, with their cells.
    pub squares: Vec<GridSquare>,
    /// Cell `(row, col)` → image `(x, y)` map.
    pub polynomial: CellPolynomial,
    /// Image → ortho frame (unit squares, `u` along columns).
    pub ortho_from_image: Homography,
}

impl ColorCheckerDetection {
    #[inline]
    pub fn rows(&self) -> usize {
        self.colors.rows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.colors.cols()
    }

    /// Predicted image centre of cell `(row, col)`.
    pub fn center(&self, row: usize, col: usize) -> Option<Point2<f32>> {
        if row >= self.rows() || col >= self.cols() {
            return None;
        }
        self.centers.get(row * self.cols() + col).copied()
    }

    /// Fronto-parallel view of the target at `px_per_square` pixels per
    /// square side, with one square of margin around the cell centres.
    pub fn rectified_view(&self, image: &RgbImage, px_per_square: f32) -> Option<RgbImage> {
        if px_per_square.is_nan() || px_per_square <= 0.0 {
            return None;
        }
        let image_from_ortho = self.ortho_from_image.inverse()?;
        let (mut min, mut max) = (
            Point2::new(f32::INFINITY, f32::INFINITY),
            Point2::new(f32::NEG_INFINITY, f32::NEG_INFINITY),
        );
        for c in &self.centers {
            let o = self.ortho_from_image.apply(*c);
            min = min.inf(&o);
            max = max.sup(&o);
        }
        let (min, max) = (min.map(|v| v - 1.0), max.map(|v| v + 1.0));
        let extent = max - min;
        if !(extent.x.is_finite() && extent.y.is_finite()) {
            return None;
        }
        let w = (extent.x * px_per_square).ceil() as u32;
        let h = (extent.y * px_per_square).ceil() as u32;

        let s = 1.0 / px_per_square as f64;
        let ortho_from_rect = Homography::new(Matrix3::new(
            s, 0.0, min.x as f64, //
            0.0, s, min.y as f64, //
            0.0, 0.0, 1.0,
        ));
        let h_img_from_rect = image_from_ortho.compose(&ortho_from_rect);
        Some(warp_perspective_rgb(image, &h_img_from_rect, w, h))
    }
}
