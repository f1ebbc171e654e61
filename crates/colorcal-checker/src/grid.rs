//! Grid indexing: rectified squares → (row, col) cells → quadratic cell-to-image
//! map → sampled patch colors.

use crate::contour::signed_area;
use crate::rectify::rectified_corners;
use crate::square::{retain_median_consistent, Square};
use crate::{ColorCheckerParams, DetectError};
use colorcal_core::{ColorGrid, Homography, NormalEquations, SolveMethod};
use image::RgbImage;
use log::{debug, trace};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Centres of squares in different rows (or columns) are at least one square
/// side apart in the ortho frame.
const MIN_SPAN: f32 = 0.5;

/// A detected square together with the grid cell it was assigned to.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSquare {
    pub square: Square,
    pub row: usize,
    pub col: usize,
    /// Centre in the ortho frame.
    pub rectified_center: Point2<f32>,
}

/// Quadratic map `(row, col) → (x, y)` with terms `1, r, c, r², c², r·c`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellPolynomial {
    /// One `[x, y]` coefficient pair per term.
    pub coeffs: [[f64; 2]; 6],
}

impl CellPolynomial {
    #[inline]
    fn terms(row: f64, col: f64) -> [f64; 6] {
        [1.0, row, col, row * row, col * col, row * col]
    }

    /// Least-squares fit to `(row, col, image point)` samples. `None` when the
    /// cells do not determine all six terms.
    pub fn fit(samples: impl IntoIterator<Item = (usize, usize, Point2<f32>)>) -> Option<Self> {
        let mut system = NormalEquations::new(6, 2);
        for (row, col, p) in samples {
            system.add_row(
                &Self::terms(row as f64, col as f64),
                &[p.x as f64, p.y as f64],
            );
        }
        let params = system.solve(SolveMethod::Inverse)?;
        trace!("cell polynomial AtA:\n{}", system.ata());
        trace!("cell polynomial AtB:\n{}", system.atb());
        Some(Self {
            coeffs: std::array::from_fn(|k| [params[(k, 0)], params[(k, 1)]]),
        })
    }

    /// Predicted image position of cell `(row, col)` (fractional cells allowed).
    pub fn predict(&self, row: f64, col: f64) -> Point2<f32> {
        let t = Self::terms(row, col);
        let (x, y) = t
            .iter()
            .zip(&self.coeffs)
            .fold((0.0, 0.0), |(x, y), (t, c)| (x + t * c[0], y + t * c[1]));
        Point2::new(x as f32, y as f32)
    }
}

/// Map `v` from `[lo, lo + extent]` onto `[0, cells - 1]` and round.
fn to_cell(v: f32, lo: f32, extent: f32, cells: usize) -> usize {
    if cells <= 1 {
        return 0;
    }
    let t = (v - lo) / extent * (cells - 1) as f32;
    (t.round().max(0.0) as usize).min(cells - 1)
}

/// Assign every rectified-size-consistent square to a grid cell and fit the
/// cell polynomial.
pub fn index_squares(
    squares: &[Square],
    ortho_from_image: &Homography,
    params: &ColorCheckerParams,
) -> Result<(Vec<GridSquare>, CellPolynomial), DetectError> {
    let (rows, cols) = (params.rows, params.cols);
    let rectified: Vec<(Square, Point2<f32>, f32)> = squares
        .iter()
        .filter_map(|sq| {
            let c = rectified_corners(ortho_from_image, sq)?;
            let side = signed_area(&c).abs().sqrt();
            let center = Point2::from((c[0].coords + c[1].coords + c[2].coords + c[3].coords) * 0.25);
            Some((*sq, center, side))
        })
        .collect();

    let total = rectified.len();
    let (kept, median) =
        retain_median_consistent(rectified, |r| r.2, params.rectified_size_tolerance);
    debug!(
        "median rectified square size {median:.3}, kept {} of {total}",
        kept.len()
    );
    if kept.is_empty() {
        return Err(DetectError::NoConsistentSquares { median });
    }
    if kept.len() < params.min_squares {
        return Err(DetectError::TooFewSquares {
            found: kept.len(),
            required: params.min_squares,
        });
    }

    let (mut min, mut max) = (
        Point2::new(f32::INFINITY, f32::INFINITY),
        Point2::new(f32::NEG_INFINITY, f32::NEG_INFINITY),
    );
    for (_, c, _) in &kept {
        min = min.inf(c);
        max = max.sup(c);
    }
    let extent = max - min;
    if (cols > 1 && extent.x < MIN_SPAN) || (rows > 1 && extent.y < MIN_SPAN) {
        return Err(DetectError::DegenerateGrid { rows, cols });
    }

    let cells: Vec<GridSquare> = kept
        .into_iter()
        .map(|(square, c, _)| GridSquare {
            square,
            row: to_cell(c.y, min.y, extent.y, rows),
            col: to_cell(c.x, min.x, extent.x, cols),
            rectified_center: c,
        })
        .collect();

    let poly = CellPolynomial::fit(cells.iter().map(|g| (g.row, g.col, g.square.center())))
        .ok_or(DetectError::DegenerateGrid { rows, cols })?;
    Ok((cells, poly))
}

/// Predicted centre of every cell in row-major order. Fails if any rounded
/// centre falls outside a `width × height` image.
pub fn predict_centers(
    poly: &CellPolynomial,
    rows: usize,
    cols: usize,
    width: u32,
    height: u32,
) -> Result<Vec<Point2<f32>>, DetectError> {
    let mut out = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let p = poly.predict(row as f64, col as f64);
            let (x, y) = (p.x.round(), p.y.round());
            let inside = x.is_finite()
                && y.is_finite()
                && x >= 0.0
                && y >= 0.0
                && x < width as f32
                && y < height as f32;
            if !inside {
                return Err(DetectError::GridOutOfBounds {
                    row,
                    col,
                    x: p.x,
                    y: p.y,
                });
            }
            out.push(p);
        }
    }
    Ok(out)
}

/// Color at the rounded `center`, or the mean over the `(2r+1)²` window
/// around it (clipped to the image). `center` must lie inside the image.
pub fn sample_patch(image: &RgbImage, center: Point2<f32>, radius: u32) -> [u8; 3] {
    let cx = center.x.round() as u32;
    let cy = center.y.round() as u32;
    if radius == 0 {
        return image.get_pixel(cx, cy).0;
    }
    let x0 = cx.saturating_sub(radius);
    let y0 = cy.saturating_sub(radius);
    let x1 = (cx + radius).min(image.width() - 1);
    let y1 = (cy + radius).min(image.height() - 1);

    let mut sum = [0u64; 3];
    let mut n = 0u64;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let px = image.get_pixel(x, y).0;
            for c in 0..3 {
                sum[c] += px[c] as u64;
            }
            n += 1;
        }
    }
    sum.map(|s| ((s + n / 2) / n) as u8)
}

/// Sample every predicted centre into a `rows × cols` grid.
pub fn sample_colors(
    image: &RgbImage,
    centers: &[Point2<f32>],
    rows: usize,
    cols: usize,
    radius: u32,
) -> ColorGrid {
    let colors: Vec<[u8; 3]> = centers
        .iter()
        .map(|&c| sample_patch(image, c, radius))
        .collect();
    ColorGrid::from_colors(rows, cols, &colors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rectify::rectify;
    use crate::rectify::tests::lattice;
    use crate::RectifierKind;
    use approx::assert_relative_eq;
    use image::Rgb;

    fn shifted() -> Homography {
        Homography::from_array([[1.0, 0.0, 30.0], [0.0, 1.0, 20.0], [0.0, 0.0, 1.0]])
    }

    #[test]
    fn polynomial_reproduces_a_quadratic_layout() {
        let f = |r: f64, c: f64| {
            Point2::new(
                (40.0 + 60.0 * c + 0.5 * c * c) as f32,
                (30.0 + 58.0 * r + 0.2 * r * c) as f32,
            )
        };
        let samples = (0..4).flat_map(|r| (0..6).map(move |c| (r, c, f(r as f64, c as f64))));
        let poly = CellPolynomial::fit(samples).expect("fit");
        let p = poly.predict(2.0, 3.0);
        let want = f(2.0, 3.0);
        assert_relative_eq!(p.x, want.x, epsilon = 1e-3);
        assert_relative_eq!(p.y, want.y, epsilon = 1e-3);
    }

    #[test]
    fn one_row_does_not_determine_the_polynomial() {
        let samples = (0..6).map(|c| (0usize, c, Point2::new(c as f32 * 10.0, 5.0)));
        assert!(CellPolynomial::fit(samples).is_none());
    }

    #[test]
    fn lattice_squares_land_in_their_cells() {
        let squares = lattice(&shifted(), 4, 6, 60.0, 48.0);
        let params = ColorCheckerParams::default();
        let h = rectify(&squares, RectifierKind::Projective).expect("rectify");
        let (cells, poly) = index_squares(&squares, &h, &params).expect("index");
        assert_eq!(cells.len(), 24);
        for (i, g) in cells.iter().enumerate() {
            assert_eq!((g.row, g.col), (i / 6, i % 6));
        }
        let c = poly.predict(1.0, 2.0);
        assert_relative_eq!(c.x, 30.0 + 120.0 + 24.0, epsilon = 1e-2);
        assert_relative_eq!(c.y, 20.0 + 60.0 + 24.0, epsilon = 1e-2);
    }

    #[test]
    fn missing_squares_are_interpolated() {
        let mut squares = lattice(&shifted(), 4, 6, 60.0, 48.0);
        // Drop cells (1, 2) and (2, 4).
        squares.remove(16);
        squares.remove(8);
        let params = ColorCheckerParams::default();
        let h = rectify(&squares, RectifierKind::Projective).expect("rectify");
        let (cells, poly) = index_squares(&squares, &h, &params).expect("index");
        assert_eq!(cells.len(), 22);
        let centers = predict_centers(&poly, 4, 6, 400, 300).expect("inside");
        assert_relative_eq!(centers[8].x, 30.0 + 120.0 + 24.0, epsilon = 1e-2);
        assert_relative_eq!(centers[16].y, 20.0 + 120.0 + 24.0, epsilon = 1e-2);
    }

    #[test]
    fn too_few_or_collinear_squares_fail() {
        let params = ColorCheckerParams::default();

        let few = lattice(&shifted(), 2, 2, 60.0, 48.0);
        let h = rectify(&few, RectifierKind::Projective).expect("rectify");
        assert_eq!(
            index_squares(&few, &h, &params).map(|_| ()),
            Err(DetectError::TooFewSquares {
                found: 4,
                required: 6
            })
        );

        let strip = lattice(&shifted(), 1, 6, 60.0, 48.0);
        let h = rectify(&strip, RectifierKind::Projective).expect("rectify");
        assert_eq!(
            index_squares(&strip, &h, &params).map(|_| ()),
            Err(DetectError::DegenerateGrid { rows: 4, cols: 6 })
        );
    }

    #[test]
    fn centers_outside_the_image_are_reported() {
        let samples = (0..4).flat_map(|r| {
            (0..6).map(move |c| (r, c, Point2::new(10.0 + 20.0 * c as f32, 10.0 + 20.0 * r as f32)))
        });
        let poly = CellPolynomial::fit(samples).expect("fit");
        assert!(predict_centers(&poly, 4, 6, 200, 200).is_ok());
        match predict_centers(&poly, 4, 6, 100, 200) {
            Err(DetectError::GridOutOfBounds { row: 0, col, .. }) => assert_eq!(col, 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn window_sampling_averages_and_clips() {
        let img = RgbImage::from_fn(5, 5, |x, _| if x < 2 { Rgb([0, 0, 0]) } else { Rgb([90, 30, 3]) });
        assert_eq!(sample_patch(&img, Point2::new(2.2, 2.0), 0), [90, 30, 3]);
        // 3x3 window over x = 1..=3: one dark column of three.
        assert_eq!(sample_patch(&img, Point2::new(2.0, 2.0), 1), [60, 20, 2]);
        // Clipped at the corner: x = 0..=1 all dark.
        assert_eq!(sample_patch(&img, Point2::new(0.0, 0.0), 1), [0, 0, 0]);
    }
}
