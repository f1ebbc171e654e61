//! Boundary tracing of the low-gradient mask, polygon simplification and
//! subpixel edge refinement.

use colorcal_core::NormalEquations;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use nalgebra::{Point2, Vector3};

/// Line fits run on coordinates multiplied by this factor.
const LINE_FIT_SCALE: f64 = 1e-3;

/// Fraction of the way towards its successor each boundary point is moved
/// before refinement, so axis-aligned duplicate runs do not coincide.
const TIE_BREAK_SHIFT: f32 = 0.01;

/// A traced boundary with pixel-exact points.
#[derive(Clone, Debug, PartialEq)]
pub struct RawContour {
    pub points: Vec<Point2<i32>>,
    /// Enclosed area; outer borders of a region are positive, hole borders
    /// negative.
    pub signed_area: f32,
}

/// Simplified closed polygon of a contour.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<Point2<f32>>,
    /// Signed area of the raw contour the polygon came from.
    pub area: f32,
}

/// Trace all borders of the nonzero regions of `mask`, without hierarchy.
pub fn find_raw_contours(mask: &GrayImage) -> Vec<RawContour> {
    find_contours::<i32>(mask)
        .into_iter()
        .map(|c| {
            let points: Vec<Point2<i32>> = c.points.iter().map(|p| Point2::new(p.x, p.y)).collect();
            let area = polygon_area(&points).abs() as f32;
            let signed_area = match c.border_type {
                BorderType::Outer => area,
                BorderType::Hole => -area,
            };
            RawContour {
                points,
                signed_area,
            }
        })
        .collect()
}

/// Unsigned shoelace area of a closed integer polygon.
fn polygon_area(points: &[Point2<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: i64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum();
    twice as f64 * 0.5
}

/// Shoelace area of a closed float polygon; positive when the vertices run
/// clockwise on screen (y down).
pub fn signed_area(points: &[Point2<f32>]) -> f32 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64
        })
        .sum();
    (twice * 0.5) as f32
}

fn distance_to_line(p: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    let ab = b - a;
    let ap = p - a;
    let len = ab.norm();
    if len <= f32::EPSILON {
        return ap.norm();
    }
    (ab.x * ap.y - ab.y * ap.x).abs() / len
}

fn farthest_from(points: &[Point2<f32>], from: Point2<f32>) -> usize {
    points
        .iter()
        .enumerate()
        .max_by(|a, b| (a.1 - from).norm_squared().total_cmp(&(b.1 - from).norm_squared()))
        .map_or(0, |(i, _)| i)
}

/// Douglas-Peucker on the open chain `start..=start+len` (indices wrap),
/// pushing kept interior indices into `out`.
fn simplify_chain(points: &[Point2<f32>], start: usize, len: usize, epsilon: f32, out: &mut Vec<usize>) {
    let n = points.len();
    let mut stack = vec![(0usize, len)];
    while let Some((lo, hi)) = stack.pop() {
        if hi <= lo + 1 {
            continue;
        }
        let (a, b) = (points[(start + lo) % n], points[(start + hi) % n]);
        let (split, dist) = (lo + 1..hi)
            .map(|k| (k, distance_to_line(points[(start + k) % n], a, b)))
            .fold((lo, -1.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });
        if dist > epsilon {
            out.push((start + split) % n);
            stack.push((lo, split));
            stack.push((split, hi));
        }
    }
}

/// Closed-polygon Douglas-Peucker. Returns the kept indices in contour order.
///
/// The polygon is anchored at two mutually distant points and each of the two
/// chains between them is simplified independently.
pub fn approx_polygon(points: &[Point2<f32>], epsilon: f32) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }
    let a = farthest_from(points, points[0]);
    let b = farthest_from(points, points[a]);
    if a == b {
        return vec![a];
    }
    let (lo, hi) = (a.min(b), a.max(b));

    let mut keep = vec![lo, hi];
    simplify_chain(points, lo, hi - lo, epsilon, &mut keep);
    simplify_chain(points, hi, n - hi + lo, epsilon, &mut keep);
    keep.sort_unstable();
    keep.dedup();
    keep
}

/// Homogeneous line `(a, b, c)` through `points` (in scaled coordinates),
/// minimising algebraic distance.
fn fit_line(points: impl Iterator<Item = Point2<f32>>) -> Option<Vector3<f64>> {
    let mut scatter = NormalEquations::new(3, 0);
    for p in points {
        scatter.add_row(
            &[p.x as f64 * LINE_FIT_SCALE, p.y as f64 * LINE_FIT_SCALE, 1.0],
            &[],
        );
    }
    if scatter.rows() < 2 {
        return None;
    }
    let v = scatter.null_vector()?;
    Some(Vector3::new(v[0], v[1], v[2]))
}

/// Intersection of two scaled homogeneous lines, back in pixel coordinates.
fn intersect(l0: &Vector3<f64>, l1: &Vector3<f64>) -> Option<Point2<f32>> {
    let p = l0.cross(l1);
    if p[2].abs() < 1e-12 {
        return None;
    }
    let x = p[0] / p[2] / LINE_FIT_SCALE;
    let y = p[1] / p[2] / LINE_FIT_SCALE;
    (x.is_finite() && y.is_finite()).then(|| Point2::new(x as f32, y as f32))
}

/// Move every point a little towards its successor.
fn break_ties(points: &[Point2<i32>]) -> Vec<Point2<f32>> {
    let n = points.len();
    (0..n)
        .map(|i| {
            let p = points[i].cast::<f32>();
            let next = points[(i + 1) % n].cast::<f32>();
            p + (next - p) * TIE_BREAK_SHIFT
        })
        .collect()
}

/// Fit a line to each boundary run between consecutive corners and replace
/// every corner by the intersection of its two adjacent lines.
///
/// Corners whose adjacent lines cannot be fitted or are parallel keep their
/// original position.
pub fn refine_corners(points: &[Point2<f32>], corners: &[usize]) -> Vec<Point2<f32>> {
    let n = points.len();
    let m = corners.len();
    let lines: Vec<Option<Vector3<f64>>> = (0..m)
        .map(|k| {
            let start = corners[k];
            let end = corners[(k + 1) % m];
            let len = (end + n - start) % n;
            fit_line((0..=len).map(|i| points[(start + i) % n]))
        })
        .collect();

    (0..m)
        .map(|k| {
            let before = &lines[(k + m - 1) % m];
            let after = &lines[k];
            match (before, after) {
                (Some(l0), Some(l1)) => intersect(l0, l1),
                _ => None,
            }
            .unwrap_or(points[corners[k]])
        })
        .collect()
}

/// Simplify a raw contour to a polygon, optionally refining its vertices.
///
/// Contours that simplify to fewer than three vertices are returned without
/// refinement.
pub fn simplify_contour(contour: &RawContour, epsilon: f32, refine: bool) -> Polygon {
    let points = if refine {
        break_ties(&contour.points)
    } else {
        contour.points.iter().map(|p| p.cast::<f32>()).collect()
    };
    let corners = approx_polygon(&points, epsilon);
    let vertices = if refine && corners.len() >= 3 {
        refine_corners(&points, &corners)
    } else {
        corners.iter().map(|&i| points[i]).collect()
    };
    Polygon {
        vertices,
        area: contour.signed_area,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Mask with a filled `size × size` block whose top-left pixel is `(x0, y0)`.
    fn block_mask(w: u32, h: u32, x0: u32, y0: u32, size: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if x >= x0 && x < x0 + size && y >= y0 && y < y0 + size {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    fn assert_near(p: Point2<f32>, x: f32, y: f32, tol: f32) {
        assert!(
            (p.x - x).abs() < tol && (p.y - y).abs() < tol,
            "({}, {}) is not near ({x}, {y})",
            p.x,
            p.y
        );
    }

    #[test]
    fn block_yields_one_positive_outer_contour() {
        let contours = find_raw_contours(&block_mask(40, 40, 10, 10, 20));
        assert_eq!(contours.len(), 1);
        // Boundary pixels run from 10 to 29.
        assert_eq!(contours[0].signed_area, 19.0 * 19.0);
    }

    #[test]
    fn ring_has_a_negative_hole_border() {
        let mut mask = block_mask(40, 40, 5, 5, 30);
        for y in 15..25 {
            for x in 15..25 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        let contours = find_raw_contours(&mask);
        assert!(contours.iter().any(|c| c.signed_area > 0.0));
        assert!(contours.iter().any(|c| c.signed_area < 0.0));
    }

    #[test]
    fn square_boundary_simplifies_to_its_corners() {
        let contour = &find_raw_contours(&block_mask(40, 40, 10, 10, 20))[0];
        let poly = simplify_contour(contour, 5.0, false);
        assert_eq!(poly.vertices.len(), 4);
        for (x, y) in [(10.0, 10.0), (29.0, 10.0), (29.0, 29.0), (10.0, 29.0)] {
            assert!(
                poly.vertices.iter().any(|v| (v.x - x).abs() < 1e-6 && (v.y - y).abs() < 1e-6),
                "missing corner ({x}, {y}) in {:?}",
                poly.vertices
            );
        }
    }

    #[test]
    fn refined_corners_stay_on_the_square() {
        let contour = &find_raw_contours(&block_mask(60, 60, 12, 15, 30))[0];
        let poly = simplify_contour(contour, 5.0, true);
        assert_eq!(poly.vertices.len(), 4);
        for (x, y) in [(12.0, 15.0), (41.0, 15.0), (41.0, 44.0), (12.0, 44.0)] {
            assert!(
                poly.vertices.iter().any(|v| (v.x - x).abs() < 0.5 && (v.y - y).abs() < 0.5),
                "missing corner ({x}, {y}) in {:?}",
                poly.vertices
            );
        }
    }

    #[test]
    fn line_refinement_beats_a_displaced_vertex() {
        // Dense samples along the four sides of a 20×20 square, with the
        // polygon vertex at index 0 pushed off the true corner.
        let mut pts = Vec::new();
        for i in 0..20 {
            pts.push(Point2::new(i as f32, 0.0));
        }
        for i in 0..20 {
            pts.push(Point2::new(20.0, i as f32));
        }
        for i in 0..20 {
            pts.push(Point2::new(20.0 - i as f32, 20.0));
        }
        for i in 0..20 {
            pts.push(Point2::new(0.0, 20.0 - i as f32));
        }
        pts[0] = Point2::new(0.8, 0.6);
        let refined = refine_corners(&pts, &[0, 20, 40, 60]);
        assert_near(refined[1], 20.0, 0.0, 0.1);
        assert_near(refined[2], 20.0, 20.0, 1e-3);
        // Corner 0 is rebuilt from the two clean sides around it.
        assert_near(refined[0], 0.0, 0.0, 0.2);
    }

    #[test]
    fn approximation_of_tiny_contours_is_identity() {
        let pts = [Point2::new(0.0f32, 0.0), Point2::new(1.0, 0.0)];
        assert_eq!(approx_polygon(&pts, 5.0), vec![0, 1]);
        assert!(approx_polygon(&[], 5.0).is_empty());
    }

    #[test]
    fn shoelace_orientation() {
        let cw_on_screen = [
            Point2::new(0.0f32, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 2.0),
            Point2::new(0.0, 2.0),
        ];
        assert_eq!(signed_area(&cw_on_screen), 4.0);
        let mut ccw = cw_on_screen;
        ccw.reverse();
        assert_eq!(signed_area(&ccw), -4.0);
    }
}
