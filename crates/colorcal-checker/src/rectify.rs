//! Image → ortho-frame homography estimated from all accepted squares.
//!
//! In the ortho frame every square is axis-aligned with unit side, `u` runs
//! along the grid columns and `v` along the rows. The frame is anchored so the
//! mean of all square corners maps to `(0.5, 0.5)`.

use crate::square::{median, Square};
use crate::{DetectError, RectifierKind};
use colorcal_core::{homography_from_4pt, Homography, NormalEquations};
use log::debug;
use nalgebra::{Matrix3, Point2, Vector2, Vector3};

/// Image coordinates are multiplied by this before building line constraints.
const COORD_SCALE: f64 = 1e-3;

/// Ortho coordinates of the mean square corner.
fn ortho_center() -> Point2<f64> {
    Point2::new(0.5, 0.5)
}

/// Dominant edge direction (radians, in `(-π/4, π/4]`), from the
/// length-weighted circular mean of `4θ` over all square edges.
pub fn dominant_orientation(squares: &[Square]) -> Option<f32> {
    let (mut c, mut s) = (0.0f64, 0.0f64);
    for e in squares.iter().flat_map(|sq| sq.edges()) {
        let len = e.norm() as f64;
        let theta = (e.y as f64).atan2(e.x as f64);
        c += len * (4.0 * theta).cos();
        s += len * (4.0 * theta).sin();
    }
    if c.hypot(s) <= 1e-9 {
        return None;
    }
    Some((s.atan2(c) / 4.0) as f32)
}

/// Corners reordered as `(-,-), (+,-), (+,+), (-,+)` in the frame whose `u`
/// axis points along `theta`. `None` if the corners do not fall into four
/// distinct quadrants around the square centre.
pub fn ordered_corners(square: &Square, theta: f32) -> Option<[Point2<f32>; 4]> {
    let a = Vector2::new(theta.cos(), theta.sin());
    let b = Vector2::new(-a.y, a.x);
    let center = square.center();

    let mut slots: [Option<Point2<f32>>; 4] = [None; 4];
    for p in square.corners {
        let d = p - center;
        let slot = match (d.dot(&a) >= 0.0, d.dot(&b) >= 0.0) {
            (false, false) => 0,
            (true, false) => 1,
            (true, true) => 2,
            (false, true) => 3,
        };
        if slots[slot].replace(p).is_some() {
            return None;
        }
    }
    Some([slots[0]?, slots[1]?, slots[2]?, slots[3]?])
}

/// Unit-normal homogeneous line through two points, in scaled coordinates.
fn line_through(p: Point2<f32>, q: Point2<f32>) -> Option<Vector3<f64>> {
    let a = Vector3::new(p.x as f64 * COORD_SCALE, p.y as f64 * COORD_SCALE, 1.0);
    let b = Vector3::new(q.x as f64 * COORD_SCALE, q.y as f64 * COORD_SCALE, 1.0);
    let l = a.cross(&b);
    let n = l.x.hypot(l.y);
    (n > 1e-12).then(|| l / n)
}

/// Which vanishing point a line through two classified corners must contain.
#[derive(Clone, Copy)]
enum Through {
    /// Direction of increasing `u`.
    U,
    /// Direction of increasing `v`.
    V,
    /// The `(1, 1)` diagonal.
    Sum,
    /// The `(1, -1)` diagonal.
    Diff,
}

/// Corner pairs of an ordered square and the vanishing point their line meets.
const CONSTRAINTS: [(usize, usize, Through); 6] = [
    (0, 1, Through::U),
    (1, 2, Through::V),
    (2, 3, Through::U),
    (3, 0, Through::V),
    (0, 2, Through::Sum),
    (1, 3, Through::Diff),
];

fn mean_corner(squares: &[Square]) -> Option<Point2<f64>> {
    if squares.is_empty() {
        return None;
    }
    let sum = squares
        .iter()
        .flat_map(|sq| sq.corners)
        .fold(Vector2::<f64>::zeros(), |acc, p| acc + p.coords.cast::<f64>());
    Some(Point2::from(sum / (4 * squares.len()) as f64))
}

/// Ortho-from-image homography whose `u`/`v` vanishing points (scaled image
/// coordinates) are `h0`/`h1` and which maps `anchor` to the ortho centre.
fn from_vanishing_points(
    h0: Vector3<f64>,
    h1: Vector3<f64>,
    anchor: Point2<f64>,
) -> Option<Homography> {
    let m = Vector3::new(anchor.x * COORD_SCALE, anchor.y * COORD_SCALE, 1.0);
    let h2 = m - (h0 + h1) * 0.5;
    let unscale = Matrix3::new(
        1.0 / COORD_SCALE, 0.0, 0.0, //
        0.0, 1.0 / COORD_SCALE, 0.0, //
        0.0, 0.0, 1.0,
    );
    let image_from_ortho = unscale * Matrix3::from_columns(&[h0, h1, h2]);
    Homography::new(image_from_ortho).inverse()
}

/// Joint fit over all squares: every edge and diagonal constrains the
/// vanishing point it must pass through; the stacked homogeneous system is
/// solved for its null vector.
fn projective_fit(squares: &[Square], theta: f32) -> Option<Homography> {
    let mut system = NormalEquations::new(6, 0);
    let mut step = Vec::with_capacity(squares.len());
    for sq in squares {
        let Some(c) = ordered_corners(sq, theta) else {
            continue;
        };
        step.push(sq.size);
        for (i, j, through) in CONSTRAINTS {
            let Some(l) = line_through(c[i], c[j]) else {
                continue;
            };
            let (x, y, z) = (l.x, l.y, l.z);
            let row = match through {
                Through::U => [x, y, z, 0.0, 0.0, 0.0],
                Through::V => [0.0, 0.0, 0.0, x, y, z],
                Through::Sum => [x, y, z, x, y, z],
                Through::Diff => [x, y, z, -x, -y, -z],
            };
            system.add_row(&row, &[]);
        }
    }
    if system.rows() < 6 {
        return None;
    }
    let x = system.null_vector()?;
    let h0 = Vector3::new(x[0], x[1], x[2]);
    let h1 = Vector3::new(x[3], x[4], x[5]);
    let anchor = mean_corner(squares)?;

    // The null vector has an arbitrary sign; pick the one with u increasing
    // along `theta`.
    let probe_len = median(&step)? as f64;
    let probe = Point2::new(
        (anchor.x + theta.cos() as f64 * probe_len) as f32,
        (anchor.y + theta.sin() as f64 * probe_len) as f32,
    );
    let h = from_vanishing_points(h0, h1, anchor)?;
    let u = h.apply(probe).x as f64;
    if !u.is_finite() {
        return None;
    }
    if u >= ortho_center().x {
        Some(h)
    } else {
        from_vanishing_points(-h0, -h1, anchor)
    }
}

/// Four-point homography of one square onto the unit square.
pub fn square_ortho_from_image(square: &Square, theta: f32) -> Option<Homography> {
    let corners = ordered_corners(square, theta)?;
    let unit = [
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(1.0, 1.0),
        Point2::new(0.0, 1.0),
    ];
    homography_from_4pt(&corners, &unit)
}

/// Per-square fit of the square whose size is closest to the median.
fn median_square_fit(squares: &[Square], theta: f32) -> Option<Homography> {
    let sizes: Vec<f32> = squares.iter().map(|s| s.size).collect();
    let m = median(&sizes)?;
    let sq = squares
        .iter()
        .min_by(|a, b| (a.size - m).abs().total_cmp(&(b.size - m).abs()))?;
    square_ortho_from_image(sq, theta)
}

/// Rotation-only fit: average the edge directions closest to the image x and
/// y axes (sign-normalised to point right/down).
fn axis_fit(squares: &[Square]) -> Option<Homography> {
    let mut x_axis = Vector2::<f64>::zeros();
    let mut y_axis = Vector2::<f64>::zeros();
    for e in squares.iter().flat_map(|sq| sq.edges()) {
        let e = e.cast::<f64>();
        if e.x.abs() > e.y.abs() {
            x_axis += if e.x > 0.0 { e } else { -e };
        } else {
            y_axis += if e.y > 0.0 { e } else { -e };
        }
    }
    let x_axis = x_axis.try_normalize(1e-12)?;
    let y_axis = y_axis.try_normalize(1e-12)?;
    let anchor = mean_corner(squares)?;
    let t = Vector2::new(
        ortho_center().x - x_axis.dot(&anchor.coords),
        ortho_center().y - y_axis.dot(&anchor.coords),
    );
    Some(Homography::new(Matrix3::new(
        x_axis.x, x_axis.y, t.x, //
        y_axis.x, y_axis.y, t.y, //
        0.0, 0.0, 1.0,
    )))
}

/// Corners of `square` in the ortho frame; `None` if any maps to infinity.
pub fn rectified_corners(ortho_from_image: &Homography, square: &Square) -> Option<[Point2<f32>; 4]> {
    let out = square.corners.map(|p| ortho_from_image.apply(p));
    out.iter()
        .all(|p| p.x.is_finite() && p.y.is_finite())
        .then_some(out)
}

fn rectified_side(ortho_from_image: &Homography, square: &Square) -> Option<f32> {
    let c = rectified_corners(ortho_from_image, square)?;
    Some(crate::contour::signed_area(&c).abs().sqrt())
}

/// Scale so the median square has unit side, then turn the frame by 90° if
/// the square centres extend further in `v` than in `u`.
fn normalize_frame(base: Homography, squares: &[Square]) -> Option<Homography> {
    let sides: Vec<f32> = squares
        .iter()
        .filter_map(|sq| rectified_side(&base, sq))
        .collect();
    let side = median(&sides)?;
    if !(side.is_finite() && side > 0.0) {
        return None;
    }
    let scaled = Homography::scaling_about(ortho_center(), 1.0 / side as f64).compose(&base);

    let centers: Vec<Point2<f32>> = squares
        .iter()
        .filter_map(|sq| rectified_corners(&scaled, sq))
        .map(|c| Point2::from((c[0].coords + c[1].coords + c[2].coords + c[3].coords) * 0.25))
        .collect();
    let extent = |f: fn(&Point2<f32>) -> f32| {
        let (lo, hi) = centers
            .iter()
            .map(f)
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        hi - lo
    };
    let (width, height) = (extent(|p| p.x), extent(|p| p.y));
    debug!("rectified square side {side:.4}, centre extent {width:.2} x {height:.2}");

    if height > width {
        // (u, v) -> (v, 1 - u) about the ortho centre.
        let turn = Homography::new(Matrix3::new(
            0.0, 1.0, 0.0, //
            -1.0, 0.0, 1.0, //
            0.0, 0.0, 1.0,
        ));
        Some(turn.compose(&scaled))
    } else {
        Some(scaled)
    }
}

/// Estimate the ortho-from-image homography for `squares`.
pub fn rectify(squares: &[Square], kind: RectifierKind) -> Result<Homography, DetectError> {
    let base = match kind {
        RectifierKind::Projective => {
            let theta = dominant_orientation(squares).ok_or(DetectError::RectificationFailed)?;
            debug!("dominant grid orientation {:.2} deg", theta.to_degrees());
            projective_fit(squares, theta).or_else(|| {
                debug!("joint projective fit failed, using the median square alone");
                median_square_fit(squares, theta)
            })
        }
        RectifierKind::Axis => axis_fit(squares),
    };
    base.and_then(|h| normalize_frame(h, squares))
        .ok_or(DetectError::RectificationFailed)
}
