//! Square test on simplified polygons and median-size filtering.

use crate::contour::Polygon;
use crate::SquareParams;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// A quadrilateral accepted as one patch of the target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Square {
    /// Corners in contour order.
    pub corners: [Point2<f32>; 4],
    /// Mean edge length in pixels.
    pub size: f32,
    /// Area of the traced boundary in pixels².
    pub area: f32,
}

impl Square {
    /// Edge vectors `corners[i+1] - corners[i]`.
    pub fn edges(&self) -> [Vector2<f32>; 4] {
        std::array::from_fn(|i| self.corners[(i + 1) % 4] - self.corners[i])
    }

    /// Intersection of the diagonals; the corner mean if they are parallel.
    pub fn center(&self) -> Point2<f32> {
        let [p0, p1, p2, p3] = self.corners;
        let d0 = p2 - p0;
        let d1 = p3 - p1;
        let denom = d0.x * d1.y - d0.y * d1.x;
        if denom.abs() > f32::EPSILON * d0.norm() * d1.norm() {
            let r = p1 - p0;
            let t = (r.x * d1.y - r.y * d1.x) / denom;
            p0 + d0 * t
        } else {
            Point2::from((p0.coords + p1.coords + p2.coords + p3.coords) * 0.25)
        }
    }
}

/// Outcome of the two square criteria for one quadrilateral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SquareCheck {
    /// Squared mean edge length agrees with the area.
    pub area_ok: bool,
    /// All edges agree with the mean edge length.
    pub lengths_ok: bool,
}

impl SquareCheck {
    #[inline]
    pub fn accepted(&self) -> bool {
        self.area_ok && self.lengths_ok
    }

    /// Number of criteria met (0, 1 or 2).
    #[inline]
    pub fn passed(&self) -> usize {
        self.area_ok as usize + self.lengths_ok as usize
    }
}

/// Evaluate the square criteria on a quadrilateral with the given area.
/// Returns the check and the mean edge length.
pub fn check_quad(corners: &[Point2<f32>; 4], area: f32, params: &SquareParams) -> (SquareCheck, f32) {
    let lengths: [f32; 4] = std::array::from_fn(|i| (corners[(i + 1) % 4] - corners[i]).norm());
    let mean = lengths.iter().sum::<f32>() / 4.0;
    let area_ok = (mean * mean - area).abs() < area * params.area_tolerance;
    let lengths_ok = lengths
        .iter()
        .all(|l| (l - mean).abs() <= mean * params.length_tolerance);
    (SquareCheck { area_ok, lengths_ok }, mean)
}

/// Square test for a simplified contour. Polygons that are not
/// positive-area quadrilaterals yield `None`.
pub fn classify(polygon: &Polygon, params: &SquareParams) -> Option<(SquareCheck, Square)> {
    if polygon.area <= 0.0 {
        return None;
    }
    let corners: [Point2<f32>; 4] = polygon.vertices.as_slice().try_into().ok()?;
    let (check, size) = check_quad(&corners, polygon.area, params);
    Some((
        check,
        Square {
            corners,
            size,
            area: polygon.area,
        },
    ))
}

/// Upper median of `values` by partial selection. `None` when empty.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut v = values.to_vec();
    let mid = v.len() / 2;
    let (_, m, _) = v.select_nth_unstable_by(mid, f32::total_cmp);
    Some(*m)
}

/// Keep the items whose size is within `median * tolerance` of the median
/// size. Returns the survivors and the median.
pub fn retain_median_consistent<T>(
    items: Vec<T>,
    size: impl Fn(&T) -> f32,
    tolerance: f32,
) -> (Vec<T>, f32) {
    let sizes: Vec<f32> = items.iter().map(&size).collect();
    let Some(m) = median(&sizes) else {
        return (items, 0.0);
    };
    let kept = items
        .into_iter()
        .zip(sizes)
        .filter(|(_, s)| (s - m).abs() < m * tolerance)
        .map(|(item, _)| item)
        .collect();
    (kept, m)
}
