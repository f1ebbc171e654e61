use serde::{Deserialize, Serialize};

/// How image space is mapped to the orthonormal grid frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RectifierKind {
    /// Joint projective fit over all squares (handles perspective skew).
    #[default]
    Projective,
    /// Rotation-only fit from the dominant edge directions.
    Axis,
}

/// Tolerances of the square test, as fractions of the square's own size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SquareParams {
    /// `|mean_len² - area| < area * area_tolerance`.
    pub area_tolerance: f32,
    /// Every edge within `mean_len * length_tolerance` of the mean.
    pub length_tolerance: f32,
}

impl Default for SquareParams {
    fn default() -> Self {
        Self {
            area_tolerance: 0.2,
            length_tolerance: 0.2,
        }
    }
}

impl SquareParams {
    /// The tighter 10 % tolerances of the axis-only pipeline.
    pub fn strict() -> Self {
        Self {
            area_tolerance: 0.1,
            length_tolerance: 0.1,
        }
    }
}

fn default_min_squares() -> usize {
    6
}

/// Configuration for [`crate::ColorCheckerDetector`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorCheckerParams {
    /// Patch rows of the target.
    pub rows: usize,
    /// Patch columns of the target.
    pub cols: usize,
    /// Pixels with edge magnitude at or below this value form the contour mask.
    pub gradient_threshold: f32,
    /// Douglas-Peucker tolerance in pixels.
    pub approx_epsilon: f32,
    /// Replace polygon vertices by intersections of least-squares edge lines.
    pub refine_edges: bool,
    #[serde(default)]
    pub square: SquareParams,
    /// Relative size tolerance around the median square in image space.
    pub image_size_tolerance: f32,
    /// Relative size tolerance around the median square after rectification.
    pub rectified_size_tolerance: f32,
    /// Fewest squares that may feed the row/col polynomial (it has 6 terms).
    #[serde(default = "default_min_squares")]
    pub min_squares: usize,
    #[serde(default)]
    pub rectifier: RectifierKind,
    /// Patch color is the mean over a `(2r+1)²` window; 0 samples one pixel.
    #[serde(default)]
    pub sample_radius: u32,
}

impl Default for ColorCheckerParams {
    fn default() -> Self {
        Self {
            rows: 4,
            cols: 6,
            gradient_threshold: 2.0,
            approx_epsilon: 5.0,
            refine_edges: true,
            square: SquareParams::default(),
            image_size_tolerance: 0.5,
            rectified_size_tolerance: 0.3,
            min_squares: default_min_squares(),
            rectifier: RectifierKind::Projective,
            sample_radius: 0,
        }
    }
}

impl ColorCheckerParams {
    /// Axis-aligned pipeline: coarse polygons, no edge refinement, rotation-only
    /// rectification and 10 % tolerances throughout.
    pub fn axis_aligned() -> Self {
        Self {
            approx_epsilon: 15.0,
            refine_edges: false,
            square: SquareParams::strict(),
            image_size_tolerance: 0.1,
            rectified_size_tolerance: 0.1,
            rectifier: RectifierKind::Axis,
            ..Self::default()
        }
    }

    /// Number of patches.
    #[inline]
    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_24_patch_target() {
        let p = ColorCheckerParams::default();
        assert_eq!((p.rows, p.cols, p.cells()), (4, 6, 24));
        assert_eq!(p.rectifier, RectifierKind::Projective);
        assert!(p.refine_edges);
    }

    #[test]
    fn json_fills_optional_fields() {
        let json = r#"{
            "rows": 4, "cols": 6,
            "gradient_threshold": 3.0,
            "approx_epsilon": 5.0,
            "refine_edges": false,
            "image_size_tolerance": 0.5,
            "rectified_size_tolerance": 0.3,
            "rectifier": "axis"
        }"#;
        let p: ColorCheckerParams = serde_json::from_str(json).expect("parse");
        assert_eq!(p.gradient_threshold, 3.0);
        assert_eq!(p.rectifier, RectifierKind::Axis);
        assert_eq!(p.square, SquareParams::default());
        assert_eq!(p.min_squares, 6);
        assert_eq!(p.sample_radius, 0);
    }
}
