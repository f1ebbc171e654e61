//! Affine color correction: fit `new = M · [r, g, b, 1]ᵗ` between two
//! patch grids and apply it to images.

use crate::lstsq::{NormalEquations, SolveMethod};
use crate::ColorGrid;
use image::RgbImage;
use log::trace;
use nalgebra::{Matrix3x4, Vector3, Vector4};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("dimension mismatch: {left_rows}x{left_cols} vs {right_rows}x{right_cols}")]
    DimensionMismatch {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },
    #[error("empty input")]
    Empty,
    #[error("color samples do not span enough of the gamut to fit a transform")]
    Singular,
}

fn check_same_shape(a: &RgbImage, b: &RgbImage) -> Result<(), TransformError> {
    if a.dimensions() != b.dimensions() {
        return Err(TransformError::DimensionMismatch {
            left_rows: a.height() as usize,
            left_cols: a.width() as usize,
            right_rows: b.height() as usize,
            right_cols: b.width() as usize,
        });
    }
    if a.width() == 0 || a.height() == 0 {
        return Err(TransformError::Empty);
    }
    Ok(())
}

/// 3×4 affine color transform, applied identically to every pixel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorTransform {
    pub m: Matrix3x4<f32>,
}

impl Default for ColorTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl ColorTransform {
    pub fn new(m: Matrix3x4<f32>) -> Self {
        Self { m }
    }

    /// `[I | 0]`.
    pub fn identity() -> Self {
        Self::new(Matrix3x4::identity())
    }

    /// Least-squares fit mapping `source` colors onto `reference` colors.
    ///
    /// Each patch contributes one row `[r, g, b, 1]` to `A` and its reference
    /// color to `B`; the 4×4 system is solved by direct inversion, which is
    /// adequate because a color target spans the gamut.
    pub fn fit(source: &ColorGrid, reference: &ColorGrid) -> Result<Self, TransformError> {
        check_same_shape(source.as_image(), reference.as_image())?;

        let mut system = NormalEquations::new(4, 3);
        for (s, r) in source.colors().zip(reference.colors()) {
            system.add_row(
                &[s[0] as f64, s[1] as f64, s[2] as f64, 1.0],
                &[r[0] as f64, r[1] as f64, r[2] as f64],
            );
        }
        let params = system
            .solve(SolveMethod::Inverse)
            .ok_or(TransformError::Singular)?;
        trace!("color fit AtA:\n{}", system.ata());
        trace!("color fit AtB:\n{}", system.atb());

        // params is 4x3; the transform is its transpose.
        let m = Matrix3x4::from_fn(|r, c| params[(c, r)] as f32);
        trace!("color transform:\n{m}");
        Ok(Self::new(m))
    }

    /// Transformed color before saturation.
    #[inline]
    pub fn apply_to_color(&self, color: [u8; 3]) -> [f32; 3] {
        let v = self.m
            * Vector4::new(color[0] as f32, color[1] as f32, color[2] as f32, 1.0);
        [v[0], v[1], v[2]]
    }

    /// Transform every pixel in place, rounding and saturating to `0..=255`.
    pub fn apply(&self, image: &mut RgbImage) {
        for px in image.pixels_mut() {
            let v = self.apply_to_color(px.0);
            px.0 = v.map(saturate_u8);
        }
    }

    pub fn apply_to_grid(&self, grid: &mut ColorGrid) {
        self.apply(grid.as_image_mut());
    }

    /// Linear part (3×3) and offset, for callers that want them separately.
    pub fn split(&self) -> (nalgebra::Matrix3<f32>, Vector3<f32>) {
        (
            self.m.fixed_view::<3, 3>(0, 0).into_owned(),
            self.m.column(3).into_owned(),
        )
    }
}

#[inline]
fn saturate_u8(v: f32) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

fn abs_deviations(a: &RgbImage, b: &RgbImage) -> Result<Vec<f32>, TransformError> {
    check_same_shape(a, b)?;
    Ok(a.as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| (x as f32 - y as f32).abs())
        .collect())
}

/// Median of the per-channel absolute differences (upper median for even
/// counts), computed with partial selection.
pub fn median_absolute_deviation(a: &RgbImage, b: &RgbImage) -> Result<f32, TransformError> {
    let mut devs = abs_deviations(a, b)?;
    let mid = devs.len() / 2;
    let (_, median, _) = devs.select_nth_unstable_by(mid, f32::total_cmp);
    Ok(*median)
}

/// Average absolute difference per channel value (L1 norm / count).
pub fn mean_absolute_error(a: &RgbImage, b: &RgbImage) -> Result<f32, TransformError> {
    let devs = abs_deviations(a, b)?;
    Ok(devs.iter().map(|&d| d as f64).sum::<f64>() as f32 / devs.len() as f32)
}

/// Root-mean-square difference per channel value (L2 norm / sqrt(count)).
pub fn rms_error(a: &RgbImage, b: &RgbImage) -> Result<f32, TransformError> {
    let devs = abs_deviations(a, b)?;
    let sq: f64 = devs.iter().map(|&d| (d as f64) * (d as f64)).sum();
    Ok((sq / devs.len() as f64).sqrt() as f32)
}
