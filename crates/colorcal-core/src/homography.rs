use crate::lstsq::{NormalEquations, SolveMethod};
use image::{Rgb, RgbImage};
use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Planar projective transform acting on homogeneous 2D points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_fn(|r, c| rows[r][c]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        let mut out = [[0.0; 3]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = self.h[(r, c)];
            }
        }
        out
    }

    /// Map `p` and dehomogenise. Points on the vanishing line map to
    /// non-finite coordinates.
    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    /// Homogeneous scale `w` of `H·(p, 1)`; its sign tells which side of the
    /// vanishing line `p` lies on.
    #[inline]
    pub fn weight(&self, p: Point2<f32>) -> f64 {
        (self.h.row(2) * Vector3::new(p.x as f64, p.y as f64, 1.0))[0]
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// `self ∘ other`: first apply `other`, then `self`.
    pub fn compose(&self, other: &Homography) -> Self {
        Self::new(self.h * other.h)
    }

    /// Pure scaling by `s` about `center`.
    pub fn scaling_about(center: Point2<f64>, s: f64) -> Self {
        Self::new(Matrix3::new(
            s,
            0.0,
            center.x * (1.0 - s),
            0.0,
            s,
            center.y * (1.0 - s),
            0.0,
            0.0,
            1.0,
        ))
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points4(pts: &[Point2<f32>; 4]) -> ([Point2<f64>; 4], Matrix3<f64>) {
    let cx = pts.iter().map(|p| p.x as f64).sum::<f64>() / 4.0;
    let cy = pts.iter().map(|p| p.y as f64).sum::<f64>() / 4.0;
    let mean_dist = pts
        .iter()
        .map(|p| (p.x as f64 - cx).hypot(p.y as f64 - cy))
        .sum::<f64>()
        / 4.0;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts.map(|p| {
        let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
        Point2::new(v[0], v[1])
    });
    (out, t)
}

/// Compute H such that `dst ~ H * src` from 4 point correspondences.
///
/// Unknowns are the 8 entries `[h11 h12 h13 h21 h22 h23 h31 h32]` with
/// `h33 = 1`; both point sets are Hartley-normalised and the normal equations
/// are solved through the SVD pseudo-inverse. Corner order must be consistent
/// between `src` and `dst`.
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    let (src_n, t_src) = normalize_points4(src);
    let (dst_n, t_dst) = normalize_points4(dst);

    let mut system = NormalEquations::new(8, 1);
    for (s, d) in src_n.iter().zip(dst_n.iter()) {
        let (x, y, u, v) = (s.x, s.y, d.x, d.y);
        // h11 x + h12 y + h13 - u h31 x - u h32 y = u
        system.add_row(&[x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y], &[u]);
        // h21 x + h22 y + h23 - v h31 x - v h32 y = v
        system.add_row(&[0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y], &[v]);
    }
    let x = system.solve(SolveMethod::Svd)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    // H = T_dst^-1 * Hn * T_src
    let h = t_dst.try_inverse()? * hn * t_src;
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(Homography::new(h / s))
}

/// Render a rectified view: every output pixel centre is mapped through
/// `h_img_from_rect` and sampled (nearest neighbour) from `src`. Pixels that
/// land outside `src` are black.
pub fn warp_perspective_rgb(
    src: &RgbImage,
    h_img_from_rect: &Homography,
    out_w: u32,
    out_h: u32,
) -> RgbImage {
    RgbImage::from_fn(out_w, out_h, |x, y| {
        let p = h_img_from_rect.apply(Point2::new(x as f32 + 0.5, y as f32 + 0.5));
        let (sx, sy) = (p.x.floor(), p.y.floor());
        if sx.is_finite()
            && sy.is_finite()
            && sx >= 0.0
            && sy >= 0.0
            && (sx as u32) < src.width()
            && (sy as u32) < src.height()
        {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}
