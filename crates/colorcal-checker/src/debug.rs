//! Annotations drawn on an optional canvas while detecting. Nothing here
//! affects the detection result.

use crate::contour::RawContour;
use crate::grid::GridSquare;
use crate::square::SquareCheck;
use colorcal_core::Homography;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use nalgebra::Point2;

const CONTOUR: Rgb<u8> = Rgb([255, 255, 255]);
const SQUARE_OK: Rgb<u8> = Rgb([0, 255, 0]);
const SQUARE_PARTIAL: Rgb<u8> = Rgb([255, 127, 0]);
const SQUARE_REJECTED: Rgb<u8> = Rgb([255, 0, 0]);
const U_AXIS: Rgb<u8> = Rgb([255, 0, 0]);
const V_AXIS: Rgb<u8> = Rgb([0, 255, 0]);

/// Length of the axis arrows, in ortho units (square sides).
const ARROW: f32 = 0.4;

fn polyline(canvas: &mut RgbImage, points: impl Iterator<Item = Point2<f32>>, closed: bool, color: Rgb<u8>) {
    let points: Vec<Point2<f32>> = points.collect();
    let n = points.len();
    let segments = if closed { n } else { n.saturating_sub(1) };
    for i in 0..segments {
        let (a, b) = (points[i], points[(i + 1) % n]);
        draw_line_segment_mut(canvas, (a.x, a.y), (b.x, b.y), color);
    }
}

/// Every traced contour, in white.
pub fn draw_contours(canvas: &mut RgbImage, contours: &[RawContour]) {
    for c in contours {
        polyline(canvas, c.points.iter().map(|p| p.cast::<f32>()), true, CONTOUR);
    }
}

/// A candidate quadrilateral, colored by how many square criteria it met.
pub fn draw_candidate(canvas: &mut RgbImage, corners: &[Point2<f32>; 4], check: SquareCheck) {
    let color = match check.passed() {
        2 => SQUARE_OK,
        1 => SQUARE_PARTIAL,
        _ => SQUARE_REJECTED,
    };
    polyline(canvas, corners.iter().copied(), true, color);
}

/// Short `u` (red) and `v` (green) arrows from each indexed square's centre.
pub fn draw_axes(canvas: &mut RgbImage, squares: &[GridSquare], image_from_ortho: &Homography) {
    for g in squares {
        let from = image_from_ortho.apply(g.rectified_center);
        for (d, color) in [((ARROW, 0.0), U_AXIS), ((0.0, ARROW), V_AXIS)] {
            let to = image_from_ortho.apply(g.rectified_center + nalgebra::Vector2::new(d.0, d.1));
            if to.x.is_finite() && to.y.is_finite() {
                draw_line_segment_mut(canvas, (from.x, from.y), (to.x, to.y), color);
            }
        }
    }
}

/// Dot and ring at each sampled centre, white on dark patches and black on
/// bright ones.
pub fn draw_samples(canvas: &mut RgbImage, centers: &[Point2<f32>], colors: impl Iterator<Item = [u8; 3]>) {
    for (c, color) in centers.iter().zip(colors) {
        let luma: u32 = color.iter().map(|&v| v as u32 * v as u32 / 255).sum();
        let contrast = if luma < 255 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        };
        let at = (c.x.round() as i32, c.y.round() as i32);
        draw_filled_circle_mut(canvas, at, 1, contrast);
        draw_hollow_circle_mut(canvas, at, 6, contrast);
    }
}
