//! Ordered patch colors of a color target and swatch rendering.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// `rows × cols` patch colors in canonical row-major order.
///
/// Backed by an `RgbImage` with `width = cols`, `height = rows`, so the
/// per-pixel color operations apply to a grid unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ColorGridRepr", try_from = "ColorGridRepr")]
pub struct ColorGrid {
    image: RgbImage,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ColorGridRepr {
    rows: usize,
    cols: usize,
    colors: Vec<[u8; 3]>,
}

impl From<ColorGrid> for ColorGridRepr {
    fn from(grid: ColorGrid) -> Self {
        Self {
            rows: grid.rows(),
            cols: grid.cols(),
            colors: grid.colors().collect(),
        }
    }
}

impl TryFrom<ColorGridRepr> for ColorGrid {
    type Error = String;

    fn try_from(repr: ColorGridRepr) -> Result<Self, Self::Error> {
        if repr.colors.len() != repr.rows * repr.cols {
            return Err(format!(
                "expected {} colors for a {}x{} grid, got {}",
                repr.rows * repr.cols,
                repr.rows,
                repr.cols,
                repr.colors.len()
            ));
        }
        Ok(Self::from_colors(repr.rows, repr.cols, &repr.colors))
    }
}

impl ColorGrid {
    /// Grid filled with a single color.
    pub fn filled(rows: usize, cols: usize, color: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(cols as u32, rows as u32, Rgb(color)),
        }
    }

    /// Build from row-major colors. Panics if `colors.len() != rows * cols`.
    pub fn from_colors(rows: usize, cols: usize, colors: &[[u8; 3]]) -> Self {
        assert_eq!(colors.len(), rows * cols, "color count must match grid size");
        let mut grid = Self::filled(rows, cols, [0, 0, 0]);
        for (px, c) in grid.image.pixels_mut().zip(colors) {
            *px = Rgb(*c);
        }
        grid
    }

    /// Interpret an image as a grid (`rows = height`, `cols = width`).
    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.image.height() as usize
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.image.width() as usize
    }

    pub fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> [u8; 3] {
        self.image.get_pixel(col as u32, row as u32).0
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, color: [u8; 3]) {
        self.image.put_pixel(col as u32, row as u32, Rgb(color));
    }

    /// Colors in row-major order.
    pub fn colors(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.image.pixels().map(|p| p.0)
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    pub fn as_image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Grid rotated by 180° (what a detector sees when the target is upside down).
    pub fn rotated_180(&self) -> Self {
        Self::from_image(image::imageops::rotate180(&self.image))
    }
}

/// Render the grid as solid squares of `square_size` pixels separated (and
/// surrounded) by `padding` pixels of `background`.
pub fn render_swatch(
    grid: &ColorGrid,
    square_size: u32,
    padding: u32,
    background: [u8; 3],
) -> RgbImage {
    let pitch = square_size + padding;
    let width = grid.cols() as u32 * pitch + padding;
    let height = grid.rows() as u32 * pitch + padding;
    RgbImage::from_fn(width, height, |x, y| {
        let (cx, ox) = (x.saturating_sub(padding) / pitch, x.saturating_sub(padding) % pitch);
        let (cy, oy) = (y.saturating_sub(padding) / pitch, y.saturating_sub(padding) % pitch);
        let inside = x >= padding
            && y >= padding
            && ox < square_size
            && oy < square_size
            && (cx as usize) < grid.cols()
            && (cy as usize) < grid.rows();
        if inside {
            Rgb(grid.get(cy as usize, cx as usize))
        } else {
            Rgb(background)
        }
    })
}

/// Enlarged swatch for inspection: 50 px squares, 10 px gaps, mid-grey background.
pub fn big_checker(grid: &ColorGrid) -> RgbImage {
    render_swatch(grid, 50, 10, [127, 127, 127])
}

/// Per-channel `127 + adjusted - reference`, saturated: mid-grey means no error.
///
/// Both grids must have the same shape.
pub fn error_checker(adjusted: &ColorGrid, reference: &ColorGrid) -> Option<ColorGrid> {
    if adjusted.rows() != reference.rows() || adjusted.cols() != reference.cols() {
        return None;
    }
    let colors: Vec<[u8; 3]> = adjusted
        .colors()
        .zip(reference.colors())
        .map(|(a, r)| {
            [0, 1, 2].map(|c| (127 + a[c] as i32 - r[c] as i32).clamp(0, 255) as u8)
        })
        .collect();
    Some(ColorGrid::from_colors(
        adjusted.rows(),
        adjusted.cols(),
        &colors,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_grid() -> ColorGrid {
        let colors: Vec<[u8; 3]> = (0..6u8).map(|i| [i * 40, 255 - i * 40, 7]).collect();
        ColorGrid::from_colors(2, 3, &colors)
    }

    #[test]
    fn row_major_access() {
        let g = sample_grid();
        assert_eq!((g.rows(), g.cols(), g.len()), (2, 3, 6));
        assert_eq!(g.get(0, 0), [0, 255, 7]);
        assert_eq!(g.get(1, 2), [200, 55, 7]);
        assert_eq!(g.colors().nth(4), Some([160, 95, 7]));
    }

    #[test]
    fn rotation_by_180_reverses_order() {
        let g = sample_grid();
        let r = g.rotated_180();
        assert_eq!(r.get(0, 0), g.get(1, 2));
        assert_eq!(r.get(1, 2), g.get(0, 0));
    }

    #[test]
    fn swatch_layout() {
        let g = sample_grid();
        let img = big_checker(&g);
        assert_eq!(img.dimensions(), (3 * 60 + 10, 2 * 60 + 10));
        assert_eq!(img.get_pixel(5, 5).0, [127, 127, 127]);
        assert_eq!(img.get_pixel(10, 10).0, g.get(0, 0));
        assert_eq!(img.get_pixel(59, 59).0, g.get(0, 0));
        assert_eq!(img.get_pixel(65, 30).0, [127, 127, 127]);
        assert_eq!(img.get_pixel(70 + 60, 70).0, g.get(1, 2));
    }

    #[test]
    fn error_checker_is_grey_for_equal_grids() {
        let g = sample_grid();
        let e = error_checker(&g, &g).expect("same shape");
        assert!(e.colors().all(|c| c == [127, 127, 127]));
        assert!(error_checker(&g, &ColorGrid::filled(3, 2, [0; 3])).is_none());
    }

    #[test]
    fn serde_round_trip_checks_length() {
        let g = sample_grid();
        let json = serde_json::to_string(&g).expect("serialize");
        let back: ColorGrid = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, g);

        let bad = r#"{"rows":2,"cols":2,"colors":[[1,2,3]]}"#;
        assert!(serde_json::from_str::<ColorGrid>(bad).is_err());
    }
}
