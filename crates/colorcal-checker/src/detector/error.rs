/// Reasons a color checker could not be located.
///
/// Everything except [`DetectError::EmptyImage`] and
/// [`DetectError::InvalidLayout`] is an ordinary outcome for a photo that
/// does not show a usable target.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("input image is empty")]
    EmptyImage,
    #[error("invalid grid layout {rows}x{cols}")]
    InvalidLayout { rows: usize, cols: usize },
    #[error("no contours in the low-gradient mask")]
    NoContours,
    #[error("found no squares among {contours} contours")]
    NoSquares { contours: usize },
    #[error("no squares consistent with the median square size {median:.2}")]
    NoConsistentSquares { median: f32 },
    #[error("only {found} consistent squares, need at least {required}")]
    TooFewSquares { found: usize, required: usize },
    #[error("could not rectify the square grid")]
    RectificationFailed,
    #[error("square centers do not span a {rows}x{cols} grid")]
    DegenerateGrid { rows: usize, cols: usize },
    #[error("predicted center of cell ({row}, {col}) at ({x:.1}, {y:.1}) is outside the image")]
    GridOutOfBounds {
        row: usize,
        col: usize,
        x: f32,
        y: f32,
    },
}

impl DetectError {
    /// `true` for caller errors (bad input), `false` when the image simply
    /// does not contain a detectable target.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::EmptyImage | Self::InvalidLayout { .. })
    }
}
