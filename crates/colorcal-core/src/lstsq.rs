//! Dense normal-equation accumulator for small least-squares problems.
//!
//! Every fit in the pipeline (edge lines, the grid rectifier, per-square
//! homographies, the row/col polynomial and the color transform) has the
//! same shape: accumulate `AᵗWA` and `AᵗWB` one observation at a time, then
//! solve. [`NormalEquations`] is that accumulator.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// Singular values below `max_sv * SVD_RELATIVE_EPS` are treated as zero.
const SVD_RELATIVE_EPS: f64 = 1e-12;

/// Direct inversion is refused below this reciprocal condition number.
const INVERSE_MIN_RCOND: f64 = 1e-12;

/// How to solve `AᵗA x = AᵗB`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveMethod {
    /// Direct inverse of `AᵗA`. Fails on singular systems.
    Inverse,
    /// SVD pseudo-inverse; tolerates rank deficiency (minimum-norm solution).
    Svd,
}

/// Accumulated normal equations for `unknowns` parameters and `rhs_cols`
/// right-hand sides.
#[derive(Clone, Debug)]
pub struct NormalEquations {
    ata: DMatrix<f64>,
    atb: DMatrix<f64>,
    rows: usize,
}

impl NormalEquations {
    pub fn new(unknowns: usize, rhs_cols: usize) -> Self {
        Self {
            ata: DMatrix::zeros(unknowns, unknowns),
            atb: DMatrix::zeros(unknowns, rhs_cols),
            rows: 0,
        }
    }

    #[inline]
    pub fn unknowns(&self) -> usize {
        self.ata.nrows()
    }

    /// Number of observation rows added so far.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn ata(&self) -> &DMatrix<f64> {
        &self.ata
    }

    pub fn atb(&self) -> &DMatrix<f64> {
        &self.atb
    }

    #[inline]
    pub fn add_row(&mut self, a: &[f64], b: &[f64]) {
        self.add_weighted_row(a, b, 1.0);
    }

    /// Add one observation row `a` with target `b`, weighted by `weight`.
    ///
    /// `a.len()` must equal the number of unknowns and `b.len()` the number of
    /// right-hand-side columns (zero for homogeneous systems).
    pub fn add_weighted_row(&mut self, a: &[f64], b: &[f64], weight: f64) {
        let n = self.unknowns();
        let m = self.atb.ncols();
        debug_assert_eq!(a.len(), n, "row length does not match unknowns");
        debug_assert_eq!(b.len(), m, "rhs length does not match rhs columns");

        for i in 0..n {
            let wa = weight * a[i];
            if wa == 0.0 {
                continue;
            }
            for j in 0..n {
                self.ata[(i, j)] += wa * a[j];
            }
            for k in 0..m {
                self.atb[(i, k)] += wa * b[k];
            }
        }
        self.rows += 1;
    }

    /// Solve for the `unknowns × rhs_cols` parameter matrix.
    pub fn solve(&self, method: SolveMethod) -> Option<DMatrix<f64>> {
        if self.rows == 0 {
            return None;
        }
        let x = match method {
            SolveMethod::Inverse => {
                let sv = self.ata.singular_values();
                if !(sv.min() > sv.max() * INVERSE_MIN_RCOND) {
                    return None;
                }
                let inv = self.ata.clone().try_inverse()?;
                inv * &self.atb
            }
            SolveMethod::Svd => {
                let svd = self.ata.clone().svd(true, true);
                let max_sv = svd.singular_values.max();
                if !max_sv.is_finite() || max_sv <= 0.0 {
                    return None;
                }
                svd.solve(&self.atb, max_sv * SVD_RELATIVE_EPS).ok()?
            }
        };
        x.iter().all(|v| v.is_finite()).then_some(x)
    }

    /// Unit vector minimising `|A x|²`: the eigenvector of the smallest
    /// eigenvalue of `AᵗA`.
    pub fn null_vector(&self) -> Option<DVector<f64>> {
        if self.rows == 0 || self.unknowns() == 0 {
            return None;
        }
        let eig = SymmetricEigen::new(self.ata.clone());
        let (idx, _) = eig
            .eigenvalues
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))?;
        let v = eig.eigenvectors.column(idx).into_owned();
        v.iter().all(|x| x.is_finite()).then_some(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fits_a_line_with_both_methods() {
        // y = 2x + 1
        let mut ne = NormalEquations::new(2, 1);
        for x in [0.0, 1.0, 2.0, 5.0] {
            ne.add_row(&[x, 1.0], &[2.0 * x + 1.0]);
        }
        for method in [SolveMethod::Inverse, SolveMethod::Svd] {
            let p = ne.solve(method).expect("solvable");
            assert_relative_eq!(p[(0, 0)], 2.0, epsilon = 1e-9);
            assert_relative_eq!(p[(1, 0)], 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn weights_pull_the_fit() {
        let mut ne = NormalEquations::new(1, 1);
        ne.add_weighted_row(&[1.0], &[0.0], 1.0);
        ne.add_weighted_row(&[1.0], &[10.0], 9.0);
        let p = ne.solve(SolveMethod::Inverse).expect("solvable");
        assert_relative_eq!(p[(0, 0)], 9.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_system_needs_svd() {
        let mut ne = NormalEquations::new(2, 1);
        ne.add_row(&[1.0, 1.0], &[2.0]);
        ne.add_row(&[2.0, 2.0], &[4.0]);

        assert!(ne.solve(SolveMethod::Inverse).is_none());

        let p = ne.solve(SolveMethod::Svd).expect("pseudo-inverse");
        assert_relative_eq!(p[(0, 0)], 1.0, epsilon = 1e-9);
        assert_relative_eq!(p[(1, 0)], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn null_vector_recovers_homogeneous_line() {
        // Points on x - 2y + 3 = 0.
        let mut ne = NormalEquations::new(3, 0);
        for y in [0.0, 1.0, 2.5, 4.0] {
            let x = 2.0 * y - 3.0;
            ne.add_row(&[x, y, 1.0], &[]);
        }
        let l = ne.null_vector().expect("null vector");
        let s = l[0];
        assert_relative_eq!(l[1] / s, -2.0, epsilon = 1e-9);
        assert_relative_eq!(l[2] / s, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_system_has_no_solution() {
        let ne = NormalEquations::new(3, 1);
        assert!(ne.solve(SolveMethod::Svd).is_none());
        assert!(ne.null_vector().is_none());
    }
}
