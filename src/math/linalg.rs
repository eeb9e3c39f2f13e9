//! Dense linear-system capability used by the estimator.
//!
//! The estimator only needs three primitives: solve a square system for one or
//! more right-hand sides, multiply, and transpose. They sit behind
//! `LinearSolver` so the estimator is written once against the interface.
//!
//! `DenseSolver` is the canonical implementation:
//! - the systems we solve (`A Rxx Aᵀ + Rnn`) are symmetric positive definite,
//!   so Cholesky is tried first
//! - if Cholesky fails (loss of definiteness from round-off) we fall back to LU
//! - a singular system or a non-finite solution is a `Numeric` error

use nalgebra::DMatrix;

use crate::error::AppError;

pub trait LinearSolver: Send + Sync {
    /// Solve `a · x = b` for `x` (`a` square, `b` with any number of columns).
    fn solve(&self, a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>, AppError>;

    fn multiply(&self, a: &DMatrix<f64>, b: &DMatrix<f64>) -> DMatrix<f64> {
        a * b
    }

    fn transpose(&self, a: &DMatrix<f64>) -> DMatrix<f64> {
        a.transpose()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DenseSolver;

impl LinearSolver for DenseSolver {
    fn solve(&self, a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>, AppError> {
        if !a.is_square() || a.nrows() != b.nrows() {
            return Err(AppError::numeric(format!(
                "Incompatible system: a is {}x{}, b is {}x{}.",
                a.nrows(),
                a.ncols(),
                b.nrows(),
                b.ncols()
            )));
        }

        if let Some(chol) = a.clone().cholesky() {
            let x = chol.solve(b);
            if x.iter().all(|v| v.is_finite()) {
                return Ok(x);
            }
        }

        let x = a
            .clone()
            .lu()
            .solve(b)
            .ok_or_else(|| AppError::numeric(format!("Singular {}x{} system.", a.nrows(), a.ncols())))?;
        if x.iter().all(|v| v.is_finite()) {
            Ok(x)
        } else {
            Err(AppError::numeric("Non-finite solution of linear system."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_spd_system() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DMatrix::from_row_slice(2, 1, &[1.0, 2.0]);
        let x = DenseSolver.solve(&a, &b).unwrap();
        // Exact: x = [1/11, 7/11]
        assert!((x[(0, 0)] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[(1, 0)] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn falls_back_to_lu_for_indefinite_system() {
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let b = DMatrix::from_row_slice(2, 1, &[2.0, 3.0]);
        let x = DenseSolver.solve(&a, &b).unwrap();
        assert!((x[(0, 0)] - 3.0).abs() < 1e-12);
        assert!((x[(1, 0)] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn singular_system_is_numeric_error() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let b = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let err = DenseSolver.solve(&a, &b).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Numeric);
    }
}
