//! Covariance matrix validation and decomposition.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::core::error::{Result, SimError};

/// Tolerance for symmetry and unit-diagonal checks.
const SYMMETRY_TOL: f64 = 1e-8;
/// Floor applied to eigenvalues when regularizing a non-PD matrix.
const EIGEN_FLOOR: f64 = 1e-12;

/// Validated symmetric covariance matrix over the run's asset classes.
///
/// Constructed once per run from externally estimated inputs; the engine
/// consumes it but never estimates it.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    matrix: DMatrix<f64>,
}

impl CovarianceMatrix {
    /// Build from row-major entries, validating shape and symmetry.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        if n == 0 {
            return Err(SimError::invalid_config("covariance matrix is empty"));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(SimError::invalid_config(format!(
                    "covariance row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    n
                )));
            }
        }
        let matrix = DMatrix::from_fn(n, n, |i, j| rows[i][j]);
        Self::from_matrix(matrix)
    }

    /// Build from per-asset volatilities and a correlation matrix:
    /// `cov[i][j] = vol[i] * vol[j] * corr[i][j]`.
    pub fn from_volatilities(volatilities: &[f64], correlations: &[Vec<f64>]) -> Result<Self> {
        let n = volatilities.len();
        if n == 0 {
            return Err(SimError::invalid_config("no volatilities supplied"));
        }
        if correlations.len() != n {
            return Err(SimError::invalid_config(format!(
                "correlation matrix is {}x{}, expected {}x{}",
                correlations.len(),
                correlations.first().map_or(0, Vec::len),
                n,
                n
            )));
        }
        for (i, &vol) in volatilities.iter().enumerate() {
            if !vol.is_finite() || vol < 0.0 {
                return Err(SimError::invalid_config(format!(
                    "volatility for asset {} must be finite and non-negative, got {}",
                    i, vol
                )));
            }
        }
        for (i, row) in correlations.iter().enumerate() {
            if row.len() != n {
                return Err(SimError::invalid_config(format!(
                    "correlation row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    n
                )));
            }
            for (j, &c) in row.iter().enumerate() {
                if !c.is_finite() || c.abs() > 1.0 + SYMMETRY_TOL {
                    return Err(SimError::invalid_config(format!(
                        "correlation [{},{}] must lie in [-1, 1], got {}",
                        i, j, c
                    )));
                }
            }
            if (row[i] - 1.0).abs() > 1e-6 {
                return Err(SimError::invalid_config(format!(
                    "correlation diagonal [{},{}] must be 1, got {}",
                    i, i, row[i]
                )));
            }
        }
        let matrix = DMatrix::from_fn(n, n, |i, j| {
            volatilities[i] * volatilities[j] * correlations[i][j]
        });
        Self::from_matrix(matrix)
    }

    fn from_matrix(matrix: DMatrix<f64>) -> Result<Self> {
        let n = matrix.nrows();
        for i in 0..n {
            for j in 0..n {
                let v = matrix[(i, j)];
                if !v.is_finite() {
                    return Err(SimError::invalid_config(format!(
                        "covariance entry [{},{}] is not finite",
                        i, j
                    )));
                }
                if (v - matrix[(j, i)]).abs() > SYMMETRY_TOL {
                    return Err(SimError::invalid_config(format!(
                        "covariance matrix is not symmetric at [{},{}]",
                        i, j
                    )));
                }
            }
            if matrix[(i, i)] < 0.0 {
                return Err(SimError::invalid_config(format!(
                    "covariance diagonal [{},{}] is negative",
                    i, i
                )));
            }
        }
        Ok(Self { matrix })
    }

    /// Number of asset classes covered.
    #[inline]
    pub fn n_assets(&self) -> usize {
        self.matrix.nrows()
    }

    /// The underlying matrix.
    #[inline]
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Variance of asset `i`.
    #[inline]
    pub fn variance(&self, i: usize) -> f64 {
        self.matrix[(i, i)]
    }

    /// Per-asset volatilities (square roots of the diagonal).
    pub fn volatilities(&self) -> DVector<f64> {
        DVector::from_fn(self.n_assets(), |i, _| self.matrix[(i, i)].sqrt())
    }

    /// Portfolio variance `wᵀΣw`.
    pub fn portfolio_variance(&self, weights: &DVector<f64>) -> f64 {
        (weights.transpose() * &self.matrix * weights)[(0, 0)]
    }

    /// Lower-triangular Cholesky factor.
    ///
    /// A matrix that is valid but not positive definite (zero-variance asset,
    /// perfectly redundant assets) is regularized by clamping its eigenvalues
    /// before a second attempt.
    pub fn cholesky_factor(&self) -> Result<DMatrix<f64>> {
        if let Some(chol) = self.matrix.clone().cholesky() {
            return Ok(chol.l());
        }
        let eigen = SymmetricEigen::new(self.matrix.clone());
        let clamped = DVector::from_fn(self.n_assets(), |i, _| eigen.eigenvalues[i].max(EIGEN_FLOOR));
        let rebuilt =
            &eigen.eigenvectors * DMatrix::from_diagonal(&clamped) * eigen.eigenvectors.transpose();
        // Symmetrize away the reconstruction round-off before retrying.
        let symmetric = (&rebuilt + rebuilt.transpose()) * 0.5;
        symmetric.cholesky().map(|c| c.l()).ok_or_else(|| {
            SimError::decomposition("covariance is not positive definite after regularization")
        })
    }

    /// Whether the matrix is singular or close enough to defeat the Newton
    /// risk-parity solve.
    pub fn is_near_singular(&self) -> bool {
        match self.matrix.clone().cholesky() {
            None => true,
            Some(chol) => {
                let l = chol.l();
                let mut min_diag = f64::INFINITY;
                let mut max_diag: f64 = 0.0;
                for i in 0..self.n_assets() {
                    let d = l[(i, i)].abs();
                    min_diag = min_diag.min(d);
                    max_diag = max_diag.max(d);
                }
                max_diag == 0.0 || min_diag / max_diag < 1e-9
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_factor() {
        let cov = CovarianceMatrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let l = cov.cholesky_factor().unwrap();
        assert_relative_eq!(l[(0, 0)], 1.0, epsilon = 1e-10);
        assert_relative_eq!(l[(1, 1)], 1.0, epsilon = 1e-10);
        assert!(l[(1, 0)].abs() < 1e-10);
    }

    #[test]
    fn test_factor_reconstructs_matrix() {
        let cov = CovarianceMatrix::from_rows(&[vec![1.0, 0.5], vec![0.5, 1.0]]).unwrap();
        let l = cov.cholesky_factor().unwrap();
        let rebuilt = &l * l.transpose();
        assert_relative_eq!(rebuilt[(0, 0)], 1.0, epsilon = 1e-10);
        assert_relative_eq!(rebuilt[(0, 1)], 0.5, epsilon = 1e-10);
        assert_relative_eq!(rebuilt[(1, 1)], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_from_volatilities() {
        let cov = CovarianceMatrix::from_volatilities(
            &[0.2, 0.1],
            &[vec![1.0, 0.5], vec![0.5, 1.0]],
        )
        .unwrap();
        assert_relative_eq!(cov.variance(0), 0.04, epsilon = 1e-12);
        assert_relative_eq!(cov.variance(1), 0.01, epsilon = 1e-12);
        assert_relative_eq!(cov.as_matrix()[(0, 1)], 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_asymmetric_rejected() {
        let err = CovarianceMatrix::from_rows(&[vec![1.0, 0.3], vec![0.1, 1.0]]).unwrap_err();
        assert!(matches!(err, SimError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_bad_correlation_rejected() {
        let err = CovarianceMatrix::from_volatilities(
            &[0.2, 0.1],
            &[vec![1.0, 1.5], vec![1.5, 1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_near_singular_detection() {
        // Duplicated asset rows make the matrix rank deficient.
        let cov = CovarianceMatrix::from_rows(&[
            vec![0.04, 0.04, 0.01],
            vec![0.04, 0.04, 0.01],
            vec![0.01, 0.01, 0.02],
        ])
        .unwrap();
        assert!(cov.is_near_singular());

        let healthy =
            CovarianceMatrix::from_rows(&[vec![0.04, 0.01], vec![0.01, 0.02]]).unwrap();
        assert!(!healthy.is_near_singular());
    }

    #[test]
    fn test_singular_matrix_still_factors() {
        let cov = CovarianceMatrix::from_rows(&[
            vec![0.04, 0.04],
            vec![0.04, 0.04],
        ])
        .unwrap();
        // Regularization clamps the zero eigenvalue so a factor exists.
        let l = cov.cholesky_factor().unwrap();
        let rebuilt = &l * l.transpose();
        assert_relative_eq!(rebuilt[(0, 0)], 0.04, epsilon = 1e-6);
    }
}
