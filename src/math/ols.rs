use crate::CwasError;
use nalgebra::{DMatrix, DVector};

/// Represents the results of an OLS regression.
#[derive(Debug)]
pub struct OlsResult {
    pub coefficients: DVector<f64>,
    pub vcov: DMatrix<f64>,
    pub residuals: DVector<f64>,
}

impl OlsResult {
    /// Standard error of the coefficient at `index`.
    pub fn std_err(&self, index: usize) -> f64 {
        self.vcov[(index, index)].sqrt()
    }
}

/// Performs an Ordinary Least Squares (OLS) regression.
///
/// The function calculates the coefficient vector `β` using the formula:
/// `β = (X'X)⁻¹ * X'y`
///
/// # Arguments
///
/// * `y` - A `DVector` representing the outcome variable.
/// * `x` - A `DMatrix` representing the predictor variables. It is crucial that this
///   matrix includes a column of ones if an intercept is desired in the model.
///
/// # Returns
///
/// A `Result` containing the `OlsResult` on success, or a `CwasError` if the
/// model is underdetermined or the `X'X` matrix is singular and cannot be
/// inverted.
pub fn ols(y: &DVector<f64>, x: &DMatrix<f64>) -> Result<OlsResult, CwasError> {
    let n = x.nrows() as f64;
    let k = x.ncols() as f64;
    if n <= k {
        return Err(CwasError::LinearAlgebra(format!(
            "Cannot fit OLS with {} observations and {} predictors.",
            x.nrows(),
            x.ncols()
        )));
    }

    let xtx = x.transpose() * x;
    let xty = x.transpose() * y;

    // Attempt Cholesky decomposition on X'X.
    // This is more numerically stable than explicit inversion and acts as a check for positive-definiteness.
    // X'X should be positive definite if there is no perfect multicollinearity.
    let cholesky = xtx.cholesky().ok_or_else(|| {
        CwasError::LinearAlgebra(
            "Failed to perform Cholesky decomposition. Matrix may be singular or not positive definite due to multicollinearity.".to_string(),
        )
    })?;

    // Calculate coefficients: β = (X'X)⁻¹ * X'y
    // We solve the linear system (X'X) * β = X'y using the Cholesky factor.
    let coefficients = cholesky.solve(&xty);

    // Calculate residuals: y - Xβ
    let y_hat = x * &coefficients;
    let residuals = y - y_hat;

    // Residual variance: e'e / (n - k)
    let sigma_squared = residuals.norm_squared() / (n - k);

    // Variance-covariance matrix: (X'X)⁻¹ * σ²
    // We can get the inverse from the Cholesky decomposition efficiently.
    let xtx_inv = cholesky.inverse();
    let vcov = xtx_inv * sigma_squared;

    Ok(OlsResult {
        coefficients,
        vcov,
        residuals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, DVector};

    #[test]
    fn test_ols_simple_regression() {
        // Test a simple model: y = 1 + 2x
        // Note: DMatrix::from_vec is column-major.
        let x = DMatrix::from_vec(
            5,
            2,
            vec![
                // Column 1: Intercept
                1.0, 1.0, 1.0, 1.0, 1.0, // Column 2: x-values
                0.0, 1.0, 2.0, 3.0, 4.0,
            ],
        );
        let y = DVector::from_vec(vec![1.0, 3.0, 5.0, 7.0, 9.0]);

        let result = ols(&y, &x).expect("OLS calculation failed on valid data");
        let coeffs = result.coefficients;

        // Check that the calculated coefficients are very close to the true values.
        assert_eq!(coeffs.len(), 2);
        assert!((coeffs[0] - 1.0).abs() < 1e-9, "Intercept is incorrect");
        assert!((coeffs[1] - 2.0).abs() < 1e-9, "Slope is incorrect");
    }

    #[test]
    fn test_ols_handles_singular_matrix() {
        // Create a singular matrix by making two columns perfectly correlated.
        // Column 2 is 2 * Column 1.
        let x = DMatrix::from_vec(
            4,
            2,
            vec![
                // Column 1
                1.0, 1.0, 1.0, 1.0, // Column 2
                2.0, 2.0, 2.0, 2.0,
            ],
        );
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);

        let result = ols(&y, &x);

        // Assert that the result is an error and that it's the specific error we expect.
        assert!(result.is_err());
        match result {
            Err(CwasError::LinearAlgebra(msg)) => {
                assert!(msg.contains("Failed to perform Cholesky decomposition"));
            }
            _ => {
                panic!("Expected a LinearAlgebra error for a singular matrix, but got something else.")
            }
        }
    }

    #[test]
    fn test_ols_rejects_underdetermined_fit() {
        let x = DMatrix::from_vec(2, 3, vec![1.0, 1.0, 0.0, 1.0, 1.0, 0.0]);
        let y = DVector::from_vec(vec![1.0, 2.0]);
        assert!(ols(&y, &x).is_err());
    }

    #[test]
    fn test_ols_std_err_matches_vcov() {
        let x = DMatrix::from_vec(
            5,
            2,
            vec![1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 2.0, 3.0, 4.0],
        );
        let y = DVector::from_vec(vec![1.1, 2.9, 5.2, 6.8, 9.1]);

        let result = ols(&y, &x).unwrap();
        assert!((result.std_err(1) - result.vcov[(1, 1)].sqrt()).abs() < 1e-12);
    }
}
