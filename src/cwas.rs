//! Per-connection association testing.
//!
//! Every connection gets its own OLS fit of the stacked connectivity values
//! against a binary group indicator, the integer site code, and an
//! intercept. The test statistic for the connection is the two-sided
//! p-value of the group coefficient. The fits are mutually independent, so
//! they run as a rayon parallel map over columns with the output kept in
//! column order.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::math::ols::ols;

/// Design-matrix column holding the group indicator.
const GROUP_COEFF: usize = 0;
/// Number of design-matrix columns: group, site, intercept.
const N_PREDICTORS: usize = 3;

/// Runs one group-difference regression per connection.
///
/// `group1` and `group2_modified` must have identical column semantics;
/// `group1_sites` / `group2_sites` are the integer site codes aligned with
/// each group's rows. Returns one entry per connection in column order:
/// `Some(p_value)` for a successful fit, `None` when the design matrix is
/// singular for that connection (for example a site confounded with the
/// group split) or the fit is otherwise degenerate.
pub fn run_connection_tests(
    group1: &DMatrix<f64>,
    group2_modified: &DMatrix<f64>,
    group1_sites: &[f64],
    group2_sites: &[f64],
) -> Vec<Option<f64>> {
    debug_assert_eq!(group1.ncols(), group2_modified.ncols());
    debug_assert_eq!(group1.nrows(), group1_sites.len());
    debug_assert_eq!(group2_modified.nrows(), group2_sites.len());

    let n1 = group1.nrows();
    let n2 = group2_modified.nrows();
    let n = n1 + n2;

    // The design matrix is shared by every connection; only the response
    // changes. Columns: group indicator (0 for Group 1 rows, 1 for Group 2
    // rows), site code, intercept.
    let design = DMatrix::from_fn(n, N_PREDICTORS, |row, col| match col {
        0 => {
            if row < n1 {
                0.0
            } else {
                1.0
            }
        }
        1 => {
            if row < n1 {
                group1_sites[row]
            } else {
                group2_sites[row - n1]
            }
        }
        _ => 1.0,
    });

    (0..group1.ncols())
        .into_par_iter()
        .map(|connection| {
            let response = DVector::from_fn(n, |row, _| {
                if row < n1 {
                    group1[(row, connection)]
                } else {
                    group2_modified[(row - n1, connection)]
                }
            });
            group_p_value(&response, &design)
        })
        .collect()
}

/// Fits the model and extracts the two-sided p-value of the group
/// coefficient, with `n - 3` degrees of freedom.
fn group_p_value(y: &DVector<f64>, x: &DMatrix<f64>) -> Option<f64> {
    let fit = ols(y, x).ok()?;
    let df = (x.nrows() - x.ncols()) as f64;
    let t_stat = fit.coefficients[GROUP_COEFF] / fit.std_err(GROUP_COEFF);
    if !t_stat.is_finite() {
        return None;
    }
    let t_dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let p = 2.0 * (1.0 - t_dist.cdf(t_stat.abs()));
    p.is_finite().then_some(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two groups, two sites interleaved so site is not confounded with group.
    fn site_codes(n: usize) -> Vec<f64> {
        (0..n).map(|i| (i % 2) as f64).collect()
    }

    #[test]
    fn test_separated_groups_yield_small_p_value() {
        let group1 = DMatrix::from_fn(10, 1, |i, _| i as f64 * 0.01);
        let group2 = DMatrix::from_fn(10, 1, |i, _| 10.0 + i as f64 * 0.01);
        let p = run_connection_tests(&group1, &group2, &site_codes(10), &site_codes(10));
        assert_eq!(p.len(), 1);
        assert!(p[0].unwrap() < 1e-6, "p = {:?}", p[0]);
    }

    #[test]
    fn test_identical_groups_yield_large_p_value() {
        let column: Vec<f64> = vec![0.3, -0.1, 0.7, 0.2, -0.5, 0.4, 0.0, 0.1];
        let group1 = DMatrix::from_column_slice(8, 1, &column);
        let group2 = DMatrix::from_column_slice(8, 1, &column);
        let p = run_connection_tests(&group1, &group2, &site_codes(8), &site_codes(8));
        assert!(p[0].unwrap() > 0.9, "p = {:?}", p[0]);
    }

    #[test]
    fn test_confounded_site_reports_fit_failure() {
        // Site code equals the group indicator exactly, so the design
        // matrix is rank-deficient and the fit must fail per-connection
        // rather than panic.
        let group1 = DMatrix::from_fn(6, 2, |i, j| (i + j) as f64 * 0.1);
        let group2 = DMatrix::from_fn(6, 2, |i, j| (i * j) as f64 * 0.1);
        let p = run_connection_tests(&group1, &group2, &vec![0.0; 6], &vec![1.0; 6]);
        assert_eq!(p, vec![None, None]);
    }

    #[test]
    fn test_output_is_in_connection_order() {
        // Only the second connection differs between groups.
        let group1 = DMatrix::from_fn(12, 3, |i, _| (i as f64 * 0.7).sin());
        let mut group2 = group1.clone_owned();
        for v in group2.column_mut(1).iter_mut() {
            *v += 50.0;
        }
        let p = run_connection_tests(&group1, &group2, &site_codes(12), &site_codes(12));
        assert_eq!(p.len(), 3);
        assert!(p[1].unwrap() < p[0].unwrap());
        assert!(p[1].unwrap() < p[2].unwrap());
    }
}
