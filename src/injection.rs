//! Synthetic effect injection.
//!
//! A trial's ground truth is manufactured by shifting a random subset of
//! connections in Group 2 by `d` pooled standard deviations. Those
//! connections become the condition-positive set the detection pipeline is
//! scored against.

use nalgebra::DMatrix;
use rand::Rng;

/// The outcome of injecting an effect into Group 2.
#[derive(Debug, Clone)]
pub struct InjectionResult {
    /// Group 2 feature matrix after modification.
    pub modified: DMatrix<f64>,
    /// Sorted indices of the modified connections (ground-truth positives).
    pub connections: Vec<usize>,
}

/// Selects `floor(n_connections * pi)` connection columns uniformly at
/// random without replacement and adds `d` times the pooled sample standard
/// deviation to every Group 2 value in each selected column.
///
/// The standard deviation is computed over the stacked, pre-modification
/// Group 1 and Group 2 values of that column, with Bessel's correction.
/// `pi = 0` returns Group 2 unchanged with an empty selection.
pub fn inject_effect<R: Rng>(
    rng: &mut R,
    group1: &DMatrix<f64>,
    group2: &DMatrix<f64>,
    pi: f64,
    d: f64,
) -> InjectionResult {
    let n_connections = group2.ncols();
    let num_to_modify = (n_connections as f64 * pi).floor() as usize;

    let mut connections =
        rand::seq::index::sample(rng, n_connections, num_to_modify).into_vec();
    connections.sort_unstable();

    let mut modified = group2.clone();
    for &col in &connections {
        let std = pooled_std(group1.column(col).iter(), group2.column(col).iter());
        for value in modified.column_mut(col).iter_mut() {
            *value += d * std;
        }
    }

    InjectionResult {
        modified,
        connections,
    }
}

/// Sample standard deviation (ddof = 1) of two stacked columns.
fn pooled_std<'a>(
    a: impl Iterator<Item = &'a f64>,
    b: impl Iterator<Item = &'a f64>,
) -> f64 {
    let values: Vec<f64> = a.chain(b).copied().collect();
    let n = values.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (ss / (n - 1.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn matrices() -> (DMatrix<f64>, DMatrix<f64>) {
        let group1 = DMatrix::from_row_slice(2, 4, &[
            1.0, 2.0, 3.0, 4.0, //
            2.0, 3.0, 4.0, 5.0,
        ]);
        let group2 = DMatrix::from_row_slice(2, 4, &[
            0.0, 1.0, 2.0, 3.0, //
            3.0, 4.0, 5.0, 6.0,
        ]);
        (group1, group2)
    }

    #[test]
    fn test_selection_count_is_floor_of_fraction() {
        let (g1, g2) = matrices();
        let mut rng = StdRng::seed_from_u64(1);
        for (pi, expected) in [(0.0, 0), (0.25, 1), (0.5, 2), (0.7, 2), (1.0, 4)] {
            let result = inject_effect(&mut rng, &g1, &g2, pi, 0.5);
            assert_eq!(result.connections.len(), expected, "pi = {}", pi);
        }
    }

    #[test]
    fn test_pi_zero_leaves_group2_untouched() {
        let (g1, g2) = matrices();
        let mut rng = StdRng::seed_from_u64(2);
        let result = inject_effect(&mut rng, &g1, &g2, 0.0, 3.0);
        assert!(result.connections.is_empty());
        assert_eq!(result.modified, g2);
    }

    #[test]
    fn test_modified_columns_are_shifted_by_d_std() {
        let (g1, g2) = matrices();
        let mut rng = StdRng::seed_from_u64(3);
        let d = 2.0;
        let result = inject_effect(&mut rng, &g1, &g2, 1.0, d);

        for col in 0..g2.ncols() {
            let std = pooled_std(g1.column(col).iter(), g2.column(col).iter());
            for row in 0..g2.nrows() {
                let expected = g2[(row, col)] + d * std;
                assert!((result.modified[(row, col)] - expected).abs() < 1e-12);
            }
        }
        // Group 1 columns never change; only Group 2 is perturbed.
        assert_eq!(result.connections, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_pooled_std_uses_bessel_correction() {
        // Values 1..=4 have sample variance 5/3.
        let a = [1.0, 2.0];
        let b = [3.0, 4.0];
        let std = pooled_std(a.iter(), b.iter());
        assert!((std - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
