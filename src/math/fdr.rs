//! Benjamini-Hochberg false discovery rate control.

/// The outcome of an FDR correction over a batch of p-values.
///
/// Both vectors are indexed like the input p-value slice.
#[derive(Debug, Clone)]
pub struct FdrOutcome {
    /// Whether the null hypothesis at each index is rejected at level `q`.
    pub rejected: Vec<bool>,
    /// BH-adjusted p-values, clamped to [0, 1].
    pub adjusted: Vec<f64>,
}

impl FdrOutcome {
    /// True if at least one hypothesis was rejected.
    pub fn any_rejected(&self) -> bool {
        self.rejected.iter().any(|&r| r)
    }
}

/// Benjamini-Hochberg step-up procedure for controlling the false discovery
/// rate at level `q`.
///
/// Sorts the p-values ascending, finds the largest rank `k` such that
/// `p(k) <= (k/m) * q`, and rejects every hypothesis of rank `<= k`.
/// Adjusted p-values are `p(i) * m / i` taken as a cumulative minimum from
/// the largest rank downward, clamped to [0, 1], and reported in the
/// original input order.
pub fn benjamini_hochberg(p_values: &[f64], q: f64) -> FdrOutcome {
    let m = p_values.len();
    if m == 0 {
        return FdrOutcome {
            rejected: Vec::new(),
            adjusted: Vec::new(),
        };
    }

    // Sort indices by p-value.
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let m_f = m as f64;

    // Largest rank k (1-based) whose p-value clears the step-up line.
    let mut threshold_rank = 0;
    for (i, &idx) in order.iter().enumerate() {
        let rank = (i + 1) as f64;
        if p_values[idx] <= rank / m_f * q {
            threshold_rank = i + 1;
        }
    }

    let mut rejected = vec![false; m];
    for &idx in order.iter().take(threshold_rank) {
        rejected[idx] = true;
    }

    // Adjusted p-values with monotonicity enforced from right to left.
    let mut adjusted = vec![0.0; m];
    let mut prev = f64::INFINITY;
    for i in (0..m).rev() {
        let rank = (i + 1) as f64;
        let adj = (p_values[order[i]] * m_f / rank).min(1.0).min(prev);
        adjusted[order[i]] = adj;
        prev = adj;
    }

    FdrOutcome { rejected, adjusted }
}
