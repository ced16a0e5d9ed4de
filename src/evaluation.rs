//! Scoring a trial's rejection decisions against the injected ground truth.

use serde::Serialize;

use crate::CwasError;

/// Confusion counts for one trial, comparing the per-connection rejection
/// flags against the set of connections that actually received an injected
/// effect.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConfusionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionCounts {
    /// Tallies the counts. `modified` must be sorted ascending and
    /// `rejected` must have one flag per connection.
    pub fn tally(modified: &[usize], rejected: &[bool]) -> Self {
        let mut counts = ConfusionCounts {
            true_positives: 0,
            false_positives: 0,
            true_negatives: 0,
            false_negatives: 0,
        };
        for (connection, &was_rejected) in rejected.iter().enumerate() {
            let is_modified = modified.binary_search(&connection).is_ok();
            match (is_modified, was_rejected) {
                (true, true) => counts.true_positives += 1,
                (true, false) => counts.false_negatives += 1,
                (false, true) => counts.false_positives += 1,
                (false, false) => counts.true_negatives += 1,
            }
        }
        counts
    }

    /// Connections carrying an injected effect.
    pub fn condition_positive(&self) -> usize {
        self.true_positives + self.false_negatives
    }

    /// Connections without an injected effect.
    pub fn condition_negative(&self) -> usize {
        self.true_negatives + self.false_positives
    }

    /// True positive rate. Fails when no connection was modified, since
    /// the rate is undefined for an empty positive class.
    pub fn sensitivity(&self) -> Result<f64, CwasError> {
        let cp = self.condition_positive();
        if cp == 0 {
            return Err(CwasError::DegenerateTrial(
                "Sensitivity is undefined: no connection carries an injected effect.".to_string(),
            ));
        }
        Ok(self.true_positives as f64 / cp as f64)
    }

    /// True negative rate. Fails when every connection was modified.
    pub fn specificity(&self) -> Result<f64, CwasError> {
        let cn = self.condition_negative();
        if cn == 0 {
            return Err(CwasError::DegenerateTrial(
                "Specificity is undefined: every connection carries an injected effect."
                    .to_string(),
            ));
        }
        Ok(self.true_negatives as f64 / cn as f64)
    }
}

/// One trial's scores, as accumulated by the Monte Carlo runner.
///
/// Sensitivity and specificity are `None` only in the pure-null (`pi = 0`)
/// and saturated (`pi = 1`) boundary designs, where the corresponding class
/// is empty by construction.
#[derive(Debug, Clone, Serialize)]
pub struct TrialOutcome {
    pub counts: ConfusionCounts,
    pub sensitivity: Option<f64>,
    pub specificity: Option<f64>,
    /// Whether the FDR step rejected at least one hypothesis.
    pub any_rejection: bool,
    /// Connections whose regression could not be fitted this trial.
    pub failed_connections: Vec<usize>,
}
