//! Monte Carlo power estimation for connectome-wide association studies.
//!
//! A connectome-wide association study (CWAS) compares two groups of
//! subjects on a large set of pairwise connectivity features, one
//! regression per connection, with multiple-comparison control. This
//! library answers the design question that precedes such a study: given
//! `N` subjects split into two groups, an injected effect of `d` pooled
//! standard deviations on a fraction `pi` of connections, and an FDR
//! threshold `q`, how often does the pipeline detect the effect, and how
//! well does it separate true from false positives?
//!
//! Each trial samples a cohort, splits it in half, encodes the site
//! covariate, injects the synthetic effect into Group 2, fits one OLS model
//! per connection, applies Benjamini-Hochberg correction, and scores the
//! rejections against the injected ground truth. Power, mean sensitivity,
//! and mean specificity are aggregated over `num_samples` trials.
//!
//! # Example
//!
//! ```ignore
//! use polars::prelude::*;
//! use cwas_power::SimulationBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let df = LazyCsvReader::new("connectomes.csv")
//!         .with_has_header(true)
//!         .finish()?
//!         .collect()?;
//!
//!     let results = SimulationBuilder::new(df, 50)
//!         .injection_fraction(0.1)
//!         .effect_size(0.8)
//!         .fdr_threshold(0.05)
//!         .num_samples(500)
//!         .seed(42)
//!         .run()?;
//!
//!     results.summary();
//!     println!("{}", results.summary_message());
//!     Ok(())
//! }
//! ```

use comfy_table::{Cell, Table};
use getset::Getters;
use nalgebra::DMatrix;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fmt;

pub mod cwas;
pub mod dataset;
pub mod evaluation;
pub mod injection;
pub mod math;
pub mod sampling;

pub use crate::dataset::ConnectivityDataset;
pub use crate::evaluation::{ConfusionCounts, TrialOutcome};
pub use crate::injection::InjectionResult;
pub use crate::math::fdr::{benjamini_hochberg, FdrOutcome};
pub use crate::sampling::{GroupPartition, SiteCodebook};

use crate::cwas::run_connection_tests;
use crate::injection::inject_effect;

/// Error type for the `cwas_power` library.
#[derive(Debug)]
pub enum CwasError {
    /// Wraps a `PolarsError`.
    Polars(PolarsError),
    /// Occurs when a specified column name does not exist in the DataFrame.
    ColumnNotFound(String),
    /// Occurs when a simulation parameter is outside its valid range.
    InvalidParameter(String),
    /// Occurs when the injection fraction empties the positive or negative
    /// class, leaving sensitivity or specificity undefined.
    DegenerateTrial(String),
    /// Occurs when there is an issue with linear algebra operations, such as a singular matrix.
    LinearAlgebra(String),
}

impl From<PolarsError> for CwasError {
    fn from(err: PolarsError) -> Self {
        CwasError::Polars(err)
    }
}

impl fmt::Display for CwasError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CwasError::Polars(e) => write!(f, "Polars error: {}", e),
            CwasError::ColumnNotFound(s) => write!(f, "Column not found: {}", s),
            CwasError::InvalidParameter(s) => write!(f, "Invalid parameter: {}", s),
            CwasError::DegenerateTrial(s) => write!(f, "Degenerate trial: {}", s),
            CwasError::LinearAlgebra(s) => write!(f, "Linear algebra error: {}", s),
        }
    }
}

impl std::error::Error for CwasError {}

/// The main entry point for configuring and running a CWAS power simulation.
///
/// This struct is created using a builder pattern.
#[derive(Debug, Clone)]
pub struct SimulationBuilder {
    dataframe: DataFrame,
    subject_col: String,
    site_col: String,
    n_subjects: usize,
    pi: f64,
    d: f64,
    q: f64,
    num_samples: usize,
    seed: Option<u64>,
    fisher_transform: bool,
}

impl SimulationBuilder {
    /// Creates a new `SimulationBuilder` over the given connectivity table,
    /// sampling cohorts of `n_subjects` per trial.
    ///
    /// Defaults: subject column `"Subject"`, site column `"Site"`,
    /// `pi = 0.1`, `d = 0.5`, `q = 0.05`, 100 trials, unseeded RNG, no
    /// Fisher transform.
    pub fn new(dataframe: DataFrame, n_subjects: usize) -> Self {
        Self {
            dataframe,
            subject_col: "Subject".to_string(),
            site_col: "Site".to_string(),
            n_subjects,
            pi: 0.1,
            d: 0.5,
            q: 0.05,
            num_samples: 100,
            seed: None,
            fisher_transform: false,
        }
    }

    /// Name of the subject identifier column.
    pub fn subject_column(&mut self, name: &str) -> &mut Self {
        self.subject_col = name.to_string();
        self
    }

    /// Name of the categorical site column.
    pub fn site_column(&mut self, name: &str) -> &mut Self {
        self.site_col = name.to_string();
        self
    }

    /// Fraction of connections that receive the injected effect (`pi`).
    pub fn injection_fraction(&mut self, pi: f64) -> &mut Self {
        self.pi = pi;
        self
    }

    /// Injected effect size in pooled standard deviations (`d`).
    pub fn effect_size(&mut self, d: f64) -> &mut Self {
        self.d = d;
        self
    }

    /// False-discovery-rate threshold (`q`).
    pub fn fdr_threshold(&mut self, q: f64) -> &mut Self {
        self.q = q;
        self
    }

    /// Number of Monte Carlo trials.
    pub fn num_samples(&mut self, num_samples: usize) -> &mut Self {
        self.num_samples = num_samples;
        self
    }

    /// Seeds the random number generator for reproducible runs.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// Applies the Fisher z-transform (`atanh`) to every connectivity value
    /// when the dataset is loaded.
    pub fn fisher_transform(&mut self, enabled: bool) -> &mut Self {
        self.fisher_transform = enabled;
        self
    }

    fn validate(&self) -> Result<(), CwasError> {
        if self.n_subjects < 2 {
            return Err(CwasError::InvalidParameter(format!(
                "N = {} cannot form two nonempty groups.",
                self.n_subjects
            )));
        }
        if !(0.0..=1.0).contains(&self.pi) {
            return Err(CwasError::InvalidParameter(format!(
                "pi = {} must lie in [0, 1].",
                self.pi
            )));
        }
        if !(self.q > 0.0 && self.q < 1.0) {
            return Err(CwasError::InvalidParameter(format!(
                "q = {} must lie strictly between 0 and 1.",
                self.q
            )));
        }
        if self.num_samples == 0 {
            return Err(CwasError::InvalidParameter(
                "num_samples must be at least 1.".to_string(),
            ));
        }
        Ok(())
    }

    /// Executes the Monte Carlo simulation.
    pub fn run(&self) -> Result<SimulationResults, CwasError> {
        self.validate()?;

        let dataset = ConnectivityDataset::from_dataframe(
            &self.dataframe,
            &self.subject_col,
            &self.site_col,
            self.fisher_transform,
        )?;
        if self.n_subjects > dataset.n_subjects() {
            return Err(CwasError::InvalidParameter(format!(
                "N = {} exceeds the {} subjects available in the dataset.",
                self.n_subjects,
                dataset.n_subjects()
            )));
        }

        let n_connections = dataset.n_connections();
        let num_to_modify = (n_connections as f64 * self.pi).floor() as usize;
        // Boundary pi is a legitimate pure-null / saturated design; an
        // interior pi that floors to an empty class is caller error, and it
        // is deterministic given the connection count, so fail before the
        // first trial.
        if self.pi > 0.0 && num_to_modify == 0 {
            return Err(CwasError::DegenerateTrial(format!(
                "pi = {} selects zero of {} connections; sensitivity would be undefined.",
                self.pi, n_connections
            )));
        }
        if self.pi < 1.0 && num_to_modify == n_connections {
            return Err(CwasError::DegenerateTrial(format!(
                "pi = {} selects all {} connections; specificity would be undefined.",
                self.pi, n_connections
            )));
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut trials: Vec<TrialOutcome> = Vec::with_capacity(self.num_samples);
        let mut rejecting_trials = 0usize;
        let mut last_trial = None;

        for trial in 0..self.num_samples {
            let partition = GroupPartition::sample(&mut rng, &dataset, self.n_subjects)?;

            // One codebook per trial, fitted on the whole cohort and applied
            // to both groups.
            let codebook = SiteCodebook::fit(partition.cohort().map(|row| dataset.site(row)));
            let group1_sites =
                codebook.encode(partition.group1().iter().map(|&row| dataset.site(row)))?;
            let group2_sites =
                codebook.encode(partition.group2().iter().map(|&row| dataset.site(row)))?;

            let group1 = dataset.feature_rows(partition.group1());
            let group2 = dataset.feature_rows(partition.group2());

            let injection = inject_effect(&mut rng, &group1, &group2, self.pi, self.d);

            let p_values =
                run_connection_tests(&group1, &injection.modified, &group1_sites, &group2_sites);

            // Connections whose fit failed are excluded from the correction
            // and can never be rejected; their indices are kept on the
            // trial outcome.
            let mut tested: Vec<(usize, f64)> = Vec::with_capacity(n_connections);
            let mut failed_connections = Vec::new();
            for (connection, p) in p_values.iter().enumerate() {
                match p {
                    Some(p) => tested.push((connection, *p)),
                    None => failed_connections.push(connection),
                }
            }

            let raw: Vec<f64> = tested.iter().map(|&(_, p)| p).collect();
            let fdr = benjamini_hochberg(&raw, self.q);
            let mut rejected = vec![false; n_connections];
            for (&(connection, _), &flag) in tested.iter().zip(fdr.rejected.iter()) {
                rejected[connection] = flag;
            }

            let any_rejection = fdr.any_rejected();
            if any_rejection {
                rejecting_trials += 1;
            }

            let counts = ConfusionCounts::tally(&injection.connections, &rejected);
            let with_trial_context = |err: CwasError| match err {
                CwasError::DegenerateTrial(msg) => {
                    CwasError::DegenerateTrial(format!("Trial {}: {}", trial, msg))
                }
                other => other,
            };
            let sensitivity = if num_to_modify > 0 {
                Some(counts.sensitivity().map_err(with_trial_context)?)
            } else {
                None
            };
            let specificity = if num_to_modify < n_connections {
                Some(counts.specificity().map_err(with_trial_context)?)
            } else {
                None
            };

            trials.push(TrialOutcome {
                counts,
                sensitivity,
                specificity,
                any_rejection,
                failed_connections,
            });

            if trial + 1 == self.num_samples {
                last_trial = Some((group2, injection.modified, injection.connections));
            }
        }

        let (last_group2_raw, last_group2_modified, last_modified_connections) =
            last_trial.expect("num_samples >= 1 guarantees at least one trial");

        let power = rejecting_trials as f64 / self.num_samples as f64;
        let mean_sensitivity = mean(trials.iter().filter_map(|t| t.sensitivity));
        let mean_specificity = mean(trials.iter().filter_map(|t| t.specificity));
        let theta = self.d / (self.n_subjects as f64).sqrt();

        Ok(SimulationResults {
            power,
            mean_sensitivity,
            mean_specificity,
            theta,
            effect_size: self.d,
            pi: self.pi,
            q: self.q,
            n_subjects: self.n_subjects,
            num_samples: self.num_samples,
            trials,
            last_group2_raw,
            last_group2_modified,
            last_modified_connections,
        })
    }
}

/// Arithmetic mean; NaN over an empty sequence (undefined rate).
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Holds the aggregated results of a Monte Carlo power simulation.
#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct SimulationResults {
    /// Fraction of trials in which at least one hypothesis was rejected.
    power: f64,
    /// Mean sensitivity over the trials where it is defined (NaN for a
    /// pure-null design).
    mean_sensitivity: f64,
    /// Mean specificity over the trials where it is defined (NaN for a
    /// saturated design).
    mean_specificity: f64,
    /// Effect size normalized to a single-subject scale: `d / sqrt(N)`.
    theta: f64,
    /// The injected effect size `d`.
    effect_size: f64,
    /// The injected connection fraction `pi`.
    pi: f64,
    /// The FDR threshold `q`.
    q: f64,
    /// Cohort size per trial.
    n_subjects: usize,
    /// Number of Monte Carlo trials.
    num_samples: usize,
    /// Per-trial outcomes, in trial order.
    trials: Vec<TrialOutcome>,
    /// The last trial's Group 2 feature matrix before modification.
    last_group2_raw: DMatrix<f64>,
    /// The last trial's Group 2 feature matrix after effect injection.
    last_group2_modified: DMatrix<f64>,
    /// The last trial's modified connection indices.
    last_modified_connections: Vec<usize>,
}

/// JSON-friendly subset of the results.
#[derive(Debug, Serialize)]
struct SimulationReport<'a> {
    power: f64,
    mean_sensitivity: f64,
    mean_specificity: f64,
    theta: f64,
    effect_size: f64,
    pi: f64,
    q: f64,
    n_subjects: usize,
    num_samples: usize,
    last_modified_connections: &'a [usize],
    message: String,
}

impl SimulationResults {
    /// The human-readable one-line summary of the run.
    pub fn summary_message(&self) -> String {
        format!(
            "Estimated power to detect d={} with N={}: {}, with a mean sensitivity of {:.2} and mean specificity of {:.2}, theta (effect size for N=1): {:.2}",
            self.effect_size,
            self.n_subjects,
            self.power,
            self.mean_sensitivity,
            self.mean_specificity,
            self.theta
        )
    }

    /// Prints a formatted summary of the simulation to the console.
    pub fn summary(&self) {
        println!("CWAS Power Simulation Results");
        println!("=============================");
        println!(
            "N = {} subjects per trial, {} trials, pi = {}, d = {}, q = {}",
            self.n_subjects, self.num_samples, self.pi, self.effect_size, self.q
        );

        let mut table = Table::new();
        table.set_header(vec!["Metric", "Estimate"]);
        table.add_row(vec![
            Cell::new("Power"),
            Cell::new(format!("{:.4}", self.power)),
        ]);
        table.add_row(vec![
            Cell::new("Mean sensitivity"),
            Cell::new(format!("{:.4}", self.mean_sensitivity)),
        ]);
        table.add_row(vec![
            Cell::new("Mean specificity"),
            Cell::new(format!("{:.4}", self.mean_specificity)),
        ]);
        table.add_row(vec![
            Cell::new("Theta (d / sqrt(N))"),
            Cell::new(format!("{:.4}", self.theta)),
        ]);
        println!("{}", table);

        let failed: usize = self.trials.iter().map(|t| t.failed_connections.len()).sum();
        if failed > 0 {
            println!(
                "Warning: {} connection fits failed across {} trials and were excluded from correction.",
                failed, self.num_samples
            );
        }
    }

    /// Serializes the aggregate results to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let report = SimulationReport {
            power: self.power,
            mean_sensitivity: self.mean_sensitivity,
            mean_specificity: self.mean_specificity,
            theta: self.theta,
            effect_size: self.effect_size,
            pi: self.pi,
            q: self.q,
            n_subjects: self.n_subjects,
            num_samples: self.num_samples,
            last_modified_connections: &self.last_modified_connections,
            message: self.summary_message(),
        };
        serde_json::to_string_pretty(&report)
    }
}
