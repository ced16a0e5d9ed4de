//! Cohort sampling, group partitioning, and site covariate encoding.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::dataset::ConnectivityDataset;
use crate::CwasError;

/// A randomly drawn, shuffled cohort split into two groups of subject rows.
///
/// Group 1 holds the first `floor(n/2)` rows of the shuffled cohort; when
/// `n` is odd the extra subject goes to Group 2. Membership is exhaustive
/// and disjoint over the cohort.
#[derive(Debug, Clone)]
pub struct GroupPartition {
    group1: Vec<usize>,
    group2: Vec<usize>,
}

impl GroupPartition {
    /// Draws `n` distinct subjects uniformly at random without replacement,
    /// shuffles them, and splits them into two halves.
    pub fn sample<R: Rng>(
        rng: &mut R,
        dataset: &ConnectivityDataset,
        n: usize,
    ) -> Result<Self, CwasError> {
        if n > dataset.n_subjects() {
            return Err(CwasError::InvalidParameter(format!(
                "Requested a cohort of {} subjects but the dataset only has {}.",
                n,
                dataset.n_subjects()
            )));
        }

        let mut cohort: Vec<usize> = rand::seq::index::sample(rng, dataset.n_subjects(), n).into_vec();
        cohort.shuffle(rng);

        let half = cohort.len() / 2;
        let group2 = cohort.split_off(half);
        Ok(Self {
            group1: cohort,
            group2,
        })
    }

    pub fn group1(&self) -> &[usize] {
        &self.group1
    }

    pub fn group2(&self) -> &[usize] {
        &self.group2
    }

    /// All cohort rows, Group 1 first.
    pub fn cohort(&self) -> impl Iterator<Item = usize> + '_ {
        self.group1.iter().chain(self.group2.iter()).copied()
    }
}

/// A per-trial mapping from site labels to integer codes.
///
/// Built once from the distinct labels observed in the sampled cohort and
/// applied identically to both groups, so the regression design matrix sees
/// a single consistent numeric encoding. Labels are enumerated in sorted
/// order, which keeps seeded runs bit-identical.
#[derive(Debug, Clone)]
pub struct SiteCodebook {
    codes: BTreeMap<String, usize>,
}

impl SiteCodebook {
    /// Fits the codebook on the cohort's site labels.
    pub fn fit<'a>(labels: impl Iterator<Item = &'a str>) -> Self {
        let mut codes: BTreeMap<String, usize> = labels
            .map(|label| (label.to_string(), 0))
            .collect();
        for (next, code) in codes.values_mut().enumerate() {
            *code = next;
        }
        Self { codes }
    }

    pub fn n_sites(&self) -> usize {
        self.codes.len()
    }

    /// Encodes a sequence of labels as `f64` codes, aligned by position.
    ///
    /// Fails if a label was not observed in the cohort the codebook was
    /// fitted on; by construction that cannot happen for the cohort's own
    /// groups.
    pub fn encode<'a>(
        &self,
        labels: impl Iterator<Item = &'a str>,
    ) -> Result<Vec<f64>, CwasError> {
        labels
            .map(|label| {
                self.codes
                    .get(label)
                    .map(|&code| code as f64)
                    .ok_or_else(|| {
                        CwasError::InvalidParameter(format!(
                            "Site label '{}' was not present in the sampled cohort.",
                            label
                        ))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dataset(n: usize) -> ConnectivityDataset {
        let subjects: Vec<String> = (0..n).map(|i| format!("s{}", i)).collect();
        let sites: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "A" } else { "B" }).collect();
        let conn: Vec<f64> = (0..n).map(|i| i as f64 / 10.0).collect();
        let df = df!(
            "Subject" => subjects,
            "Site" => sites,
            "conn_0" => conn
        )
        .unwrap();
        ConnectivityDataset::from_dataframe(&df, "Subject", "Site", false).unwrap()
    }

    #[test]
    fn test_partition_is_disjoint_and_exhaustive() {
        let ds = dataset(20);
        let mut rng = StdRng::seed_from_u64(7);
        for n in [2usize, 5, 11, 20] {
            let partition = GroupPartition::sample(&mut rng, &ds, n).unwrap();
            let mut all: Vec<usize> = partition.cohort().collect();
            assert_eq!(all.len(), n);
            all.sort_unstable();
            all.dedup();
            assert_eq!(all.len(), n, "cohort rows must be distinct");
            assert_eq!(partition.group1().len(), n / 2);
            assert_eq!(partition.group2().len(), n - n / 2);
            assert!(partition.group2().len() - partition.group1().len() <= 1);
        }
    }

    #[test]
    fn test_oversized_cohort_is_rejected() {
        let ds = dataset(10);
        let mut rng = StdRng::seed_from_u64(7);
        let err = GroupPartition::sample(&mut rng, &ds, 11).unwrap_err();
        assert!(matches!(err, CwasError::InvalidParameter(_)));
    }

    #[test]
    fn test_codebook_is_stable_and_consistent() {
        let labels = ["siteB", "siteA", "siteB", "siteC", "siteA"];
        let book = SiteCodebook::fit(labels.iter().copied());
        let again = SiteCodebook::fit(labels.iter().copied());
        assert_eq!(book.n_sites(), 3);
        assert_eq!(
            book.encode(labels.iter().copied()).unwrap(),
            again.encode(labels.iter().copied()).unwrap()
        );
        // Identical labels receive identical codes.
        let codes = book.encode(labels.iter().copied()).unwrap();
        assert_eq!(codes[0], codes[2]);
        assert_eq!(codes[1], codes[4]);
        assert_ne!(codes[0], codes[1]);
    }

    #[test]
    fn test_codebook_rejects_unseen_label() {
        let book = SiteCodebook::fit(["A", "B"].into_iter());
        assert!(book.encode(["C"].into_iter()).is_err());
    }
}
