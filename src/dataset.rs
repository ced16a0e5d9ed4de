//! In-memory representation of a connectivity table.
//!
//! The raw table arrives as an opaque polars `DataFrame` with one row per
//! subject: an identifier column, a categorical site column, and numeric
//! connectivity columns (one per connection, same order for every subject).
//! It is parsed once into a dense matrix; everything downstream works on
//! plain `nalgebra` types.

use nalgebra::DMatrix;
use polars::prelude::*;

use crate::CwasError;

/// A read-only connectivity dataset: subject ids, site labels, and a dense
/// feature matrix with one row per subject and one column per connection.
#[derive(Debug, Clone)]
pub struct ConnectivityDataset {
    subjects: Vec<String>,
    sites: Vec<String>,
    features: DMatrix<f64>,
    connection_names: Vec<String>,
}

impl ConnectivityDataset {
    /// Builds a dataset from a DataFrame.
    ///
    /// Rows containing nulls in any relevant column are dropped. Every
    /// column other than `subject_col` and `site_col` is treated as a
    /// numeric connection, in the order it appears in the frame. When
    /// `fisher_transform` is set, each connectivity value is mapped through
    /// the Fisher z-transform (`atanh`), the usual variance-stabilizing
    /// step for correlation-valued connectomes.
    pub fn from_dataframe(
        df: &DataFrame,
        subject_col: &str,
        site_col: &str,
        fisher_transform: bool,
    ) -> Result<Self, CwasError> {
        for col in [subject_col, site_col] {
            if df.column(col).is_err() {
                return Err(CwasError::ColumnNotFound(col.to_string()));
            }
        }

        let all_cols: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let df = df
            .drop_nulls(Some(all_cols.as_slice()))
            .map_err(CwasError::Polars)?;

        let subjects = string_column(&df, subject_col)?;
        let sites = string_column(&df, site_col)?;

        let connection_names: Vec<String> = all_cols
            .iter()
            .filter(|name| name.as_str() != subject_col && name.as_str() != site_col)
            .cloned()
            .collect();
        if connection_names.is_empty() {
            return Err(CwasError::InvalidParameter(
                "The dataset contains no connectivity columns.".to_string(),
            ));
        }

        let n_subjects = df.height();
        let n_connections = connection_names.len();

        // Column-major fill matches DMatrix::from_vec's storage order.
        let mut values = Vec::with_capacity(n_subjects * n_connections);
        for name in &connection_names {
            let series = df
                .column(name)
                .map_err(CwasError::Polars)?
                .as_materialized_series()
                .cast(&DataType::Float64)
                .map_err(CwasError::Polars)?;
            let chunked = series.f64().map_err(CwasError::Polars)?;
            for value in chunked.into_iter() {
                let v = value.ok_or_else(|| {
                    CwasError::InvalidParameter(format!(
                        "Non-numeric value in connectivity column '{}'.",
                        name
                    ))
                })?;
                values.push(if fisher_transform { v.atanh() } else { v });
            }
        }
        let features = DMatrix::from_vec(n_subjects, n_connections, values);

        Ok(Self {
            subjects,
            sites,
            features,
            connection_names,
        })
    }

    pub fn n_subjects(&self) -> usize {
        self.subjects.len()
    }

    pub fn n_connections(&self) -> usize {
        self.connection_names.len()
    }

    pub fn subject_ids(&self) -> &[String] {
        &self.subjects
    }

    pub fn connection_names(&self) -> &[String] {
        &self.connection_names
    }

    /// Site label of the subject at `row`.
    pub fn site(&self, row: usize) -> &str {
        &self.sites[row]
    }

    /// Extracts the feature sub-matrix for the given subject rows, keeping
    /// all connections and the row order given by `rows`.
    pub fn feature_rows(&self, rows: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(rows.len(), self.n_connections(), |i, j| {
            self.features[(rows[i], j)]
        })
    }
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>, CwasError> {
    let series = df
        .column(name)
        .map_err(CwasError::Polars)?
        .as_materialized_series()
        .cast(&DataType::String)
        .map_err(CwasError::Polars)?;
    let chunked = series.str().map_err(CwasError::Polars)?;
    Ok(chunked
        .into_iter()
        .map(|opt| opt.unwrap_or_default().to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn small_frame() -> DataFrame {
        df!(
            "Subject" => &["s1", "s2", "s3"],
            "Site" => &["A", "B", "A"],
            "conn_0" => &[0.1, 0.2, 0.3],
            "conn_1" => &[0.4, 0.5, 0.6]
        )
        .unwrap()
    }

    #[test]
    fn test_parses_shape_and_order() {
        let ds = ConnectivityDataset::from_dataframe(&small_frame(), "Subject", "Site", false)
            .unwrap();
        assert_eq!(ds.n_subjects(), 3);
        assert_eq!(ds.n_connections(), 2);
        assert_eq!(ds.connection_names(), &["conn_0", "conn_1"]);
        assert_eq!(ds.site(1), "B");
        let rows = ds.feature_rows(&[2, 0]);
        assert_eq!(rows[(0, 0)], 0.3);
        assert_eq!(rows[(1, 1)], 0.4);
    }

    #[test]
    fn test_fisher_transform_applies_atanh() {
        let ds =
            ConnectivityDataset::from_dataframe(&small_frame(), "Subject", "Site", true).unwrap();
        let rows = ds.feature_rows(&[0]);
        assert!((rows[(0, 0)] - 0.1f64.atanh()).abs() < 1e-12);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let err = ConnectivityDataset::from_dataframe(&small_frame(), "Subject", "Scanner", false)
            .unwrap_err();
        assert!(matches!(err, CwasError::ColumnNotFound(_)));
    }

    #[test]
    fn test_no_connectivity_columns_is_invalid() {
        let df = df!(
            "Subject" => &["s1", "s2"],
            "Site" => &["A", "B"]
        )
        .unwrap();
        let err = ConnectivityDataset::from_dataframe(&df, "Subject", "Site", false).unwrap_err();
        assert!(matches!(err, CwasError::InvalidParameter(_)));
    }
}
