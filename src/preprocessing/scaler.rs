//! Standard scaler: per-column centering and unit-variance scaling.

use serde::{Deserialize, Serialize};

use super::TransformError;

/// Fitted standard scaler over named numeric columns.
///
/// Uses the population standard deviation. A constant column gets a scale of
/// 1.0 so that transforming it only centers the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit on column-major data: `values[i]` holds every observation of `columns[i]`.
    ///
    /// # Errors
    /// Returns an error message if a column is empty or contains a non-finite value.
    pub fn fit(columns: &[String], values: &[Vec<f64>]) -> Result<Self, String> {
        if columns.len() != values.len() {
            return Err(format!(
                "Scaler got {} columns but {} value vectors",
                columns.len(),
                values.len()
            ));
        }

        let mut means = Vec::with_capacity(columns.len());
        let mut scales = Vec::with_capacity(columns.len());

        for (name, col) in columns.iter().zip(values) {
            if col.is_empty() {
                return Err(format!("Cannot fit scaler on empty column {name:?}"));
            }
            if let Some(bad) = col.iter().find(|v| !v.is_finite()) {
                return Err(format!("Column {name:?} contains non-finite value {bad}"));
            }

            let n = col.len() as f64;
            let mean = col.iter().sum::<f64>() / n;
            let var = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            let std = var.sqrt();

            means.push(mean);
            scales.push(if std > 0.0 { std } else { 1.0 });
        }

        Ok(Self {
            columns: columns.to_vec(),
            means,
            scales,
        })
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    #[must_use]
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// Whether the scaler was fitted on this column.
    #[must_use]
    pub fn handles(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Scale one value of a fitted column.
    ///
    /// # Errors
    /// Returns `InvalidValue` for a non-finite input or a column the scaler was not fitted on.
    pub fn transform(&self, column: &str, value: f64) -> Result<f64, TransformError> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| TransformError::InvalidValue {
                field: column.to_string(),
                reason: "column was not fitted by the scaler".to_string(),
            })?;

        if !value.is_finite() {
            return Err(TransformError::InvalidValue {
                field: column.to_string(),
                reason: format!("cannot scale non-finite value {value}"),
            });
        }

        Ok((value - self.means[idx]) / self.scales[idx])
    }
}
