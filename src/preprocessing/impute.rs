//! Median imputation for numeric columns.

/// Median of the present values, averaging the two middle values for an even count.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Per-column medians fitted on one split and applied to any split.
#[derive(Debug, Clone, PartialEq)]
pub struct MedianImputer {
    columns: Vec<String>,
    medians: Vec<f64>,
}

impl MedianImputer {
    /// Fit on column-major data where `None` marks a missing cell.
    ///
    /// # Errors
    /// Returns an error message naming a column with no present value.
    pub fn fit(columns: &[String], values: &[Vec<Option<f64>>]) -> Result<Self, String> {
        let mut medians = Vec::with_capacity(columns.len());
        for (name, col) in columns.iter().zip(values) {
            let present: Vec<f64> = col.iter().flatten().copied().collect();
            let m = median(&present)
                .ok_or_else(|| format!("Column {name:?} has no values to compute a median from"))?;
            medians.push(m);
        }
        Ok(Self {
            columns: columns.to_vec(),
            medians,
        })
    }

    #[must_use]
    pub fn median_of(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.medians[i])
    }

    /// Fill a missing cell of a fitted column. Unfitted columns are returned unchanged.
    #[must_use]
    pub fn fill(&self, column: &str, value: Option<f64>) -> Option<f64> {
        value.or_else(|| self.median_of(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[f64::NAN, 5.0]), Some(5.0));
    }

    #[test]
    fn test_imputer_fills_only_missing() {
        let imputer = MedianImputer::fit(
            &["bmi".to_string()],
            &[vec![Some(20.0), None, Some(30.0), Some(28.0)]],
        )
        .expect("Should fit");
        assert_eq!(imputer.median_of("bmi"), Some(28.0));
        assert_eq!(imputer.fill("bmi", None), Some(28.0));
        assert_eq!(imputer.fill("bmi", Some(19.0)), Some(19.0));
        assert_eq!(imputer.fill("age", None), None);
    }

    #[test]
    fn test_all_missing_column_is_an_error() {
        let err = MedianImputer::fit(&["bmi".to_string()], &[vec![None, None]])
            .expect_err("Should fail");
        assert!(err.contains("bmi"));
    }
}
