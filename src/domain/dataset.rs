//! Raw tabular training data with normalized column names.

use std::collections::BTreeMap;

use super::record::normalize_name;

/// Cell spellings treated as a missing value.
const MISSING_MARKERS: [&str; 5] = ["", "na", "n/a", "nan", "null"];

/// Whether a raw cell denotes a missing value.
#[must_use]
pub fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    MISSING_MARKERS.iter().any(|m| cell.eq_ignore_ascii_case(m))
}

/// A rectangular dataset of raw string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build a table, normalizing headers.
    ///
    /// # Errors
    /// Returns an error message on duplicate normalized headers or ragged rows.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, String> {
        let columns: Vec<String> = headers.iter().map(|h| normalize_name(h)).collect();

        let mut seen = std::collections::BTreeSet::new();
        for c in &columns {
            if !seen.insert(c.as_str()) {
                return Err(format!("Duplicate column {c:?} after name normalization"));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(format!(
                    "Row {}: expected {} cells, got {}",
                    i + 1,
                    columns.len(),
                    row.len()
                ));
            }
        }

        Ok(Self { columns, rows })
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in file order, cells aligned with [`RawTable::columns`].
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = normalize_name(name);
        self.columns.iter().position(|c| *c == name)
    }

    /// Cells of one column, top to bottom.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Count occurrences of each distinct (trimmed) value of a column.
    #[must_use]
    pub fn value_counts(&self, name: &str) -> Option<BTreeMap<String, usize>> {
        let cells = self.column(name)?;
        let mut counts = BTreeMap::new();
        for cell in cells {
            *counts.entry(cell.trim().to_string()).or_insert(0) += 1;
        }
        Some(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RawTable {
        RawTable::new(
            vec!["id".into(), " Residence_type".into(), "Stroke ".into()],
            vec![
                vec!["1".into(), "Urban".into(), "1".into()],
                vec!["2".into(), "Rural".into(), "0".into()],
                vec!["3".into(), "Urban".into(), "0".into()],
            ],
        )
        .expect("Should build")
    }

    #[test]
    fn test_headers_are_normalized() {
        let t = table();
        assert_eq!(t.columns(), ["id", "residence_type", "stroke"]);
        assert_eq!(t.column_index("Residence_Type"), Some(1));
    }

    #[test]
    fn test_value_counts() {
        let counts = table().value_counts("stroke").expect("Column exists");
        assert_eq!(counts.get("0"), Some(&2));
        assert_eq!(counts.get("1"), Some(&1));
    }

    #[test]
    fn test_rejects_ragged_rows_and_duplicates() {
        assert!(RawTable::new(vec!["a".into()], vec![vec!["1".into(), "2".into()]]).is_err());
        assert!(RawTable::new(vec!["A".into(), "a ".into()], vec![]).is_err());
    }

    #[test]
    fn test_missing_markers() {
        assert!(is_missing(""));
        assert!(is_missing(" N/A "));
        assert!(is_missing("NaN"));
        assert!(!is_missing("0"));
    }
}
