//! CSV adapter: reads training datasets into a [`RawTable`].

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::domain::RawTable;
use crate::{Result, StrokewatchError};

/// Read a headed CSV file. Cells are trimmed; headers are normalized by the table.
///
/// # Errors
/// Returns `Csv` for unreadable or malformed input and `TrainingData` for
/// duplicate headers or ragged rows.
pub fn read_table(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path)?;
    let table = read_table_from(file)?;
    tracing::info!(
        "Read {} rows x {} columns from {:?}",
        table.len(),
        table.columns().len(),
        path
    );
    Ok(table)
}

/// Read a headed CSV from any reader.
///
/// # Errors
/// Same as [`read_table`].
pub fn read_table_from<R: Read>(reader: R) -> Result<RawTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    RawTable::new(headers, rows).map_err(StrokewatchError::TrainingData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_and_normalizes() {
        let csv = "id, Gender ,stroke\n1, Male ,0\n2,Female,1\n";
        let table = read_table_from(csv.as_bytes()).expect("Should read");
        assert_eq!(table.columns(), ["id", "gender", "stroke"]);
        assert_eq!(table.column("gender"), Some(vec!["Male", "Female"]));
    }

    #[test]
    fn test_ragged_rows_fail() {
        let csv = "a,b\n1,2\n3\n";
        assert!(read_table_from(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("Should create temp file");
        writeln!(file, "TenYearCHD,age").expect("Should write");
        writeln!(file, "1,61").expect("Should write");
        let table = read_table(file.path()).expect("Should read");
        assert_eq!(table.len(), 1);
        assert_eq!(table.column_index("tenyearchd"), Some(0));
    }
}
