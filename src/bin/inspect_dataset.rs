//! Dataset inspection utility.
//!
//! Prints the class distribution of one column of a CSV dataset.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin inspect_dataset -- <dataset.csv> [column]
//! ```
//!
//! The column defaults to `stroke`. Column names are matched after
//! normalization, so `TenYearCHD` and `tenyearchd` are the same column.

#![allow(non_snake_case)]

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use Strokewatch::adapters::csv_table::read_table;

const DEFAULT_COLUMN: &str = "stroke";

fn usage() -> ! {
    eprintln!("Usage: inspect_dataset <dataset.csv> [column]");
    std::process::exit(2);
}

fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    let path = match args.next() {
        Some(p) if p != "--help" && p != "-h" => PathBuf::from(p),
        _ => usage(),
    };
    let column = args.next().unwrap_or_else(|| DEFAULT_COLUMN.to_string());
    if args.next().is_some() {
        usage();
    }

    let table = read_table(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let counts = table.value_counts(&column).with_context(|| {
        format!(
            "Column {column:?} not found; available columns: {}",
            table.columns().join(", ")
        )
    })?;

    println!("{column} ({} rows)", table.len());
    for (value, count) in &counts {
        let share = if table.is_empty() {
            0.0
        } else {
            *count as f64 / table.len() as f64 * 100.0
        };
        println!("{value:>16}  {count:>8}  {share:>6.2}%");
    }
    Ok(())
}
