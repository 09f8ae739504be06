//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external systems:
//! - `filesystem`: artifact store on a local directory
//! - `csv_table`: CSV datasets
//! - `sanitize`: identifier filtering for logs

pub mod csv_table;
pub mod filesystem;
pub mod sanitize;

// Re-export artifact error for lib.rs
pub use filesystem::{ArtifactError, FileArtifactStore};
