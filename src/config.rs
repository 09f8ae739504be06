//! Runtime configuration from the environment.
//!
//! Every setting has a default; command-line flags override what is read here.

use std::path::PathBuf;
use std::str::FromStr;

use crate::{Result, StrokewatchError};

pub const ARTIFACT_DIR_ENV: &str = "STROKEWATCH_ARTIFACT_DIR";
pub const WORKERS_ENV: &str = "STROKEWATCH_WORKERS";
pub const LOG_MODE_ENV: &str = "STROKEWATCH_LOG_MODE";
pub const LOG_FILE_ENV: &str = "STROKEWATCH_LOG_FILE";
pub const SANITIZE_MAX_BYTES_ENV: &str = "STROKEWATCH_SANITIZE_MAX_BYTES";

const DEFAULT_ARTIFACT_DIR: &str = "artifacts";
const DEFAULT_LOG_FILE: &str = "strokewatch.log";

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// A file when `STROKEWATCH_LOG_FILE` is set, stderr otherwise.
    Auto,
    File,
    Stdout,
    Stderr,
}

impl FromStr for LogMode {
    type Err = StrokewatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "file" => Ok(Self::File),
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            other => Err(StrokewatchError::Config(format!(
                "{LOG_MODE_ENV} must be auto, file, stdout or stderr, got {other:?}"
            ))),
        }
    }
}

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub artifact_dir: PathBuf,
    pub workers: usize,
    pub log_mode: LogMode,
    /// Explicitly configured log file, if any.
    pub log_file: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Read settings from the process environment.
    ///
    /// # Errors
    /// Returns `Config` for an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary lookup.
    ///
    /// # Errors
    /// Returns `Config` for an unparsable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let artifact_dir = lookup(ARTIFACT_DIR_ENV)
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR), PathBuf::from);

        let workers = match lookup(WORKERS_ENV) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(StrokewatchError::Config(format!(
                        "{WORKERS_ENV} must be a positive integer, got {raw:?}"
                    )))
                }
            },
            None => default_workers(),
        };

        let log_mode = lookup(LOG_MODE_ENV)
            .map(|v| v.parse::<LogMode>())
            .transpose()?
            .unwrap_or(LogMode::Auto);

        let log_file = lookup(LOG_FILE_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            artifact_dir,
            workers,
            log_mode,
            log_file,
        })
    }

    /// Resolved log destination: `Some(path)` for a file, `None` for a stream.
    #[must_use]
    pub fn log_file_target(&self) -> Option<PathBuf> {
        match self.log_mode {
            LogMode::File => Some(
                self.log_file
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            ),
            LogMode::Auto => self.log_file.clone(),
            LogMode::Stdout | LogMode::Stderr => None,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}
