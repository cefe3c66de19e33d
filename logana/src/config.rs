//! Search options and scanner configuration.
//!
//! [`SearchOptions`] describes one scan: which file, which query, and how the
//! terms combine. It keeps the wire names of the desktop front end
//! (`FilePath`, `Query`, `IsRegex`, ...) so a serialized request can be fed
//! straight into a scan.
//!
//! [`ScannerConfig`] tunes the engine itself and can be loaded from YAML.
//! Locations are read in order of increasing precedence:
//! 1. Global `$HOME/.config/logana/config.yaml`
//! 2. Local `.logana.yaml` in the current directory
//! 3. A file passed explicitly (the CLI's `--config` flag)
//!
//! ```yaml
//! # Size of one unit of parallel work, in bytes
//! chunk_size: 67108864
//!
//! # Worker threads (default: CPU cores, at least 4)
//! worker_count: 8
//!
//! # Lines longer than this stop the chunk that holds them
//! max_line_length: 10485760
//!
//! # Compute real line numbers with an extra counting pass
//! line_numbers: false
//!
//! # Log level (trace, debug, info, warn, error)
//! log_level: "warn"
//! ```
use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{SearchError, SearchResult};

/// Fixed size of a raw chunk
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024 * 1024;
/// Longest line a chunk will buffer before giving up on the rest of its range
pub const DEFAULT_MAX_LINE_LENGTH: usize = 10 * 1024 * 1024;
/// Result cap used when `max_results` is zero or negative
pub const DEFAULT_MAX_RESULTS: usize = 100_000;
/// Lower bound on the default worker pool size
pub const MIN_WORKERS: usize = 4;

/// How multiple query terms combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicMode {
    #[default]
    And,
    Or,
}

impl LogicMode {
    /// Only the exact text `"OR"` selects OR; everything else is AND.
    pub fn parse(value: &str) -> Self {
        if value == "OR" {
            Self::Or
        } else {
            Self::And
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl From<String> for LogicMode {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<LogicMode> for String {
    fn from(mode: LogicMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Parameters of a single scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchOptions {
    /// Log file to scan
    pub file_path: PathBuf,

    /// Whitespace separated search terms
    pub query: String,

    /// Treat every term as a regular expression
    #[serde(default)]
    pub is_regex: bool,

    #[serde(default)]
    pub ignore_case: bool,

    /// Report lines that do not satisfy the query
    #[serde(default)]
    pub invert: bool,

    #[serde(default)]
    pub logic: LogicMode,

    /// Lines of context before and after each match
    #[serde(default)]
    pub context: usize,

    /// Soft cap on emitted matches; zero or negative means the default cap
    #[serde(default)]
    pub max_results: i64,
}

impl SearchOptions {
    /// Literal, case-sensitive AND search with no context and the default cap.
    pub fn new(file_path: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            query: query.into(),
            is_regex: false,
            ignore_case: false,
            invert: false,
            logic: LogicMode::And,
            context: 0,
            max_results: 0,
        }
    }

    /// Query terms in the order they were typed
    pub fn terms(&self) -> Vec<&str> {
        self.query.split_whitespace().collect()
    }

    pub fn result_cap(&self) -> usize {
        if self.max_results <= 0 {
            DEFAULT_MAX_RESULTS
        } else {
            usize::try_from(self.max_results).unwrap_or(usize::MAX)
        }
    }
}

/// Engine tuning, shared by every scan a scanner runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Number of chunk tasks allowed in flight
    pub worker_count: NonZeroUsize,

    /// Size of a raw chunk in bytes
    pub chunk_size: u64,

    /// Longest accepted line in bytes, excluding the line terminator
    pub max_line_length: usize,

    /// Capacity of the progress channel
    pub progress_capacity: usize,

    /// Capacity of the match channel
    pub result_capacity: usize,

    /// Matches per forwarded batch in a search session
    pub batch_size: usize,

    /// Run a newline counting pass so matches carry real line numbers
    pub line_numbers: bool,

    /// Memory-map the file instead of issuing positioned reads
    pub use_mmap: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

fn default_worker_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get().max(MIN_WORKERS)).unwrap_or(NonZeroUsize::MIN)
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            progress_capacity: 10,
            result_capacity: 100,
            batch_size: 50,
            line_numbers: false,
            use_mmap: false,
            log_level: "warn".to_string(),
        }
    }
}

impl ScannerConfig {
    /// Loads configuration from the default locations plus an explicit file
    pub fn load_from(config_path: Option<&Path>) -> SearchResult<Self> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(SearchError::config_error(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("logana/config.yaml")),
            Some(PathBuf::from(".logana.yaml")),
            config_path.map(PathBuf::from),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the engine cannot run with
    pub fn validate(&self) -> SearchResult<()> {
        let checks = [
            (self.chunk_size == 0, "chunk_size"),
            (self.max_line_length == 0, "max_line_length"),
            (self.progress_capacity == 0, "progress_capacity"),
            (self.result_capacity == 0, "result_capacity"),
            (self.batch_size == 0, "batch_size"),
        ];
        for (invalid, field) in checks {
            if invalid {
                return Err(SearchError::config_error(format!(
                    "{} must be greater than zero",
                    field
                )));
            }
        }
        Ok(())
    }
}
