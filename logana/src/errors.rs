//! Error types for logana.
//!
//! Two families live here and they never mix:
//!
//! * [`SearchError`] is terminal. Only input failures (the file cannot be
//!   opened or stat'ed), pattern failures (a regex term does not compile) and
//!   cancellation become the status of a scan. Configuration and plain I/O
//!   variants exist for the layers around the engine.
//! * [`ChunkError`] is local to one chunk task. The orchestrator logs it,
//!   counts it and throws it away, so a scan that reports success may still
//!   be missing the results of a chunk that failed part way.
//!
//! ```rust,ignore
//! match scanner.scan(&options, &token, &progress_tx, &results_tx) {
//!     Ok(()) => // every dispatched chunk ran,
//!     Err(SearchError::Cancelled) => // stopped at a dispatch checkpoint,
//!     Err(SearchError::InvalidPattern { term, .. }) => // nothing was dispatched,
//!     Err(e) => // file could not be opened,
//! }
//! ```
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that end a scan
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Failed to open {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid regex '{term}': {source}")]
    InvalidPattern {
        term: String,
        #[source]
        source: regex::Error,
    },
    #[error("Search cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl SearchError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Classifies a failure to open or stat the input file.
    pub fn input(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => Self::file_not_found(path),
            io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::Input { path, source },
        }
    }

    pub fn invalid_pattern(term: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            term: term.into(),
            source,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// True for the input family: the file was missing or unreadable.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound(_) | Self::PermissionDenied(_) | Self::Input { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<config::ConfigError> for SearchError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

/// Failures confined to a single chunk task
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("I/O error near offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("Line at offset {offset} exceeds the maximum length of {limit} bytes")]
    LineTooLong { offset: u64, limit: usize },
}

impl ChunkError {
    pub fn io(offset: u64, source: io::Error) -> Self {
        Self::Io { offset, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_input_error_classification() {
        let path = Path::new("missing.log");

        let err = SearchError::input(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, SearchError::FileNotFound(_)));
        assert!(err.is_input_error());

        let err = SearchError::input(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, SearchError::PermissionDenied(_)));

        let err = SearchError::input(path, io::Error::new(io::ErrorKind::Other, "device gone"));
        assert!(matches!(err, SearchError::Input { .. }));
        assert!(err.is_input_error());
        assert!(!SearchError::Cancelled.is_input_error());
    }

    #[test]
    fn test_error_messages() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = SearchError::invalid_pattern("(", source);
        assert!(err.to_string().starts_with("Invalid regex '(':"));

        let err = SearchError::config_error("chunk_size must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Configuration error: chunk_size must be greater than zero"
        );

        assert_eq!(SearchError::Cancelled.to_string(), "Search cancelled");
        assert!(SearchError::Cancelled.is_cancelled());

        let err = SearchError::file_not_found("app.log");
        assert_eq!(err.to_string(), "File not found: app.log");

        let err = ChunkError::LineTooLong {
            offset: 42,
            limit: 16,
        };
        assert_eq!(
            err.to_string(),
            "Line at offset 42 exceeds the maximum length of 16 bytes"
        );
    }
}
