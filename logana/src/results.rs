//! Values produced by a scan and the events a search session forwards.
use serde::{Deserialize, Serialize};

use crate::errors::SearchResult;

/// A matched line together with its context block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// 1-based line number of the matched line, or 0 when line numbers
    /// were not computed for the scan
    #[serde(rename = "line")]
    pub line_number: u64,
    /// Before-context, the matched line and after-context joined by `\n`
    pub content: String,
    /// Byte offset of the start of the matched line
    pub offset: u64,
}

impl Match {
    /// Lines of the block in file order
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.content.split('\n')
    }
}

/// Terminal status of a scan as reported to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Complete,
    Cancelled,
    Error,
}

impl ScanStatus {
    pub fn from_result<T>(result: &SearchResult<T>) -> Self {
        match result {
            Ok(_) => Self::Complete,
            Err(e) if e.is_cancelled() => Self::Cancelled,
            Err(_) => Self::Error,
        }
    }
}

/// Final report of a search session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCompletion {
    pub status: ScanStatus,
    /// Error message, empty on success
    pub error: String,
    /// Wall-clock seconds from start to completion
    pub elapsed: f64,
}

/// Events a search session forwards to its caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SearchEvent {
    /// Percentage of chunks finished, 0 to 100; not necessarily monotonic
    #[serde(rename = "search_progress")]
    Progress(f64),
    #[serde(rename = "search_results")]
    Results(Vec<Match>),
    #[serde(rename = "search_complete")]
    Complete(ScanCompletion),
}

/// Size and name of a file, for display before a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub size: u64,
    pub name: String,
}
