pub mod config;
pub mod errors;
pub mod metrics;
pub mod results;
pub mod search;
pub mod session;

pub use config::{LogicMode, ScannerConfig, SearchOptions};
pub use errors::{ChunkError, SearchError, SearchResult};
pub use results::{FileInfo, Match, ScanCompletion, ScanStatus, SearchEvent};
pub use search::{search, CancellationToken, ParallelScanner};
pub use session::{file_info, SearchSession};
