//! Parallel scanning of a single large file.
//!
//! # How a scan runs
//!
//! 1. **Validation**: the file is opened and stat'ed, the query is split on
//!    whitespace and, in regex mode, every term is compiled. Any failure here
//!    ends the scan before a single chunk is dispatched.
//! 2. **Partitioning**: the file is cut into fixed-size byte ranges
//!    ([`Chunk`]) that tile it exactly.
//! 3. **Dispatch**: chunks are handed to a rayon pool through a counting
//!    semaphore with one permit per worker. The cancellation token and the
//!    shared result counter are consulted before each dispatch and nowhere
//!    else.
//! 4. **Chunk scan**: each task realigns its start to a line boundary, reads
//!    every line that starts inside its range (finishing a line that runs
//!    past the range end), and assembles context blocks around matches.
//!
//! ```rust,ignore
//! let scanner = ParallelScanner::new(ScannerConfig::default())?;
//! let (progress_tx, progress_rx) = crossbeam_channel::bounded(10);
//! let (results_tx, results_rx) = crossbeam_channel::bounded(100);
//! // drain progress_rx and results_rx on other threads, then:
//! scanner.scan(&options, &CancellationToken::new(), &progress_tx, &results_tx)?;
//! ```
//!
//! # Line ownership
//!
//! A line belongs to the chunk in which its first byte lies. A chunk whose
//! raw start falls mid-line skips forward past the next newline; the chunk
//! before it reads that line to its end. Every line is therefore scanned
//! exactly once, and an unterminated final line belongs to whichever chunk
//! it starts in.
//!
//! # Backpressure
//!
//! Both sinks are bounded channels. A worker that emits into a full sink
//! blocks, and a dispatch waits for a free worker, so a caller that stops
//! draining stalls the whole scan rather than growing memory.
pub mod engine;
pub mod matcher;
pub mod processor;
pub mod source;

pub use engine::{search, CancellationToken, ParallelScanner};
pub use matcher::QueryMatcher;
pub use processor::{partition, Chunk, ChunkOutcome, ChunkProcessor};
pub use source::{ReadAt, ScanSource};
