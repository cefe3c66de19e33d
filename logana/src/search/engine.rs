use crossbeam_channel::{bounded, unbounded, Sender};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs::File;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, trace, warn};

use super::matcher::QueryMatcher;
use super::processor::{partition, Chunk, ChunkOutcome, ChunkProcessor, ChunkSettings};
use super::source::{count_newlines, ScanSource};
use crate::config::{ScannerConfig, SearchOptions};
use crate::errors::{SearchError, SearchResult};
use crate::metrics::ScanMetrics;
use crate::results::Match;

/// Cooperative cancellation flag.
///
/// The scanner only looks at it between chunk dispatches: chunks already
/// running always finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Splits a file into chunks and scans them on a bounded worker pool
pub struct ParallelScanner {
    config: ScannerConfig,
    pool: ThreadPool,
    latest: Mutex<ScanMetrics>,
}

impl ParallelScanner {
    pub fn new(config: ScannerConfig) -> SearchResult<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_count.get())
            .thread_name(|i| format!("logana-scan-{}", i))
            .build()
            .map_err(|e| SearchError::config_error(format!("failed to start worker pool: {}", e)))?;

        Ok(Self {
            config,
            pool,
            latest: Mutex::new(ScanMetrics::new()),
        })
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.config.worker_count.get()
    }

    /// Counters of the most recently started scan.
    ///
    /// Each scan owns its counters; a scan still finishing after a newer one
    /// started keeps updating the handle it was given, not this one.
    pub fn metrics(&self) -> ScanMetrics {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Scans `options.file_path`, streaming progress and matches.
    ///
    /// Both sinks are bounded by the caller and must be drained concurrently:
    /// a full sink blocks every worker. Progress values are percentages of
    /// finished chunks and arrive in completion order, not chunk order.
    ///
    /// Only input, pattern and cancellation errors are returned. A chunk that
    /// hits a read error or an over-long line is logged and dropped, so `Ok`
    /// can mean partial results.
    pub fn scan(
        &self,
        options: &SearchOptions,
        cancel: &CancellationToken,
        progress: &Sender<f64>,
        results: &Sender<Match>,
    ) -> SearchResult<()> {
        let path = &options.file_path;
        info!("Starting scan of {} with query {:?}", path.display(), options.query);

        let file = File::open(path).map_err(|e| SearchError::input(path, e))?;
        let file_size = file
            .metadata()
            .map_err(|e| SearchError::input(path, e))?
            .len();

        let matcher = QueryMatcher::from_options(options)?;
        if matcher.is_empty() {
            debug!("Empty query, nothing to scan");
            return Ok(());
        }
        debug!("Compiled {} query terms", matcher.len());

        let source = ScanSource::open(file, file_size, self.config.use_mmap)
            .map_err(|e| SearchError::input(path, e))?;
        let chunks = partition(file_size, self.config.chunk_size);
        let total = chunks.len();
        let metrics = ScanMetrics::with_total(total as u64);
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = metrics.clone();
        debug!(
            "Split {} bytes into {} chunks for {} workers (mapped: {})",
            file_size,
            total,
            self.worker_count(),
            source.is_mapped()
        );

        let line_bases = if self.config.line_numbers {
            self.line_bases(&source, &chunks)
        } else {
            None
        };

        let settings = ChunkSettings {
            context: options.context,
            cap: options.result_cap(),
            max_line_length: self.config.max_line_length,
        };
        let emitted = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let processor = ChunkProcessor::new(&matcher, settings, &emitted, results, &metrics);
        let metrics = &metrics;

        // One token per running chunk task
        let (slot_tx, slot_rx) = bounded::<()>(self.worker_count());

        let cancelled = self.pool.in_place_scope(|scope| {
            for chunk in &chunks {
                if slot_tx.send(()).is_err() {
                    break;
                }
                if cancel.is_cancelled() {
                    let _ = slot_rx.try_recv();
                    return true;
                }
                if emitted.load(Ordering::Relaxed) >= settings.cap {
                    debug!("Result cap reached, not dispatching chunk {}", chunk.index);
                    let _ = slot_rx.try_recv();
                    break;
                }

                metrics.record_dispatch();
                let processor = &processor;
                let source = &source;
                let line_bases = &line_bases;
                let completed = &completed;
                let slot_rx = &slot_rx;
                scope.spawn(move |_| {
                    let base = line_bases.as_ref().map(|bases| bases[chunk.index]);
                    let outcome = processor.process(source, chunk, base);
                    log_outcome(chunk, &outcome);
                    metrics.record_outcome(&outcome);

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    let _ = progress.send(done as f64 / total as f64 * 100.0);
                    let _ = slot_rx.recv();
                });
            }
            false
        });

        metrics.log_stats();
        if cancelled {
            info!(
                "Scan cancelled after dispatching {} of {} chunks",
                metrics.get_stats().chunks_dispatched,
                total
            );
            return Err(SearchError::Cancelled);
        }

        info!(
            "Scan complete. Emitted {} matches from {} chunks",
            emitted.load(Ordering::Relaxed),
            total
        );
        Ok(())
    }

    /// Newlines before each chunk's raw start, or `None` if counting failed
    fn line_bases(&self, source: &ScanSource, chunks: &[Chunk]) -> Option<Vec<u64>> {
        let counts: io::Result<Vec<u64>> = self.pool.install(|| {
            chunks
                .par_iter()
                .map(|chunk| count_newlines(source, chunk.start, chunk.end))
                .collect()
        });

        match counts {
            Ok(counts) => Some(
                counts
                    .iter()
                    .scan(0u64, |seen, &count| {
                        let base = *seen;
                        *seen += count;
                        Some(base)
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!("Line counting failed, matches will carry line 0: {}", e);
                None
            }
        }
    }
}

fn log_outcome(chunk: &Chunk, outcome: &ChunkOutcome) {
    match outcome {
        ChunkOutcome::Failed(e) => warn!(
            "Chunk {} [{}, {}) stopped early, remaining lines skipped: {}",
            chunk.index, chunk.start, chunk.end, e
        ),
        ChunkOutcome::Disconnected => {
            debug!("Chunk {} stopped: result sink closed", chunk.index)
        }
        other => trace!("Chunk {} finished: {:?}", chunk.index, other),
    }
}

/// Runs a whole scan and returns every match ordered by offset.
///
/// Convenience for callers that do not need streaming; progress is dropped.
pub fn search(options: &SearchOptions, config: &ScannerConfig) -> SearchResult<Vec<Match>> {
    let scanner = ParallelScanner::new(config.clone())?;
    let (progress_tx, _progress_rx) = unbounded();
    let (results_tx, results_rx) = unbounded();

    scanner.scan(options, &CancellationToken::new(), &progress_tx, &results_tx)?;
    drop(results_tx);

    let mut matches: Vec<Match> = results_rx.into_iter().collect();
    matches.sort_by_key(|m| m.offset);
    Ok(matches)
}
