//! Caller side of a scan: owns the sinks, drains them and forwards events.
use crossbeam_channel::{bounded, never, select};
use std::mem;
use std::panic;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{ScannerConfig, SearchOptions};
use crate::errors::{SearchError, SearchResult};
use crate::metrics::ScanMetrics;
use crate::results::{FileInfo, Match, ScanCompletion, ScanStatus, SearchEvent};
use crate::search::{CancellationToken, ParallelScanner};

/// Runs one search at a time on a shared scanner.
///
/// Starting a search cancels the one before it, if any. Events are delivered
/// on the thread that called [`SearchSession::search`].
pub struct SearchSession {
    scanner: ParallelScanner,
    active: Mutex<Option<(u64, CancellationToken)>>,
    generation: AtomicU64,
}

impl SearchSession {
    pub fn new(config: ScannerConfig) -> SearchResult<Self> {
        Ok(Self {
            scanner: ParallelScanner::new(config)?,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    /// Counters of the most recently started scan
    pub fn metrics(&self) -> ScanMetrics {
        self.scanner.metrics()
    }

    /// Signals the running search to stop dispatching chunks.
    ///
    /// Does nothing when no search is running.
    pub fn cancel(&self) {
        if let Some((id, token)) = self.lock_active().as_ref() {
            info!("Cancelling search {}", id);
            token.cancel();
        }
    }

    /// Runs a search to completion, forwarding events to `emit`.
    ///
    /// Progress is forwarded as it arrives. Matches are grouped into batches
    /// of `batch_size`; the last batch may be shorter. The final event is
    /// always [`SearchEvent::Complete`], which is also returned.
    pub fn search<F>(&self, options: &SearchOptions, mut emit: F) -> ScanCompletion
    where
        F: FnMut(SearchEvent),
    {
        let started = Instant::now();
        let (id, token) = self.begin();
        let config = self.scanner.config();
        let batch_size = config.batch_size;

        let (progress_tx, progress_rx) = bounded::<f64>(config.progress_capacity);
        let (results_tx, results_rx) = bounded::<Match>(config.result_capacity);

        let result = thread::scope(|scope| {
            let scan = thread::Builder::new()
                .name(format!("logana-search-{}", id))
                .spawn_scoped(scope, {
                    let token = &token;
                    move || {
                        // Both senders drop when the scan returns, which ends the drain loop
                        self.scanner.scan(options, token, &progress_tx, &results_tx)
                    }
                })
                .map_err(SearchError::IoError)?;

            let mut progress = Some(progress_rx);
            let mut results = Some(results_rx);
            let mut batch: Vec<Match> = Vec::with_capacity(batch_size);

            while progress.is_some() || results.is_some() {
                let progress_rx = progress.clone().unwrap_or_else(never);
                let results_rx = results.clone().unwrap_or_else(never);
                select! {
                    recv(progress_rx) -> msg => match msg {
                        Ok(percent) => emit(SearchEvent::Progress(percent)),
                        Err(_) => progress = None,
                    },
                    recv(results_rx) -> msg => match msg {
                        Ok(m) => {
                            batch.push(m);
                            if batch.len() >= batch_size {
                                emit(SearchEvent::Results(mem::replace(
                                    &mut batch,
                                    Vec::with_capacity(batch_size),
                                )));
                            }
                        }
                        Err(_) => results = None,
                    },
                }
            }

            if !batch.is_empty() {
                emit(SearchEvent::Results(batch));
            }

            match scan.join() {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            }
        });

        self.finish(id);

        let completion = ScanCompletion {
            status: ScanStatus::from_result(&result),
            error: result.err().map(|e| e.to_string()).unwrap_or_default(),
            elapsed: started.elapsed().as_secs_f64(),
        };
        debug!(
            "Search {} finished with status {:?} in {:.3}s",
            id, completion.status, completion.elapsed
        );
        emit(SearchEvent::Complete(completion.clone()));
        completion
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let id = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let mut active = self.lock_active();
        if let Some((previous, old)) = active.replace((id, token.clone())) {
            debug!("Search {} supersedes search {}", id, previous);
            old.cancel();
        }
        (id, token)
    }

    fn finish(&self, id: u64) {
        let mut active = self.lock_active();
        if matches!(active.as_ref(), Some((current, _)) if *current == id) {
            *active = None;
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<(u64, CancellationToken)>> {
        // The guarded value is a plain token, so a poisoned lock is still usable
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Size and name of `path`
pub fn file_info(path: impl AsRef<Path>) -> SearchResult<FileInfo> {
    let path = path.as_ref();
    let metadata = path.metadata().map_err(|e| SearchError::input(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(FileInfo {
        size: metadata.len(),
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;
    use tempfile::NamedTempFile;

    fn write_log(content: &str) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), content).unwrap();
        file
    }

    fn config(chunk_size: u64, workers: usize) -> ScannerConfig {
        ScannerConfig {
            chunk_size,
            worker_count: NonZeroUsize::new(workers).unwrap(),
            ..ScannerConfig::default()
        }
    }

    #[test]
    fn test_matches_are_batched() {
        let content: String = (0..120).map(|i| format!("hit {:03}\n", i)).collect();
        let file = write_log(&content);
        let session = SearchSession::new(config(64, 4)).unwrap();

        let mut events = Vec::new();
        let completion = session.search(&SearchOptions::new(file.path(), "hit"), |e| events.push(e));
        assert_eq!(completion.status, ScanStatus::Complete);
        assert!(completion.error.is_empty());

        let batches: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SearchEvent::Results(batch) => Some(batch.len()),
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![50, 50, 20]);

        assert!(matches!(events.last(), Some(SearchEvent::Complete(c)) if c == &completion));
        let progress = events
            .iter()
            .filter(|e| matches!(e, SearchEvent::Progress(_)))
            .count();
        assert_eq!(progress, content.len().div_ceil(64));
    }

    #[test]
    fn test_missing_file_completes_with_error() {
        let session = SearchSession::new(ScannerConfig::default()).unwrap();
        let mut events = Vec::new();
        let completion = session.search(&SearchOptions::new("/no/such/file.log", "x"), |e| {
            events.push(e)
        });

        assert_eq!(completion.status, ScanStatus::Error);
        assert!(completion.error.contains("/no/such/file.log"));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_invalid_regex_completes_with_error() {
        let file = write_log("abc\n");
        let session = SearchSession::new(ScannerConfig::default()).unwrap();
        let mut options = SearchOptions::new(file.path(), "ok [unclosed");
        options.is_regex = true;

        let completion = session.search(&options, |_| {});
        assert_eq!(completion.status, ScanStatus::Error);
        assert!(completion.error.contains("[unclosed"));
    }

    #[test]
    fn test_cancel_from_event_handler() {
        let content: String = (0..400).map(|i| format!("match line {:04}\n", i)).collect();
        let file = write_log(&content);
        let session = SearchSession::new(ScannerConfig {
            result_capacity: 1,
            batch_size: 1,
            ..config(64, 1)
        })
        .unwrap();

        let mut delivered = 0;
        let completion = session.search(&SearchOptions::new(file.path(), "match"), |e| {
            if let SearchEvent::Results(batch) = e {
                delivered += batch.len();
                session.cancel();
            }
        });

        assert_eq!(completion.status, ScanStatus::Cancelled);
        assert_eq!(completion.error, "Search cancelled");
        let stats = session.metrics().get_stats();
        assert!(stats.chunks_dispatched < stats.chunks_total);
        assert_eq!(delivered as u64, stats.matches_emitted);
    }

    #[test]
    fn test_session_is_reusable_after_cancel() {
        let file = write_log("one\ntwo\n");
        let session = SearchSession::new(ScannerConfig::default()).unwrap();
        session.cancel();

        let completion = session.search(&SearchOptions::new(file.path(), "two"), |_| {});
        assert_eq!(completion.status, ScanStatus::Complete);
        assert!(session.lock_active().is_none());
    }

    #[test]
    fn test_file_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "0123456789").unwrap();

        let info = file_info(&path).unwrap();
        assert_eq!(info.size, 10);
        assert_eq!(info.name, "app.log");

        let err = file_info(dir.path().join("gone.log")).unwrap_err();
        assert!(err.is_input_error());
    }
}
