use anyhow::Result;
use crossbeam_channel::unbounded;
use logana::{
    search, CancellationToken, LogicMode, ParallelScanner, ScannerConfig, SearchError,
    SearchOptions,
};
use std::fs;
use std::num::NonZeroUsize;
use tempfile::{tempdir, TempDir};

fn create_log(dir: &TempDir, content: &str) -> Result<std::path::PathBuf> {
    let path = dir.path().join("app.log");
    fs::write(&path, content)?;
    Ok(path)
}

fn scanner_config(chunk_size: u64, workers: usize) -> ScannerConfig {
    ScannerConfig {
        chunk_size,
        worker_count: NonZeroUsize::new(workers).unwrap(),
        ..ScannerConfig::default()
    }
}

#[test]
fn test_literal_search() -> Result<()> {
    let dir = tempdir()?;
    let path = create_log(&dir, "alpha\nbeta\ngamma\n")?;

    let matches = search(&SearchOptions::new(&path, "beta"), &ScannerConfig::default())?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].content, "beta");
    assert_eq!(matches[0].offset, 6);
    Ok(())
}

#[test]
fn test_every_line_reported_once_for_any_chunk_size() -> Result<()> {
    let dir = tempdir()?;
    let mut content: String = (0..60)
        .map(|i| format!("{} {}\n", "x".repeat(i % 13), i))
        .collect();
    content.push_str("tail without newline");
    let path = create_log(&dir, &content)?;

    let mut expected = Vec::new();
    let mut offset = 0u64;
    for line in content.split_inclusive('\n') {
        expected.push((offset, line.trim_end_matches('\n').to_string()));
        offset += line.len() as u64;
    }

    // Inverting a term that never occurs selects every line
    let mut options = SearchOptions::new(&path, "never-present");
    options.invert = true;

    for chunk_size in [1, 2, 3, 7, 13, 64, 100, 4096, content.len() as u64] {
        let config = ScannerConfig {
            line_numbers: true,
            ..scanner_config(chunk_size, 4)
        };
        let matches = search(&options, &config)?;
        let found: Vec<(u64, String)> = matches
            .iter()
            .map(|m| (m.offset, m.content.clone()))
            .collect();
        assert_eq!(found, expected, "chunk size {}", chunk_size);

        for (i, m) in matches.iter().enumerate() {
            assert_eq!(m.line_number, i as u64 + 1, "chunk size {}", chunk_size);
        }
    }
    Ok(())
}

#[test]
fn test_logic_modes_on_file() -> Result<()> {
    let dir = tempdir()?;
    let path = create_log(&dir, "a b\na\nb\nnone\n")?;

    let run = |logic: LogicMode, invert: bool| -> Result<Vec<String>> {
        let mut options = SearchOptions::new(&path, "a b");
        options.logic = logic;
        options.invert = invert;
        Ok(search(&options, &scanner_config(3, 4))?
            .into_iter()
            .map(|m| m.content)
            .collect())
    };

    assert_eq!(run(LogicMode::And, false)?, vec!["a b"]);
    assert_eq!(run(LogicMode::Or, false)?, vec!["a b", "a", "b"]);
    assert_eq!(run(LogicMode::And, true)?, vec!["a", "b", "none"]);
    assert_eq!(run(LogicMode::Or, true)?, vec!["none"]);
    Ok(())
}

#[test]
fn test_context_block() -> Result<()> {
    let dir = tempdir()?;
    let content: String = (1..=10).map(|i| format!("line {}\n", i)).collect();
    let path = create_log(&dir, &content)?;

    let mut options = SearchOptions::new(&path, "line 5");
    options.context = 2;

    let matches = search(&options, &ScannerConfig::default())?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].content, "line 3\nline 4\nline 5\nline 6\nline 7");
    assert_eq!(matches[0].offset, 28);
    Ok(())
}

#[test]
fn test_context_does_not_cross_chunks() -> Result<()> {
    let dir = tempdir()?;
    let content: String = (1..=10).map(|i| format!("line {}\n", i)).collect();
    let path = create_log(&dir, &content)?;
    // 28-byte chunks: lines 1-4, 5-8, 9-10
    let config = scanner_config(28, 4);

    let mut options = SearchOptions::new(&path, "line 5");
    options.context = 2;
    let matches = search(&options, &config)?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].content, "line 5\nline 6\nline 7");
    assert_eq!(matches[0].offset, 28);

    options.query = "line 8".to_string();
    let matches = search(&options, &config)?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].content, "line 6\nline 7\nline 8");
    Ok(())
}

#[test]
fn test_context_larger_than_file() -> Result<()> {
    let dir = tempdir()?;
    let path = create_log(&dir, "first\nsecond\nthird\n")?;

    let mut options = SearchOptions::new(&path, "second");
    options.context = usize::MAX;
    let matches = search(&options, &ScannerConfig::default())?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].content, "first\nsecond\nthird");
    Ok(())
}

#[test]
fn test_each_scan_keeps_its_own_metrics() -> Result<()> {
    let dir = tempdir()?;
    let path = create_log(&dir, "aaaa\nbbbb\ncccc\ndddd\n")?;
    let scanner = ParallelScanner::new(scanner_config(5, 4))?;
    let (progress_tx, _progress_rx) = unbounded();
    let (results_tx, _results_rx) = unbounded();

    scanner.scan(
        &SearchOptions::new(&path, "bbbb"),
        &CancellationToken::new(),
        &progress_tx,
        &results_tx,
    )?;
    let first = scanner.metrics();

    let token = CancellationToken::new();
    token.cancel();
    let err = scanner
        .scan(&SearchOptions::new(&path, "cccc"), &token, &progress_tx, &results_tx)
        .unwrap_err();
    assert!(err.is_cancelled());

    // The later scan did not touch the earlier scan's counters
    let stats = first.get_stats();
    assert_eq!(stats.chunks_total, 4);
    assert_eq!(stats.chunks_dispatched, 4);
    assert_eq!(stats.matches_emitted, 1);

    let latest = scanner.metrics().get_stats();
    assert_eq!(latest.chunks_total, 4);
    assert_eq!(latest.chunks_dispatched, 0);
    assert_eq!(latest.matches_emitted, 0);
    Ok(())
}

#[test]
fn test_soft_cap() -> Result<()> {
    let dir = tempdir()?;
    let content: String = (0..1000).map(|i| format!("error {:04}\n", i)).collect();
    let path = create_log(&dir, &content)?;

    let workers = 4;
    let mut options = SearchOptions::new(&path, "error");
    options.max_results = 10;

    let matches = search(&options, &scanner_config(110, workers))?;
    assert!(matches.len() >= 10, "got {}", matches.len());
    assert!(matches.len() <= 10 + workers, "got {}", matches.len());
    Ok(())
}

#[test]
fn test_invalid_regex_emits_nothing() -> Result<()> {
    let dir = tempdir()?;
    let path = create_log(&dir, "(\n")?;

    let scanner = ParallelScanner::new(ScannerConfig::default())?;
    let (progress_tx, progress_rx) = unbounded();
    let (results_tx, results_rx) = unbounded();
    let mut options = SearchOptions::new(&path, "(");
    options.is_regex = true;

    let err = scanner
        .scan(&options, &CancellationToken::new(), &progress_tx, &results_tx)
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidPattern { ref term, .. } if term == "("));

    drop((progress_tx, results_tx));
    assert_eq!(results_rx.iter().count(), 0);
    assert_eq!(progress_rx.iter().count(), 0);
    Ok(())
}

#[test]
fn test_cancel_before_dispatch() -> Result<()> {
    let dir = tempdir()?;
    let path = create_log(&dir, "x\n")?;

    let scanner = ParallelScanner::new(ScannerConfig::default())?;
    let (progress_tx, _progress_rx) = unbounded();
    let (results_tx, results_rx) = unbounded();
    let token = CancellationToken::new();
    token.cancel();

    let err = scanner
        .scan(&SearchOptions::new(&path, "x"), &token, &progress_tx, &results_tx)
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "Search cancelled");
    assert_eq!(scanner.metrics().get_stats().chunks_dispatched, 0);

    drop(results_tx);
    assert!(results_rx.iter().next().is_none());
    Ok(())
}

#[test]
fn test_long_line_only_loses_its_chunk() -> Result<()> {
    let dir = tempdir()?;
    // [0, 6) "hit 1", [6, 207) an over-long line, then more hits
    let mut content = String::from("hit 1\n");
    content.push_str(&"x".repeat(200));
    content.push('\n');
    content.push_str("hit 2\nhit 3\n");
    let path = create_log(&dir, &content)?;

    let config = ScannerConfig {
        max_line_length: 32,
        ..scanner_config(64, 4)
    };
    let scanner = ParallelScanner::new(config)?;
    let (progress_tx, _progress_rx) = unbounded();
    let (results_tx, results_rx) = unbounded();

    scanner.scan(
        &SearchOptions::new(&path, "hit"),
        &CancellationToken::new(),
        &progress_tx,
        &results_tx,
    )?;
    drop(results_tx);

    let mut found: Vec<String> = results_rx.iter().map(|m| m.content).collect();
    found.sort();
    assert_eq!(found, vec!["hit 1", "hit 2", "hit 3"]);

    let stats = scanner.metrics().get_stats();
    assert_eq!(stats.long_line_failures, 1);
    assert_eq!(stats.chunks_empty, 2);
    Ok(())
}

#[test]
fn test_missing_file() {
    let err = search(
        &SearchOptions::new("/no/such/dir/app.log", "x"),
        &ScannerConfig::default(),
    )
    .unwrap_err();
    assert!(err.is_input_error());
}
