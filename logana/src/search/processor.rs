use crossbeam_channel::Sender;
use memchr::memchr;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

use super::matcher::QueryMatcher;
use super::source::{ReadAt, SourceReader};
use crate::errors::ChunkError;
use crate::metrics::ScanMetrics;
use crate::results::Match;

const BUFFER_CAPACITY: usize = 65536;
const REALIGN_PROBE: usize = 4096;

/// Raw byte range `[start, end)` of the file assigned to one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Splits `file_size` bytes into consecutive chunks of `chunk_size` bytes;
/// the last chunk holds whatever remains.
pub fn partition(file_size: u64, chunk_size: u64) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let count = file_size.div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            Chunk {
                index: i as usize,
                start,
                end: (start + chunk_size).min(file_size),
            }
        })
        .collect()
}

/// How one chunk task ended
#[derive(Debug)]
pub enum ChunkOutcome {
    /// Every line starting in the chunk was scanned
    Completed,
    /// No line starts inside the chunk
    Empty,
    /// The shared result cap was reached; an open block was dropped
    CapReached,
    /// The match sink was closed by its consumer
    Disconnected,
    /// Scanning stopped early; matches already emitted stand
    Failed(ChunkError),
}

/// Per-scan settings every chunk task shares
#[derive(Debug, Clone, Copy)]
pub struct ChunkSettings {
    /// Context lines before and after each match
    pub context: usize,
    /// Soft cap on matches emitted across all chunks
    pub cap: usize,
    /// Longest line accepted, excluding the terminator
    pub max_line_length: usize,
}

/// Scans chunks of a file and streams match blocks into the result sink.
///
/// One processor is built per scan and shared by reference across the
/// chunk tasks; each call to [`process`](Self::process) owns its own line
/// and context state.
pub struct ChunkProcessor<'a> {
    matcher: &'a QueryMatcher,
    settings: ChunkSettings,
    emitted: &'a AtomicUsize,
    results: &'a Sender<Match>,
    metrics: &'a ScanMetrics,
}

impl<'a> ChunkProcessor<'a> {
    pub fn new(
        matcher: &'a QueryMatcher,
        settings: ChunkSettings,
        emitted: &'a AtomicUsize,
        results: &'a Sender<Match>,
        metrics: &'a ScanMetrics,
    ) -> Self {
        Self {
            matcher,
            settings,
            emitted,
            results,
            metrics,
        }
    }

    fn cap_reached(&self) -> bool {
        self.emitted.load(Ordering::Relaxed) >= self.settings.cap
    }

    /// Hands a block to the sink, blocking while the sink is full
    fn emit(&self, block: Match) -> bool {
        if self.results.send(block).is_err() {
            return false;
        }
        self.emitted.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_match();
        true
    }

    /// Scans every line that starts inside `chunk`.
    ///
    /// `line_base` is the number of newlines before `chunk.start`; when it is
    /// known, emitted matches carry real line numbers.
    pub fn process<R: ReadAt + ?Sized>(
        &self,
        source: &R,
        chunk: &Chunk,
        line_base: Option<u64>,
    ) -> ChunkOutcome {
        let start = match realign_start(source, chunk) {
            Ok(Some(start)) => start,
            Ok(None) => {
                trace!("Chunk {} holds no line start", chunk.index);
                return ChunkOutcome::Empty;
            }
            Err(e) => return ChunkOutcome::Failed(ChunkError::io(chunk.start, e)),
        };

        // The skipped prefix ends with exactly one newline
        let first_line = line_base.map(|base| base + u64::from(start > chunk.start) + 1);

        let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, SourceReader::new(source, start));
        let mut assembler = ContextAssembler::new(self.settings.context);
        let mut buf = Vec::new();
        let mut offset = start;
        let mut lines = 0u64;

        let outcome = loop {
            if offset >= chunk.end {
                break ChunkOutcome::Completed;
            }
            if self.cap_reached() {
                self.metrics.record_scanned(offset - start, lines);
                return ChunkOutcome::CapReached;
            }

            buf.clear();
            let consumed = match read_line(&mut reader, &mut buf, self.settings.max_line_length) {
                Ok(0) => break ChunkOutcome::Completed,
                Ok(n) => n,
                Err(LineError::Io(e)) => break ChunkOutcome::Failed(ChunkError::io(offset, e)),
                Err(LineError::TooLong) => {
                    break ChunkOutcome::Failed(ChunkError::LineTooLong {
                        offset,
                        limit: self.settings.max_line_length,
                    })
                }
            };

            let line = trim_line_ending(&buf);
            let line_number = first_line.map_or(0, |first| first + lines);
            let matched = self.matcher.is_match(line);
            if let Some(block) = assembler.push_line(line, matched, offset, line_number) {
                if !self.emit(block) {
                    return ChunkOutcome::Disconnected;
                }
            }

            offset += consumed as u64;
            lines += 1;
        };

        self.metrics.record_scanned(offset - start, lines);

        if let Some(block) = assembler.finish() {
            if !self.cap_reached() && !self.emit(block) {
                return ChunkOutcome::Disconnected;
            }
        }
        outcome
    }
}

/// Moves a chunk's start past the line that straddles its raw start.
///
/// Returns `None` when no line starts inside the chunk: the line running
/// through it belongs to the chunk where that line begins.
pub(crate) fn realign_start<R: ReadAt + ?Sized>(
    source: &R,
    chunk: &Chunk,
) -> io::Result<Option<u64>> {
    if chunk.start == 0 {
        return Ok(Some(0));
    }

    let mut prev = [0u8; 1];
    if source.read_at(&mut prev, chunk.start - 1)? == 0 {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
    }
    if prev[0] == b'\n' {
        return Ok(Some(chunk.start));
    }

    let mut probe = [0u8; REALIGN_PROBE];
    let mut pos = chunk.start;
    while pos < chunk.end {
        let n = source.read_at(&mut probe, pos)?;
        if n == 0 {
            return Ok(None);
        }
        if let Some(i) = memchr(b'\n', &probe[..n]) {
            let start = pos + i as u64 + 1;
            return Ok((start < chunk.end).then_some(start));
        }
        pos += n as u64;
    }
    Ok(None)
}

enum LineError {
    Io(io::Error),
    TooLong,
}

/// Appends the next line, terminator included, to `buf`.
///
/// Returns the number of bytes consumed, 0 at end of data.
fn read_line<B: BufRead>(reader: &mut B, buf: &mut Vec<u8>, limit: usize) -> Result<usize, LineError> {
    let mut consumed = 0;
    loop {
        let available = match reader.fill_buf() {
            Ok(available) => available,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(LineError::Io(e)),
        };
        if available.is_empty() {
            return Ok(consumed);
        }

        let (done, used) = match memchr(b'\n', available) {
            Some(i) => (true, i + 1),
            None => (false, available.len()),
        };
        buf.extend_from_slice(&available[..used]);
        reader.consume(used);
        consumed += used;

        let content_len = buf.len() - usize::from(done);
        if content_len > limit {
            return Err(LineError::TooLong);
        }
        if done {
            return Ok(consumed);
        }
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// A match block still collecting after-context
struct OpenBlock {
    content: String,
    offset: u64,
    line_number: u64,
    remaining: usize,
}

impl OpenBlock {
    fn finish(self) -> Match {
        Match {
            line_number: self.line_number,
            content: self.content,
            offset: self.offset,
        }
    }
}

/// Builds context blocks from a chunk's lines in file order.
///
/// Idle: non-matching lines feed a window of the last `context` lines.
/// Collecting: non-matching lines are appended until the after-context
/// quota runs out. A match while collecting cuts the open block short;
/// overlapping windows are never merged.
struct ContextAssembler {
    context: usize,
    before: VecDeque<String>,
    open: Option<OpenBlock>,
}

impl ContextAssembler {
    fn new(context: usize) -> Self {
        Self {
            context,
            // Grows with the lines seen; `context` may be far larger than the chunk
            before: VecDeque::new(),
            open: None,
        }
    }

    /// Feeds one line; returns a block once it is complete
    fn push_line(&mut self, line: &[u8], matched: bool, offset: u64, line_number: u64) -> Option<Match> {
        if matched {
            let flushed = self.open.take().map(OpenBlock::finish);

            let mut content = String::new();
            for before in self.before.drain(..) {
                content.push_str(&before);
                content.push('\n');
            }
            content.push_str(&String::from_utf8_lossy(line));

            let block = OpenBlock {
                content,
                offset,
                line_number,
                remaining: self.context,
            };
            if self.context == 0 {
                debug_assert!(flushed.is_none());
                return Some(block.finish());
            }
            self.open = Some(block);
            return flushed;
        }

        if let Some(block) = self.open.as_mut() {
            block.content.push('\n');
            block.content.push_str(&String::from_utf8_lossy(line));
            block.remaining -= 1;
            if block.remaining == 0 {
                return self.open.take().map(OpenBlock::finish);
            }
            return None;
        }

        if self.context > 0 {
            if self.before.len() == self.context {
                self.before.pop_front();
            }
            self.before.push_back(String::from_utf8_lossy(line).into_owned());
        }
        None
    }

    /// Closes the open block at the end of the chunk, after-context as is
    fn finish(&mut self) -> Option<Match> {
        self.open.take().map(OpenBlock::finish)
    }
}
