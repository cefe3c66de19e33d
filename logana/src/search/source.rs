//! Positioned reads over the scanned file.
//!
//! Every chunk task reads the same file concurrently. Nothing here keeps a
//! shared cursor: each read names its own offset, so tasks never contend on
//! seek state.
use memchr::memchr_iter;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Read};

/// Random-access reads that are safe to issue from many threads at once
pub trait ReadAt: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`; 0 means end of data
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl ReadAt for File {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

impl ReadAt for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = usize::try_from(offset).map_or(self.len(), |o| o.min(self.len()));
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

impl ReadAt for Mmap {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self[..].read_at(buf, offset)
    }
}

/// The file a scan runs over, read either through the handle or a mapping
#[derive(Debug)]
pub enum ScanSource {
    File(File),
    Mapped(Mmap),
}

impl ScanSource {
    /// Maps the file when asked to and when there is something to map
    pub fn open(file: File, file_size: u64, use_mmap: bool) -> io::Result<Self> {
        if use_mmap && file_size > 0 {
            // SAFETY: files that change during a scan are unsupported; the
            // mapping is only ever read.
            let mmap = unsafe { Mmap::map(&file)? };
            Ok(Self::Mapped(mmap))
        } else {
            Ok(Self::File(file))
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}

impl ReadAt for ScanSource {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        match self {
            Self::File(file) => file.read_at(buf, offset),
            Self::Mapped(mmap) => mmap.read_at(buf, offset),
        }
    }
}

/// Sequential [`Read`] adapter starting at a fixed offset of a [`ReadAt`]
pub struct SourceReader<'a, R: ReadAt + ?Sized> {
    source: &'a R,
    pos: u64,
}

impl<'a, R: ReadAt + ?Sized> SourceReader<'a, R> {
    pub fn new(source: &'a R, pos: u64) -> Self {
        Self { source, pos }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl<R: ReadAt + ?Sized> Read for SourceReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.source.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// Counts `\n` bytes in `[start, end)`
pub fn count_newlines<R: ReadAt + ?Sized>(source: &R, start: u64, end: u64) -> io::Result<u64> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut pos = start;
    let mut count = 0u64;
    while pos < end {
        let want = buf.len().min(usize::try_from(end - pos).unwrap_or(usize::MAX));
        let n = source.read_at(&mut buf[..want], pos)?;
        if n == 0 {
            break;
        }
        count += memchr_iter(b'\n', &buf[..n]).count() as u64;
        pos += n as u64;
    }
    Ok(count)
}
