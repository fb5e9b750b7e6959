//! Container reader - positioned byte access over a file or buffer.
//!
//! The demuxer only ever sees [`ContainerReader`]. [`ReaderStream`] turns
//! one into `Read + Seek` for parsers that want a stream.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Positioned, seekable byte source.
pub trait ContainerReader {
    /// Fill `buf` from `offset`. Short reads are errors.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// `(total, available)` byte counts.
    fn length(&mut self) -> io::Result<(u64, u64)>;
}

impl<R: ContainerReader + ?Sized> ContainerReader for Box<R> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_at(offset, buf)
    }

    fn length(&mut self) -> io::Result<(u64, u64)> {
        (**self).length()
    }
}

// ============================================================================
// File Reader
// ============================================================================

pub struct FileReader {
    file: File,
    position: u64,
}

impl FileReader {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self { file, position: 0 })
    }
}

impl ContainerReader for FileReader {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        if self.position != offset {
            self.file.seek(SeekFrom::Start(offset))?;
            self.position = offset;
        }
        match self.file.read_exact(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(())
            }
            Err(e) => {
                // Position is unknown after a failed read_exact
                self.position = u64::MAX;
                Err(e)
            }
        }
    }

    fn length(&mut self) -> io::Result<(u64, u64)> {
        let len = self.file.metadata()?.len();
        Ok((len, len))
    }
}

// ============================================================================
// Memory Reader
// ============================================================================

pub struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ContainerReader for MemoryReader {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflow"))?;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn length(&mut self) -> io::Result<(u64, u64)> {
        let len = self.data.len() as u64;
        Ok((len, len))
    }
}

// ============================================================================
// Read + Seek adapter
// ============================================================================

/// Streams a [`ContainerReader`] as `Read + Seek`.
pub struct ReaderStream<R: ContainerReader> {
    inner: R,
    position: u64,
}

impl<R: ContainerReader> ReaderStream<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }
}

impl<R: ContainerReader> Read for ReaderStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (total, _) = self.inner.length()?;
        if self.position >= total || buf.is_empty() {
            return Ok(0);
        }
        let remaining = total - self.position;
        let n = (buf.len() as u64).min(remaining) as usize;
        self.inner.read_at(self.position, &mut buf[..n])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: ContainerReader> Seek for ReaderStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let (total, _) = self.inner.length()?;
                total.checked_add_signed(delta)
            }
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;
        self.position = target;
        Ok(target)
    }
}
