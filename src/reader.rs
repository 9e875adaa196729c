//! Read-only container and cursors
//!
//! [`CaskReader`] decodes the footer once and exposes positioned cursors
//! over the logical stream. Every cursor owns its block buffer and position
//! and shares the immutable extent map.
//!
//! When the substrate is a regular file the reader memory-maps it and
//! cursors read the mapping directly, with no locking between them. Over a
//! generic substrate the fallback serializes seek + read under a mutex.

use crate::cache::BlockCache;
use crate::container::{validate_block_size, CaskOptions};
use crate::error::{CaskError, Result};
use crate::extent::{read_footer_slice, read_footer_stream, ExtentMap};
use crate::substrate::read_full;
use crate::transform::BlockTransformer;
use crate::MAX_EXTENT_LEN;
use memmap2::Mmap;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

enum Backing<S> {
    /// Seek + read, serialized across cursors.
    Stream(Mutex<S>),
    /// Read-only memory mapping of the whole substrate.
    Mapped(Mmap),
}

struct ReaderShared<S> {
    backing: Backing<S>,
    extents: ExtentMap,
    transformer: Arc<dyn BlockTransformer>,
    block_size: usize,
    logical_len: u64,
    cache: Option<Arc<dyn BlockCache>>,
}

impl<S: Read + Seek> ReaderShared<S> {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        match &self.backing {
            Backing::Stream(stream) => {
                let mut stream = stream.lock();
                stream.seek(SeekFrom::Start(offset))?;
                let got = read_full(&mut *stream, buf)?;
                if got < buf.len() {
                    return Err(CaskError::TruncatedRead {
                        wanted: buf.len(),
                        got,
                    });
                }
                Ok(())
            }
            Backing::Mapped(map) => {
                let start = offset as usize;
                let end = start + buf.len();
                if end > map.len() {
                    return Err(CaskError::TruncatedRead {
                        wanted: buf.len(),
                        got: map.len().saturating_sub(start),
                    });
                }
                buf.copy_from_slice(&map[start..end]);
                Ok(())
            }
        }
    }
}

/// Read-only view of an extent-indexed container.
///
/// The reader itself behaves as its default cursor; [`CaskReader::cursor`]
/// creates additional independent ones.
pub struct CaskReader<S> {
    shared: Arc<ReaderShared<S>>,
    default_cursor: CaskCursor<S>,
}

impl<S: Read + Seek> CaskReader<S> {
    /// Open a read-only container at the substrate's current position using
    /// the seek + read path.
    pub fn new(mut substrate: S, options: CaskOptions) -> Result<Self> {
        validate_block_size(options.block_size)?;
        let start = substrate.stream_position()?;
        let end = substrate.seek(SeekFrom::End(0))?;
        let footer = read_footer_stream(&mut substrate, start, end)?;
        if footer.skipped > 0 {
            tracing::warn!(
                skipped = footer.skipped,
                "discarded half-committed append records from footer"
            );
        }

        Self::from_parts(Backing::Stream(Mutex::new(substrate)), footer.map, footer.logical_len, options)
    }

    fn from_parts(
        backing: Backing<S>,
        extents: ExtentMap,
        logical_len: u64,
        options: CaskOptions,
    ) -> Result<Self> {
        let shared = Arc::new(ReaderShared {
            backing,
            extents,
            transformer: options.transformer,
            block_size: options.block_size,
            logical_len,
            cache: options.cache,
        });
        let default_cursor = CaskCursor::new(shared.clone());
        Ok(CaskReader {
            shared,
            default_cursor,
        })
    }

    /// Logical stream length in bytes.
    pub fn logical_len(&self) -> u64 {
        self.shared.logical_len
    }

    /// Number of logical blocks stored.
    pub fn block_count(&self) -> usize {
        self.shared.extents.len()
    }

    /// Create an independent cursor positioned at zero.
    pub fn cursor(&self) -> CaskCursor<S> {
        CaskCursor::new(self.shared.clone())
    }

    /// Read from the default cursor.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.default_cursor.read(buf)
    }

    /// Seek the default cursor.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.default_cursor.seek(pos)
    }
}

impl CaskReader<File> {
    /// Open a read-only container over a regular file via a shared
    /// memory mapping, starting at the file's current position.
    ///
    /// Cursors over a mapped reader may run concurrently without locking.
    pub fn open_mapped(mut file: File, options: CaskOptions) -> Result<Self> {
        validate_block_size(options.block_size)?;
        let start = file.stream_position()?;
        if file.metadata()?.len() == 0 {
            // An empty file cannot be mapped; the stream path handles it.
            return Self::new(file, options);
        }
        // Safety: the mapping is read-only; mutation of the underlying file
        // while mapped is outside the single-writer contract.
        let map = unsafe { Mmap::map(&file)? };
        let footer = read_footer_slice(&map, start)?;
        if footer.skipped > 0 {
            tracing::warn!(
                skipped = footer.skipped,
                "discarded half-committed append records from footer"
            );
        }
        tracing::debug!(bytes = map.len(), "container memory-mapped");

        Self::from_parts(Backing::Mapped(map), footer.map, footer.logical_len, options)
    }
}

/// Positioned reader sharing a [`CaskReader`]'s extent map.
pub struct CaskCursor<S> {
    shared: Arc<ReaderShared<S>>,
    block: Vec<u8>,
    scratch: Vec<u8>,
    /// Buffered block index, or -1 when nothing is buffered.
    idx: i64,
    position: u64,
}

impl<S: Read + Seek> CaskCursor<S> {
    fn new(shared: Arc<ReaderShared<S>>) -> Self {
        CaskCursor {
            shared,
            block: vec![0u8; MAX_EXTENT_LEN],
            scratch: vec![0u8; MAX_EXTENT_LEN],
            idx: -1,
            position: 0,
        }
    }

    /// Current logical position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read up to `buf.len()` bytes from the current position. Reads at or
    /// past the logical length return zero.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let block_size = self.shared.block_size as u64;
        let mut done = 0;
        while done < buf.len() && self.position < self.shared.logical_len {
            let block = self.position / block_size;
            let offset = (self.position % block_size) as usize;
            if !self.fill(block)? {
                break;
            }

            let want = (buf.len() - done) as u64;
            let n = (self.shared.logical_len - self.position)
                .min(block_size - offset as u64)
                .min(want) as usize;
            buf[done..done + n].copy_from_slice(&self.block[offset..offset + n]);
            done += n;
            self.position += n as u64;
        }
        Ok(done)
    }

    /// Reposition the cursor on the logical stream.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.shared.logical_len as i128 + delta as i128,
        };
        if target < 0 {
            return Err(CaskError::OutOfRange(format!(
                "seek to negative position {target}"
            )));
        }
        self.position = target as u64;
        Ok(self.position)
    }

    fn fill(&mut self, block: u64) -> Result<bool> {
        if self.idx == block as i64 {
            return Ok(true);
        }

        let extent = match self.shared.extents.get(block) {
            Some(extent) => extent,
            None => return Ok(false),
        };
        let block_size = self.shared.block_size;

        if extent.length == 0 {
            if !self.shared.transformer.may_change_size() {
                return Err(CaskError::Corruption(format!(
                    "placeholder extent for block {block} under a size-preserving transformer"
                )));
            }
            self.block[..block_size].fill(0);
        } else {
            let cached = match &self.shared.cache {
                Some(cache) => cache.try_read(block, &mut self.block[..block_size]),
                None => false,
            };
            if !cached {
                let length = extent.length as usize;
                self.shared
                    .read_exact_at(extent.offset as u64, &mut self.scratch[..length])?;
                let decoded = self
                    .shared
                    .transformer
                    .untransform(&self.scratch[..length], &mut self.block)?;
                if decoded != block_size {
                    return Err(CaskError::Corruption(format!(
                        "block {block} decoded to {decoded} bytes, expected {block_size}"
                    )));
                }
                if let Some(cache) = &self.shared.cache {
                    cache.store(block, &self.block[..block_size]);
                }
            }
        }

        self.idx = block as i64;
        Ok(true)
    }
}

impl<S: Read + Seek> Read for CaskReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        CaskReader::read(self, buf).map_err(Into::into)
    }
}

impl<S: Read + Seek> Seek for CaskReader<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        CaskReader::seek(self, pos).map_err(Into::into)
    }
}

impl<S: Read + Seek> Read for CaskCursor<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        CaskCursor::read(self, buf).map_err(Into::into)
    }
}

impl<S: Read + Seek> Seek for CaskCursor<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        CaskCursor::seek(self, pos).map_err(Into::into)
    }
}
