//! Append-only write-once stream
//!
//! [`CaskWriter`] produces the same extent-indexed layout as [`crate::Cask`]
//! at lower cost: bytes are buffered into a full logical block, each full
//! block is transformed and appended, and the footer is written exactly once
//! at [`CaskWriter::finish`]. The substrate is truncated at construction so
//! the writer never emits into a pre-populated tail. It is neither readable
//! nor seekable.

use crate::container::{CaskOptions, ContainerCore};
use crate::error::Result;
use crate::extent::Extent;
use crate::stream::check_transformed_len;
use crate::substrate::Substrate;
use std::io::{self, Seek, SeekFrom, Write};

/// Append-only producer of an extent-indexed container.
pub struct CaskWriter<S: Substrate> {
    core: ContainerCore<S>,
    /// Block being assembled, sliced to the configured block size.
    block: Vec<u8>,
    /// Valid bytes in `block`.
    fill: usize,
}

impl<S: Substrate> CaskWriter<S> {
    /// Start a fresh container at the substrate's current position. Any
    /// existing bytes past it are discarded.
    pub fn create(substrate: S, options: CaskOptions) -> Result<Self> {
        let mut core = ContainerCore::create_truncated(substrate, options)?;
        core.substrate.seek(SeekFrom::Start(core.start))?;
        let block_size = core.block_size;
        Ok(CaskWriter {
            core,
            block: vec![0u8; block_size],
            fill: 0,
        })
    }

    /// Total logical bytes written so far.
    pub fn logical_len(&self) -> u64 {
        self.core.logical_len
    }

    /// Append bytes to the logical stream.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let block_size = self.core.block_size;
        let mut rest = buf;
        while !rest.is_empty() {
            let n = (block_size - self.fill).min(rest.len());
            self.block[self.fill..self.fill + n].copy_from_slice(&rest[..n]);
            self.fill += n;
            self.core.logical_len += n as u64;
            rest = &rest[n..];

            if self.fill == block_size {
                self.emit_block()?;
            }
        }
        Ok(buf.len())
    }

    /// Pad the current partial block with zeros up to the block boundary and
    /// emit it. The zeros become part of the logical stream.
    pub fn skip_to_next_block(&mut self) -> Result<()> {
        if self.fill == 0 {
            return Ok(());
        }
        let block_size = self.core.block_size;
        self.core.logical_len += (block_size - self.fill) as u64;
        self.block[self.fill..block_size].fill(0);
        self.fill = block_size;
        self.emit_block()
    }

    /// Flush the trailing partial block (zero-padded past the last valid
    /// byte), write the footer, and hand the substrate back. `durable`
    /// additionally asks the substrate to reach durable storage.
    pub fn finish(mut self, durable: bool) -> Result<S> {
        if self.fill > 0 {
            let block_size = self.core.block_size;
            self.block[self.fill..block_size].fill(0);
            self.fill = block_size;
            self.emit_block()?;
        }
        self.core.write_footer()?;
        self.core.substrate.flush()?;
        if durable {
            self.core.substrate.sync()?;
        }
        Ok(self.core.substrate)
    }

    fn emit_block(&mut self) -> Result<()> {
        let offset = self.core.extents.next_offset(self.core.start);
        let transformed = self.core.transformer.transform(&self.block)?;
        check_transformed_len(transformed.len())?;

        self.core.substrate.write_all(&transformed)?;
        self.core
            .extents
            .push(Extent::new(offset, transformed.len() as i16));
        self.fill = 0;
        Ok(())
    }
}

impl<S: Substrate> Write for CaskWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        CaskWriter::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.core.substrate.flush()
    }
}
