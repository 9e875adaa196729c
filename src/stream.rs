//! Random-access read/write stream
//!
//! [`Cask`] exposes the logical byte stream over an extent-indexed
//! container. It keeps exactly one logical block in memory; switching blocks
//! flushes the dirty one first. Appending a block is crash-safe via a
//! two-phase footer write: a tombstone record reserves the slot, the payload
//! is written into the reserved hole, then the footer is rewritten with the
//! real extent. A reader that observes the intermediate state skips the
//! tombstone and sees the container as it was before the append.
//!
//! Size-changing transformers impose an asymmetric rule on random writes:
//! any write starting below the current logical length is rejected, because
//! a re-transformed block could outgrow its extent slot and corrupt every
//! extent after it. Size-preserving transformers permit in-place overwrite
//! anywhere.

use crate::container::{CaskOptions, ContainerCore};
use crate::error::{CaskError, Result};
use crate::extent::Extent;
use crate::substrate::Substrate;
use crate::MAX_EXTENT_LEN;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// No block is buffered.
const IDX_NONE: i64 = -2;
/// The buffer holds a fresh block being appended.
const IDX_FRESH: i64 = -1;

/// Random-access read/write stream over an extent-indexed container.
pub struct Cask<S: Substrate> {
    core: ContainerCore<S>,
    /// The single logical block buffer, sliced to the configured block size.
    block: Vec<u8>,
    /// Reusable buffer for transformed bytes.
    scratch: Vec<u8>,
    /// Buffered block index, or one of `IDX_NONE` / `IDX_FRESH`.
    idx: i64,
    dirty: bool,
    position: u64,
}

impl<S: Substrate> Cask<S> {
    /// Open a container at the substrate's current position. An empty
    /// substrate region becomes a fresh empty container.
    pub fn open(substrate: S, options: CaskOptions) -> Result<Self> {
        let core = ContainerCore::open(substrate, options)?;
        Ok(Cask {
            block: vec![0u8; MAX_EXTENT_LEN],
            scratch: vec![0u8; MAX_EXTENT_LEN],
            core,
            idx: IDX_NONE,
            dirty: false,
            position: 0,
        })
    }

    /// Current logical stream length in bytes.
    pub fn logical_len(&self) -> u64 {
        self.core.logical_len
    }

    /// Number of logical blocks currently stored.
    pub fn block_count(&self) -> usize {
        self.core.extents.len()
    }

    /// Current logical position.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn block_size(&self) -> u64 {
        self.core.block_size as u64
    }

    /// Read up to `buf.len()` bytes from the current position.
    ///
    /// Returns a short count at end of stream; a read starting at or past
    /// the logical length returns zero.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let block_size = self.block_size();
        let mut done = 0;
        while done < buf.len() && self.position < self.core.logical_len {
            let block = self.position / block_size;
            let offset = (self.position % block_size) as usize;
            if !self.fill(block)? {
                break;
            }

            let want = (buf.len() - done) as u64;
            let n = (self.core.logical_len - self.position)
                .min(block_size - offset as u64)
                .min(want) as usize;
            buf[done..done + n].copy_from_slice(&self.block[offset..offset + n]);
            done += n;
            self.position += n as u64;
        }
        Ok(done)
    }

    /// Write all of `buf` at the current position, extending the stream as
    /// needed. Under a size-changing transformer, writes starting below the
    /// current logical length are rejected.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.core.transformer.may_change_size() && self.position < self.core.logical_len {
            return Err(CaskError::IllegalWrite(format!(
                "position {} is below the logical length {} and the transformer may change block sizes",
                self.position, self.core.logical_len
            )));
        }

        let block_size = self.block_size();
        let mut rest = buf;
        while !rest.is_empty() {
            let block = self.position / block_size;
            let offset = (self.position % block_size) as usize;

            if block < self.core.extents.len() as u64 {
                self.fill(block)?;
                let n = ((block_size as usize) - offset).min(rest.len());
                self.block[offset..offset + n].copy_from_slice(&rest[..n]);
                self.dirty = true;
                if let Some(cache) = &self.core.cache {
                    cache.invalidate(block);
                }
                self.position += n as u64;
                self.core.logical_len = self.core.logical_len.max(self.position);
                rest = &rest[n..];
            } else if self.position > self.core.logical_len {
                // Writing past the end: zero-fill the gap first.
                let target = self.position;
                self.zero_extend(target)?;
            } else {
                // position == logical_len on a block boundary: append.
                self.flush_block()?;
                self.idx = IDX_FRESH;
                let block_size = block_size as usize;
                self.block[..block_size].fill(0);
                let n = block_size.min(rest.len());
                self.block[..n].copy_from_slice(&rest[..n]);
                self.dirty = true;
                self.position += n as u64;
                self.core.logical_len = self.core.logical_len.max(self.position);
                self.flush_block()?;
                rest = &rest[n..];
            }
        }
        Ok(buf.len())
    }

    /// Reposition the logical stream. Positions beyond the logical length
    /// are legal: reads there return zero, writes extend the stream.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.core.logical_len as i128 + delta as i128,
        };
        if target < 0 {
            return Err(CaskError::OutOfRange(format!(
                "seek to negative position {target}"
            )));
        }
        self.position = target as u64;
        Ok(self.position)
    }

    /// Grow or shrink the logical stream to exactly `len` bytes.
    pub fn set_len(&mut self, len: u64) -> Result<()> {
        let block_size = self.block_size();
        if len == self.core.logical_len {
            return Ok(());
        }

        if len == 0 {
            self.discard_buffer();
            let old_blocks = self.core.extents.len();
            if let Some(cache) = &self.core.cache {
                for index in 0..old_blocks {
                    cache.invalidate(index as u64);
                }
            }
            self.core.extents.clear();
            self.core.logical_len = 0;
            self.position = 0;
            self.core.write_footer()?;
            return Ok(());
        }

        if len > self.core.logical_len {
            return self.zero_extend(len);
        }

        // Shrink: drop whole blocks past the new end.
        let keep = len.div_ceil(block_size) as usize;
        if self.idx >= keep as i64 {
            self.discard_buffer();
        }
        if let Some(cache) = &self.core.cache {
            for index in keep..self.core.extents.len() {
                cache.invalidate(index as u64);
            }
        }
        self.core.extents.truncate(keep);
        self.core.logical_len = len;
        if self.position > len {
            self.position = len;
        }
        tracing::debug!(logical_len = len, blocks = keep, "stream truncated");
        self.core.write_footer()
    }

    /// Flush the dirty block and the substrate. `durable` additionally asks
    /// the substrate to reach durable storage.
    pub fn flush(&mut self, durable: bool) -> Result<()> {
        self.flush_block()?;
        if self.core.footer_len_on_disk != self.core.logical_len {
            self.core.write_length_trailer()?;
        }
        self.core.substrate.flush()?;
        if durable {
            self.core.substrate.sync()?;
        }
        Ok(())
    }

    /// Flush everything and drop the stream.
    pub fn close(mut self) -> Result<()> {
        self.flush(false)
    }

    /// Flush everything and hand the substrate back.
    pub fn into_inner(mut self) -> Result<S> {
        self.flush(false)?;
        Ok(self.core.substrate)
    }

    /// Append zeros until the logical length reaches `target`, preserving
    /// the caller's position.
    fn zero_extend(&mut self, target: u64) -> Result<()> {
        let saved = self.position;
        self.position = self.core.logical_len;
        let zeros = vec![0u8; self.core.block_size];
        while self.core.logical_len < target {
            let n = (target - self.core.logical_len).min(zeros.len() as u64) as usize;
            self.write(&zeros[..n])?;
        }
        self.position = saved;
        Ok(())
    }

    /// Make `block` the buffered block, flushing any dirty one first.
    /// Returns `false` when the block does not exist in the extent map.
    fn fill(&mut self, block: u64) -> Result<bool> {
        if self.idx == block as i64 {
            return Ok(true);
        }
        self.flush_block()?;

        let extent = match self.core.extents.get(block) {
            Some(extent) => extent,
            None => return Ok(false),
        };
        let block_size = self.core.block_size;

        if extent.length == 0 {
            // Placeholder: a zero-filled block never written out.
            if !self.core.transformer.may_change_size() {
                return Err(CaskError::Corruption(format!(
                    "placeholder extent for block {block} under a size-preserving transformer"
                )));
            }
            self.block[..block_size].fill(0);
        } else {
            let cached = match &self.core.cache {
                Some(cache) => cache.try_read(block, &mut self.block[..block_size]),
                None => false,
            };
            if !cached {
                let length = extent.length as usize;
                self.core
                    .read_exact_at(extent.offset as u64, &mut self.scratch[..length])?;
                let decoded = self
                    .core
                    .transformer
                    .untransform(&self.scratch[..length], &mut self.block)?;
                if decoded != block_size {
                    return Err(CaskError::Corruption(format!(
                        "block {block} decoded to {decoded} bytes, expected {block_size}"
                    )));
                }
                if let Some(cache) = &self.core.cache {
                    cache.store(block, &self.block[..block_size]);
                }
            }
        }

        self.idx = block as i64;
        Ok(true)
    }

    /// Write the buffered block out if it is dirty, then release the buffer.
    fn flush_block(&mut self) -> Result<()> {
        if !self.dirty {
            self.idx = IDX_NONE;
            return Ok(());
        }

        if self.idx >= 0 {
            self.flush_existing_block()?;
        } else {
            self.flush_fresh_block()?;
        }

        self.discard_buffer();
        self.core.substrate.flush()?;
        Ok(())
    }

    fn flush_existing_block(&mut self) -> Result<()> {
        let block = self.idx as u64;
        let block_size = self.core.block_size;
        let extent = self
            .core
            .extents
            .get(block)
            .ok_or_else(|| CaskError::Corruption(format!("no extent for block {block}")))?;
        let is_last = block as usize == self.core.extents.len() - 1;

        let transformed = self.core.transformer.transform(&self.block[..block_size])?;
        check_transformed_len(transformed.len())?;
        if transformed.len() > extent.length as usize && !is_last {
            return Err(CaskError::IllegalWrite(format!(
                "block {block} re-transformed to {} bytes, exceeding its {} byte slot",
                transformed.len(),
                extent.length
            )));
        }

        self.core.substrate.seek(SeekFrom::Start(extent.offset as u64))?;
        self.core.substrate.write_all(&transformed)?;
        self.core
            .extents
            .set(block, Extent::new(extent.offset, transformed.len() as i16));

        if transformed.len() != extent.length as usize {
            if is_last {
                // The footer body moved with the tail extent.
                self.core.write_footer()?;
            } else {
                // Unreachable when the size-change precondition held.
                return Err(CaskError::IllegalWrite(format!(
                    "non-tail block {block} changed transformed size"
                )));
            }
        } else if self.core.footer_len_on_disk != self.core.logical_len {
            self.core.write_length_trailer()?;
        }
        Ok(())
    }

    fn flush_fresh_block(&mut self) -> Result<()> {
        let block_size = self.core.block_size;
        let new_index = self.core.extents.len() as u64;
        let offset = self.core.extents.next_offset(self.core.start);

        let transformed = self.core.transformer.transform(&self.block[..block_size])?;
        check_transformed_len(transformed.len())?;

        // Two-phase append: the tombstone reserves the payload slot and is
        // the marker recovery uses to discard this append if we die between
        // the footer writes.
        self.core
            .extents
            .push(Extent::tombstone(transformed.len() as i16));
        self.core.write_footer()?;

        self.core.substrate.seek(SeekFrom::Start(offset as u64))?;
        self.core.substrate.write_all(&transformed)?;

        self.core
            .extents
            .set(new_index, Extent::new(offset, transformed.len() as i16));
        self.core.write_footer()?;
        Ok(())
    }

    fn discard_buffer(&mut self) {
        self.idx = IDX_NONE;
        self.dirty = false;
    }
}

pub(crate) fn check_transformed_len(len: usize) -> Result<()> {
    if len > MAX_EXTENT_LEN {
        return Err(CaskError::OutOfRange(format!(
            "transformed block is {len} bytes, limit {MAX_EXTENT_LEN}"
        )));
    }
    Ok(())
}

impl<S: Substrate> Read for Cask<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Cask::read(self, buf).map_err(Into::into)
    }
}

impl<S: Substrate> Write for Cask<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Cask::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Cask::flush(self, false).map_err(Into::into)
    }
}

impl<S: Substrate> Seek for Cask<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Cask::seek(self, pos).map_err(Into::into)
    }
}
