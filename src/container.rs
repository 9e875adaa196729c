//! Shared container lifecycle
//!
//! [`ContainerCore`] owns what every extent-indexed mode has in common: the
//! substrate, the transformer, the validated block size, the base offset
//! captured at construction (containers nest inside larger streams), the
//! in-memory extent map, and footer persistence.

use crate::cache::BlockCache;
use crate::error::{CaskError, Result};
use crate::extent::{read_footer_stream, ExtentMap};
use crate::substrate::{read_full, Substrate};
use crate::transform::{BlockTransformer, IdentityTransformer};
use crate::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

/// Construction options shared by every container mode.
///
/// Defaults: 16 KiB blocks, identity transformer, no cache.
pub struct CaskOptions {
    pub(crate) block_size: usize,
    pub(crate) transformer: Arc<dyn BlockTransformer>,
    pub(crate) cache: Option<Arc<dyn BlockCache>>,
}

impl Default for CaskOptions {
    fn default() -> Self {
        CaskOptions {
            block_size: DEFAULT_BLOCK_SIZE,
            transformer: Arc::new(IdentityTransformer),
            cache: None,
        }
    }
}

impl CaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical block size in bytes. Must lie within
    /// [`MIN_BLOCK_SIZE`]`..=`[`MAX_BLOCK_SIZE`] and match the value the
    /// container was written with (it is not recorded on disk).
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Transformer pipeline applied to every block.
    pub fn transformer<T: BlockTransformer + 'static>(mut self, transformer: T) -> Self {
        self.transformer = Arc::new(transformer);
        self
    }

    /// Share an already-constructed transformer between containers.
    pub fn shared_transformer(mut self, transformer: Arc<dyn BlockTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    /// Optional read-through block cache.
    pub fn cache(mut self, cache: Arc<dyn BlockCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

pub(crate) fn validate_block_size(block_size: usize) -> Result<()> {
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(CaskError::OutOfRange(format!(
            "block size {block_size} outside {MIN_BLOCK_SIZE}..={MAX_BLOCK_SIZE}"
        )));
    }
    Ok(())
}

/// State shared by the writable extent-indexed modes.
pub(crate) struct ContainerCore<S> {
    pub substrate: S,
    pub transformer: Arc<dyn BlockTransformer>,
    pub block_size: usize,
    /// Base offset of the container within the substrate.
    pub start: u64,
    pub extents: ExtentMap,
    pub logical_len: u64,
    /// Logical length currently recorded in the on-disk trailer.
    pub footer_len_on_disk: u64,
    pub cache: Option<Arc<dyn BlockCache>>,
}

impl<S: Substrate> ContainerCore<S> {
    /// Open a writable container at the substrate's current position.
    ///
    /// An empty substrate region gets a fresh empty footer; otherwise the
    /// existing footer is read, discarding tombstone records left by a
    /// half-committed append.
    pub fn open(mut substrate: S, options: CaskOptions) -> Result<Self> {
        validate_block_size(options.block_size)?;
        let start = substrate.stream_position()?;
        let end = substrate.stream_len()?;

        let mut core = ContainerCore {
            substrate,
            transformer: options.transformer,
            block_size: options.block_size,
            start,
            extents: ExtentMap::new(),
            logical_len: 0,
            footer_len_on_disk: 0,
            cache: options.cache,
        };

        if end <= start {
            core.write_footer()?;
        } else {
            let footer = read_footer_stream(&mut core.substrate, start, end)?;
            if footer.skipped > 0 {
                tracing::warn!(
                    skipped = footer.skipped,
                    "discarded half-committed append records from footer"
                );
            }
            core.extents = footer.map;
            core.logical_len = footer.logical_len;
            core.footer_len_on_disk = footer.logical_len;
            core.check_length_invariant()?;
        }
        Ok(core)
    }

    /// Start a fresh container at the substrate's current position,
    /// discarding anything after it.
    pub fn create_truncated(mut substrate: S, options: CaskOptions) -> Result<Self> {
        validate_block_size(options.block_size)?;
        let start = substrate.stream_position()?;
        substrate.truncate(start)?;

        Ok(ContainerCore {
            substrate,
            transformer: options.transformer,
            block_size: options.block_size,
            start,
            extents: ExtentMap::new(),
            logical_len: 0,
            footer_len_on_disk: 0,
            cache: options.cache,
        })
    }

    fn check_length_invariant(&self) -> Result<()> {
        let blocks = self.extents.len() as u64;
        let block_size = self.block_size as u64;
        let consistent = if blocks == 0 {
            self.logical_len == 0
        } else {
            self.logical_len > (blocks - 1) * block_size
                && self.logical_len <= blocks * block_size
        };
        if !consistent {
            return Err(CaskError::Corruption(format!(
                "logical length {} inconsistent with {} blocks of {} bytes",
                self.logical_len, blocks, self.block_size
            )));
        }
        Ok(())
    }

    /// Serialize the extent map after the last payload byte, then cut the
    /// substrate at the end of the trailer.
    pub fn write_footer(&mut self) -> Result<()> {
        let pos = self.extents.data_end(self.start);
        let footer = self.extents.encode_footer(self.logical_len);
        self.substrate.seek(SeekFrom::Start(pos))?;
        self.substrate.write_all(&footer)?;
        self.substrate.truncate(pos + footer.len() as u64)?;
        self.footer_len_on_disk = self.logical_len;
        tracing::trace!(
            blocks = self.extents.len(),
            logical_len = self.logical_len,
            "footer rewritten"
        );
        Ok(())
    }

    /// Patch only the logical length in the trailer. Legal only while the
    /// footer body bytes on disk match the in-memory extent map.
    pub fn write_length_trailer(&mut self) -> Result<()> {
        let end = self.substrate.stream_len()?;
        self.substrate.seek(SeekFrom::Start(end - 8))?;
        self.substrate
            .write_all(&(self.logical_len as i64).to_le_bytes())?;
        self.footer_len_on_disk = self.logical_len;
        Ok(())
    }

    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.substrate.seek(SeekFrom::Start(offset))?;
        let got = read_full(&mut self.substrate, buf)?;
        if got < buf.len() {
            return Err(CaskError::TruncatedRead {
                wanted: buf.len(),
                got,
            });
        }
        Ok(())
    }
}
