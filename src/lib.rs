//! Blockcask Container Format
//!
//! A block-oriented container over any seekable byte stream. A caller writes
//! a logical byte stream; the container chunks it into fixed-size logical
//! blocks, pipes each block through a pluggable transformer (identity,
//! checksum, compression, authenticated encryption, or any ordered
//! composition), and stores the transformed bytes as extents together with a
//! trailing index footer.
//!
//! ## Features
//!
//! - **Four access modes** over two layouts:
//!   - [`Cask`]: random-access read/write
//!   - [`CaskReader`]: random-access read-only, with independent cursors
//!     and a memory-mapped fast path for regular files
//!   - [`CaskWriter`]: append-only write-once producer
//!   - [`FrameWriter`] / [`FrameReader`]: sequential framed stream without
//!     an extent index
//! - **Pluggable transformers**: CRC-64 checksums, LZ4 compression via
//!   `lz4_flex`, ChaCha20-Poly1305 or AES-CTR + HMAC-SHA-256 authenticated
//!   encryption, and ordered pipelines of any of them
//! - **Crash-safe appends**: a two-phase footer write leaves a tombstone
//!   record that recovery discards
//! - **Optional block cache** with a bundled LRU implementation
//!
//! ## On-Disk Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │ extent 0 payload │ … │ extent N−1 payload       │
//! ├─────────────────────────────────────────────────┤
//! │ footer body: N × (offset: i64 LE, len: i16 LE)  │
//! ├─────────────────────────────────────────────────┤
//! │ trailer: (body len: i64 LE, logical len: i64 LE)│
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! The sequential modes instead emit `(len: i16 LE) ∥ payload` frames until
//! EOF. The logical block size is not recorded on disk; readers must be
//! configured with the size the container was written with.
//!
//! ## Example
//!
//! ```no_run
//! use blockcask::{Cask, CaskOptions, ChecksumTransformer};
//! use std::io::Cursor;
//!
//! # fn main() -> blockcask::Result<()> {
//! let options = CaskOptions::default()
//!     .block_size(4096)
//!     .transformer(ChecksumTransformer);
//!
//! let mut cask = Cask::open(Cursor::new(Vec::new()), options)?;
//! cask.write(b"hello, container")?;
//! cask.flush(true)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! A writable container is owned by a single writer. Read-only cursors may
//! run concurrently: without locking over a memory mapping, serialized under
//! an internal mutex over a plain seek + read substrate.

pub mod cache;
pub mod checksum;
pub mod compress;
pub mod container;
pub mod crypto;
pub mod error;
pub mod extent;
pub mod framed;
pub mod reader;
pub mod stream;
pub mod substrate;
pub mod transform;
pub mod writer;

// Re-export commonly used types
pub use cache::{BlockCache, CacheStats, LruBlockCache};
pub use checksum::ChecksumTransformer;
pub use compress::Lz4Transformer;
pub use container::CaskOptions;
pub use crypto::{AesCtrHmacTransformer, ChaChaPolyTransformer};
pub use error::{CaskError, Result};
pub use extent::{Extent, ExtentMap};
pub use framed::{FrameReader, FrameWriter};
pub use reader::{CaskCursor, CaskReader};
pub use stream::Cask;
pub use substrate::Substrate;
pub use transform::{BlockTransformer, CompositeTransformer, IdentityTransformer};
pub use writer::CaskWriter;

/// Smallest legal logical block size.
pub const MIN_BLOCK_SIZE: usize = 512;

/// Largest legal logical block size.
pub const MAX_BLOCK_SIZE: usize = 28671;

/// Default logical block size.
pub const DEFAULT_BLOCK_SIZE: usize = 16384;

/// Upper bound on the transformed length of one block, and therefore on one
/// extent or sequential frame payload.
pub const MAX_EXTENT_LEN: usize = 32767;
