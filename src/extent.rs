//! Extent map and footer codec
//!
//! An extent is the on-disk home of one logical block: a byte offset into
//! the substrate and the transformed length. Block indices are dense, so the
//! map is a plain vector ordered by index, which is also insertion order
//! and on-disk layout order.
//!
//! The footer sits at the tail of the substrate:
//!
//! ```text
//! [ extent 0 | extent 1 | … | extent N−1 | footer body | trailer ]
//!
//! footer body: N records of (offset: i64 LE, length: i16 LE)
//! trailer:     (footer body length: i64 LE, logical length: i64 LE)
//! ```
//!
//! A record with a negative offset or length is a tombstone: the residue of
//! a half-committed append. Decoding skips tombstones without assigning a
//! block index, which is the crate's single recovery behavior.

use crate::error::{CaskError, Result};
use crate::substrate::read_full;
use std::io::{Read, Seek, SeekFrom};

/// Serialized size of one footer record.
pub const EXTENT_RECORD_LEN: usize = 10;

/// Serialized size of the footer trailer.
pub const TRAILER_LEN: usize = 16;

/// On-disk location of one transformed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// Byte offset of the transformed block within the substrate.
    pub offset: i64,
    /// Transformed length in bytes.
    pub length: i16,
}

impl Extent {
    pub fn new(offset: i64, length: i16) -> Self {
        Extent { offset, length }
    }

    /// A record reserving `length` bytes for an append still in flight.
    pub fn tombstone(length: i16) -> Self {
        Extent { offset: -1, length }
    }

    /// Tombstones mark half-committed appends and are skipped on decode.
    pub fn is_tombstone(&self) -> bool {
        self.offset < 0 || self.length < 0
    }

    /// First byte past this extent's payload.
    pub fn end(&self) -> i64 {
        self.offset + self.length as i64
    }
}

/// Dense mapping from block index to extent.
#[derive(Debug, Default)]
pub struct ExtentMap {
    extents: Vec<Extent>,
}

impl ExtentMap {
    pub fn new() -> Self {
        ExtentMap {
            extents: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn get(&self, index: u64) -> Option<Extent> {
        self.extents.get(index as usize).copied()
    }

    /// Append the extent for the next block index.
    pub fn push(&mut self, extent: Extent) {
        self.extents.push(extent);
    }

    /// Replace the extent at an existing index.
    pub fn set(&mut self, index: u64, extent: Extent) {
        self.extents[index as usize] = extent;
    }

    /// Drop every extent with index `>= keep`.
    pub fn truncate(&mut self, keep: usize) {
        self.extents.truncate(keep);
    }

    pub fn clear(&mut self) {
        self.extents.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extent> {
        self.extents.iter()
    }

    /// First substrate byte past all payloads, tombstone reservations
    /// included. This is where the footer body begins.
    pub fn data_end(&self, start: u64) -> u64 {
        start
            + self
                .extents
                .iter()
                .map(|e| e.length.max(0) as u64)
                .sum::<u64>()
    }

    /// Substrate offset where the next appended extent will land.
    pub fn next_offset(&self, start: u64) -> i64 {
        match self.extents.last() {
            Some(last) if !last.is_tombstone() => last.end(),
            _ => self.data_end(start) as i64,
        }
    }

    /// Serialize the footer: body records in block-index order followed by
    /// the `(body length, logical length)` trailer.
    pub fn encode_footer(&self, logical_len: u64) -> Vec<u8> {
        let body_len = self.extents.len() * EXTENT_RECORD_LEN;
        let mut buf = Vec::with_capacity(body_len + TRAILER_LEN);
        for extent in &self.extents {
            buf.extend_from_slice(&extent.offset.to_le_bytes());
            buf.extend_from_slice(&extent.length.to_le_bytes());
        }
        buf.extend_from_slice(&(body_len as i64).to_le_bytes());
        buf.extend_from_slice(&(logical_len as i64).to_le_bytes());
        buf
    }

    /// Decode a footer body. Returns the map and the number of tombstone
    /// records that were skipped.
    pub fn decode_body(body: &[u8]) -> Result<(Self, usize)> {
        if body.len() % EXTENT_RECORD_LEN != 0 {
            return Err(CaskError::Corruption(format!(
                "footer body of {} bytes is not a whole number of records",
                body.len()
            )));
        }

        let mut map = ExtentMap::new();
        let mut skipped = 0;
        for record in body.chunks_exact(EXTENT_RECORD_LEN) {
            let offset = i64::from_le_bytes(
                record[..8].try_into().expect("record has eight offset bytes"),
            );
            let length = i16::from_le_bytes(
                record[8..].try_into().expect("record has two length bytes"),
            );
            let extent = Extent::new(offset, length);
            if extent.is_tombstone() {
                skipped += 1;
            } else {
                map.push(extent);
            }
        }
        Ok((map, skipped))
    }
}

/// Decoded tail of a container: extent map, logical length, skipped
/// tombstone count.
pub(crate) struct Footer {
    pub map: ExtentMap,
    pub logical_len: u64,
    pub skipped: usize,
}

fn decode_trailer(trailer: &[u8; TRAILER_LEN], available: u64) -> Result<(u64, u64)> {
    let body_len = i64::from_le_bytes(
        trailer[..8].try_into().expect("trailer has eight body bytes"),
    );
    let logical_len = i64::from_le_bytes(
        trailer[8..].try_into().expect("trailer has eight length bytes"),
    );
    if body_len < 0 {
        return Err(CaskError::Corruption(format!(
            "negative footer body length {body_len}"
        )));
    }
    if logical_len < 0 {
        return Err(CaskError::Corruption(format!(
            "negative logical length {logical_len}"
        )));
    }
    if body_len as u64 + TRAILER_LEN as u64 > available {
        return Err(CaskError::Corruption(format!(
            "footer body of {body_len} bytes exceeds the {available} byte container"
        )));
    }
    Ok((body_len as u64, logical_len as u64))
}

/// Read the footer from a seekable substrate spanning `[start, end)`.
pub(crate) fn read_footer_stream<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
) -> Result<Footer> {
    if end <= start {
        return Ok(Footer {
            map: ExtentMap::new(),
            logical_len: 0,
            skipped: 0,
        });
    }
    let available = end - start;
    if available < TRAILER_LEN as u64 {
        return Err(CaskError::Corruption(format!(
            "container of {available} bytes is too short for a footer trailer"
        )));
    }

    let mut trailer = [0u8; TRAILER_LEN];
    reader.seek(SeekFrom::Start(end - TRAILER_LEN as u64))?;
    let got = read_full(reader, &mut trailer)?;
    if got < TRAILER_LEN {
        return Err(CaskError::TruncatedRead {
            wanted: TRAILER_LEN,
            got,
        });
    }
    let (body_len, logical_len) = decode_trailer(&trailer, available)?;

    let mut body = vec![0u8; body_len as usize];
    reader.seek(SeekFrom::Start(end - TRAILER_LEN as u64 - body_len))?;
    let got = read_full(reader, &mut body)?;
    if got < body.len() {
        return Err(CaskError::TruncatedRead {
            wanted: body.len(),
            got,
        });
    }

    let (map, skipped) = ExtentMap::decode_body(&body)?;
    Ok(Footer {
        map,
        logical_len,
        skipped,
    })
}

/// Read the footer from an in-memory view of the whole substrate.
pub(crate) fn read_footer_slice(data: &[u8], start: u64) -> Result<Footer> {
    let end = data.len() as u64;
    if end <= start {
        return Ok(Footer {
            map: ExtentMap::new(),
            logical_len: 0,
            skipped: 0,
        });
    }
    let available = end - start;
    if available < TRAILER_LEN as u64 {
        return Err(CaskError::Corruption(format!(
            "container of {available} bytes is too short for a footer trailer"
        )));
    }

    let trailer: [u8; TRAILER_LEN] = data[(end as usize - TRAILER_LEN)..]
        .try_into()
        .expect("trailer slice is sixteen bytes");
    let (body_len, logical_len) = decode_trailer(&trailer, available)?;

    let body_start = end as usize - TRAILER_LEN - body_len as usize;
    let body = &data[body_start..end as usize - TRAILER_LEN];
    let (map, skipped) = ExtentMap::decode_body(body)?;
    Ok(Footer {
        map,
        logical_len,
        skipped,
    })
}
