//! Sequential framed reader and writer
//!
//! The simpler variant without an extent footer: each transformed block is
//! prefixed with its length as a little-endian 16-bit integer and frames
//! follow each other until EOF. Neither side seeks, so any readable or
//! writable byte stream works as the substrate.
//!
//! ```text
//! [ len: i16 LE | transformed bytes ] [ len | bytes ] …
//! ```
//!
//! The reader stops cleanly on EOF at a frame boundary; a truncated length
//! prefix or payload is corruption, as is a non-positive frame length or a
//! decoded block outside `1..=block_size`.

use crate::container::{validate_block_size, CaskOptions};
use crate::error::{CaskError, Result};
use crate::stream::check_transformed_len;
use crate::substrate::read_full;
use crate::transform::BlockTransformer;
use crate::MAX_EXTENT_LEN;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Length-prefix size for one frame.
pub const FRAME_HEADER_LEN: usize = 2;

/// Sequential writer emitting length-prefixed transformed frames.
pub struct FrameWriter<S: Write> {
    inner: S,
    transformer: Arc<dyn BlockTransformer>,
    block_size: usize,
    /// Frame being assembled.
    block: Vec<u8>,
    fill: usize,
}

impl<S: Write> FrameWriter<S> {
    pub fn new(inner: S, options: CaskOptions) -> Result<Self> {
        validate_block_size(options.block_size)?;
        Ok(FrameWriter {
            inner,
            transformer: options.transformer,
            block_size: options.block_size,
            block: vec![0u8; options.block_size],
            fill: 0,
        })
    }

    /// Buffer bytes, emitting a frame whenever a full block accumulates.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let n = (self.block_size - self.fill).min(rest.len());
            self.block[self.fill..self.fill + n].copy_from_slice(&rest[..n]);
            self.fill += n;
            rest = &rest[n..];

            if self.fill == self.block_size {
                self.emit_frame()?;
            }
        }
        Ok(buf.len())
    }

    /// Emit any buffered bytes as a short frame, then flush the substrate.
    pub fn flush(&mut self) -> Result<()> {
        if self.fill > 0 {
            self.emit_frame()?;
        }
        self.inner.flush()?;
        Ok(())
    }

    /// Flush the trailing frame and hand the substrate back.
    pub fn finish(mut self) -> Result<S> {
        self.flush()?;
        Ok(self.inner)
    }

    fn emit_frame(&mut self) -> Result<()> {
        let transformed = self.transformer.transform(&self.block[..self.fill])?;
        check_transformed_len(transformed.len())?;
        if transformed.is_empty() {
            return Err(CaskError::Corruption(
                "transformer produced an empty frame".to_string(),
            ));
        }

        self.inner
            .write_all(&(transformed.len() as i16).to_le_bytes())?;
        self.inner.write_all(&transformed)?;
        self.fill = 0;
        Ok(())
    }
}

impl<S: Write> Write for FrameWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FrameWriter::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        FrameWriter::flush(self).map_err(Into::into)
    }
}

/// Sequential reader over length-prefixed transformed frames.
pub struct FrameReader<S: Read> {
    inner: S,
    transformer: Arc<dyn BlockTransformer>,
    block_size: usize,
    /// Decoded bytes of the current frame.
    block: Vec<u8>,
    scratch: Vec<u8>,
    /// Valid decoded bytes in `block`.
    avail: usize,
    /// Read position within `block`.
    pos: usize,
    eof: bool,
}

impl<S: Read> FrameReader<S> {
    pub fn new(inner: S, options: CaskOptions) -> Result<Self> {
        validate_block_size(options.block_size)?;
        Ok(FrameReader {
            inner,
            transformer: options.transformer,
            block_size: options.block_size,
            block: vec![0u8; MAX_EXTENT_LEN],
            scratch: vec![0u8; MAX_EXTENT_LEN],
            avail: 0,
            pos: 0,
            eof: false,
        })
    }

    /// Read decoded bytes, pulling the next frame as needed. Returns zero
    /// once the substrate is exhausted at a frame boundary.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut done = 0;
        while done < buf.len() {
            if self.pos == self.avail {
                if self.eof || !self.next_frame()? {
                    break;
                }
            }
            let n = (self.avail - self.pos).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&self.block[self.pos..self.pos + n]);
            self.pos += n;
            done += n;
        }
        Ok(done)
    }

    /// Recover the substrate.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn next_frame(&mut self) -> Result<bool> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        let got = read_full(&mut self.inner, &mut header)?;
        if got == 0 {
            self.eof = true;
            return Ok(false);
        }
        if got < FRAME_HEADER_LEN {
            return Err(CaskError::Corruption(
                "substrate ended inside a frame length prefix".to_string(),
            ));
        }

        let length = i16::from_le_bytes(header);
        if length <= 0 {
            return Err(CaskError::Corruption(format!(
                "illegal frame length {length}"
            )));
        }
        let length = length as usize;

        let got = read_full(&mut self.inner, &mut self.scratch[..length])?;
        if got < length {
            return Err(CaskError::Corruption(format!(
                "frame payload truncated: wanted {length} bytes, got {got}"
            )));
        }

        let decoded = self
            .transformer
            .untransform(&self.scratch[..length], &mut self.block)?;
        if decoded == 0 || decoded > self.block_size {
            return Err(CaskError::Corruption(format!(
                "frame decoded to {decoded} bytes, expected 1..={}",
                self.block_size
            )));
        }

        self.avail = decoded;
        self.pos = 0;
        Ok(true)
    }
}

impl<S: Read> Read for FrameReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FrameReader::read(self, buf).map_err(Into::into)
    }
}

/// Sequential streams have no notion of position.
impl<S: Write> io::Seek for FrameWriter<S> {
    fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
        Err(CaskError::Unsupported("seek on a sequential stream").into())
    }
}

/// Sequential streams have no notion of position.
impl<S: Read> io::Seek for FrameReader<S> {
    fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
        Err(CaskError::Unsupported("seek on a sequential stream").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::Lz4Transformer;
    use crate::crypto::ChaChaPolyTransformer;

    fn options_512() -> CaskOptions {
        CaskOptions::default().block_size(512)
    }

    #[test]
    fn test_frame_round_trip() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 241) as u8).collect();

        let mut writer = FrameWriter::new(Vec::new(), options_512()).unwrap();
        writer.write(&data).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = FrameReader::new(bytes.as_slice(), options_512()).unwrap();
        let mut back = Vec::new();
        io::Read::read_to_end(&mut reader, &mut back).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_flush_emits_short_frames() {
        let mut writer = FrameWriter::new(Vec::new(), options_512()).unwrap();
        writer.write(&[1u8; 10]).unwrap();
        writer.flush().unwrap();
        writer.write(&[2u8; 20]).unwrap();
        let bytes = writer.finish().unwrap();

        // Two frames: 10 and 20 payload bytes under the identity transformer.
        assert_eq!(bytes.len(), FRAME_HEADER_LEN + 10 + FRAME_HEADER_LEN + 20);

        let mut reader = FrameReader::new(bytes.as_slice(), options_512()).unwrap();
        let mut back = Vec::new();
        io::Read::read_to_end(&mut reader, &mut back).unwrap();
        assert_eq!(&back[..10], &[1u8; 10]);
        assert_eq!(&back[10..], &[2u8; 20]);
    }

    #[test]
    fn test_clean_eof_at_frame_boundary() {
        let mut writer = FrameWriter::new(Vec::new(), options_512()).unwrap();
        writer.write(&[9u8; 100]).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = FrameReader::new(bytes.as_slice(), options_512()).unwrap();
        let mut buf = [0u8; 200];
        assert_eq!(reader.read(&mut buf).unwrap(), 100);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_truncated_length_prefix_is_corrupt() {
        let mut writer = FrameWriter::new(Vec::new(), options_512()).unwrap();
        writer.write(&[9u8; 512]).unwrap();
        let mut bytes = writer.finish().unwrap();
        // Leave one stray byte where the next length prefix should be.
        bytes.push(0x05);

        let mut reader = FrameReader::new(bytes.as_slice(), options_512()).unwrap();
        let mut buf = [0u8; 512];
        assert_eq!(reader.read(&mut buf).unwrap(), 512);
        assert!(matches!(
            reader.read(&mut buf),
            Err(CaskError::Corruption(_))
        ));
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let mut writer = FrameWriter::new(Vec::new(), options_512()).unwrap();
        writer.write(&[9u8; 100]).unwrap();
        let mut bytes = writer.finish().unwrap();
        bytes.pop();

        let mut reader = FrameReader::new(bytes.as_slice(), options_512()).unwrap();
        let mut buf = [0u8; 100];
        assert!(matches!(
            reader.read(&mut buf),
            Err(CaskError::Corruption(_))
        ));
    }

    #[test]
    fn test_negative_frame_length_is_corrupt() {
        let bytes = (-5i16).to_le_bytes().to_vec();
        let mut reader = FrameReader::new(bytes.as_slice(), options_512()).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            reader.read(&mut buf),
            Err(CaskError::Corruption(_))
        ));
    }

    #[test]
    fn test_seek_is_unsupported() {
        let mut writer = FrameWriter::new(Vec::new(), options_512()).unwrap();
        let err = io::Seek::seek(&mut writer, io::SeekFrom::Start(0)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn test_lz4_frames_round_trip() {
        let data = vec![0x03u8; 100_000];
        let options = || options_512().transformer(Lz4Transformer);

        let mut writer = FrameWriter::new(Vec::new(), options()).unwrap();
        writer.write(&data).unwrap();
        let bytes = writer.finish().unwrap();
        assert!(bytes.len() < data.len());

        let mut reader = FrameReader::new(bytes.as_slice(), options()).unwrap();
        let mut back = Vec::new();
        io::Read::read_to_end(&mut reader, &mut back).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_encrypted_frames_round_trip() {
        let data: Vec<u8> = (0..2048u32).map(|i| (i % 199) as u8).collect();
        let options = || options_512().transformer(ChaChaPolyTransformer::new("frame pw"));

        let mut writer = FrameWriter::new(Vec::new(), options()).unwrap();
        writer.write(&data).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = FrameReader::new(bytes.as_slice(), options()).unwrap();
        let mut back = Vec::new();
        io::Read::read_to_end(&mut reader, &mut back).unwrap();
        assert_eq!(back, data);
    }
}
