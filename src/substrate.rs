//! Substrate seam between the container and whatever holds its bytes
//!
//! The container never talks to the filesystem directly; it goes through
//! [`Substrate`], which is any seekable byte stream that can additionally be
//! truncated and, where the backing supports it, durably flushed. Impls are
//! provided for `std::fs::File` and for `std::io::Cursor<Vec<u8>>` (the
//! in-memory substrate used throughout the tests).

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, Write};

/// A seekable byte stream a container can live inside.
///
/// `sync` is the durable-flush hook behind `flush(durable = true)`; the
/// default is a no-op so purely in-memory substrates do not have to pretend
/// to offer durability.
pub trait Substrate: Read + Write + Seek {
    /// Cut or extend the stream to exactly `len` bytes.
    ///
    /// Extension fills with zeros. The current position is left unchanged,
    /// matching `File::set_len`.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Total length of the stream in bytes.
    fn stream_len(&self) -> io::Result<u64>;

    /// Force written bytes to durable storage.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Substrate for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn stream_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

impl Substrate for Cursor<Vec<u8>> {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }

    fn stream_len(&self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

/// Read exactly `buf.len()` bytes, reporting how many arrived before EOF.
///
/// Unlike `read_exact` this distinguishes "the substrate ended" from other
/// I/O failures, so callers can map the former to a truncated-read error.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
