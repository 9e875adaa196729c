//! CRC-64 checksum transformer
//!
//! Appends an 8-byte little-endian CRC-64 over the block payload. The
//! parameters are the GO-ISO set: reflected polynomial
//! `0xD800000000000000`, initial value and final XOR all-ones. Verification
//! happens on `untransform`; a mismatch is reported as corruption.

use crate::error::{CaskError, Result};
use crate::transform::BlockTransformer;
use crc::{Crc, CRC_64_GO_ISO};

/// Bytes appended to each block.
pub const CHECKSUM_LEN: usize = 8;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Transformer that guards each block with a CRC-64 trailer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumTransformer;

impl BlockTransformer for ChecksumTransformer {
    fn may_change_size(&self) -> bool {
        true
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() + CHECKSUM_LEN);
        out.extend_from_slice(input);
        out.extend_from_slice(&CRC64.checksum(input).to_le_bytes());
        Ok(out)
    }

    fn untransform(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        if input.len() < CHECKSUM_LEN {
            return Err(CaskError::Corruption(format!(
                "block of {} bytes is too short for a checksum trailer",
                input.len()
            )));
        }

        let (payload, trailer) = input.split_at(input.len() - CHECKSUM_LEN);
        let expected = u64::from_le_bytes(
            trailer
                .try_into()
                .expect("trailer split is exactly eight bytes"),
        );
        let actual = CRC64.checksum(payload);
        if actual != expected {
            return Err(CaskError::Corruption(format!(
                "checksum mismatch: stored {expected:#018x}, computed {actual:#018x}"
            )));
        }

        if output.len() < payload.len() {
            return Err(CaskError::OutOfRange(format!(
                "scratch buffer of {} bytes cannot hold {} decoded bytes",
                output.len(),
                payload.len()
            )));
        }
        output[..payload.len()].copy_from_slice(payload);
        Ok(payload.len())
    }
}
