//! LZ4 compression transformer
//!
//! Uses the raw LZ4 block codec: no length prefix is stored, because the
//! extent (or sequential frame) already records the transformed length.
//! Decompression is bounded by the caller's scratch buffer, so a corrupt
//! block cannot expand past one logical block.

use crate::error::{CaskError, Result};
use crate::transform::BlockTransformer;
use lz4_flex::block::{compress, decompress_into};

/// Transformer that LZ4-compresses each block.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Transformer;

impl BlockTransformer for Lz4Transformer {
    fn may_change_size(&self) -> bool {
        true
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(compress(input))
    }

    fn untransform(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        decompress_into(input, output)
            .map_err(|e| CaskError::Corruption(format!("LZ4 decode failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_compressible() {
        let t = Lz4Transformer;
        let data = vec![0x03u8; 16384];

        let stored = t.transform(&data).unwrap();
        assert!(stored.len() < data.len());

        let mut out = vec![0u8; 32767];
        let n = t.untransform(&stored, &mut out).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(&out[..n], &data[..]);
    }

    #[test]
    fn test_round_trip_incompressible() {
        let t = Lz4Transformer;
        // Pseudo-random bytes compress poorly but must still round-trip.
        let data: Vec<u8> = (0..4096u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();

        let stored = t.transform(&data).unwrap();
        let mut out = vec![0u8; 32767];
        let n = t.untransform(&stored, &mut out).unwrap();
        assert_eq!(&out[..n], &data[..]);
    }

    #[test]
    fn test_truncated_block_is_corrupt() {
        let t = Lz4Transformer;
        let stored = t.transform(&vec![7u8; 2048]).unwrap();

        let mut out = vec![0u8; 32767];
        assert!(matches!(
            t.untransform(&stored[..stored.len() - 1], &mut out),
            Err(CaskError::Corruption(_))
        ));
    }

    #[test]
    fn test_garbage_block_is_corrupt() {
        let t = Lz4Transformer;
        let mut out = vec![0u8; 512];
        // A declared literal run far longer than the scratch buffer.
        let garbage = [0xF0u8, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(matches!(
            t.untransform(&garbage, &mut out),
            Err(CaskError::Corruption(_))
        ));
    }
}
