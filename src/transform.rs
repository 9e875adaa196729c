//! Block transformer contract
//!
//! Every logical block passes through a [`BlockTransformer`] on its way to
//! and from the substrate. A transformer is a bidirectional codec over byte
//! ranges: `transform` produces the on-disk representation, `untransform`
//! reverses it. Transformers that preserve length (`may_change_size() ==
//! false`) permit in-place random overwrite; all others restrict overwrite
//! to the tail (see the write rules in [`crate::stream`]).
//!
//! Rust's borrow rules guarantee `untransform`'s input and output slices
//! never alias, so implementations may decode straight into `output` without
//! overlap checks.

use crate::error::{CaskError, Result};
use crate::MAX_EXTENT_LEN;

/// Bidirectional per-block codec.
///
/// The round-trip law: for every input `x` of legal length,
/// `untransform(&transform(x)?, out)? == x.len()` and `out[..x.len()] == x`.
pub trait BlockTransformer: Send + Sync {
    /// Whether `transform` may produce output of a different length than its
    /// input. Size-preserving transformers must satisfy `|out| == |in|` for
    /// every input.
    fn may_change_size(&self) -> bool;

    /// Produce the on-disk representation of a logical block.
    ///
    /// Output must not exceed [`MAX_EXTENT_LEN`] bytes; callers enforce the
    /// bound before writing.
    fn transform(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Reverse `transform` into `output`, returning the decoded byte count.
    fn untransform(&self, input: &[u8], output: &mut [u8]) -> Result<usize>;
}

/// The do-nothing transformer: bytes are stored as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransformer;

impl BlockTransformer for IdentityTransformer {
    fn may_change_size(&self) -> bool {
        false
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn untransform(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        if output.len() < input.len() {
            return Err(CaskError::OutOfRange(format!(
                "scratch buffer of {} bytes cannot hold {} decoded bytes",
                output.len(),
                input.len()
            )));
        }
        output[..input.len()].copy_from_slice(input);
        Ok(input.len())
    }
}

/// Ordered pipeline of transformers.
///
/// `transform` applies stages front to back; `untransform` walks them in
/// reverse, threading the valid length through each stage.
pub struct CompositeTransformer {
    stages: Vec<Box<dyn BlockTransformer>>,
}

impl CompositeTransformer {
    pub fn new(stages: Vec<Box<dyn BlockTransformer>>) -> Self {
        CompositeTransformer { stages }
    }

    /// Append a stage to the end of the pipeline.
    pub fn push(&mut self, stage: Box<dyn BlockTransformer>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl BlockTransformer for CompositeTransformer {
    fn may_change_size(&self) -> bool {
        self.stages.iter().any(|s| s.may_change_size())
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut current = input.to_vec();
        for stage in &self.stages {
            current = stage.transform(&current)?;
        }
        Ok(current)
    }

    fn untransform(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let mut current = input.to_vec();
        let mut scratch = vec![0u8; MAX_EXTENT_LEN.max(output.len())];
        for stage in self.stages.iter().rev() {
            let n = stage.untransform(&current, &mut scratch)?;
            current.clear();
            current.extend_from_slice(&scratch[..n]);
        }
        if output.len() < current.len() {
            return Err(CaskError::OutOfRange(format!(
                "scratch buffer of {} bytes cannot hold {} decoded bytes",
                output.len(),
                current.len()
            )));
        }
        output[..current.len()].copy_from_slice(&current);
        Ok(current.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumTransformer;

    #[test]
    fn test_identity_round_trip() {
        let t = IdentityTransformer;
        let data = b"some block payload";

        let stored = t.transform(data).unwrap();
        assert_eq!(stored, data);

        let mut out = vec![0u8; 64];
        let n = t.untransform(&stored, &mut out).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(&out[..n], data);
    }

    #[test]
    fn test_identity_does_not_change_size() {
        assert!(!IdentityTransformer.may_change_size());
    }

    #[test]
    fn test_identity_rejects_short_scratch() {
        let t = IdentityTransformer;
        let mut out = vec![0u8; 4];
        assert!(matches!(
            t.untransform(b"longer than four", &mut out),
            Err(CaskError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_composite_applies_stages_in_order() {
        let pipeline = CompositeTransformer::new(vec![
            Box::new(IdentityTransformer),
            Box::new(ChecksumTransformer),
        ]);

        let data = vec![0x5Au8; 600];
        let stored = pipeline.transform(&data).unwrap();
        // Checksum is the outermost stage, so the trailer lands at the end.
        assert_eq!(stored.len(), data.len() + 8);

        let mut out = vec![0u8; 1024];
        let n = pipeline.untransform(&stored, &mut out).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(&out[..n], &data[..]);
    }

    #[test]
    fn test_composite_size_change_is_disjunction() {
        let plain = CompositeTransformer::new(vec![
            Box::new(IdentityTransformer),
            Box::new(IdentityTransformer),
        ]);
        assert!(!plain.may_change_size());

        let mut mixed = plain;
        mixed.push(Box::new(ChecksumTransformer));
        assert!(mixed.may_change_size());
    }

    #[test]
    fn test_empty_composite_is_identity() {
        let pipeline = CompositeTransformer::new(Vec::new());
        let data = b"pass through";

        let stored = pipeline.transform(data).unwrap();
        assert_eq!(stored, data);

        let mut out = vec![0u8; 32];
        let n = pipeline.untransform(&stored, &mut out).unwrap();
        assert_eq!(&out[..n], data);
    }
}
