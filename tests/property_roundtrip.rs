//! Property-based transformer round-trip tests
//!
//! Uses proptest to check the round-trip law over random block contents and
//! lengths: untransforming a transformed block recovers the input exactly.

use blockcask::{
    AesCtrHmacTransformer, BlockTransformer, ChaChaPolyTransformer, ChecksumTransformer,
    CompositeTransformer, IdentityTransformer, Lz4Transformer, MAX_EXTENT_LEN,
};
use proptest::prelude::*;

fn assert_round_trip(t: &dyn BlockTransformer, data: &[u8]) {
    let stored = t.transform(data).unwrap();
    assert!(stored.len() <= MAX_EXTENT_LEN);

    let mut out = vec![0u8; MAX_EXTENT_LEN];
    let n = t.untransform(&stored, &mut out).unwrap();
    assert_eq!(n, data.len());
    assert_eq!(&out[..n], data);
}

proptest! {
    #[test]
    fn prop_identity_round_trip(data in proptest::collection::vec(any::<u8>(), 1..16384)) {
        assert_round_trip(&IdentityTransformer, &data);
    }

    #[test]
    fn prop_checksum_round_trip(data in proptest::collection::vec(any::<u8>(), 1..16384)) {
        assert_round_trip(&ChecksumTransformer, &data);
    }

    #[test]
    fn prop_lz4_round_trip(data in proptest::collection::vec(any::<u8>(), 1..16384)) {
        assert_round_trip(&Lz4Transformer, &data);
    }

    #[test]
    fn prop_chacha_round_trip(data in proptest::collection::vec(any::<u8>(), 1..4096)) {
        assert_round_trip(&ChaChaPolyTransformer::new("prop pw"), &data);
    }

    #[test]
    fn prop_aes_ctr_hmac_round_trip(data in proptest::collection::vec(any::<u8>(), 1..4096)) {
        assert_round_trip(&AesCtrHmacTransformer::new("prop pw"), &data);
    }

    #[test]
    fn prop_composite_round_trip(data in proptest::collection::vec(any::<u8>(), 1..8192)) {
        let pipeline = CompositeTransformer::new(vec![
            Box::new(Lz4Transformer),
            Box::new(ChecksumTransformer),
        ]);
        assert_round_trip(&pipeline, &data);
    }

    #[test]
    fn prop_checksum_detects_any_single_flip(
        data in proptest::collection::vec(any::<u8>(), 1..2048),
        flip in any::<usize>(),
        bit in 0u8..8,
    ) {
        let t = ChecksumTransformer;
        let mut stored = t.transform(&data).unwrap();
        let at = flip % stored.len();
        stored[at] ^= 1 << bit;

        let mut out = vec![0u8; MAX_EXTENT_LEN];
        prop_assert!(t.untransform(&stored, &mut out).is_err());
    }
}
