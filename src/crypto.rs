//! Authenticated-encryption transformers
//!
//! Two interchangeable constructions over the same on-disk layout:
//!
//! - [`ChaChaPolyTransformer`]: ChaCha20-Poly1305 with a detached tag
//! - [`AesCtrHmacTransformer`]: AES-256-CTR with an HMAC-SHA-256 tag
//!   truncated to 16 bytes over `nonce ∥ ciphertext`
//!
//! Block layout: `[nonce: 12 bytes][tag: 16 bytes][ciphertext]`. A fresh
//! random nonce is drawn per encryption, and tag verification failure is
//! reported as corruption.
//!
//! Keys are derived from the caller's passphrase with PBKDF2-HMAC-SHA-256
//! over a fixed internal salt at 100 iterations: 64 bytes of output, split
//! into a 32-byte cipher key and a 32-byte MAC key. The derivation is a
//! speed bump against casual inspection, not a password-hashing strength
//! guarantee. Key material is zeroized on drop.

use crate::error::{CaskError, Result};
use crate::transform::BlockTransformer;
use aes::cipher::{KeyIvInit, StreamCipher};
use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce, Tag,
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Nonce size shared by both constructions (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag size (128 bits).
pub const TAG_LEN: usize = 16;

/// Bytes added to every block by either construction.
pub const AEAD_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

const KDF_SALT: &[u8] = b"blockcask.kdf.v1";
const KDF_ITERATIONS: u32 = 100;

type Aes256Ctr = ctr::Ctr32BE<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Cipher and MAC keys derived from a passphrase, wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct DerivedKeys {
    cipher: [u8; 32],
    mac: [u8; 32],
}

fn derive_keys(passphrase: &str) -> DerivedKeys {
    let mut okm = [0u8; 64];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut okm);

    let mut keys = DerivedKeys {
        cipher: [0u8; 32],
        mac: [0u8; 32],
    };
    keys.cipher.copy_from_slice(&okm[..32]);
    keys.mac.copy_from_slice(&okm[32..]);
    okm.zeroize();
    keys
}

fn fresh_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn split_block(input: &[u8]) -> Result<(&[u8], &[u8], &[u8])> {
    if input.len() < AEAD_OVERHEAD {
        return Err(CaskError::Corruption(format!(
            "encrypted block of {} bytes is shorter than the {} byte AEAD header",
            input.len(),
            AEAD_OVERHEAD
        )));
    }
    let (nonce, rest) = input.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);
    Ok((nonce, tag, ciphertext))
}

fn check_scratch(output: &[u8], needed: usize) -> Result<()> {
    if output.len() < needed {
        return Err(CaskError::OutOfRange(format!(
            "scratch buffer of {} bytes cannot hold {} decoded bytes",
            output.len(),
            needed
        )));
    }
    Ok(())
}

/// ChaCha20-Poly1305 transformer, the primary construction.
pub struct ChaChaPolyTransformer {
    keys: DerivedKeys,
}

impl ChaChaPolyTransformer {
    pub fn new(passphrase: &str) -> Self {
        ChaChaPolyTransformer {
            keys: derive_keys(passphrase),
        }
    }
}

impl BlockTransformer for ChaChaPolyTransformer {
    fn may_change_size(&self) -> bool {
        true
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new((&self.keys.cipher).into());
        let nonce = fresh_nonce();

        let mut buffer = input.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
            .map_err(|_| CaskError::Corruption("AEAD encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(AEAD_OVERHEAD + buffer.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&buffer);
        Ok(out)
    }

    fn untransform(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let (nonce, tag, ciphertext) = split_block(input)?;
        check_scratch(output, ciphertext.len())?;

        output[..ciphertext.len()].copy_from_slice(ciphertext);
        let cipher = ChaCha20Poly1305::new((&self.keys.cipher).into());
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce),
                b"",
                &mut output[..ciphertext.len()],
                Tag::from_slice(tag),
            )
            .map_err(|_| {
                CaskError::Corruption("AEAD tag verification failed".to_string())
            })?;

        Ok(ciphertext.len())
    }
}

/// AES-256-CTR + HMAC-SHA-256 transformer, the alternate construction.
///
/// The CTR IV is the 12-byte nonce followed by a 32-bit big-endian counter
/// starting at zero. The tag is the first 16 bytes of
/// `HMAC-SHA-256(mac_key, nonce ∥ ciphertext)`, compared in constant time.
pub struct AesCtrHmacTransformer {
    keys: DerivedKeys,
}

impl AesCtrHmacTransformer {
    pub fn new(passphrase: &str) -> Self {
        AesCtrHmacTransformer {
            keys: derive_keys(passphrase),
        }
    }

    fn mac(&self, nonce: &[u8], ciphertext: &[u8]) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.keys.mac)
            .expect("HMAC accepts any key length");
        mac.update(nonce);
        mac.update(ciphertext);
        mac
    }

    fn keystream(&self, nonce: &[u8], buffer: &mut [u8]) {
        let mut iv = [0u8; 16];
        iv[..NONCE_LEN].copy_from_slice(nonce);
        let mut cipher = Aes256Ctr::new((&self.keys.cipher).into(), (&iv).into());
        cipher.apply_keystream(buffer);
    }
}

impl BlockTransformer for AesCtrHmacTransformer {
    fn may_change_size(&self) -> bool {
        true
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>> {
        let nonce = fresh_nonce();
        let mut buffer = input.to_vec();
        self.keystream(&nonce, &mut buffer);

        let digest = self.mac(&nonce, &buffer).finalize().into_bytes();

        let mut out = Vec::with_capacity(AEAD_OVERHEAD + buffer.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&digest[..TAG_LEN]);
        out.extend_from_slice(&buffer);
        Ok(out)
    }

    fn untransform(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let (nonce, tag, ciphertext) = split_block(input)?;
        check_scratch(output, ciphertext.len())?;

        self.mac(nonce, ciphertext)
            .verify_truncated_left(tag)
            .map_err(|_| {
                CaskError::Corruption("HMAC tag verification failed".to_string())
            })?;

        output[..ciphertext.len()].copy_from_slice(ciphertext);
        self.keystream(nonce, &mut output[..ciphertext.len()]);
        Ok(ciphertext.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(t: &dyn BlockTransformer) {
        let data: Vec<u8> = (0..512u32).map(|i| (i * 7) as u8).collect();

        let stored = t.transform(&data).unwrap();
        assert_eq!(stored.len(), data.len() + AEAD_OVERHEAD);
        assert_ne!(&stored[AEAD_OVERHEAD..], &data[..]);

        let mut out = vec![0u8; 1024];
        let n = t.untransform(&stored, &mut out).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(&out[..n], &data[..]);
    }

    #[test]
    fn test_chacha_round_trip() {
        round_trip(&ChaChaPolyTransformer::new("correct horse"));
    }

    #[test]
    fn test_aes_ctr_hmac_round_trip() {
        round_trip(&AesCtrHmacTransformer::new("correct horse"));
    }

    #[test]
    fn test_nonces_are_unique_per_transform() {
        let t = ChaChaPolyTransformer::new("pw");
        let a = t.transform(b"same plaintext").unwrap();
        let b = t.transform(b"same plaintext").unwrap();
        assert_ne!(&a[..NONCE_LEN], &b[..NONCE_LEN]);

        let mut out = vec![0u8; 64];
        assert_eq!(t.untransform(&a, &mut out).unwrap(), 14);
        assert_eq!(t.untransform(&b, &mut out).unwrap(), 14);
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let stored = ChaChaPolyTransformer::new("alpha")
            .transform(b"secret block")
            .unwrap();

        let mut out = vec![0u8; 64];
        assert!(matches!(
            ChaChaPolyTransformer::new("beta").untransform(&stored, &mut out),
            Err(CaskError::Corruption(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        for t in [
            Box::new(ChaChaPolyTransformer::new("pw")) as Box<dyn BlockTransformer>,
            Box::new(AesCtrHmacTransformer::new("pw")),
        ] {
            let mut stored = t.transform(b"important data").unwrap();
            stored[AEAD_OVERHEAD + 2] ^= 0xFF;

            let mut out = vec![0u8; 64];
            assert!(matches!(
                t.untransform(&stored, &mut out),
                Err(CaskError::Corruption(_))
            ));
        }
    }

    #[test]
    fn test_tampered_tag_fails() {
        let t = AesCtrHmacTransformer::new("pw");
        let mut stored = t.transform(b"important data").unwrap();
        stored[NONCE_LEN] ^= 0x01;

        let mut out = vec![0u8; 64];
        assert!(matches!(
            t.untransform(&stored, &mut out),
            Err(CaskError::Corruption(_))
        ));
    }

    #[test]
    fn test_constructions_share_key_derivation() {
        // Both constructions must derive the same keys so they stay
        // interchangeable at the transformer boundary.
        let a = derive_keys("shared passphrase");
        let b = derive_keys("shared passphrase");
        assert_eq!(a.cipher, b.cipher);
        assert_eq!(a.mac, b.mac);
        assert_ne!(a.cipher, a.mac);
    }

    #[test]
    fn test_too_short_block_is_corrupt() {
        let t = ChaChaPolyTransformer::new("pw");
        let mut out = vec![0u8; 64];
        assert!(matches!(
            t.untransform(&[0u8; AEAD_OVERHEAD - 1], &mut out),
            Err(CaskError::Corruption(_))
        ));
    }
}
