use chacha20poly1305::{AeadInPlace, Key as ChaChaKey, KeyInit, XChaCha20Poly1305};
use ecdsa::signature::rand_core::CryptoRngCore;
use rand::Rng;

use crate::codec::crypto::{AuthenticationTag, Nonce};

const SYMMETRIC_KEY_LENGTH: usize = 32;

/// The per-object key a block's payload is encrypted under, derived from the owning object's
/// identity via [`SymmetricKey::derive_symmetric`] rather than negotiated per-reader.
#[derive(Clone)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_LENGTH]);

impl SymmetricKey {
    fn chacha_key(&self) -> &ChaChaKey {
        ChaChaKey::from_slice(&self.0)
    }

    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        Self(rng.gen())
    }

    /// Derives a symmetric key from arbitrary secret material, keyed to `context` so the same
    /// secret never yields the same key for two different purposes.
    pub fn derive_symmetric(secret: &[u8], context: &str) -> Self {
        let derived = blake3::derive_key(context, secret);
        Self(derived)
    }

    /// Encrypts `plaintext` in place under a fresh nonce and returns the nonce and tag that must
    /// accompany it. Matches the envelope layout in [`crate::envelope::BlockEnvelope`]: nonce and
    /// tag travel alongside the ciphertext rather than being prepended to it.
    pub fn encrypt(
        &self,
        rng: &mut impl CryptoRngCore,
        plaintext: &mut Vec<u8>,
    ) -> Result<(Nonce, AuthenticationTag), SymmetricKeyError> {
        let cipher = XChaCha20Poly1305::new(self.chacha_key());
        let nonce = Nonce::generate(rng);

        let raw_tag = cipher.encrypt_in_place_detached(&nonce, &[], plaintext)?;

        let mut tag_bytes = [0u8; AuthenticationTag::size()];
        tag_bytes.copy_from_slice(raw_tag.as_slice());
        let tag = AuthenticationTag::from(tag_bytes);

        Ok((nonce, tag))
    }

    /// Decrypts `ciphertext` in place, verifying `tag` under `nonce`. On mismatch the buffer is
    /// left in an undefined state and the caller must discard it; this is the last line of
    /// defense behind the envelope's outer signature check.
    pub fn decrypt(
        &self,
        nonce: &Nonce,
        tag: &AuthenticationTag,
        ciphertext: &mut Vec<u8>,
    ) -> Result<(), SymmetricKeyError> {
        let cipher = XChaCha20Poly1305::new(self.chacha_key());
        cipher.decrypt_in_place_detached(nonce, &[], ciphertext, tag)?;
        Ok(())
    }

    pub const fn size() -> usize {
        SYMMETRIC_KEY_LENGTH
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; SYMMETRIC_KEY_LENGTH]> for SymmetricKey {
    fn from(key: [u8; SYMMETRIC_KEY_LENGTH]) -> Self {
        Self(key)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SymmetricKeyError {
    #[error("symmetric encryption or decryption failed")]
    CryptoFailure,
}

impl From<chacha20poly1305::Error> for SymmetricKeyError {
    fn from(_: chacha20poly1305::Error) -> Self {
        SymmetricKeyError::CryptoFailure
    }
}

#[cfg(test)]
mod tests {
    use ecdsa::signature::rand_core::OsRng;

    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips_the_payload() {
        let key = SymmetricKey::generate(&mut OsRng);
        let mut buffer = b"quill payload".to_vec();
        let original = buffer.clone();

        let (nonce, tag) = key.encrypt(&mut OsRng, &mut buffer).unwrap();
        assert_ne!(buffer, original);

        key.decrypt(&nonce, &tag, &mut buffer).unwrap();
        assert_eq!(buffer, original);
    }

    #[test]
    fn decrypt_rejects_a_tampered_ciphertext() {
        let key = SymmetricKey::generate(&mut OsRng);
        let mut buffer = b"quill payload".to_vec();

        let (nonce, tag) = key.encrypt(&mut OsRng, &mut buffer).unwrap();
        buffer[0] ^= 0xff;

        assert!(key.decrypt(&nonce, &tag, &mut buffer).is_err());
    }

    #[test]
    fn derivation_is_deterministic_and_context_separated() {
        let secret = b"owning object identity";

        let a = SymmetricKey::derive_symmetric(secret, "porcupine.nodule.v1");
        let b = SymmetricKey::derive_symmetric(secret, "porcupine.nodule.v1");
        let c = SymmetricKey::derive_symmetric(secret, "porcupine.value.v1");

        assert_eq!(a.0, b.0);
        assert_ne!(a.0, c.0);
    }
}
