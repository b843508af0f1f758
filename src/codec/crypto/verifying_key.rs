use std::ops::Deref;

use async_trait::async_trait;
use elliptic_curve::sec1::ToEncodedPoint;
use futures::{AsyncWrite, AsyncWriteExt};
use p384::NistP384;
use winnow::error::{ContextError, ErrMode};
use winnow::token::take;
use winnow::Parser;

use crate::codec::crypto::{Fingerprint, KeyId, Signature};
use crate::codec::{AsyncEncodable, ParserResult, Stream};

const KEY_SIZE: usize = 49;

/// A writer's public identity key, used to verify the signature on a block envelope. Carried in
/// the owning object's access record, not in the envelope itself.
#[derive(Clone)]
pub struct VerifyingKey {
    inner: ecdsa::VerifyingKey<NistP384>,
}

impl VerifyingKey {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from(self)
    }

    #[cfg(feature = "pem")]
    pub fn from_spki(pem: &str) -> Result<Self, VerifyingKeyError> {
        use elliptic_curve::pkcs8::DecodePublicKey;

        let p384_key =
            p384::PublicKey::from_public_key_pem(pem).map_err(VerifyingKeyError::InvalidSpki)?;
        let inner = ecdsa::VerifyingKey::from(p384_key);

        Ok(Self { inner })
    }

    pub fn key_id(&self) -> KeyId {
        self.fingerprint().key_id()
    }

    /// Verifies a signature produced by the matching [`super::SigningKey`] over a SHA-384 digest.
    pub fn verify_digest(
        &self,
        digest: sha2::Sha384,
        signature: &Signature,
    ) -> Result<(), ecdsa::signature::Error> {
        use ecdsa::signature::DigestVerifier;
        self.inner.verify_digest(digest, signature.inner())
    }

    pub fn parse(input: Stream) -> ParserResult<Self> {
        let (remaining, slice) = take(KEY_SIZE).parse_peek(input)?;

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(slice);

        let key = match ecdsa::VerifyingKey::from_sec1_bytes(&bytes) {
            Ok(key) => key,
            Err(err) => {
                tracing::error!("failed to decode ECDSA key: {err}");
                return Err(ErrMode::Cut(ContextError::new()));
            }
        };

        Ok((remaining, Self { inner: key }))
    }

    pub const fn size() -> usize {
        KEY_SIZE
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        let compressed_public_key = self.inner.to_encoded_point(true);

        let mut public_key = [0u8; KEY_SIZE];
        public_key.copy_from_slice(compressed_public_key.as_bytes());

        public_key
    }

    #[cfg(feature = "pem")]
    pub fn to_spki(&self) -> Result<String, VerifyingKeyError> {
        use elliptic_curve::pkcs8::EncodePublicKey;

        let public_key: p384::PublicKey = self.inner.into();

        let spki = public_key
            .to_public_key_pem(elliptic_curve::pkcs8::LineEnding::LF)
            .map_err(VerifyingKeyError::SpkiEncodingFailed)?;

        Ok(spki)
    }
}

#[async_trait]
impl AsyncEncodable for VerifyingKey {
    async fn encode<W: AsyncWrite + Unpin + Send>(&self, writer: &mut W) -> std::io::Result<usize> {
        let key_bytes = self.to_bytes();
        writer.write_all(&key_bytes).await?;
        Ok(key_bytes.len())
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{VerifyingKey({:?})}}", self.key_id())
    }
}

impl Deref for VerifyingKey {
    type Target = ecdsa::VerifyingKey<NistP384>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ecdsa::VerifyingKey<NistP384>> for VerifyingKey {
    fn from(inner: ecdsa::VerifyingKey<NistP384>) -> Self {
        Self { inner }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyingKeyError {
    #[cfg(feature = "pem")]
    #[error("failed to load SPKI fomatted verifying key: {0}")]
    InvalidSpki(elliptic_curve::pkcs8::spki::Error),

    #[cfg(feature = "pem")]
    #[error("failed to encoded public key as SPKI: {0}")]
    SpkiEncodingFailed(elliptic_curve::pkcs8::spki::Error),
}
