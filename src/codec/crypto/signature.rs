use async_trait::async_trait;
use futures::{AsyncWrite, AsyncWriteExt};
use p384::NistP384;
use winnow::error::{ContextError, ErrMode};
use winnow::token::take;
use winnow::Parser;

use crate::codec::{AsyncEncodable, ParserResult, Stream};

const SIGNATURE_SIZE: usize = 96;

/// The ECDSA/P-384 signature covering a block envelope's ciphertext, tag, and revision. Produced
/// by [`super::SigningKey::try_sign_digest_with_rng`] and checked during load as part of the
/// integrity contract.
#[derive(Clone)]
pub struct Signature {
    inner: ecdsa::Signature<NistP384>,
}

impl Signature {
    pub fn from_slice(slice: &[u8]) -> Result<Self, SignatureError> {
        let inner = ecdsa::Signature::from_slice(slice)?;
        Ok(Self { inner })
    }

    pub fn parse(input: Stream) -> ParserResult<Self> {
        let (remaining, slice) = take(SIGNATURE_SIZE).parse_peek(input)?;

        let inner = match ecdsa::Signature::from_slice(slice) {
            Ok(inner) => inner,
            Err(err) => {
                tracing::error!("failed to decode ECDSA signature: {err}");
                return Err(ErrMode::Cut(ContextError::new()));
            }
        };

        Ok((remaining, Self { inner }))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        let signature_bytes = self.inner.to_bytes();

        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&signature_bytes);

        signature
    }

    pub const fn size() -> usize {
        SIGNATURE_SIZE
    }

    pub(crate) fn inner(&self) -> &ecdsa::Signature<NistP384> {
        &self.inner
    }
}

#[async_trait]
impl AsyncEncodable for Signature {
    async fn encode<W: AsyncWrite + Unpin + Send>(&self, writer: &mut W) -> std::io::Result<usize> {
        let byte_ref = self.inner.to_bytes();
        writer.write_all(byte_ref.as_slice()).await?;
        Ok(byte_ref.len())
    }
}

impl From<ecdsa::Signature<NistP384>> for Signature {
    fn from(inner: ecdsa::Signature<NistP384>) -> Self {
        Self { inner }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] ecdsa::Error),
}

#[cfg(test)]
mod tests {
    use ecdsa::signature::rand_core::OsRng;
    use ecdsa::signature::RandomizedDigestSigner;
    use sha2::{Digest, Sha384};

    use super::*;
    use crate::codec::crypto::SigningKey;

    #[test]
    fn round_trips_through_encode_and_parse() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let digest = Sha384::new_with_prefix(b"porcupine nodule");
        let signature: Signature = signing_key
            .try_sign_digest_with_rng(&mut OsRng, digest)
            .unwrap();

        let bytes = signature.to_bytes();
        let (remaining, parsed) = Signature::parse(&bytes).unwrap();

        assert!(remaining.is_empty());
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn rejects_input_shorter_than_a_signature() {
        let input = [0u8; SIGNATURE_SIZE - 1];
        assert!(Signature::parse(&input).is_err());
    }
}
