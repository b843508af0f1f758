use async_trait::async_trait;
use futures::{AsyncWrite, AsyncWriteExt};
use winnow::token::take;
use winnow::Parser;

use crate::codec::crypto::{KeyId, VerifyingKey};
use crate::codec::{AsyncEncodable, ParserResult, Stream};

const FINGERPRINT_SIZE: usize = 32;

/// A blake3 digest of a [`VerifyingKey`]'s compressed SEC1 encoding. Carried as the writer
/// identity in a [`crate::envelope::BlockEnvelope`]'s signature so a verifier knows which public
/// key to check against without shipping the key itself on every block.
#[derive(Clone, Copy, PartialEq)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    pub fn key_id(&self) -> KeyId {
        let mut key_id = [0u8; 2];
        key_id.copy_from_slice(&self.0[..2]);
        KeyId::from(u16::from_le_bytes(key_id))
    }

    pub fn parse(input: Stream) -> ParserResult<Self> {
        let (remaining, id_bytes) = take(FINGERPRINT_SIZE).parse_peek(input)?;

        let mut bytes = [0u8; FINGERPRINT_SIZE];
        bytes.copy_from_slice(id_bytes);

        Ok((remaining, Self(bytes)))
    }

    pub const fn size() -> usize {
        FINGERPRINT_SIZE
    }
}

#[async_trait]
impl AsyncEncodable for Fingerprint {
    async fn encode<W: AsyncWrite + Unpin + Send>(&self, writer: &mut W) -> std::io::Result<usize> {
        writer.write_all(&self.0).await?;
        Ok(self.0.len())
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{0x{}}}", crate::codec::bytes_to_hex_string(&self.0))
    }
}

impl From<[u8; FINGERPRINT_SIZE]> for Fingerprint {
    fn from(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<&VerifyingKey> for Fingerprint {
    fn from(key: &VerifyingKey) -> Self {
        let public_key_bytes = key.to_bytes();
        Self(blake3::hash(&public_key_bytes).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE_FINGERPRINT_BYTES: &[u8; 32] = b"UUUUUUUUaaaaaaaaUUUUUUUUaaaaaaaa";

    #[test]
    fn debug_format_hex_encodes_the_digest() {
        let fingerprint = Fingerprint::from(*REFERENCE_FINGERPRINT_BYTES);
        let fmt_str = format!("{:?}", fingerprint);

        assert_eq!(
            fmt_str,
            "{0x5555555555555555616161616161616155555555555555556161616161616161}"
        );
    }

    #[test]
    fn key_id_is_taken_from_the_leading_two_bytes() {
        let fingerprint = Fingerprint::from(*REFERENCE_FINGERPRINT_BYTES);
        let key_id = fingerprint.key_id();
        assert_eq!(key_id, KeyId::from(0x5555));
    }
}
