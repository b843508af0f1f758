use async_trait::async_trait;
use futures::{AsyncWrite, AsyncWriteExt};
use winnow::token::take;
use winnow::Parser;

use crate::codec::{AsyncEncodable, ParserResult, Stream};

pub const HASH_SIZE: usize = 32;

/// The output of the content-hash used to compute [`crate::address::Address`] values. A thin
/// wrapper around a blake3 digest so callers can't confuse it with an arbitrary byte array.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Hashes `data` with blake3. This is the concrete backing for the external `hash(bytes) ->
    /// address` collaborator described by the block store contract.
    pub fn of(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    pub fn parse(input: Stream) -> ParserResult<Self> {
        let (remaining, bytes) = take(HASH_SIZE).parse_peek(input)?;

        let mut buf = [0u8; HASH_SIZE];
        buf.copy_from_slice(bytes);

        Ok((remaining, Self(buf)))
    }

    pub const fn size() -> usize {
        HASH_SIZE
    }
}

#[async_trait]
impl AsyncEncodable for Hash {
    async fn encode<W: AsyncWrite + Unpin + Send>(&self, writer: &mut W) -> std::io::Result<usize> {
        writer.write_all(&self.0).await?;
        Ok(self.0.len())
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{0x{}}}", crate::codec::bytes_to_hex_string(&self.0))
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}
