use std::ops::Deref;

use async_trait::async_trait;
use chacha20poly1305::XNonce as ChaChaNonce;
use futures::{AsyncWrite, AsyncWriteExt};
use rand::Rng;
use winnow::token::take;
use winnow::Parser;

use crate::codec::{AsyncEncodable, ParserResult, Stream};

const NONCE_LENGTH: usize = 24;

/// The XChaCha20 nonce carried alongside every symmetrically encrypted payload in a
/// [`crate::envelope::BlockEnvelope`]. Generated fresh per encryption; never reused across
/// revisions of the same block.
#[derive(Clone)]
pub struct Nonce([u8; NONCE_LENGTH]);

impl Nonce {
    pub fn as_bytes(&self) -> &[u8; NONCE_LENGTH] {
        &self.0
    }

    pub fn generate(rng: &mut impl Rng) -> Self {
        Self(rng.gen())
    }

    pub fn parse(input: Stream) -> ParserResult<Self> {
        let (remaining, slice) = take(NONCE_LENGTH).parse_peek(input)?;

        let mut bytes = [0u8; NONCE_LENGTH];
        bytes.copy_from_slice(slice);

        Ok((remaining, Self(bytes)))
    }

    pub const fn size() -> usize {
        NONCE_LENGTH
    }
}

#[async_trait]
impl AsyncEncodable for Nonce {
    async fn encode<W: AsyncWrite + Unpin + Send>(&self, writer: &mut W) -> std::io::Result<usize> {
        writer.write_all(&self.0).await?;
        Ok(self.0.len())
    }
}

impl Deref for Nonce {
    type Target = ChaChaNonce;

    fn deref(&self) -> &Self::Target {
        ChaChaNonce::from_slice(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_length_prefix_and_leaves_remainder() {
        let mut rng = rand::thread_rng();
        let input: [u8; NONCE_LENGTH + 4] = rng.gen();
        let (remaining, nonce) = Nonce::parse(&input).unwrap();

        assert_eq!(remaining, &input[NONCE_LENGTH..]);
        assert_eq!(nonce.as_bytes(), &input[..NONCE_LENGTH]);
    }

    #[test]
    fn rejects_input_shorter_than_a_nonce() {
        let input = [0u8; NONCE_LENGTH - 1];
        assert!(Nonce::parse(&input).is_err());
    }
}
