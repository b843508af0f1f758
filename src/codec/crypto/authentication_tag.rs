use std::ops::Deref;

use chacha20poly1305::Tag as ChaChaTag;
use futures::{AsyncWrite, AsyncWriteExt};
use winnow::token::take;
use winnow::Parser;

use crate::codec::{ParserResult, Stream};

const TAG_LENGTH: usize = 16;

/// The Poly1305 authentication tag produced alongside a symmetrically encrypted payload. Carried
/// in the clear next to the ciphertext; [`crate::codec::crypto::SymmetricKey::decrypt`] rejects
/// the payload outright if the tag doesn't match.
#[derive(Clone, Debug)]
pub struct AuthenticationTag([u8; TAG_LENGTH]);

impl AuthenticationTag {
    pub fn as_bytes(&self) -> &[u8; TAG_LENGTH] {
        &self.0
    }

    pub async fn encode<W: AsyncWrite + Unpin + Send>(
        &self,
        writer: &mut W,
    ) -> std::io::Result<usize> {
        writer.write_all(&self.0).await?;
        Ok(self.0.len())
    }

    pub fn parse(input: Stream) -> ParserResult<Self> {
        let (remaining, slice) = take(TAG_LENGTH).parse_peek(input)?;

        let mut bytes = [0u8; TAG_LENGTH];
        bytes.copy_from_slice(slice);

        Ok((remaining, Self(bytes)))
    }

    pub const fn size() -> usize {
        TAG_LENGTH
    }
}

impl Deref for AuthenticationTag {
    type Target = ChaChaTag;

    fn deref(&self) -> &Self::Target {
        ChaChaTag::from_slice(&self.0)
    }
}

impl From<[u8; TAG_LENGTH]> for AuthenticationTag {
    fn from(bytes: [u8; TAG_LENGTH]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[tokio::test]
    async fn parses_fixed_length_prefix_and_leaves_remainder() {
        let mut rng = rand::thread_rng();
        let input: [u8; TAG_LENGTH + 4] = rng.gen();
        let (remaining, tag) = AuthenticationTag::parse(&input).unwrap();

        assert_eq!(remaining, &input[TAG_LENGTH..]);
        assert_eq!(tag.as_bytes(), &input[..TAG_LENGTH]);
    }

    #[tokio::test]
    async fn rejects_input_shorter_than_a_tag() {
        let input = [0u8; TAG_LENGTH - 1];
        assert!(AuthenticationTag::parse(&input).is_err());
    }
}
