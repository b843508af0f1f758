use futures::{AsyncWrite, AsyncWriteExt};
use winnow::binary::le_u8;
use winnow::error::{ContextError, ErrMode};
use winnow::Parser;

use crate::codec::{ParserResult, Stream};

/// Identifies what a block envelope's decrypted payload deserializes into, so
/// [`crate::nest::Nest::load`] can dispatch to the right factory without first decoding the
/// payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComponentTag {
    /// A leaf nodule: inlets map keys to values or out-of-line value references.
    Quill,
    /// An internal nodule: inlets map summary keys to child nodule handles.
    Seam,
    /// An out-of-line value too large to inline in a Quill's own footprint.
    Value,
}

impl ComponentTag {
    /// The tag's encoded wire byte, for callers (the signed-payload construction) that need it
    /// without going through the async `encode` path.
    pub(crate) fn as_byte(&self) -> u8 {
        match self {
            ComponentTag::Quill => 0x00,
            ComponentTag::Seam => 0x01,
            ComponentTag::Value => 0x02,
        }
    }

    pub async fn encode<W: AsyncWrite + Unpin + Send>(
        &self,
        writer: &mut W,
    ) -> std::io::Result<usize> {
        writer.write_all(&[self.as_byte()]).await?;
        Ok(1)
    }

    pub fn parse(input: Stream) -> ParserResult<Self> {
        let (input, byte) = le_u8.parse_peek(input)?;

        let tag = match byte {
            0x00 => ComponentTag::Quill,
            0x01 => ComponentTag::Seam,
            0x02 => ComponentTag::Value,
            _ => return Err(ErrMode::Cut(ContextError::new())),
        };

        Ok((input, tag))
    }

    pub const fn size() -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_every_variant() {
        for tag in [ComponentTag::Quill, ComponentTag::Seam, ComponentTag::Value] {
            let mut buffer = Vec::new();
            tag.encode(&mut buffer).await.unwrap();

            let (remaining, parsed) = ComponentTag::parse(&buffer).unwrap();
            assert!(remaining.is_empty());
            assert_eq!(parsed, tag);
        }
    }

    #[test]
    fn rejects_an_unknown_tag_byte() {
        assert!(ComponentTag::parse(&[0xff]).is_err());
    }
}
