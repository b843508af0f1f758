//! # Codec
//!
//! Encoding and decoding primitives shared by every persisted block. [`crypto`] holds the
//! cryptographic building blocks (hashing, signing, symmetric encryption); the parsing and
//! encoding glue that ties them together into a [`crate::envelope::BlockEnvelope`] lives in
//! [`crate::envelope`].

pub mod crypto;

use async_trait::async_trait;
use futures::{AsyncWrite, AsyncWriteExt};

/// Parser input type for every `winnow`-based decoder in this crate. Blocks are always decoded
/// from an already-buffered, in-memory slice; nothing here streams directly off the network (the
/// external block store is responsible for handing us complete envelopes).
pub type Stream<'a> = &'a [u8];

/// Result type returned by every `parse` function: the remaining unparsed input and the decoded
/// value, or a `winnow` parse error.
pub type ParserResult<'a, O> = winnow::PResult<(Stream<'a>, O)>;

/// Implemented by every type that appears inside a [`crate::envelope::BlockEnvelope`]. Kept
/// `async` so implementors that need to touch a writer backed by actual I/O (rather than an
/// in-memory `Vec<u8>`) aren't forced to buffer first.
#[async_trait]
pub trait AsyncEncodable {
    async fn encode<W: AsyncWrite + Unpin + Send>(&self, writer: &mut W) -> std::io::Result<usize>;
}

pub(crate) fn bytes_to_hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::new(), |acc, &b| format!("{acc}{:02x}", b))
}
