//! # Block envelope
//!
//! The persisted representation of every nodule: a component tag, a monotone revision counter,
//! the owning object's id, a symmetrically encrypted payload, and an asymmetric signature over
//! the ciphertext, tag, revision, and object id. The content-address of a block is the hash of
//! its fully serialized envelope.

mod tag;

pub use tag::ComponentTag;

use ecdsa::signature::rand_core::CryptoRngCore;
use ecdsa::signature::RandomizedDigestSigner;
use futures::{AsyncWrite, AsyncWriteExt};
use sha2::{Digest, Sha384};
use winnow::binary::{le_u32, le_u64};
use winnow::token::take;
use winnow::Parser;

use crate::address::Address;
use crate::codec::crypto::{
    AuthenticationTag, Hash, KeyId, Nonce, Signature, SigningKey, SymmetricKey, VerifyingKey,
};
use crate::codec::{AsyncEncodable, ParserResult, Stream};

pub const ENVELOPE_MAGIC: &[u8; 4] = b"PRQN";
const ENVELOPE_VERSION: u8 = 0x01;

/// The fully self-contained, persisted representation of a single nodule or out-of-line value.
#[derive(Clone)]
pub struct BlockEnvelope {
    tag: ComponentTag,
    revision: u64,
    object_id: [u8; 16],
    signer: KeyId,
    nonce: Nonce,
    ciphertext: Vec<u8>,
    auth_tag: AuthenticationTag,
    signature: Signature,
}

impl BlockEnvelope {
    /// Encrypts `plaintext` under `symmetric_key` and signs the result with `signing_key`,
    /// producing a ready-to-persist envelope. The caller still has to hand the serialized bytes
    /// to the block store and compute the resulting [`Address`] via [`Self::address`].
    ///
    /// `object_id` travels in the clear alongside `tag`/`revision`: it's the owning object's
    /// identity the caller derived `symmetric_key` from, and must be readable before decryption
    /// so `open`'s caller can re-derive the same key.
    pub fn seal(
        rng: &mut impl CryptoRngCore,
        tag: ComponentTag,
        revision: u64,
        object_id: [u8; 16],
        mut plaintext: Vec<u8>,
        symmetric_key: &SymmetricKey,
        signing_key: &SigningKey,
    ) -> Result<Self, EnvelopeError> {
        let (nonce, auth_tag) = symmetric_key
            .encrypt(rng, &mut plaintext)
            .map_err(|_| EnvelopeError::EncryptionFailed)?;

        let signed_payload = Self::signed_payload(tag, revision, object_id, &plaintext, &auth_tag);
        let digest = Sha384::new_with_prefix(&signed_payload);
        let signature = signing_key
            .try_sign_digest_with_rng(rng, digest)
            .map_err(|_| EnvelopeError::SigningFailed)?;

        Ok(Self {
            tag,
            revision,
            object_id,
            signer: signing_key.key_id(),
            nonce,
            ciphertext: plaintext,
            auth_tag,
            signature,
        })
    }

    /// Verifies the signature against `verifying_key`, decrypts under `symmetric_key`, and
    /// returns the original plaintext payload. This is the integrity contract every `Nest::load`
    /// must run before handing a deserialized nodule back to the tree.
    pub fn open(
        &self,
        verifying_key: &VerifyingKey,
        symmetric_key: &SymmetricKey,
    ) -> Result<Vec<u8>, EnvelopeError> {
        let signed_payload =
            Self::signed_payload(self.tag, self.revision, self.object_id, &self.ciphertext, &self.auth_tag);
        let digest = Sha384::new_with_prefix(&signed_payload);

        verifying_key
            .verify_digest(digest, &self.signature)
            .map_err(|_| EnvelopeError::SignatureInvalid)?;

        let mut plaintext = self.ciphertext.clone();
        symmetric_key
            .decrypt(&self.nonce, &self.auth_tag, &mut plaintext)
            .map_err(|_| EnvelopeError::DecryptionFailed)?;

        Ok(plaintext)
    }

    fn signed_payload(
        tag: ComponentTag,
        revision: u64,
        object_id: [u8; 16],
        ciphertext: &[u8],
        auth_tag: &AuthenticationTag,
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 8 + object_id.len() + ciphertext.len() + AuthenticationTag::size());
        buf.push(tag.as_byte());
        buf.extend_from_slice(&revision.to_le_bytes());
        buf.extend_from_slice(&object_id);
        buf.extend_from_slice(ciphertext);
        buf.extend_from_slice(auth_tag.as_bytes());
        buf
    }

    pub fn tag(&self) -> ComponentTag {
        self.tag
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn object_id(&self) -> [u8; 16] {
        self.object_id
    }

    pub fn signer(&self) -> KeyId {
        self.signer
    }

    pub async fn encode<W: AsyncWrite + Unpin + Send>(
        &self,
        writer: &mut W,
    ) -> std::io::Result<usize> {
        let mut written = 0;

        writer.write_all(ENVELOPE_MAGIC).await?;
        written += ENVELOPE_MAGIC.len();

        writer.write_all(&[ENVELOPE_VERSION]).await?;
        written += 1;

        written += self.tag.encode(writer).await?;

        writer.write_all(&self.revision.to_le_bytes()).await?;
        written += 8;

        writer.write_all(&self.object_id).await?;
        written += self.object_id.len();

        written += self.signer.encode(writer).await?;
        written += self.nonce.encode(writer).await?;

        let ciphertext_len = self.ciphertext.len() as u32;
        writer.write_all(&ciphertext_len.to_le_bytes()).await?;
        written += 4;

        writer.write_all(&self.ciphertext).await?;
        written += self.ciphertext.len();

        written += self.auth_tag.encode(writer).await?;
        written += self.signature.encode(writer).await?;

        Ok(written)
    }

    pub fn parse(input: Stream) -> ParserResult<Self> {
        let (input, _magic) = take(ENVELOPE_MAGIC.len()).parse_peek(input)?;
        let (input, version) = winnow::binary::le_u8.parse_peek(input)?;

        if version != ENVELOPE_VERSION {
            return Err(winnow::error::ErrMode::Cut(winnow::error::ContextError::new()));
        }

        let (input, tag) = ComponentTag::parse(input)?;
        let (input, revision) = le_u64.parse_peek(input)?;
        let (input, object_id_slice) = take(16usize).parse_peek(input)?;
        let (input, signer) = KeyId::parse(input)?;
        let (input, nonce) = Nonce::parse(input)?;
        let (input, ciphertext_len) = le_u32.parse_peek(input)?;
        let (input, ciphertext_slice) = take(ciphertext_len as usize).parse_peek(input)?;
        let (input, auth_tag) = AuthenticationTag::parse(input)?;
        let (input, signature) = Signature::parse(input)?;

        let mut object_id = [0u8; 16];
        object_id.copy_from_slice(object_id_slice);

        let envelope = Self {
            tag,
            revision,
            object_id,
            signer,
            nonce,
            ciphertext: ciphertext_slice.to_vec(),
            auth_tag,
            signature,
        };

        Ok((input, envelope))
    }

    /// Computes the content-address of this envelope's full serialized form. This is what
    /// `checkpoint` assigns to every Handle referring to the nodule once the write-back succeeds.
    pub async fn address(&self) -> std::io::Result<Address> {
        let mut buffer = Vec::new();
        self.encode(&mut buffer).await?;
        Ok(Address::from(Hash::of(&buffer)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("failed to encrypt envelope payload")]
    EncryptionFailed,

    #[error("failed to sign envelope")]
    SigningFailed,

    #[error("envelope signature failed verification")]
    SignatureInvalid,

    #[error("failed to decrypt envelope payload")]
    DecryptionFailed,

    #[error("malformed envelope bytes: {0}")]
    Malformed(String),
}
