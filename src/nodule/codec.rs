//! Plain-bytes (de)serialization of nodules, independent of the encryption and signing layer.
//! [`crate::nest::Nest`] wraps the bytes produced here inside a [`crate::envelope::BlockEnvelope`]
//! before handing them to the block store, and unwraps the envelope before calling back in here.

use std::io;

use crate::address::{Address, Handle};
use crate::codec::crypto::Hash;
use crate::nodule::{Footprint, Nodule, Quill, Seam};

/// A key or value type usable inside a persisted nodule. Intentionally synchronous and
/// self-contained (no `winnow` `Stream`/suspension points) since key and value payloads are
/// always fully materialized in memory by the time a nodule is serialized.
pub trait NoduleCodec: Sized {
    fn encode_to(&self, out: &mut Vec<u8>);

    /// Decodes a value from the front of `input`, returning the remainder.
    fn decode_from(input: &[u8]) -> io::Result<(Self, &[u8])>;
}

impl NoduleCodec for Vec<u8> {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.len() as u32).to_le_bytes());
        out.extend_from_slice(self);
    }

    fn decode_from(input: &[u8]) -> io::Result<(Self, &[u8])> {
        if input.len() < 4 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated length prefix"));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&input[0..4]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        let rest = &input[4..];
        if rest.len() < len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated value bytes"));
        }

        Ok((rest[0..len].to_vec(), &rest[len..]))
    }
}

const TAG_SEAM: u8 = 0;
const TAG_QUILL: u8 = 1;

fn encode_address(address: &Address, out: &mut Vec<u8>) -> io::Result<()> {
    match address {
        Address::Hash(hash) => {
            out.extend_from_slice(hash.as_bytes());
            Ok(())
        }
        Address::Null | Address::Pending => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "cannot persist a child reference without a real address",
        )),
    }
}

fn decode_address(input: &[u8]) -> io::Result<(Address, &[u8])> {
    if input.len() < Hash::size() {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated address"));
    }
    let (head, rest) = input.split_at(Hash::size());
    let (_, hash) = Hash::parse(head)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "malformed address hash"))?;
    Ok((Address::from(hash), rest))
}

/// Serializes `nodule`'s structure (not including sibling/parent Handles, which are weak
/// references rebuilt on load rather than persisted).
pub async fn encode_nodule<K, V>(nodule: &Nodule<K, V>) -> io::Result<Vec<u8>>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    let mut out = Vec::new();

    match nodule {
        Nodule::Seam(seam) => {
            out.push(TAG_SEAM);
            out.extend_from_slice(&(seam.len() as u32).to_le_bytes());
            for (key, child) in seam.iter() {
                key.encode_to(&mut out);
                out.push(0); // reserved for future per-inlet flags
                let child_address = child.address().await;
                encode_address(&child_address, &mut out)?;
            }
        }
        Nodule::Quill(quill) => {
            out.push(TAG_QUILL);
            out.extend_from_slice(&(quill.len() as u32).to_le_bytes());
            for (key, value) in quill.iter() {
                key.encode_to(&mut out);
                value.encode_to(&mut out);
            }
        }
    }

    Ok(out)
}

/// Rebuilds a nodule's inlets from its serialized bytes. Child references come back as
/// un-resident `Handle`s pointing at their persisted address; sibling and parent links are left
/// null for the caller ([`crate::nest::Nest::load`]) to reattach from context.
pub fn decode_nodule<K, V>(bytes: &[u8]) -> io::Result<Nodule<K, V>>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    if bytes.is_empty() {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty nodule body"));
    }

    let tag = bytes[0];
    let mut rest = &bytes[1..];

    if rest.len() < 4 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated inlet count"));
    }
    let mut count_bytes = [0u8; 4];
    count_bytes.copy_from_slice(&rest[0..4]);
    let count = u32::from_le_bytes(count_bytes) as usize;
    rest = &rest[4..];

    match tag {
        TAG_SEAM => {
            let mut seam = Seam::new();
            for _ in 0..count {
                let (key, after_key) = K::decode_from(rest)?;
                if after_key.is_empty() {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated seam inlet"));
                }
                let after_flags = &after_key[1..];
                let (address, after_address) = decode_address(after_flags)?;
                seam.insert(key, Handle::from_address(address));
                rest = after_address;
            }
            seam.mark_clean();
            Ok(Nodule::Seam(seam))
        }
        TAG_QUILL => {
            let mut quill = Quill::new();
            for _ in 0..count {
                let (key, after_key) = K::decode_from(rest)?;
                let (value, after_value) = V::decode_from(after_key)?;
                quill.insert(key, value);
                rest = after_value;
            }
            quill.mark_clean();
            Ok(Nodule::Quill(quill))
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unrecognized nodule tag {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn quill_round_trips_through_encode_and_decode() {
        let mut quill: Quill<Vec<u8>, Vec<u8>> = Quill::new();
        quill.insert(b"alpha".to_vec(), b"one".to_vec());
        quill.insert(b"beta".to_vec(), b"two".to_vec());

        let nodule = Nodule::Quill(quill);
        let bytes = encode_nodule(&nodule).await.unwrap();
        let decoded: Nodule<Vec<u8>, Vec<u8>> = decode_nodule(&bytes).unwrap();

        match decoded {
            Nodule::Quill(quill) => {
                assert_eq!(quill.get(&b"alpha".to_vec()), Some(&b"one".to_vec()));
                assert_eq!(quill.len(), 2);
            }
            Nodule::Seam(_) => panic!("expected a quill"),
        }
    }

    #[tokio::test]
    async fn seam_round_trips_child_addresses() {
        let mut seam: Seam<Vec<u8>, Vec<u8>> = Seam::new();
        let hash = Hash::of(b"child block");
        seam.insert(b"zzz".to_vec(), Handle::from_address(Address::from(hash)));

        let nodule = Nodule::Seam(seam);
        let bytes = encode_nodule(&nodule).await.unwrap();
        let decoded: Nodule<Vec<u8>, Vec<u8>> = decode_nodule(&bytes).unwrap();

        match decoded {
            Nodule::Seam(seam) => {
                let child = seam.locate(&b"zzz".to_vec()).unwrap();
                assert_eq!(child.address().await, Address::from(hash));
            }
            Nodule::Quill(_) => panic!("expected a seam"),
        }
    }

    #[tokio::test]
    async fn encoding_a_pending_child_address_fails() {
        let mut seam: Seam<Vec<u8>, Vec<u8>> = Seam::new();
        seam.insert(b"zzz".to_vec(), Handle::new_dirty(Nodule::Quill(Quill::new())));

        let nodule = Nodule::Seam(seam);
        assert!(encode_nodule(&nodule).await.is_err());
    }
}
