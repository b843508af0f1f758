//! # Address & Handle
//!
//! [`Address`] is the content-hash identity of a persisted block, or one of two sentinels.
//! [`Handle`] is the universal tree-internal reference: an [`Address`] plus, when the block is
//! resident, a pointer into the [`crate::nest::Nest`]'s resident set. Residency is owned by the
//! Nest, not the Handle — the Handle only records whether one currently exists.

mod handle;

pub use handle::Handle;

use crate::codec::crypto::Hash;

/// The content-hash identity of a persisted block, or a sentinel standing in for "no block" or
/// "a block exists but hasn't been written back yet".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Address {
    /// No block exists at this reference.
    Null,
    /// A block exists and is resident and Dirty, but has never been assigned a real address
    /// because it has never been persisted. Turned into `Hash` by a checkpoint.
    Pending,
    /// The real content-hash of a persisted block.
    Hash(Hash),
}

impl Address {
    pub fn is_null(&self) -> bool {
        matches!(self, Address::Null)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Address::Pending)
    }

    pub fn as_hash(&self) -> Option<&Hash> {
        match self {
            Address::Hash(hash) => Some(hash),
            _ => None,
        }
    }
}

impl From<Hash> for Address {
    fn from(hash: Hash) -> Self {
        Address::Hash(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_pending_are_distinct_sentinels() {
        assert_ne!(Address::Null, Address::Pending);
        assert!(Address::Null.is_null());
        assert!(Address::Pending.is_pending());
        assert!(!Address::Pending.is_null());
    }

    #[test]
    fn equal_hashes_make_equal_addresses() {
        let hash = Hash::of(b"nodule payload");
        assert_eq!(Address::from(hash), Address::from(hash));
    }
}
