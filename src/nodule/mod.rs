//! # Nodule
//!
//! A node of the Porcupine: either a [`Seam`] (internal, routing by summary key) or a [`Quill`]
//! (leaf, holding the actual values). Rebalancing is driven entirely by each nodule's
//! [`Footprint`]-reported byte size against the tree's configured `extent`, never by a fixed
//! fan-out count.

pub mod codec;
mod quill;
mod seam;

pub use codec::NoduleCodec;
pub use quill::Quill;
pub use seam::Seam;

use crate::address::Handle;

/// Per-node bookkeeping overhead folded into every nodule's footprint, approximating the
/// serialized cost of the node's own header fields (state, sibling links, inlet count).
pub const NODE_OVERHEAD: usize = 24;

/// The serialized size of a child reference carried inside a [`Seam`] inlet: a content hash plus
/// a small tag/length prefix.
pub const SEAM_REF_FOOTPRINT: usize = crate::codec::crypto::HASH_SIZE + 8;

/// A type usable as a Porcupine key or value must know its own serialized footprint in bytes so
/// nodules can track theirs without re-encoding on every mutation.
pub trait Footprint {
    fn footprint(&self) -> usize;
}

impl Footprint for Vec<u8> {
    fn footprint(&self) -> usize {
        self.len()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Clean,
    Dirty,
}

/// A node of the tree: either an internal [`Seam`] or a leaf [`Quill`]. Generic over the key type
/// `K` and value type `V`; `Handle<Nodule<K, V>>` is what makes the type recursive without an
/// unbounded size, since a `Handle` only carries a pointer, not the pointee inline.
pub enum Nodule<K, V> {
    Seam(Seam<K, V>),
    Quill(Quill<K, V>),
}

impl<K: Ord + Clone + Footprint, V: Clone + Footprint> Nodule<K, V> {
    pub fn is_seam(&self) -> bool {
        matches!(self, Nodule::Seam(_))
    }

    pub fn is_quill(&self) -> bool {
        matches!(self, Nodule::Quill(_))
    }

    pub fn footprint(&self) -> usize {
        match self {
            Nodule::Seam(seam) => seam.footprint(),
            Nodule::Quill(quill) => quill.footprint(),
        }
    }

    pub fn state(&self) -> State {
        match self {
            Nodule::Seam(seam) => seam.state,
            Nodule::Quill(quill) => quill.state,
        }
    }

    pub fn mark_dirty(&mut self) {
        match self {
            Nodule::Seam(seam) => seam.state = State::Dirty,
            Nodule::Quill(quill) => quill.state = State::Dirty,
        }
    }

    pub fn mark_clean(&mut self) {
        match self {
            Nodule::Seam(seam) => seam.state = State::Clean,
            Nodule::Quill(quill) => quill.state = State::Clean,
        }
    }

    pub fn parent(&self) -> &Handle<Nodule<K, V>> {
        match self {
            Nodule::Seam(seam) => &seam.parent,
            Nodule::Quill(quill) => &quill.parent,
        }
    }

    pub fn set_parent(&mut self, parent: Handle<Nodule<K, V>>) {
        match self {
            Nodule::Seam(seam) => seam.parent = parent,
            Nodule::Quill(quill) => quill.parent = parent,
        }
    }

    pub fn mayor(&self) -> Option<K> {
        match self {
            Nodule::Seam(seam) => seam.mayor(),
            Nodule::Quill(quill) => quill.mayor(),
        }
    }

    pub fn maiden(&self) -> Option<K> {
        match self {
            Nodule::Seam(seam) => seam.maiden(),
            Nodule::Quill(quill) => quill.maiden(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Nodule::Seam(seam) => seam.is_empty(),
            Nodule::Quill(quill) => quill.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Nodule::Seam(seam) => seam.len(),
            Nodule::Quill(quill) => quill.len(),
        }
    }

    pub fn left(&self) -> &Handle<Nodule<K, V>> {
        match self {
            Nodule::Seam(seam) => seam.left(),
            Nodule::Quill(quill) => quill.left(),
        }
    }

    pub fn right(&self) -> &Handle<Nodule<K, V>> {
        match self {
            Nodule::Seam(seam) => seam.right(),
            Nodule::Quill(quill) => quill.right(),
        }
    }

    pub fn set_left(&mut self, left: Handle<Nodule<K, V>>) {
        match self {
            Nodule::Seam(seam) => seam.set_left(left),
            Nodule::Quill(quill) => quill.set_left(left),
        }
    }

    pub fn set_right(&mut self, right: Handle<Nodule<K, V>>) {
        match self {
            Nodule::Seam(seam) => seam.set_right(right),
            Nodule::Quill(quill) => quill.set_right(right),
        }
    }
}

#[cfg(test)]
impl Footprint for u32 {
    fn footprint(&self) -> usize {
        4
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NoduleError {
    #[error("key was not found in this nodule")]
    NotFound,

    #[error("operation requires a non-empty nodule")]
    Empty,
}
