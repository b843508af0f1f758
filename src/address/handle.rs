use std::sync::Arc;

use async_std::sync::RwLock;

use crate::address::Address;

/// A reference to a block of logical type `T`. Carries an [`Address`] and, when the block is
/// resident, a pointer to the materialized value. The resident pointer is owned by the
/// [`crate::nest::Nest`]; a Handle only records whether residency currently exists, it does not
/// control the object's lifetime — dropping every Handle to a nodule does not evict it, and the
/// Nest may evict a Clean, unpinned nodule out from under a Handle that still names it.
#[derive(Clone)]
pub struct Handle<T> {
    inner: Arc<RwLock<Inner<T>>>,
}

struct Inner<T> {
    address: Address,
    resident: Option<T>,
    revision: u64,
    /// A stable, content-independent identity for this residency cell's lineage, used to derive
    /// a per-object symmetric key. `None` until a value is assigned (on creation, or read back
    /// off an envelope on load) — a Handle constructed via `from_address` doesn't know it yet.
    object_id: Option<[u8; 16]>,
}

impl<T> Handle<T> {
    /// A Handle referring to a previously persisted block at a real address. Not resident until
    /// [`crate::nest::Nest::load`] materializes it.
    pub fn from_address(address: Address) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                address,
                resident: None,
                revision: 0,
                object_id: None,
            })),
        }
    }

    /// A Handle for a freshly created, Dirty block: `Address::Pending`, with the resident value
    /// already in hand. Assigned a fresh `object_id` immediately, since a brand-new block needs
    /// one the first time it's sealed.
    pub fn new_dirty(resident: T) -> Self {
        use rand::Rng;
        let object_id = crate::utils::crypto_rng().gen();

        Self {
            inner: Arc::new(RwLock::new(Inner {
                address: Address::Pending,
                resident: Some(resident),
                revision: 0,
                object_id: Some(object_id),
            })),
        }
    }

    pub fn null() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                address: Address::Null,
                resident: None,
                revision: 0,
                object_id: None,
            })),
        }
    }

    pub async fn address(&self) -> Address {
        self.inner.read().await.address
    }

    pub async fn is_resident(&self) -> bool {
        self.inner.read().await.resident.is_some()
    }

    /// Records that the Nest has materialized the resident value (following a `load`).
    pub(crate) async fn set_resident(&self, value: T) {
        let mut inner = self.inner.write().await;
        inner.resident = Some(value);
    }

    /// Records that the Nest has evicted the resident value. The caller is responsible for
    /// ensuring no pin is outstanding.
    pub(crate) async fn clear_resident(&self) {
        let mut inner = self.inner.write().await;
        inner.resident = None;
    }

    /// Records the real address a checkpoint assigned to this block, turning `Pending` into
    /// `Hash`.
    pub(crate) async fn set_address(&self, address: Address) {
        let mut inner = self.inner.write().await;
        inner.address = address;
    }

    /// This cell's per-object key derivation identity, if one has been assigned yet.
    pub(crate) async fn object_id(&self) -> Option<[u8; 16]> {
        self.inner.read().await.object_id
    }

    /// Records the `object_id` read back off a freshly loaded envelope, so a later rewrite of
    /// this same cell derives the same per-object key rather than minting a new one.
    pub(crate) async fn set_object_id(&self, object_id: [u8; 16]) {
        let mut inner = self.inner.write().await;
        inner.object_id = Some(object_id);
    }

    /// Two Handles are identity-equal when this pointer is the same underlying residency cell —
    /// used to distinguish two `Pending` Handles that happen to wrap unrelated blocks, since
    /// `Pending` carries no content identity of its own.
    pub fn is_same_cell(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> Handle<T> {
    /// Returns a clone of the resident value, if any. Callers inside the Nest use this to hand
    /// out a materialized value without holding the lock across a suspension point; the pinning
    /// discipline in [`crate::nest::Nest`] is what actually guards against concurrent eviction.
    pub async fn resident(&self) -> Option<T> {
        self.inner.read().await.resident.clone()
    }
}

impl<T> Handle<T> {
    /// Runs `f` against the resident value under a read lock, without requiring `T: Clone`.
    /// Returns `None` when the block is not currently resident.
    pub(crate) async fn with_resident<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        self.inner.read().await.resident.as_ref().map(f)
    }

    /// Runs `f` against the resident value under a write lock, without requiring `T: Clone`.
    /// Returns `None` when the block is not currently resident.
    pub(crate) async fn with_resident_mut<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        self.inner.write().await.resident.as_mut().map(f)
    }

    /// A stable identity for this residency cell, used as a map key by [`crate::nest::Nest`]'s
    /// resident set. Distinct `Pending` handles never compare equal under this even though
    /// `Address::Pending` itself carries no content identity.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Runs an async closure against the resident value while holding the read lock, for
    /// operations (like nodule serialization) that need to suspend while borrowing the
    /// resident value. Returns `None` when the block is not currently resident.
    pub(crate) async fn with_resident_async<F, Fut, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> Fut,
        Fut: std::future::Future<Output = R>,
    {
        let guard = self.inner.read().await;
        match guard.resident.as_ref() {
            Some(value) => Some(f(value).await),
            None => None,
        }
    }

    /// Takes the resident value out of this cell, leaving it non-resident. Used when a nodule is
    /// being consumed wholesale (merged into a sibling, absorbed by `shrink`) rather than mutated
    /// in place.
    pub(crate) async fn take_resident(&self) -> Option<T> {
        self.inner.write().await.resident.take()
    }

    /// Assigns the next monotone revision number for this residency cell's lineage (the cell
    /// itself, stable across repeated rewrites under new content addresses).
    pub(crate) async fn next_revision(&self) -> u64 {
        let mut inner = self.inner.write().await;
        inner.revision += 1;
        inner.revision
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({:p})", Arc::as_ptr(&self.inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_handle_has_no_address_and_no_residency() {
        let handle: Handle<u32> = Handle::null();
        assert_eq!(handle.address().await, Address::Null);
        assert!(!handle.is_resident().await);
    }

    #[tokio::test]
    async fn dirty_handle_is_pending_and_resident() {
        let handle = Handle::new_dirty(7u32);
        assert_eq!(handle.address().await, Address::Pending);
        assert_eq!(handle.resident().await, Some(7));
    }

    #[tokio::test]
    async fn two_pending_handles_are_not_the_same_cell() {
        let a = Handle::new_dirty(1u32);
        let b = Handle::new_dirty(1u32);
        assert!(!a.is_same_cell(&b));
        assert!(a.is_same_cell(&a.clone()));
    }

    #[tokio::test]
    async fn checkpoint_promotes_pending_to_a_real_address() {
        let handle = Handle::new_dirty(1u32);
        let hash = crate::codec::crypto::Hash::of(b"nodule");
        handle.set_address(Address::from(hash)).await;
        assert_eq!(handle.address().await, Address::from(hash));
    }
}
