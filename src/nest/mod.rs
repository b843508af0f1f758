//! # Nest
//!
//! The resident-set manager: demand-loads nodules from the block store, tracks which are Dirty,
//! pins them against eviction while in use, and runs the bottom-up write-back protocol on
//! `checkpoint`. The Nest is the sole mutator of the resident set; nothing else is allowed to set
//! or clear a Handle's resident pointer directly.

use std::collections::HashMap;

use async_std::sync::RwLock;
use lru::LruCache;

use crate::address::{Address, Handle};
use crate::codec::crypto::{Hash, SymmetricKey};
use crate::context::Context;
use crate::envelope::{BlockEnvelope, ComponentTag};
use crate::nodule::{codec, Footprint, Nodule, NoduleCodec, State};

/// Domain separator for deriving a nodule's per-object symmetric key from its `object_id`.
const NODULE_KEY_CONTEXT: &str = "porcupine.nodule.v1";

struct Entry<K, V> {
    handle: Handle<Nodule<K, V>>,
    pins: usize,
}

/// Demand-paged, bounded resident set of nodules for one [`crate::porcupine::Porcupine`].
pub struct Nest<K, V> {
    context: Context,
    entries: RwLock<HashMap<usize, Entry<K, V>>>,
    lru: RwLock<LruCache<usize, ()>>,
}

impl<K, V> Nest<K, V>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    pub fn new(context: Context) -> Self {
        Self {
            context,
            entries: RwLock::new(HashMap::new()),
            lru: RwLock::new(LruCache::unbounded()),
        }
    }

    /// Declares a freshly created, Dirty nodule to the Nest. Pinned until the caller `unpin`s it
    /// or the next checkpoint clears it.
    pub async fn register(&self, handle: Handle<Nodule<K, V>>) {
        let id = handle.identity();
        self.entries.write().await.insert(
            id,
            Entry {
                handle,
                pins: 1,
            },
        );
        self.lru.write().await.pop(&id);
    }

    /// Returns a resident, pinned Handle for `handle`, fetching and decoding through the block
    /// store if it isn't already resident.
    pub async fn load(&self, handle: &Handle<Nodule<K, V>>) -> Result<(), NestError> {
        self.pin(handle).await;

        if handle.is_resident().await {
            return Ok(());
        }

        let address = handle.address().await;
        let real_hash = match address {
            Address::Hash(hash) => hash,
            Address::Null => {
                self.unpin(handle).await;
                return Err(NestError::NotFound);
            }
            Address::Pending => {
                self.unpin(handle).await;
                return Err(NestError::NotFound);
            }
        };

        let result = self.load_from_store(real_hash).await;

        match result {
            Ok((nodule, object_id)) => {
                handle.set_resident(nodule).await;
                handle.set_object_id(object_id).await;
                let id = handle.identity();
                self.entries.write().await.entry(id).or_insert_with(|| Entry {
                    handle: handle.clone(),
                    pins: 0,
                });
                self.lru.write().await.pop(&id);
                Ok(())
            }
            Err(err) => {
                self.unpin(handle).await;
                Err(err)
            }
        }
    }

    /// Fetches and decrypts the block at `hash`, returning the decoded nodule alongside the
    /// `object_id` its per-object key was derived from, so the caller can remember it on the
    /// Handle for the next rewrite.
    async fn load_from_store(&self, hash: Hash) -> Result<(Nodule<K, V>, [u8; 16]), NestError> {
        let envelope = self
            .context
            .store
            .get(&Address::Hash(hash))
            .await
            .map_err(|_| NestError::NotFound)?;

        let object_id = envelope.object_id();
        let symmetric_key = self.derive_nodule_key(object_id);

        let plaintext = envelope
            .open(&self.context.crypto.verifying_key, &symmetric_key)
            .map_err(NestError::IntegrityFailure)?;

        let nodule: Nodule<K, V> = codec::decode_nodule(&plaintext).map_err(|_| NestError::DecodeFailure)?;

        let expected_tag = if nodule.is_seam() { ComponentTag::Seam } else { ComponentTag::Quill };
        if envelope.tag() != expected_tag {
            return Err(NestError::DecodeFailure);
        }

        Ok((nodule, object_id))
    }

    /// Scoped pin: the resident pointer remains valid (won't be evicted) until a matching
    /// `unpin`.
    pub async fn pin(&self, handle: &Handle<Nodule<K, V>>) {
        let id = handle.identity();
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(entry) => entry.pins += 1,
            None => {
                entries.insert(
                    id,
                    Entry {
                        handle: handle.clone(),
                        pins: 1,
                    },
                );
            }
        }
        drop(entries);
        self.lru.write().await.pop(&id);
    }

    pub async fn unpin(&self, handle: &Handle<Nodule<K, V>>) {
        let id = handle.identity();
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&id) {
            entry.pins = entry.pins.saturating_sub(1);
            if entry.pins == 0 {
                drop(entries);
                self.lru.write().await.put(id, ());
            }
        }
    }

    /// Transitions `handle`'s resident nodule to Dirty.
    pub async fn mark_dirty(&self, handle: &Handle<Nodule<K, V>>) {
        handle.with_resident_mut(|nodule| nodule.mark_dirty()).await;
    }

    /// Unconditionally drops `handle` from the resident set, regardless of pin count. Used when a
    /// nodule leaves the tree for good (absorbed by a merge, or emptied and unlinked) rather than
    /// merely falling out of cache.
    pub async fn forget(&self, handle: &Handle<Nodule<K, V>>) {
        let id = handle.identity();
        self.entries.write().await.remove(&id);
        self.lru.write().await.pop(&id);
    }

    /// LRU eviction among Clean, unpinned residents only. The resident set is kept in `lru`
    /// exactly when unpinned (pinning always pops an id out), but an unpinned entry may still be
    /// Dirty, so this walks from least- to most-recently-used looking for the first Clean one.
    pub async fn evict_if_possible(&self) -> bool {
        let candidates: Vec<usize> = {
            let lru = self.lru.read().await;
            lru.iter().rev().map(|(id, _)| *id).collect()
        };

        for id in candidates {
            let entry_handle = {
                let entries = self.entries.read().await;
                entries.get(&id).map(|entry| entry.handle.clone())
            };

            let Some(handle) = entry_handle else {
                continue;
            };

            let is_clean = handle
                .with_resident(|nodule| nodule.state() == State::Clean)
                .await
                .unwrap_or(false);

            if !is_clean {
                continue;
            }

            handle.clear_resident().await;
            self.lru.write().await.pop(&id);
            self.entries.write().await.remove(&id);

            return true;
        }

        false
    }

    /// Evicts down to `capacity` resident nodules, best-effort (Dirty/pinned residents are left
    /// in place even if that means staying over capacity).
    pub async fn enforce_capacity(&self) {
        while self.entries.read().await.len() > self.context.descriptor.resident_capacity {
            if !self.evict_if_possible().await {
                break;
            }
        }
    }

    /// Bottom-up write-back over the Dirty set: topologically orders Dirty nodules so that
    /// children precede parents, then for each one serializes, encrypts, signs, hashes,
    /// persists, and marks it Clean. Aborts without mutating any Handle or state on the first
    /// failure.
    pub async fn checkpoint(&self) -> Result<(), NestError> {
        let mut pending: Vec<usize> = {
            let entries = self.entries.read().await;
            let mut dirty = Vec::new();
            for (id, entry) in entries.iter() {
                let is_dirty = entry
                    .handle
                    .with_resident(|nodule| nodule.state() == State::Dirty)
                    .await
                    .unwrap_or(false);
                if is_dirty {
                    dirty.push(*id);
                }
            }
            dirty
        };

        while !pending.is_empty() {
            let mut next_round = Vec::with_capacity(pending.len());
            let mut progressed = false;

            for id in pending {
                let handle = {
                    let entries = self.entries.read().await;
                    entries.get(&id).map(|entry| entry.handle.clone())
                };
                let Some(handle) = handle else { continue };

                if self.children_resolved(&handle).await {
                    self.write_back(&handle).await?;
                    progressed = true;
                } else {
                    next_round.push(id);
                }
            }

            if !progressed {
                return Err(NestError::Cycle);
            }
            pending = next_round;
        }

        Ok(())
    }

    /// The per-object key a single nodule's payload is encrypted under: the context-wide master
    /// symmetric key, diversified by the nodule's own `object_id` so no two nodules share a key
    /// even though they all trace back to the same `CryptoContext`.
    fn derive_nodule_key(&self, object_id: [u8; 16]) -> SymmetricKey {
        let mut keying_material = Vec::with_capacity(SymmetricKey::size() + object_id.len());
        keying_material.extend_from_slice(self.context.crypto.symmetric_key.as_bytes());
        keying_material.extend_from_slice(&object_id);
        SymmetricKey::derive_symmetric(&keying_material, NODULE_KEY_CONTEXT)
    }

    async fn children_resolved(&self, handle: &Handle<Nodule<K, V>>) -> bool {
        let children = handle
            .with_resident(|nodule| match nodule {
                Nodule::Seam(seam) => seam.iter().map(|(_, child)| child.clone()).collect::<Vec<_>>(),
                Nodule::Quill(_) => Vec::new(),
            })
            .await
            .unwrap_or_default();

        for child in children {
            if child.address().await.is_pending() {
                return false;
            }
        }
        true
    }

    async fn write_back(&self, handle: &Handle<Nodule<K, V>>) -> Result<(), NestError> {
        let tag = handle
            .with_resident(|nodule| {
                if nodule.is_seam() {
                    ComponentTag::Seam
                } else {
                    ComponentTag::Quill
                }
            })
            .await
            .ok_or(NestError::NotFound)?;

        let encoded = handle
            .with_resident_async(|nodule| codec::encode_nodule(nodule))
            .await
            .ok_or(NestError::NotFound)?
            .map_err(|_| NestError::DecodeFailure)?;

        let revision = handle.next_revision().await;

        let mut rng = crate::utils::crypto_rng();

        // A brand-new cell gets a fresh object id on its first write-back; a cell that's been
        // rewritten (or loaded back in) keeps the one it already has, so every revision of the
        // same nodule derives the same per-object key.
        let object_id = match handle.object_id().await {
            Some(object_id) => object_id,
            None => {
                let object_id: [u8; 16] = rand::Rng::gen(&mut rng);
                handle.set_object_id(object_id).await;
                object_id
            }
        };
        let symmetric_key = self.derive_nodule_key(object_id);

        let envelope = BlockEnvelope::seal(
            &mut rng,
            tag,
            revision,
            object_id,
            encoded,
            &symmetric_key,
            &self.context.crypto.signing_key,
        )
        .map_err(NestError::IntegrityFailure)?;

        let address = self
            .context
            .store
            .put(envelope)
            .await
            .map_err(|_| NestError::StoreFailure)?;

        handle.set_address(address).await;
        handle.with_resident_mut(|nodule| nodule.mark_clean()).await;

        // Drops the implicit pin `register` took out on the nodule's behalf; a caller with its
        // own scoped pin still outstanding keeps the nodule resident regardless.
        self.unpin(handle).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codec::crypto::{SigningKey, SymmetricKey};
    use crate::config::Descriptor;
    use crate::context::CryptoContext;
    use crate::stores::MemoryBlockStore;

    fn test_context() -> Context {
        let mut rng = crate::utils::crypto_rng();
        let signing_key = SigningKey::generate(&mut rng);
        let symmetric_key = SymmetricKey::generate(&mut rng);
        let crypto = CryptoContext::new(signing_key, symmetric_key);
        let store = Arc::new(MemoryBlockStore::new());
        Context::new(Descriptor::default(), store, crypto)
    }

    #[tokio::test]
    async fn register_then_checkpoint_promotes_pending_to_real_address() {
        let nest: Nest<Vec<u8>, Vec<u8>> = Nest::new(test_context());

        let mut quill = crate::nodule::Quill::new();
        quill.insert(b"k".to_vec(), b"v".to_vec());
        let handle = Handle::new_dirty(Nodule::Quill(quill));

        nest.register(handle.clone()).await;
        assert!(handle.address().await.is_pending());

        nest.checkpoint().await.unwrap();
        assert!(matches!(handle.address().await, Address::Hash(_)));
    }

    #[tokio::test]
    async fn checkpoint_is_idempotent_once_clean() {
        let nest: Nest<Vec<u8>, Vec<u8>> = Nest::new(test_context());

        let mut quill = crate::nodule::Quill::new();
        quill.insert(b"k".to_vec(), b"v".to_vec());
        let handle = Handle::new_dirty(Nodule::Quill(quill));
        nest.register(handle.clone()).await;

        nest.checkpoint().await.unwrap();
        let address_after_first = handle.address().await;

        nest.checkpoint().await.unwrap();
        assert_eq!(handle.address().await, address_after_first);
    }

    #[tokio::test]
    async fn evict_if_possible_leaves_dirty_nodules_resident() {
        let nest: Nest<Vec<u8>, Vec<u8>> = Nest::new(test_context());

        let mut quill = crate::nodule::Quill::new();
        quill.insert(b"k".to_vec(), b"v".to_vec());
        let handle = Handle::new_dirty(Nodule::Quill(quill));
        nest.register(handle.clone()).await;
        nest.unpin(&handle).await;

        assert!(!nest.evict_if_possible().await);
        assert!(handle.is_resident().await);
    }

    #[tokio::test]
    async fn evict_if_possible_reclaims_a_clean_unpinned_nodule() {
        let nest: Nest<Vec<u8>, Vec<u8>> = Nest::new(test_context());

        let mut quill = crate::nodule::Quill::new();
        quill.insert(b"k".to_vec(), b"v".to_vec());
        let handle = Handle::new_dirty(Nodule::Quill(quill));
        nest.register(handle.clone()).await;

        nest.checkpoint().await.unwrap();
        nest.unpin(&handle).await;

        assert!(nest.evict_if_possible().await);
        assert!(!handle.is_resident().await);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NestError {
    #[error("requested block is not resident and could not be loaded")]
    NotFound,

    #[error("block failed its integrity check on load")]
    IntegrityFailure(#[from] crate::envelope::EnvelopeError),

    #[error("block store operation failed during load or write-back")]
    StoreFailure,

    #[error("failed to decode a block's nodule structure")]
    DecodeFailure,

    #[error("checkpoint could not make progress; the dirty set contains a reference cycle")]
    Cycle,
}
