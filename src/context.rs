//! # Context
//!
//! The bundle of collaborators every tree operation needs: tuning parameters, the block store,
//! and the signing/verifying identity used to seal and open envelopes. Always threaded
//! explicitly through [`crate::porcupine::Porcupine`] and [`crate::nest::Nest`] — never global
//! state — so a process can host more than one tree with independent identities and stores.

use std::sync::Arc;

use crate::codec::crypto::{SigningKey, VerifyingKey, SymmetricKey};
use crate::config::Descriptor;
use crate::stores::BlockStore;

/// The writer identity and master symmetric key a [`crate::nest::Nest`] uses to seal and open
/// block envelopes. `symmetric_key` is never used to encrypt a payload directly — every nodule's
/// actual encryption key is derived from it combined with that nodule's own `object_id` (see
/// `Nest::derive_nodule_key`).
#[derive(Clone)]
pub struct CryptoContext {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
    pub symmetric_key: SymmetricKey,
}

impl CryptoContext {
    pub fn new(signing_key: SigningKey, symmetric_key: SymmetricKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            symmetric_key,
        }
    }
}

/// Everything a tree operation needs beyond the tree's own in-memory state.
#[derive(Clone)]
pub struct Context {
    pub descriptor: Descriptor,
    pub store: Arc<dyn BlockStore>,
    pub crypto: CryptoContext,
}

impl Context {
    pub fn new(descriptor: Descriptor, store: Arc<dyn BlockStore>, crypto: CryptoContext) -> Self {
        Self {
            descriptor,
            store,
            crypto,
        }
    }
}
