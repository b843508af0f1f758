use std::collections::HashMap;

use async_std::sync::RwLock;
use async_trait::async_trait;

use crate::address::Address;
use crate::envelope::BlockEnvelope;
use crate::stores::{BlockStore, StoreError};

/// An in-memory [`BlockStore`], useful for tests and for short-lived trees that never need to
/// survive a process restart.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Address, BlockEnvelope>>,
    roots: RwLock<HashMap<String, Address>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait(?Send)]
impl BlockStore for MemoryBlockStore {
    async fn get(&self, address: &Address) -> Result<BlockEnvelope, StoreError> {
        let blocks = self.blocks.read().await;
        blocks.get(address).cloned().ok_or(StoreError::NotFound)
    }

    async fn put(&self, envelope: BlockEnvelope) -> Result<Address, StoreError> {
        let address = envelope
            .address()
            .await
            .map_err(|_| StoreError::StoreFailure)?;

        let mut blocks = self.blocks.write().await;
        // Content addresses make puts idempotent: storing identical bytes twice is a no-op, not
        // an overwrite of potentially-different-but-colliding data.
        blocks.entry(address).or_insert(envelope);

        Ok(address)
    }

    async fn erase(&self, address: &Address) -> Result<(), StoreError> {
        let mut blocks = self.blocks.write().await;
        blocks.remove(address);
        Ok(())
    }

    async fn latest(&self, lineage: &str) -> Result<Address, StoreError> {
        let roots = self.roots.read().await;
        roots.get(lineage).copied().ok_or(StoreError::NotFound)
    }

    async fn set_latest(&self, lineage: &str, address: Address) -> Result<(), StoreError> {
        let mut roots = self.roots.write().await;
        roots.insert(lineage.to_string(), address);
        Ok(())
    }
}
