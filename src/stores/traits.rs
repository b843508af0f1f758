use async_trait::async_trait;

use crate::address::Address;
use crate::envelope::BlockEnvelope;

/// The external block repository (the "hole", in Infinit's own terminology). The tree never
/// assumes anything about durability or replication strategy beyond this contract: content
/// addresses make `put` idempotent by construction, so the store only needs to serialize
/// concurrent writes to the same address or tolerate redundant ones.
#[async_trait(?Send)]
pub trait BlockStore {
    /// Fetches a previously stored envelope. `NotFound` when the address is unknown to this
    /// store; callers treat this the same whether the block genuinely never existed or has been
    /// garbage collected.
    async fn get(&self, address: &Address) -> Result<BlockEnvelope, StoreError>;

    /// Stores `envelope`, returning its content address. Storing the same bytes twice must yield
    /// the same address and must not be treated as an error.
    async fn put(&self, envelope: BlockEnvelope) -> Result<Address, StoreError>;

    /// Best-effort removal. The tree never depends on `erase` succeeding for correctness — a
    /// block that's still referenced will simply be re-fetched, and one that failed to erase is
    /// merely wasted space.
    async fn erase(&self, address: &Address) -> Result<(), StoreError>;

    /// Recovers the current root address for a mutable-root lineage (used on reopen). Lineages
    /// that have never been checkpointed return `NotFound`.
    async fn latest(&self, lineage: &str) -> Result<Address, StoreError>;

    /// Records `address` as the current root for `lineage`, for later recovery via `latest`.
    async fn set_latest(&self, lineage: &str, address: Address) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("requested block is not available in this store")]
    NotFound,

    #[error("failed to store block")]
    StoreFailure,

    #[error("failed to retrieve block")]
    LookupFailure,
}
