//! # Stores
//!
//! The Porcupine delegates all durability to implementations of the [`BlockStore`] trait: the
//! in-memory [`MemoryBlockStore`] here, or a caller-supplied implementation backed by disk,
//! object storage, or a network block repository.

mod memory_data_store;
mod traits;

pub use memory_data_store::MemoryBlockStore;
pub use traits::{BlockStore, StoreError};
