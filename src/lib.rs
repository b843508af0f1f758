#![allow(unused_variables)]
#![allow(dead_code)]
#![allow(unused_imports)]

//! # Porcupine
//!
//! A content-addressed, revision-tracked, cryptographically signed, persistent ordered map.
//! Demand-paged through a bounded resident set (the [`nest`]), rebalanced by byte footprint
//! rather than fan-out, and checkpointed to a pluggable [`stores::BlockStore`] bottom-up.

pub mod address;
pub mod codec;
pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod nest;
pub mod nodule;
pub mod porcupine;
pub mod stores;
pub mod utils;
pub mod version;

pub mod prelude {
    pub use crate::address::{Address, Handle};
    pub use crate::config::{CheckpointPolicy, Descriptor};
    pub use crate::context::{Context, CryptoContext};
    pub use crate::error::{PorcupineError, PorcupineResult};
    pub use crate::porcupine::Porcupine;
    pub use crate::stores::{BlockStore, StoreError};

    pub use crate::codec::crypto::{SigningKey, SymmetricKey, VerifyingKey};
}
