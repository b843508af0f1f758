use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use porcupine::address::Address;
use porcupine::codec::crypto::{SigningKey, SymmetricKey};
use porcupine::config::Descriptor;
use porcupine::context::{Context, CryptoContext};
use porcupine::envelope::BlockEnvelope;
use porcupine::error::PorcupineError;
use porcupine::porcupine::Porcupine;
use porcupine::stores::{BlockStore, MemoryBlockStore, StoreError};

fn key(n: u32) -> Vec<u8> {
    n.to_be_bytes().to_vec()
}

fn test_context(descriptor: Descriptor, store: Arc<dyn BlockStore>) -> Context {
    let mut rng = porcupine::utils::crypto_rng();
    let crypto = CryptoContext::new(SigningKey::generate(&mut rng), SymmetricKey::generate(&mut rng));
    Context::new(descriptor, store, crypto)
}

fn seed_descriptor() -> Descriptor {
    Descriptor {
        extent: 256,
        balancing: 0.5,
        ..Descriptor::default()
    }
}

fn new_tree(descriptor: Descriptor) -> Porcupine<Vec<u8>, Vec<u8>> {
    let store = Arc::new(MemoryBlockStore::new());
    Porcupine::new(test_context(descriptor, store))
}

#[tokio::test]
async fn grow_then_shrink() {
    let mut tree = new_tree(seed_descriptor());

    tree.add(key(1), vec![0u8; 4]).await.unwrap();
    tree.remove(&key(1)).await.unwrap();

    tree.check().await.unwrap();
    assert!(!tree.exist(&key(1)).await.unwrap());
}

#[tokio::test]
async fn split_on_the_33rd_insert() {
    let mut tree = new_tree(seed_descriptor());

    for n in 1..=33u32 {
        tree.add(key(n), vec![0u8; 4]).await.unwrap();
    }

    tree.check().await.unwrap();
    for n in 1..=33u32 {
        assert_eq!(tree.locate(&key(n)).await.unwrap(), vec![0u8; 4]);
    }
}

#[tokio::test]
async fn cascading_split_to_a_deep_tree() {
    let mut tree = new_tree(seed_descriptor());

    for n in 1..=1024u32 {
        tree.add(key(n), vec![0u8; 4]).await.unwrap();
    }

    tree.check().await.unwrap();
    for n in 1..=1024u32 {
        assert_eq!(tree.locate(&key(n)).await.unwrap(), vec![0u8; 4]);
    }
}

#[tokio::test]
async fn prefer_dirty_merge_after_a_run_of_removals() {
    let mut tree = new_tree(seed_descriptor());

    for n in 1..=1024u32 {
        tree.add(key(n), vec![0u8; 4]).await.unwrap();
    }

    for n in 33..=48u32 {
        tree.remove(&key(n)).await.unwrap();
    }

    tree.check().await.unwrap();
    for n in 1..=1024u32 {
        let expected_present = !(33..=48).contains(&n);
        assert_eq!(tree.exist(&key(n)).await.unwrap(), expected_present);
    }
}

#[tokio::test]
async fn removing_down_to_one_child_shrinks_the_root() {
    let mut tree = new_tree(seed_descriptor());

    for n in 1..=64u32 {
        tree.add(key(n), vec![0u8; 4]).await.unwrap();
    }
    tree.check().await.unwrap();

    for n in 1..=40u32 {
        tree.remove(&key(n)).await.unwrap();
    }

    tree.check().await.unwrap();
    for n in 41..=64u32 {
        assert!(tree.exist(&key(n)).await.unwrap());
    }
}

/// Wraps a [`MemoryBlockStore`], failing the Nth `put` call and succeeding thereafter. Used to
/// exercise checkpoint atomicity under a mid-write-back storage failure.
struct FlakyBlockStore {
    inner: MemoryBlockStore,
    fail_on_put: usize,
    puts: AtomicUsize,
}

impl FlakyBlockStore {
    fn new(fail_on_put: usize) -> Self {
        Self {
            inner: MemoryBlockStore::new(),
            fail_on_put,
            puts: AtomicUsize::new(0),
        }
    }
}

#[async_trait(?Send)]
impl BlockStore for FlakyBlockStore {
    async fn get(&self, address: &Address) -> Result<BlockEnvelope, StoreError> {
        self.inner.get(address).await
    }

    async fn put(&self, envelope: BlockEnvelope) -> Result<Address, StoreError> {
        let count = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if count == self.fail_on_put {
            return Err(StoreError::StoreFailure);
        }
        self.inner.put(envelope).await
    }

    async fn erase(&self, address: &Address) -> Result<(), StoreError> {
        self.inner.erase(address).await
    }

    async fn latest(&self, lineage: &str) -> Result<Address, StoreError> {
        self.inner.latest(lineage).await
    }

    async fn set_latest(&self, lineage: &str, address: Address) -> Result<(), StoreError> {
        self.inner.set_latest(lineage, address).await
    }
}

#[tokio::test]
async fn checkpoint_atomicity_under_a_mid_write_back_failure() {
    let descriptor = Descriptor {
        checkpoint_policy: porcupine::config::CheckpointPolicy::Manual,
        ..seed_descriptor()
    };
    let store = Arc::new(FlakyBlockStore::new(3));
    let mut tree = Porcupine::new(test_context(descriptor, store));

    for n in 1..=64u32 {
        tree.add(key(n), vec![0u8; 4]).await.unwrap();
    }

    let result = tree.checkpoint().await;
    assert!(matches!(result, Err(PorcupineError::LoadFailure(_))));

    for n in 1..=64u32 {
        assert_eq!(tree.locate(&key(n)).await.unwrap(), vec![0u8; 4]);
    }

    tree.checkpoint().await.unwrap();
    tree.check().await.unwrap();
}
