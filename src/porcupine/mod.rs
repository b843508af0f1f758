//! # Porcupine
//!
//! Tree-level algorithms tying the [`crate::nest::Nest`]'s resident-set management to the
//! per-node operations of [`crate::nodule`]: grow, shrink, search, insert, delete, and the paged
//! `consult` traversal used by callers that want a key range rather than a single key.

mod delete;
mod grow_shrink;
mod insert;

use async_recursion::async_recursion;

use crate::address::Handle;
use crate::config::Descriptor;
use crate::context::Context;
use crate::error::{PorcupineError, PorcupineResult};
use crate::nest::Nest;
use crate::nodule::{Footprint, Nodule, NoduleCodec};

use delete::{delete_from, RootChange};
use grow_shrink::{grow, shrink};
use insert::{insert_into, Candidate};

/// A content-addressed, revision-tracked, persistent ordered map. Keys and values are demand-
/// paged through a bounded [`Nest`]; every mutation marks the affected nodules Dirty, and
/// [`Porcupine::checkpoint`] (or an automatic one, per [`crate::config::CheckpointPolicy`])
/// writes the Dirty set back to the block store bottom-up.
pub struct Porcupine<K, V> {
    root: Handle<Nodule<K, V>>,
    height: usize,
    nest: Nest<K, V>,
    descriptor: Descriptor,
}

impl<K, V> Porcupine<K, V>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    /// An empty tree. The root isn't materialized until the first [`Porcupine::add`].
    pub fn new(context: Context) -> Self {
        let descriptor = context.descriptor.clone();
        Self {
            root: Handle::null(),
            height: 0,
            nest: Nest::new(context),
            descriptor,
        }
    }

    /// Inserts `value` under `key`. Fails with `AlreadyExists` if `key` is already present.
    pub async fn add(&mut self, key: K, value: V) -> PorcupineResult<()> {
        if self.height == 0 {
            // `grow` registers the new root with the Nest, which pins it once on its own
            // behalf; that pin is released the first time it's checkpointed.
            self.root = grow(&self.nest, &self.root, 0).await;
            self.height = 1;
        }

        let quill = self.descend(&key).await?;

        let already_present = quill
            .with_resident(|nodule| match nodule {
                Nodule::Quill(q) => q.get(&key).is_some(),
                Nodule::Seam(_) => false,
            })
            .await
            .unwrap_or(false);

        if already_present {
            self.nest.unpin(&quill).await;
            return Err(PorcupineError::AlreadyExists);
        }

        let is_root = quill.is_same_cell(&self.root);
        let outcome = insert_into(&self.nest, &self.descriptor, quill, key, Candidate::Value(value), is_root).await?;

        if let Some(new_root) = outcome.new_root {
            self.root = new_root;
            self.height += 1;
        }

        self.maybe_checkpoint().await?;
        Ok(())
    }

    /// Whether `key` is present.
    pub async fn exist(&mut self, key: &K) -> PorcupineResult<bool> {
        match self.locate(key).await {
            Ok(_) => Ok(true),
            Err(PorcupineError::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// The value stored under `key`. Fails with `NotFound` if absent.
    pub async fn locate(&mut self, key: &K) -> PorcupineResult<V> {
        if self.height == 0 {
            return Err(PorcupineError::NotFound);
        }

        let quill = self.descend(key).await?;
        let value = quill
            .with_resident(|nodule| match nodule {
                Nodule::Quill(q) => q.get(key).cloned(),
                Nodule::Seam(_) => None,
            })
            .await
            .flatten();

        self.nest.unpin(&quill).await;
        value.ok_or(PorcupineError::NotFound)
    }

    /// Deletes `key`. Fails with `NotFound` if absent.
    pub async fn remove(&mut self, key: &K) -> PorcupineResult<()> {
        if self.height == 0 {
            return Err(PorcupineError::NotFound);
        }

        let quill = self.descend(key).await?;
        let present = quill
            .with_resident(|nodule| match nodule {
                Nodule::Quill(q) => q.get(key).is_some(),
                Nodule::Seam(_) => false,
            })
            .await
            .unwrap_or(false);

        if !present {
            self.nest.unpin(&quill).await;
            return Err(PorcupineError::NotFound);
        }

        // `descend` leaves `quill` pinned via the same `Nest::load` call `delete_from` performs
        // again on entry; give up our pin first so the two don't double-count.
        self.nest.unpin(&quill).await;

        match delete_from(&self.nest, &self.descriptor, quill, key.clone()).await? {
            RootChange::Unaffected => {}
            RootChange::Emptied => {
                self.root = Handle::null();
                self.height = 0;
            }
            RootChange::BelowThreshold => {
                if let Some(new_root) = shrink(&self.nest, &self.root, self.height).await {
                    self.root = new_root;
                    self.height -= 1;
                }
            }
        }

        self.maybe_checkpoint().await?;
        Ok(())
    }

    /// Writes the Dirty set back to the block store, bottom-up.
    pub async fn checkpoint(&self) -> PorcupineResult<()> {
        self.nest.checkpoint().await.map_err(PorcupineError::from)
    }

    /// A page of up to `count` `(key, value)` pairs starting at the `offset`-th entry in key
    /// order, found by following the leaf chain's right-sibling links.
    pub async fn consult(&self, offset: usize, count: usize) -> PorcupineResult<Vec<(K, V)>> {
        if count == 0 || self.height == 0 {
            return Ok(Vec::new());
        }

        let mut current = self.leftmost_quill().await?;
        let mut skip = offset;
        let mut results = Vec::with_capacity(count);

        loop {
            let batch = current
                .with_resident(|nodule| match nodule {
                    Nodule::Quill(quill) => quill.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>(),
                    Nodule::Seam(_) => Vec::new(),
                })
                .await
                .unwrap_or_default();

            for pair in batch {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                results.push(pair);
                if results.len() == count {
                    self.nest.unpin(&current).await;
                    return Ok(results);
                }
            }

            let next = current.with_resident(|nodule| nodule.right().clone()).await;
            self.nest.unpin(&current).await;

            match next {
                Some(next) if !next.address().await.is_null() => {
                    self.nest.load(&next).await?;
                    current = next;
                }
                _ => break,
            }
        }

        Ok(results)
    }

    /// Audits the tree against its structural invariants: every nodule's footprint fits
    /// `extent`, every seam inlet's key matches its child's `mayor()`, seam inlets are in key
    /// order, and every leaf sits at the same depth recorded as `height`.
    pub async fn check(&self) -> PorcupineResult<()> {
        if self.height == 0 {
            if !self.root.address().await.is_null() {
                return Err(PorcupineError::InvariantViolation(
                    "height is 0 but the root handle is not null".into(),
                ));
            }
            return Ok(());
        }

        self.nest.load(&self.root).await?;
        let leaf_depth = check_node(&self.nest, &self.descriptor, &self.root, 1, None).await?;
        self.nest.unpin(&self.root).await;

        if leaf_depth != self.height {
            return Err(PorcupineError::InvariantViolation(format!(
                "recorded height {} does not match the observed leaf depth {}",
                self.height, leaf_depth
            )));
        }

        Ok(())
    }

    /// Descends from the (already materialized) root to the quill that would own `key`. The
    /// returned handle is pinned; the caller is responsible for unpinning it.
    async fn descend(&self, key: &K) -> PorcupineResult<Handle<Nodule<K, V>>> {
        self.nest.load(&self.root).await?;
        let mut current = self.root.clone();

        loop {
            let child = current
                .with_resident(|nodule| match nodule {
                    Nodule::Seam(seam) => seam.locate(key).ok().cloned(),
                    Nodule::Quill(_) => None,
                })
                .await
                .flatten();

            let Some(child) = child else { break };

            self.nest.load(&child).await?;
            self.nest.unpin(&current).await;
            current = child;
        }

        Ok(current)
    }

    async fn leftmost_quill(&self) -> PorcupineResult<Handle<Nodule<K, V>>> {
        self.nest.load(&self.root).await?;
        let mut current = self.root.clone();

        loop {
            let child = current
                .with_resident(|nodule| match nodule {
                    Nodule::Seam(seam) => seam.iter().next().map(|(_, child)| child.clone()),
                    Nodule::Quill(_) => None,
                })
                .await
                .flatten();

            let Some(child) = child else { break };

            self.nest.load(&child).await?;
            self.nest.unpin(&current).await;
            current = child;
        }

        Ok(current)
    }

    async fn maybe_checkpoint(&self) -> PorcupineResult<()> {
        if matches!(self.descriptor.checkpoint_policy, crate::config::CheckpointPolicy::OnQuiesce) {
            self.checkpoint().await?;
        }
        Ok(())
    }
}

#[async_recursion(?Send)]
async fn check_node<K, V>(
    nest: &Nest<K, V>,
    descriptor: &Descriptor,
    node: &Handle<Nodule<K, V>>,
    depth: usize,
    expected_parent: Option<&Handle<Nodule<K, V>>>,
) -> PorcupineResult<usize>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    nest.load(node).await?;

    if let Some(expected_parent) = expected_parent {
        let parent_matches = node
            .with_resident(|nodule| nodule.parent().is_same_cell(expected_parent))
            .await
            .unwrap_or(false);
        if !parent_matches {
            nest.unpin(node).await;
            return Err(PorcupineError::InvariantViolation(format!(
                "nodule at depth {depth} does not point back to its actual parent"
            )));
        }
    }

    let footprint = node.with_resident(|nodule| nodule.footprint()).await.unwrap_or(0);
    if footprint > descriptor.extent {
        nest.unpin(node).await;
        return Err(PorcupineError::InvariantViolation(format!(
            "nodule at depth {depth} has footprint {footprint} exceeding extent {}",
            descriptor.extent
        )));
    }

    let children = node
        .with_resident(|nodule| match nodule {
            Nodule::Seam(seam) => Some(seam.iter().map(|(k, child)| (k.clone(), child.clone())).collect::<Vec<_>>()),
            Nodule::Quill(_) => None,
        })
        .await
        .flatten();

    let Some(children) = children else {
        nest.unpin(node).await;
        return Ok(depth);
    };

    let mut previous_key: Option<&K> = None;
    for (key, _) in &children {
        if let Some(previous_key) = previous_key {
            if previous_key >= key {
                nest.unpin(node).await;
                return Err(PorcupineError::InvariantViolation(format!(
                    "seam at depth {depth} has out-of-order inlets"
                )));
            }
        }
        previous_key = Some(key);
    }

    let mut leaf_depth = None;
    for (key, child) in &children {
        let child_mayor = child.with_resident(|nodule| nodule.mayor()).await.flatten();
        if child_mayor.as_ref() != Some(key) {
            nest.unpin(node).await;
            return Err(PorcupineError::InvariantViolation(format!(
                "seam inlet at depth {depth} does not match its child's mayor"
            )));
        }

        let this_leaf_depth = check_node(nest, descriptor, child, depth + 1, Some(node)).await?;
        match leaf_depth {
            None => leaf_depth = Some(this_leaf_depth),
            Some(expected) if expected != this_leaf_depth => {
                nest.unpin(node).await;
                return Err(PorcupineError::InvariantViolation(
                    "leaves are not all at the same depth".into(),
                ));
            }
            _ => {}
        }
    }

    nest.unpin(node).await;
    Ok(leaf_depth.expect("a seam always has at least one child"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::crypto::{SigningKey, SymmetricKey};
    use crate::context::CryptoContext;
    use crate::stores::MemoryBlockStore;
    use std::sync::Arc;

    fn test_porcupine(descriptor: Descriptor) -> Porcupine<Vec<u8>, Vec<u8>> {
        let mut rng = crate::utils::crypto_rng();
        let crypto = CryptoContext::new(SigningKey::generate(&mut rng), SymmetricKey::generate(&mut rng));
        let store = Arc::new(MemoryBlockStore::new());
        Porcupine::new(Context::new(descriptor, store, crypto))
    }

    fn key(n: u8) -> Vec<u8> {
        vec![n]
    }

    #[tokio::test]
    async fn add_then_locate_round_trips() {
        let mut tree = test_porcupine(Descriptor::default());
        tree.add(key(1), b"hello".to_vec()).await.unwrap();

        assert_eq!(tree.locate(&key(1)).await.unwrap(), b"hello".to_vec());
        assert!(tree.exist(&key(1)).await.unwrap());
        assert!(!tree.exist(&key(2)).await.unwrap());
    }

    #[tokio::test]
    async fn add_rejects_a_duplicate_key() {
        let mut tree = test_porcupine(Descriptor::default());
        tree.add(key(1), b"a".to_vec()).await.unwrap();

        assert!(matches!(tree.add(key(1), b"b".to_vec()).await, Err(PorcupineError::AlreadyExists)));
    }

    #[tokio::test]
    async fn remove_makes_a_key_unfindable() {
        let mut tree = test_porcupine(Descriptor::default());
        tree.add(key(1), b"a".to_vec()).await.unwrap();
        tree.remove(&key(1)).await.unwrap();

        assert!(!tree.exist(&key(1)).await.unwrap());
        assert!(matches!(tree.remove(&key(1)).await, Err(PorcupineError::NotFound)));
    }

    #[tokio::test]
    async fn tree_grows_height_across_many_splitting_inserts() {
        let descriptor = Descriptor {
            extent: 512,
            ..Descriptor::default()
        };
        let mut tree = test_porcupine(descriptor);

        for n in 0..200u32 {
            let k = n.to_be_bytes().to_vec();
            tree.add(k, vec![0u8; 8]).await.unwrap();
        }

        for n in 0..200u32 {
            let k = n.to_be_bytes().to_vec();
            assert!(tree.exist(&k).await.unwrap());
        }

        tree.check().await.unwrap();
    }

    #[tokio::test]
    async fn consult_pages_through_keys_in_order() {
        let descriptor = Descriptor {
            extent: 512,
            ..Descriptor::default()
        };
        let mut tree = test_porcupine(descriptor);

        for n in 0..64u32 {
            tree.add(n.to_be_bytes().to_vec(), vec![1u8; 4]).await.unwrap();
        }

        let page = tree.consult(10, 5).await.unwrap();
        assert_eq!(page.len(), 5);
        for (i, (k, _)) in page.iter().enumerate() {
            assert_eq!(*k, ((10 + i) as u32).to_be_bytes().to_vec());
        }
    }

    #[tokio::test]
    async fn deleting_every_key_collapses_the_tree_back_to_height_zero() {
        let descriptor = Descriptor {
            extent: 512,
            ..Descriptor::default()
        };
        let mut tree = test_porcupine(descriptor);

        let keys: Vec<Vec<u8>> = (0..200u32).map(|n| n.to_be_bytes().to_vec()).collect();
        for k in &keys {
            tree.add(k.clone(), vec![0u8; 8]).await.unwrap();
        }
        for k in &keys {
            tree.remove(k).await.unwrap();
        }

        assert_eq!(tree.height, 0);
        for k in &keys {
            assert!(!tree.exist(k).await.unwrap());
        }
    }
}
