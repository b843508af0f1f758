use crate::address::Handle;
use crate::nest::Nest;
use crate::nodule::{Footprint, Nodule, NoduleCodec, Quill, Seam};

/// Grows the tree by one level. If empty, the new root is an empty quill; otherwise a new seam
/// is created holding a single inlet (the old root's mayor -> old root), and the old root's
/// parent is pointed at it.
pub(super) async fn grow<K, V>(
    nest: &Nest<K, V>,
    root: &Handle<Nodule<K, V>>,
    height: usize,
) -> Handle<Nodule<K, V>>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    if height == 0 {
        let quill = Quill::new();
        let new_root = Handle::new_dirty(Nodule::Quill(quill));
        nest.register(new_root.clone()).await;
        return new_root;
    }

    let mayor = root
        .with_resident(|nodule| nodule.mayor())
        .await
        .flatten()
        .expect("a non-empty root always has a mayor");

    let mut seam: Seam<K, V> = Seam::new();
    seam.insert(mayor, root.clone());
    let new_root = Handle::new_dirty(Nodule::Seam(seam));
    nest.register(new_root.clone()).await;

    root.with_resident_mut(|nodule| nodule.set_parent(new_root.clone())).await;

    new_root
}

/// Shrinks the tree by one level. Only meaningful when `height >= 2`: the root seam's sole
/// surviving child becomes the new root. No-op (returns `None`) otherwise.
pub(super) async fn shrink<K, V>(
    nest: &Nest<K, V>,
    root: &Handle<Nodule<K, V>>,
    height: usize,
) -> Option<Handle<Nodule<K, V>>>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    if height < 2 {
        return None;
    }

    nest.load(root).await.ok()?;

    let maiden = root
        .with_resident(|nodule| match nodule {
            Nodule::Seam(seam) => seam.only_child().ok(),
            Nodule::Quill(_) => None,
        })
        .await
        .flatten()?;

    maiden.with_resident_mut(|nodule| nodule.set_parent(Handle::null())).await;
    nest.forget(root).await;

    Some(maiden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::crypto::{SigningKey, SymmetricKey};
    use crate::config::Descriptor;
    use crate::context::{Context, CryptoContext};
    use crate::stores::MemoryBlockStore;
    use std::sync::Arc;

    fn test_nest() -> Nest<Vec<u8>, Vec<u8>> {
        let mut rng = crate::utils::crypto_rng();
        let crypto = CryptoContext::new(SigningKey::generate(&mut rng), SymmetricKey::generate(&mut rng));
        let store = Arc::new(MemoryBlockStore::new());
        Nest::new(Context::new(Descriptor::default(), store, crypto))
    }

    #[tokio::test]
    async fn grow_from_empty_makes_an_empty_quill_root() {
        let nest = test_nest();
        let root = Handle::null();
        let new_root = grow(&nest, &root, 0).await;

        let is_quill = new_root.with_resident(|n| n.is_quill()).await.unwrap();
        assert!(is_quill);
    }

    #[tokio::test]
    async fn grow_from_a_populated_root_wraps_it_in_a_seam() {
        let nest = test_nest();
        let mut quill = Quill::new();
        quill.insert(b"a".to_vec(), b"1".to_vec());
        let root = Handle::new_dirty(Nodule::Quill(quill));
        nest.register(root.clone()).await;

        let new_root = grow(&nest, &root, 1).await;
        let is_seam = new_root.with_resident(|n| n.is_seam()).await.unwrap();
        assert!(is_seam);

        let parent_is_new_root = root
            .with_resident(|n| n.parent().is_same_cell(&new_root))
            .await
            .unwrap();
        assert!(parent_is_new_root);
    }

    #[tokio::test]
    async fn shrink_below_height_two_is_a_no_op() {
        let nest = test_nest();
        let root = Handle::new_dirty(Nodule::Quill(Quill::new()));
        assert!(shrink(&nest, &root, 1).await.is_none());
    }
}
