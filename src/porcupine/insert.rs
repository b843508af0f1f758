use async_recursion::async_recursion;

use crate::address::Handle;
use crate::config::Descriptor;
use crate::error::PorcupineError;
use crate::nest::Nest;
use crate::nodule::{Footprint, Nodule, NoduleCodec};

use super::grow_shrink::grow;

/// What's being placed into `current` by one step of the recursive insert. A quill receives a
/// value; a seam receives a child reference produced by a lower-level split.
pub(super) enum Candidate<K, V> {
    Value(V),
    Child(Handle<Nodule<K, V>>),
}

/// The result of an insert at the root: if the root itself split and grew, the caller (the
/// Porcupine) needs to swap in the new root Handle and bump `height`.
pub(super) struct InsertOutcome<K, V> {
    pub new_root: Option<Handle<Nodule<K, V>>>,
}

/// Recursively inserts `(key, candidate)` into `current`, splitting and propagating as needed.
/// `is_root` tells the overflow branch whether to `grow()` instead of propagating upward.
#[async_recursion(?Send)]
pub(super) async fn insert_into<K, V>(
    nest: &Nest<K, V>,
    descriptor: &Descriptor,
    current: Handle<Nodule<K, V>>,
    key: K,
    candidate: Candidate<K, V>,
    is_root: bool,
) -> Result<InsertOutcome<K, V>, PorcupineError>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    nest.load(&current).await?;

    let candidate_footprint = candidate_footprint(&key, &candidate);
    let current_footprint = current
        .with_resident(|nodule| nodule.footprint())
        .await
        .expect("just loaded");

    if current_footprint + candidate_footprint > descriptor.extent {
        return overflow_insert(nest, descriptor, current, key, candidate, is_root).await;
    }

    let was_empty = current.with_resident(|nodule| nodule.is_empty()).await.unwrap_or(true);
    let old_mayor = current.with_resident(|nodule| nodule.mayor()).await.flatten();

    place(&current, key, candidate).await?;
    nest.mark_dirty(&current).await;

    if was_empty {
        nest.unpin(&current).await;
        return Ok(InsertOutcome { new_root: None });
    }

    let new_mayor = current.with_resident(|nodule| nodule.mayor()).await.flatten();
    propagate_if_changed(nest, descriptor, &current, old_mayor, new_mayor).await?;

    nest.unpin(&current).await;
    Ok(InsertOutcome { new_root: None })
}

/// The footprint `(key, candidate)` would add to whichever nodule receives it. Both arms only
/// ever insert a brand-new key here (the caller rejects duplicates before recursing into a value
/// insert, and a child candidate is always a fresh inlet produced by a lower split), so this is a
/// plain additive delta, not a function of the target nodule's current contents.
fn candidate_footprint<K, V>(key: &K, candidate: &Candidate<K, V>) -> usize
where
    K: Footprint,
    V: Footprint,
{
    match candidate {
        Candidate::Value(value) => key.footprint() + value.footprint(),
        Candidate::Child(_) => key.footprint() + crate::nodule::SEAM_REF_FOOTPRINT,
    }
}

async fn place<K, V>(current: &Handle<Nodule<K, V>>, key: K, candidate: Candidate<K, V>) -> Result<(), PorcupineError>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    match candidate {
        Candidate::Value(value) => {
            current
                .with_resident_mut(|nodule| match nodule {
                    Nodule::Quill(quill) => quill.insert(key, value),
                    Nodule::Seam(_) => unreachable!("a value candidate only targets a quill"),
                })
                .await;
        }
        Candidate::Child(child) => {
            current
                .with_resident_mut(|nodule| match nodule {
                    Nodule::Seam(seam) => seam.insert(key, child),
                    Nodule::Quill(_) => unreachable!("a child candidate only targets a seam"),
                })
                .await;
        }
    }

    Ok(())
}

/// If `current`'s mayor changed, rekeys the parent's inlet for it and recurses upward. A no-op
/// when `current` is the root (parent is `Handle::null()`).
async fn propagate_if_changed<K, V>(
    nest: &Nest<K, V>,
    descriptor: &Descriptor,
    current: &Handle<Nodule<K, V>>,
    old_mayor: Option<K>,
    new_mayor: Option<K>,
) -> Result<(), PorcupineError>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    if old_mayor == new_mayor {
        return Ok(());
    }
    let (Some(old_mayor), Some(new_mayor)) = (old_mayor, new_mayor) else {
        return Ok(());
    };

    let parent = current.with_resident(|nodule| nodule.parent().clone()).await;
    let Some(parent) = parent else { return Ok(()) };
    if parent.address().await.is_null() {
        return Ok(());
    }

    rekey_upward(nest, descriptor, parent, old_mayor, new_mayor).await
}

#[async_recursion(?Send)]
pub(super) async fn rekey_upward<K, V>(
    nest: &Nest<K, V>,
    descriptor: &Descriptor,
    seam_handle: Handle<Nodule<K, V>>,
    old_key: K,
    new_key: K,
) -> Result<(), PorcupineError>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    nest.load(&seam_handle).await?;

    let old_mayor = seam_handle.with_resident(|nodule| nodule.mayor()).await.flatten();

    seam_handle
        .with_resident_mut(|nodule| match nodule {
            Nodule::Seam(seam) => seam.rekey(&old_key, new_key.clone()),
            Nodule::Quill(_) => unreachable!("rekey only ever targets a seam"),
        })
        .await
        .transpose()
        .map_err(PorcupineError::from)?;
    nest.mark_dirty(&seam_handle).await;

    let new_mayor = seam_handle.with_resident(|nodule| nodule.mayor()).await.flatten();
    propagate_if_changed(nest, descriptor, &seam_handle, old_mayor, new_mayor).await?;

    nest.unpin(&seam_handle).await;
    Ok(())
}

async fn overflow_insert<K, V>(
    nest: &Nest<K, V>,
    descriptor: &Descriptor,
    current: Handle<Nodule<K, V>>,
    key: K,
    candidate: Candidate<K, V>,
    is_root: bool,
) -> Result<InsertOutcome<K, V>, PorcupineError>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    let right_nodule = current
        .with_resident_mut(|nodule| match nodule {
            Nodule::Seam(seam) => Nodule::Seam(seam.split(descriptor.extent)),
            Nodule::Quill(quill) => Nodule::Quill(quill.split(descriptor.extent)),
        })
        .await
        .expect("just loaded");

    let right = Handle::new_dirty(right_nodule);
    nest.register(right.clone()).await;

    relink_siblings(nest, &current, &right).await?;

    let old_mayor_before_split = current
        .with_resident(|nodule| nodule.mayor())
        .await
        .flatten()
        .expect("split always leaves the left half non-empty");

    // Decide placement using current's (post-split, shrunk) mayor: the candidate lands on the
    // left half when its key precedes what remains of it, otherwise on the new right half.
    let target_left = key < old_mayor_before_split;

    if target_left {
        place(&current, key, candidate).await?;
        nest.mark_dirty(&current).await;
    } else {
        place(&right, key, candidate).await?;
        nest.mark_dirty(&right).await;
    }

    if is_root {
        let new_root = grow(nest, &current, 2).await;

        current.with_resident_mut(|n| n.set_parent(new_root.clone())).await;
        right.with_resident_mut(|n| n.set_parent(new_root.clone())).await;

        let right_mayor = right
            .with_resident(|nodule| nodule.mayor())
            .await
            .flatten()
            .expect("right half of a split is non-empty");

        new_root
            .with_resident_mut(|nodule| match nodule {
                Nodule::Seam(seam) => seam.insert(right_mayor, right.clone()),
                Nodule::Quill(_) => unreachable!("grow() from a root always produces a seam"),
            })
            .await;
        nest.mark_dirty(&new_root).await;

        nest.unpin(&current).await;
        nest.unpin(&right).await;

        return Ok(InsertOutcome {
            new_root: Some(new_root),
        });
    }

    let new_mayor = current.with_resident(|nodule| nodule.mayor()).await.flatten();
    let parent = current.with_resident(|nodule| nodule.parent().clone()).await;

    if let (Some(parent), Some(new_mayor)) = (parent.clone(), new_mayor) {
        if new_mayor != old_mayor_before_split && !parent.address().await.is_null() {
            rekey_upward(nest, descriptor, parent, old_mayor_before_split, new_mayor).await?;
        }
    }

    let right_mayor = right
        .with_resident(|nodule| nodule.mayor())
        .await
        .flatten()
        .expect("right half of a split is non-empty");

    let parent = current
        .with_resident(|nodule| nodule.parent().clone())
        .await
        .expect("a non-root nodule always has a parent");

    // `parent` is about to become `current` one level up; it may itself be the root of the
    // tree, in which case the next call needs to `grow()` rather than keep propagating.
    let grandparent = parent.with_resident(|nodule| nodule.parent().clone()).await;
    let parent_is_root = match &grandparent {
        Some(grandparent) => grandparent.address().await.is_null(),
        None => true,
    };

    nest.unpin(&current).await;
    nest.unpin(&right).await;

    insert_into(nest, descriptor, parent, right_mayor, Candidate::Child(right), parent_is_root).await
}

async fn relink_siblings<K, V>(
    nest: &Nest<K, V>,
    current: &Handle<Nodule<K, V>>,
    right: &Handle<Nodule<K, V>>,
) -> Result<(), PorcupineError>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    let old_right = current.with_resident(|nodule| nodule.right().clone()).await;

    right.with_resident_mut(|n| n.set_left(current.clone())).await;
    right.with_resident_mut(|n| n.set_right(old_right.clone())).await;
    current.with_resident_mut(|n| n.set_right(right.clone())).await;

    if let Some(old_right) = old_right {
        if !old_right.address().await.is_null() {
            let _ = nest.load(&old_right).await;
            old_right.with_resident_mut(|n| n.set_left(right.clone())).await;
            nest.unpin(&old_right).await;
        }
    }

    Ok(())
}
