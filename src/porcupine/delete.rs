use async_recursion::async_recursion;

use crate::address::Handle;
use crate::config::Descriptor;
use crate::error::PorcupineError;
use crate::nest::Nest;
use crate::nodule::{Footprint, Nodule, NoduleCodec, State, NODE_OVERHEAD};

use super::insert::rekey_upward;

/// Signals a change that only the owning [`super::Porcupine`] can apply, since only it tracks
/// `root` and `height`.
pub(super) enum RootChange {
    Unaffected,
    Emptied,
    BelowThreshold,
}

/// Recursively deletes `key`'s entry from `current` (a value entry in a quill, or a child entry
/// in a seam), relinking siblings and cascading merges/propagation as needed.
#[async_recursion(?Send)]
pub(super) async fn delete_from<K, V>(
    nest: &Nest<K, V>,
    descriptor: &Descriptor,
    current: Handle<Nodule<K, V>>,
    key: K,
) -> Result<RootChange, PorcupineError>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    nest.load(&current).await?;

    let old_mayor = current.with_resident(|nodule| nodule.mayor()).await.flatten();

    current
        .with_resident_mut(|nodule| match nodule {
            Nodule::Seam(seam) => seam.delete(&key).map(|_| ()),
            Nodule::Quill(quill) => quill.delete(&key).map(|_| ()),
        })
        .await
        .expect("just loaded")
        .map_err(PorcupineError::from)?;
    nest.mark_dirty(&current).await;

    let is_empty = current.with_resident(|nodule| nodule.is_empty()).await.unwrap_or(false);
    let parent = current.with_resident(|nodule| nodule.parent().clone()).await;
    let is_root = match &parent {
        Some(parent) => parent.address().await.is_null(),
        None => true,
    };

    if is_empty {
        if is_root {
            nest.forget(&current).await;
            return Ok(RootChange::Emptied);
        }

        let parent = parent.expect("a non-root nodule always has a parent");
        relink_around(nest, &current).await?;
        nest.forget(&current).await;

        // `current` held exactly one entry before this delete, so the key that was just removed
        // is also the key the parent used to reference it.
        return delete_from(nest, descriptor, parent, key).await;
    }

    let merge_threshold = descriptor.merge_threshold();
    let footprint = current.with_resident(|nodule| nodule.footprint()).await.unwrap_or(0);

    if footprint < merge_threshold {
        if is_root {
            return Ok(RootChange::BelowThreshold);
        }

        let parent = parent.clone().expect("a non-root nodule always has a parent");
        if let Some(outcome) = try_merge(nest, descriptor, &current, &parent).await? {
            return Ok(outcome);
        }
    }

    let new_mayor = current.with_resident(|nodule| nodule.mayor()).await.flatten();
    if old_mayor != new_mayor {
        if let (Some(parent), Some(old_mayor), Some(new_mayor)) = (parent, old_mayor, new_mayor) {
            if !parent.address().await.is_null() {
                rekey_upward(nest, descriptor, parent, old_mayor, new_mayor).await?;
            }
        }
    }

    nest.unpin(&current).await;
    Ok(RootChange::Unaffected)
}

/// Relinks `current`'s siblings around it, once it's known to be on its way out of the tree
/// (emptied, or the loser of a merge).
async fn relink_around<K, V>(nest: &Nest<K, V>, current: &Handle<Nodule<K, V>>) -> Result<(), PorcupineError>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    let left = current.with_resident(|nodule| nodule.left().clone()).await;
    let right = current.with_resident(|nodule| nodule.right().clone()).await;

    if let Some(left) = &left {
        if !left.address().await.is_null() {
            nest.load(left).await?;
            left.with_resident_mut(|nodule| nodule.set_right(right.clone().unwrap_or_else(Handle::null)))
                .await;
            nest.unpin(left).await;
        }
    }

    if let Some(right) = &right {
        if !right.address().await.is_null() {
            nest.load(right).await?;
            right
                .with_resident_mut(|nodule| nodule.set_left(left.clone().unwrap_or_else(Handle::null)))
                .await;
            nest.unpin(right).await;
        }
    }

    Ok(())
}

/// Attempts to merge `current` into an eligible sibling: an already-Dirty sibling (either side)
/// first, then the left sibling, then the right. Returns `None` when no sibling qualifies, in
/// which case the caller falls through to the normal propagate path.
async fn try_merge<K, V>(
    nest: &Nest<K, V>,
    descriptor: &Descriptor,
    current: &Handle<Nodule<K, V>>,
    current_parent: &Handle<Nodule<K, V>>,
) -> Result<Option<RootChange>, PorcupineError>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    let current_footprint = current.with_resident(|nodule| nodule.footprint()).await.unwrap_or(0);
    let extent = descriptor.extent;

    let left = current.with_resident(|nodule| nodule.left().clone()).await;
    let right = current.with_resident(|nodule| nodule.right().clone()).await;

    let left_ok = match &left {
        Some(left) => sibling_eligible(nest, left, current_parent, current_footprint, extent).await,
        None => false,
    };
    let right_ok = match &right {
        Some(right) => sibling_eligible(nest, right, current_parent, current_footprint, extent).await,
        None => false,
    };

    if !left_ok && !right_ok {
        return Ok(None);
    }

    let left_dirty = left_ok
        && left
            .as_ref()
            .unwrap()
            .with_resident(|nodule| nodule.state() == State::Dirty)
            .await
            .unwrap_or(false);
    let right_dirty = right_ok
        && right
            .as_ref()
            .unwrap()
            .with_resident(|nodule| nodule.state() == State::Dirty)
            .await
            .unwrap_or(false);

    let merge_left = if left_dirty {
        true
    } else if right_dirty {
        false
    } else {
        left_ok
    };

    if merge_left {
        let survivor = left.unwrap();
        if right_ok {
            nest.unpin(right.as_ref().unwrap()).await;
        }
        merge_left_survivor(nest, descriptor, &survivor, current, current_parent).await
    } else {
        let survivor = right.unwrap();
        if left_ok {
            nest.unpin(left.as_ref().unwrap()).await;
        }
        merge_right_survivor(nest, descriptor, &survivor, current).await
    }
}

async fn sibling_eligible<K, V>(
    nest: &Nest<K, V>,
    sibling: &Handle<Nodule<K, V>>,
    current_parent: &Handle<Nodule<K, V>>,
    current_footprint: usize,
    extent: usize,
) -> bool
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    if sibling.address().await.is_null() {
        return false;
    }
    if nest.load(sibling).await.is_err() {
        return false;
    }

    let sibling_parent = sibling.with_resident(|nodule| nodule.parent().clone()).await;
    let same_parent = matches!(&sibling_parent, Some(parent) if parent.is_same_cell(current_parent));
    if !same_parent {
        nest.unpin(sibling).await;
        return false;
    }

    let sibling_footprint = sibling.with_resident(|nodule| nodule.footprint()).await.unwrap_or(usize::MAX);
    if current_footprint + sibling_footprint < NODE_OVERHEAD
        || current_footprint + sibling_footprint - NODE_OVERHEAD > extent
    {
        nest.unpin(sibling).await;
        return false;
    }

    true
}

/// `left` absorbs `current`'s inlets. `left`'s mayor grows to `current`'s old mayor, so the
/// parent link always needs a propagate once the stale `current` entry is gone.
async fn merge_left_survivor<K, V>(
    nest: &Nest<K, V>,
    descriptor: &Descriptor,
    left: &Handle<Nodule<K, V>>,
    current: &Handle<Nodule<K, V>>,
    parent: &Handle<Nodule<K, V>>,
) -> Result<Option<RootChange>, PorcupineError>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    let left_old_mayor = left
        .with_resident(|nodule| nodule.mayor())
        .await
        .flatten()
        .expect("a merge candidate is non-empty");
    let current_old_mayor = current
        .with_resident(|nodule| nodule.mayor())
        .await
        .flatten()
        .expect("a merge candidate is non-empty");

    relink_around(nest, current).await?;
    absorb(current, left).await;
    nest.forget(current).await;

    let parent_change = delete_from(nest, descriptor, parent.clone(), current_old_mayor.clone()).await?;

    // `parent_change` may reflect a `RootChange` from several levels up the ancestor chain (a
    // tail call through an emptied `parent` recurses into its own parent), not necessarily
    // whether `left` itself lost its parent. The rekey is gated on `left`'s own parent, checked
    // fresh here, regardless of what happened further up.
    if left_old_mayor != current_old_mayor {
        let left_parent = left.with_resident(|nodule| nodule.parent().clone()).await;
        if let Some(left_parent) = left_parent {
            if !left_parent.address().await.is_null() {
                rekey_upward(nest, descriptor, left_parent, left_old_mayor, current_old_mayor).await?;
            }
        }
    }

    nest.unpin(left).await;
    Ok(Some(parent_change))
}

/// `right` absorbs `current`'s inlets. `right`'s mayor is unchanged (it was already the larger of
/// the two), so nothing needs to propagate beyond deleting `current`'s stale parent entry.
async fn merge_right_survivor<K, V>(
    nest: &Nest<K, V>,
    descriptor: &Descriptor,
    right: &Handle<Nodule<K, V>>,
    current: &Handle<Nodule<K, V>>,
) -> Result<Option<RootChange>, PorcupineError>
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    let current_old_mayor = current
        .with_resident(|nodule| nodule.mayor())
        .await
        .flatten()
        .expect("a merge candidate is non-empty");

    let parent = current.with_resident(|nodule| nodule.parent().clone()).await;

    relink_around(nest, current).await?;
    absorb(current, right).await;
    nest.forget(current).await;
    nest.unpin(right).await;

    let Some(parent) = parent else {
        return Ok(Some(RootChange::Unaffected));
    };

    let outcome = delete_from(nest, descriptor, parent, current_old_mayor).await?;
    Ok(Some(outcome))
}

/// Takes `loser`'s resident inlets and folds them into `survivor`.
async fn absorb<K, V>(loser: &Handle<Nodule<K, V>>, survivor: &Handle<Nodule<K, V>>)
where
    K: Ord + Clone + Footprint + NoduleCodec,
    V: Clone + Footprint + NoduleCodec,
{
    let taken = loser.take_resident().await.expect("loser is resident");

    survivor
        .with_resident_mut(|nodule| match (nodule, taken) {
            (Nodule::Seam(survivor), Nodule::Seam(loser)) => survivor.merge(loser),
            (Nodule::Quill(survivor), Nodule::Quill(loser)) => survivor.merge(loser),
            _ => unreachable!("siblings are always the same nodule kind"),
        })
        .await;
}
