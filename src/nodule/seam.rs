use crate::address::Handle;
use crate::nodule::{Footprint, Nodule, NoduleError, State, NODE_OVERHEAD, SEAM_REF_FOOTPRINT};

/// An internal node: inlets route by summary key to child nodules rather than holding values
/// directly. The summary key stored alongside a child is always that child's current `mayor()`.
pub struct Seam<K, V> {
    inlets: Vec<(K, Handle<Nodule<K, V>>)>,
    footprint: usize,
    pub(crate) state: State,
    pub(crate) parent: Handle<Nodule<K, V>>,
    left: Handle<Nodule<K, V>>,
    right: Handle<Nodule<K, V>>,
}

impl<K: Ord + Clone + Footprint, V: Clone + Footprint> Seam<K, V> {
    pub fn new() -> Self {
        Self {
            inlets: Vec::new(),
            footprint: NODE_OVERHEAD,
            state: State::Dirty,
            parent: Handle::null(),
            left: Handle::null(),
            right: Handle::null(),
        }
    }

    pub fn footprint(&self) -> usize {
        self.footprint
    }

    pub fn len(&self) -> usize {
        self.inlets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inlets.is_empty()
    }

    pub fn left(&self) -> &Handle<Nodule<K, V>> {
        &self.left
    }

    pub fn right(&self) -> &Handle<Nodule<K, V>> {
        &self.right
    }

    pub fn set_left(&mut self, left: Handle<Nodule<K, V>>) {
        self.left = left;
    }

    pub fn set_right(&mut self, right: Handle<Nodule<K, V>>) {
        self.right = right;
    }

    fn inlet_footprint(key: &K) -> usize {
        key.footprint() + SEAM_REF_FOOTPRINT
    }

    /// Places `(key, child)` in key order. `key` must be `child`'s current `mayor()`.
    pub fn insert(&mut self, key: K, child: Handle<Nodule<K, V>>) {
        let position = self.inlets.partition_point(|(k, _)| k < &key);
        self.footprint += Self::inlet_footprint(&key);
        self.inlets.insert(position, (key, child));
        self.state = State::Dirty;
    }

    pub fn delete(&mut self, key: &K) -> Result<Handle<Nodule<K, V>>, NoduleError> {
        let position = self
            .inlets
            .iter()
            .position(|(k, _)| k == key)
            .ok_or(NoduleError::NotFound)?;

        let (removed_key, removed_child) = self.inlets.remove(position);
        self.footprint -= Self::inlet_footprint(&removed_key);
        self.state = State::Dirty;

        Ok(removed_child)
    }

    pub fn mayor(&self) -> Option<K> {
        self.inlets.last().map(|(k, _)| k.clone())
    }

    pub fn maiden(&self) -> Option<K> {
        self.inlets.first().map(|(k, _)| k.clone())
    }

    /// The sole surviving child, used by `shrink` when the root seam has exactly one inlet.
    pub fn only_child(&self) -> Result<Handle<Nodule<K, V>>, NoduleError> {
        if self.inlets.len() != 1 {
            return Err(NoduleError::Empty);
        }

        Ok(self.inlets[0].1.clone())
    }

    /// Rekeys the inlet currently keyed `old_key` to `new_key`, reordering if necessary. The
    /// caller (the tree-level propagate algorithm) is responsible for recursing upward when this
    /// seam's own `mayor()` changed as a result.
    pub fn rekey(&mut self, old_key: &K, new_key: K) -> Result<(), NoduleError> {
        let position = self
            .inlets
            .iter()
            .position(|(k, _)| k == old_key)
            .ok_or(NoduleError::NotFound)?;

        let (_, child) = self.inlets.remove(position);
        self.footprint -= Self::inlet_footprint(old_key);
        self.footprint += Self::inlet_footprint(&new_key);

        let insert_at = self.inlets.partition_point(|(k, _)| k < &new_key);
        self.inlets.insert(insert_at, (new_key, child));
        self.state = State::Dirty;

        Ok(())
    }

    /// The child responsible for `key`: the first inlet whose summary key is `>= key`, or the
    /// last inlet if `key` exceeds every mayor currently held (the key has not been seen yet and
    /// would be routed into the rightmost child on insert).
    pub fn locate(&self, key: &K) -> Result<&Handle<Nodule<K, V>>, NoduleError> {
        if self.inlets.is_empty() {
            return Err(NoduleError::Empty);
        }

        let position = self.inlets.partition_point(|(k, _)| k < key);
        let position = position.min(self.inlets.len() - 1);
        Ok(&self.inlets[position].1)
    }

    /// Splits off the upper half of the inlets into a new right sibling, choosing the smallest
    /// split index whose left prefix footprint stays below `extent / 2 + overhead`, ties broken
    /// in favor of a left-heavier split. The returned sibling is Dirty and parentless.
    pub fn split(&mut self, extent: usize) -> Self {
        let target = extent / 2 + NODE_OVERHEAD;

        let mut running = NODE_OVERHEAD;
        let mut split_at = self.inlets.len();
        for (index, (key, _)) in self.inlets.iter().enumerate() {
            running += Self::inlet_footprint(key);
            if running >= target {
                split_at = index + 1;
                break;
            }
        }
        split_at = split_at.min(self.inlets.len());

        let tail = self.inlets.split_off(split_at);
        let tail_footprint = tail.iter().map(|(k, _)| Self::inlet_footprint(k)).sum::<usize>() + NODE_OVERHEAD;
        self.footprint -= tail_footprint - NODE_OVERHEAD;
        self.state = State::Dirty;

        Self {
            inlets: tail,
            footprint: tail_footprint,
            state: State::Dirty,
            parent: Handle::null(),
            left: Handle::null(),
            right: Handle::null(),
        }
    }

    /// Absorbs `other`'s inlets. Both nodules must share a parent; callers are responsible for
    /// checking the combined footprint fits `extent` before calling.
    pub fn merge(&mut self, mut other: Self) {
        self.inlets.append(&mut other.inlets);
        self.inlets.sort_by(|a, b| a.0.cmp(&b.0));
        self.footprint += other.footprint - NODE_OVERHEAD;
        self.state = State::Dirty;
    }

    /// All inlets in key order, for serialization and for the Porcupine's traversal.
    pub fn iter(&self) -> impl Iterator<Item = &(K, Handle<Nodule<K, V>>)> {
        self.inlets.iter()
    }

    /// Marks the nodule Clean, used right after [`crate::nodule::codec::decode_nodule`]
    /// rebuilds it from a freshly loaded block.
    pub(crate) fn mark_clean(&mut self) {
        self.state = State::Clean;
    }
}

impl<K: Ord + Clone + Footprint, V: Clone + Footprint> Default for Seam<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child() -> Handle<Nodule<u32, Vec<u8>>> {
        Handle::new_dirty(Nodule::Quill(crate::nodule::Quill::new()))
    }

    #[test]
    fn insert_keeps_key_order() {
        let mut seam: Seam<u32, Vec<u8>> = Seam::new();
        seam.insert(30, child());
        seam.insert(10, child());
        seam.insert(20, child());

        assert_eq!(seam.maiden(), Some(10));
        assert_eq!(seam.mayor(), Some(30));
        assert_eq!(seam.len(), 3);
    }

    #[test]
    fn locate_routes_to_first_inlet_with_key_at_least_target() {
        let mut seam: Seam<u32, Vec<u8>> = Seam::new();
        let a = child();
        let b = child();
        seam.insert(32, a.clone());
        seam.insert(64, b.clone());

        assert!(seam.locate(&1).unwrap().is_same_cell(&a));
        assert!(seam.locate(&32).unwrap().is_same_cell(&a));
        assert!(seam.locate(&33).unwrap().is_same_cell(&b));
        assert!(seam.locate(&1000).unwrap().is_same_cell(&b));
    }

    #[test]
    fn delete_missing_key_reports_not_found() {
        let mut seam: Seam<u32, Vec<u8>> = Seam::new();
        seam.insert(1, child());
        assert!(matches!(seam.delete(&99), Err(NoduleError::NotFound)));
    }

    #[test]
    fn rekey_reorders_when_new_key_moves_past_a_sibling() {
        let mut seam: Seam<u32, Vec<u8>> = Seam::new();
        let a = child();
        let b = child();
        seam.insert(10, a.clone());
        seam.insert(20, b.clone());

        seam.rekey(&10, 25).unwrap();
        assert_eq!(seam.mayor(), Some(25));
        assert!(seam.locate(&20).unwrap().is_same_cell(&b));
        assert!(seam.locate(&25).unwrap().is_same_cell(&a));
    }

    #[test]
    fn merge_combines_and_sorts_inlets() {
        let mut left: Seam<u32, Vec<u8>> = Seam::new();
        left.insert(10, child());
        left.insert(20, child());

        let mut right: Seam<u32, Vec<u8>> = Seam::new();
        right.insert(30, child());

        left.merge(right);
        assert_eq!(left.len(), 3);
        assert_eq!(left.mayor(), Some(30));
    }
}
