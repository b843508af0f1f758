use crate::address::Handle;
use crate::nodule::{Footprint, Nodule, NoduleError, State, NODE_OVERHEAD};

/// A leaf node: inlets map keys directly to values.
pub struct Quill<K, V> {
    inlets: Vec<(K, V)>,
    footprint: usize,
    pub(crate) state: State,
    pub(crate) parent: Handle<Nodule<K, V>>,
    left: Handle<Nodule<K, V>>,
    right: Handle<Nodule<K, V>>,
}

impl<K: Ord + Clone + Footprint, V: Clone + Footprint> Quill<K, V> {
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

    fn inlet_footprint(key: &K, value: &V) -> usize {
        key.footprint() + value.footprint()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let position = self.inlets.partition_point(|(k, _)| k < key);
        self.inlets
            .get(position)
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Places `(key, value)` in key order, overwriting any existing entry for `key`.
    pub fn insert(&mut self, key: K, value: V) {
        let position = self.inlets.partition_point(|(k, _)| k < &key);

        if self.inlets.get(position).is_some_and(|(k, _)| k == &key) {
            let (old_key, old_value) = std::mem::replace(&mut self.inlets[position], (key.clone(), value));
            self.footprint -= Self::inlet_footprint(&old_key, &old_value);
            self.footprint += Self::inlet_footprint(&self.inlets[position].0, &self.inlets[position].1);
        } else {
            self.footprint += Self::inlet_footprint(&key, &value);
            self.inlets.insert(position, (key, value));
        }

        self.state = State::Dirty;
    }

    pub fn delete(&mut self, key: &K) -> Result<V, NoduleError> {
        let position = self
            .inlets
            .iter()
            .position(|(k, _)| k == key)
            .ok_or(NoduleError::NotFound)?;

        let (removed_key, removed_value) = self.inlets.remove(position);
        self.footprint -= Self::inlet_footprint(&removed_key, &removed_value);
        self.state = State::Dirty;

        Ok(removed_value)
    }

    pub fn mayor(&self) -> Option<K> {
        self.inlets.last().map(|(k, _)| k.clone())
    }

    pub fn maiden(&self) -> Option<K> {
        self.inlets.first().map(|(k, _)| k.clone())
    }

    /// Splits off the upper half of the inlets into a new right sibling, per the same
    /// footprint-budget policy as [`super::Seam::split`].
    pub fn split(&mut self, extent: usize) -> Self {
        let target = extent / 2 + NODE_OVERHEAD;

        let mut running = NODE_OVERHEAD;
        let mut split_at = self.inlets.len();
        for (index, (key, value)) in self.inlets.iter().enumerate() {
            running += Self::inlet_footprint(key, value);
            if running >= target {
                split_at = index + 1;
                break;
            }
        }
        split_at = split_at.min(self.inlets.len());

        let tail = self.inlets.split_off(split_at);
        let tail_footprint = tail
            .iter()
            .map(|(k, v)| Self::inlet_footprint(k, v))
            .sum::<usize>()
            + NODE_OVERHEAD;
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

    /// Absorbs `other`'s inlets. Callers check the combined footprint fits `extent` beforehand.
    pub fn merge(&mut self, mut other: Self) {
        self.inlets.append(&mut other.inlets);
        self.inlets.sort_by(|a, b| a.0.cmp(&b.0));
        self.footprint += other.footprint - NODE_OVERHEAD;
        self.state = State::Dirty;
    }

    /// All inlets in key order, for the Porcupine's paged `consult` traversal.
    pub fn iter(&self) -> impl Iterator<Item = &(K, V)> {
        self.inlets.iter()
    }

    /// Marks the nodule Clean, used right after [`crate::nodule::codec::decode_nodule`]
    /// rebuilds it from a freshly loaded block.
    pub(crate) fn mark_clean(&mut self) {
        self.state = State::Clean;
    }
}

impl<K: Ord + Clone + Footprint, V: Clone + Footprint> Default for Quill<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let mut quill: Quill<u32, Vec<u8>> = Quill::new();
        quill.insert(5, vec![1, 2, 3]);
        quill.insert(1, vec![9]);

        assert_eq!(quill.get(&5), Some(&vec![1, 2, 3]));
        assert_eq!(quill.maiden(), Some(1));
        assert_eq!(quill.mayor(), Some(5));
    }

    #[test]
    fn insert_overwrites_existing_key_and_adjusts_footprint() {
        let mut quill: Quill<u32, Vec<u8>> = Quill::new();
        quill.insert(1, vec![1, 2, 3]);
        let before = quill.footprint();
        quill.insert(1, vec![9]);

        assert_eq!(quill.len(), 1);
        assert_eq!(quill.get(&1), Some(&vec![9]));
        assert!(quill.footprint() < before);
    }

    #[test]
    fn delete_missing_key_reports_not_found() {
        let mut quill: Quill<u32, Vec<u8>> = Quill::new();
        assert!(matches!(quill.delete(&1), Err(NoduleError::NotFound)));
    }

    #[test]
    fn split_moves_upper_half_to_a_new_sibling() {
        let mut quill: Quill<u32, Vec<u8>> = Quill::new();
        for key in 1..=64u32 {
            quill.insert(key, vec![0u8; 4]);
        }

        let right = quill.split(256);
        assert!(quill.mayor().unwrap() < right.maiden().unwrap());
        assert_eq!(quill.len() + right.len(), 64);
    }

    #[test]
    fn merge_recombines_a_split() {
        let mut quill: Quill<u32, Vec<u8>> = Quill::new();
        for key in 1..=64u32 {
            quill.insert(key, vec![0u8; 4]);
        }
        let right = quill.split(256);
        let total_before = quill.len() + right.len();

        quill.merge(right);
        assert_eq!(quill.len(), total_before);
        assert_eq!(quill.mayor(), Some(64));
    }
}
