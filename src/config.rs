//! # Configuration
//!
//! Tuning knobs for a [`crate::porcupine::Porcupine`] instance. These govern the byte-footprint
//! bounds that drive rebalancing and the Nest's resident-set ceiling; they have nothing to do with
//! fan-out counts.

/// When a checkpoint runs relative to tree mutations.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CheckpointPolicy {
    /// Checkpoint is only triggered by an explicit call.
    Manual,
    /// Checkpoint automatically once the tree has no operations pending.
    #[default]
    OnQuiesce,
}

/// Tree-wide tuning parameters. Cloned cheaply and shared by every [`crate::context::Context`]
/// built over the same tree.
#[derive(Clone, Debug)]
pub struct Descriptor {
    /// Hard cap, in bytes, on a nodule's serialized footprint. Splitting never produces a nodule
    /// larger than this; this is the byte-footprint analogue of a B-tree's fan-out bound.
    pub extent: usize,

    /// Fraction of `extent` below which a nodule's footprint triggers merge/shrink
    /// consideration. Must be in `(0.0, 0.5]` so two merge candidates can never both already
    /// exceed the merge threshold and still overflow `extent` when combined.
    pub balancing: f64,

    /// Maximum number of nodules the Nest keeps resident (Clean + Dirty + Pinned) before it must
    /// evict to admit another.
    pub resident_capacity: usize,

    /// When checkpoints happen relative to tree mutations.
    pub checkpoint_policy: CheckpointPolicy,
}

impl Descriptor {
    /// The footprint threshold, in bytes, below which a nodule is a merge/shrink candidate.
    pub fn merge_threshold(&self) -> usize {
        (self.extent as f64 * self.balancing) as usize
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            extent: 65_536,
            balancing: 0.5,
            resident_capacity: 4_096,
            checkpoint_policy: CheckpointPolicy::OnQuiesce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_threshold_follows_the_balancing_fraction() {
        let descriptor = Descriptor {
            extent: 1_000,
            balancing: 0.25,
            ..Descriptor::default()
        };

        assert_eq!(descriptor.merge_threshold(), 250);
    }
}
