use std::{iter, ops::Range};

use log::trace;
use rand::{Rng, seq::SliceRandom};

use super::{PartitionLayout, RangeKind, Subset, TaggedRange};

/// The ranges owned by one subset, grouped by class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsetPools {
    pub full: Vec<Range<usize>>,
    pub chunk_tail: Vec<Range<usize>>,
    pub tail: Option<Range<usize>>,
}

impl SubsetPools {
    /// Iterates over every range of the subset, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Range<usize>> {
        self.full
            .iter()
            .chain(self.chunk_tail.iter())
            .chain(self.tail.iter())
    }

    /// Amount of entries covered by the subset's ranges.
    pub fn entries(&self) -> usize {
        self.iter().map(|r| r.len()).sum()
    }
}

/// Cuts `[0, num_entries)` into tagged ranges at random positions.
///
/// The multiset of range classes dictated by `layout` is shuffled and laid out
/// back to back, so which physical rows land in which class is uniformly random
/// while the amount of ranges per class is exact.
pub fn tagged_ranges<R: Rng + ?Sized>(layout: &PartitionLayout, rng: &mut R) -> Vec<TaggedRange> {
    let mut kinds: Vec<RangeKind> = RangeKind::ALL
        .iter()
        .flat_map(|&kind| iter::repeat_n(kind, layout.range_count(kind)))
        .collect();

    kinds.shuffle(rng);

    let mut start = 0;
    let ranges: Vec<_> = kinds
        .into_iter()
        .map(|kind| {
            let end = start + layout.range_len(kind);
            let range = start..end;
            start = end;
            TaggedRange { range, kind }
        })
        .collect();

    debug_assert_eq!(start, layout.num_entries);
    ranges
}

/// Builds the train and validation range pools, indexed by `Subset::index`.
pub fn build_range_pools<R: Rng + ?Sized>(
    layout: &PartitionLayout,
    rng: &mut R,
) -> [SubsetPools; 2] {
    let mut full = Vec::with_capacity(layout.range_count(RangeKind::Full));
    let mut chunk_tail = Vec::with_capacity(layout.range_count(RangeKind::ChunkTail));
    let mut tails: [Option<Range<usize>>; 2] = [None, None];

    for TaggedRange { range, kind } in tagged_ranges(layout, rng) {
        match kind {
            RangeKind::Full => full.push(range),
            RangeKind::ChunkTail => chunk_tail.push(range),
            RangeKind::SubsetTail(subset) => tails[subset.index()] = Some(range),
        }
    }

    full.shuffle(rng);
    chunk_tail.shuffle(rng);

    let validation_full = full.split_off(layout.train.total_full_ranges());
    let validation_chunk_tail = chunk_tail.split_off(layout.train.total_chunk_tail_ranges());
    let [train_tail, validation_tail] = tails;

    trace!(
        full = full.len(),
        chunk_tail = chunk_tail.len(),
        validation_full = validation_full.len(),
        validation_chunk_tail = validation_chunk_tail.len();
        "built range pools"
    );

    [
        SubsetPools {
            full,
            chunk_tail,
            tail: train_tail,
        },
        SubsetPools {
            full: validation_full,
            chunk_tail: validation_chunk_tail,
            tail: validation_tail,
        },
    ]
}

/// Returns the pools of `subset` out of the array built by `build_range_pools`.
#[inline]
pub fn pools_of(pools: &[SubsetPools; 2], subset: Subset) -> &SubsetPools {
    &pools[subset.index()]
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn covered(pools: &[SubsetPools; 2]) -> Vec<usize> {
        let mut entries: Vec<usize> = pools.iter().flat_map(|p| p.iter().cloned().flatten()).collect();
        entries.sort_unstable();
        entries
    }

    #[test]
    fn tagged_ranges_tile_the_dataset() {
        let layout = PartitionLayout::new(1000, 75, 10, 0.3).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let ranges = tagged_ranges(&layout, &mut rng);
        let mut next = 0;
        for r in &ranges {
            assert_eq!(r.range.start, next);
            assert_eq!(r.len(), layout.range_len(r.kind));
            next = r.range.end;
        }
        assert_eq!(next, 1000);
    }

    #[test]
    fn pools_partition_entries_between_subsets() {
        let layout = PartitionLayout::new(1000, 75, 10, 0.3).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let pools = build_range_pools(&layout, &mut rng);

        let train = pools_of(&pools, Subset::Train);
        let validation = pools_of(&pools, Subset::Validation);

        assert_eq!(train.entries(), layout.train.entries);
        assert_eq!(validation.entries(), layout.validation.entries);
        assert_eq!(train.full.len(), layout.train.total_full_ranges());
        assert_eq!(train.chunk_tail.len(), layout.train.total_chunk_tail_ranges());
        assert_eq!(covered(&pools), (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn all_tail_sizes_coincide() {
        // chunk tail = 35 % 10 = 5, train tail = (40 % 35) % 10 = 5,
        // validation tail = (40 % 35) % 10 = 5.
        let layout = PartitionLayout::new(80, 35, 10, 0.5).unwrap();
        assert_eq!(layout.train.chunk_tail_size, 5);
        assert_eq!(layout.train.tail_remainder, 5);
        assert_eq!(layout.validation.tail_remainder, 5);

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let pools = build_range_pools(&layout, &mut rng);

            for subset in Subset::ALL {
                let p = pools_of(&pools, subset);
                assert_eq!(p.chunk_tail.len(), 1);
                assert_eq!(p.tail.as_ref().map(|r| r.len()), Some(5));
                assert_eq!(p.entries(), 40);
            }
            assert_eq!(covered(&pools), (0..80).collect::<Vec<_>>());
        }
    }

    #[test]
    fn chunk_tail_coincides_with_train_tail_only() {
        // chunk tail = 35 % 10 = 5, train 75 leaves a 5-entry tail, validation 22 leaves 2.
        let layout = PartitionLayout::new(97, 35, 10, 0.23).unwrap();
        assert_eq!(layout.validation.entries, 22);
        assert_eq!(layout.train.tail_remainder, 5);
        assert_eq!(layout.validation.tail_remainder, 2);

        let mut rng = StdRng::seed_from_u64(3);
        let pools = build_range_pools(&layout, &mut rng);
        let train = pools_of(&pools, Subset::Train);

        assert_eq!(train.chunk_tail.len(), layout.train.total_chunk_tail_ranges());
        assert_eq!(train.tail.as_ref().map(|r| r.len()), Some(5));
        assert_eq!(covered(&pools), (0..97).collect::<Vec<_>>());
    }

    #[test]
    fn train_and_validation_tails_coincide() {
        // chunk tail = 0, both tails = 3.
        let layout = PartitionLayout::new(46, 20, 10, 0.5).unwrap();
        assert_eq!(layout.train.chunk_tail_size, 0);
        assert_eq!(layout.train.tail_remainder, 3);
        assert_eq!(layout.validation.tail_remainder, 3);

        let mut rng = StdRng::seed_from_u64(11);
        let pools = build_range_pools(&layout, &mut rng);

        for subset in Subset::ALL {
            let p = pools_of(&pools, subset);
            assert!(p.chunk_tail.is_empty());
            assert_eq!(p.tail.as_ref().map(|r| r.len()), Some(3));
        }
    }

    #[test]
    fn empty_validation_subset() {
        let layout = PartitionLayout::new(30, 8, 3, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let pools = build_range_pools(&layout, &mut rng);

        assert_eq!(pools_of(&pools, Subset::Validation), &SubsetPools::default());
        assert_eq!(pools_of(&pools, Subset::Train).entries(), 30);
    }
}
