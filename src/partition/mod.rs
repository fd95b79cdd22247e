//! Assignment of entry ranges to the train and validation subsets, and the
//! per-epoch ordering of those ranges into chunk-aligned sequences.

mod layout;
mod pools;
mod range;

use std::{fmt, ops::Range};

use log::debug;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

pub use layout::{PartitionLayout, SubsetLayout, validation_entries};
pub use pools::{SubsetPools, build_range_pools, pools_of, tagged_ranges};
pub use range::{RangeKind, Subset, TaggedRange};

use crate::error::ConfigErr;

/// The chunk-aligned range sequence of one subset for one epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochOrder {
    subset: Subset,
    layout: SubsetLayout,
    ranges: Vec<Range<usize>>,
}

impl EpochOrder {
    #[inline]
    pub fn subset(&self) -> Subset {
        self.subset
    }

    #[inline]
    pub fn layout(&self) -> &SubsetLayout {
        &self.layout
    }

    #[inline]
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    #[inline]
    pub fn num_chunks(&self) -> usize {
        self.layout.num_chunks()
    }

    /// The ranges making up chunk `chunk`, in load order.
    pub fn chunk(&self, chunk: usize) -> Option<&[Range<usize>]> {
        self.layout.chunk_span(chunk).map(|span| &self.ranges[span])
    }

    /// Every entry of the subset, in epoch order.
    pub fn entries(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().cloned().flatten()
    }
}

/// Splits a dataset into disjoint train and validation ranges and re-randomizes
/// their chunk-aligned ordering every epoch.
///
/// The partition plan and the range pools are fixed at construction; only the
/// order in which a subset's ranges are grouped into chunks changes per epoch.
#[derive(Debug)]
pub struct RangePartitioner {
    layout: PartitionLayout,
    pools: [SubsetPools; 2],
    rng: StdRng,
}

impl RangePartitioner {
    /// Creates a new `RangePartitioner`.
    ///
    /// # Arguments
    /// * `num_entries` - Total amount of entries in the dataset.
    /// * `chunk_size` - Amount of entries per full chunk.
    /// * `range_size` - Amount of entries per full range.
    /// * `validation_split` - Fraction of entries kept for validation, in `[0, 1)`.
    /// * `seed` - Seed for every shuffle, `None` draws one from the OS.
    ///
    /// # Returns
    /// A `ConfigErr` if the parameters don't describe a valid plan.
    pub fn new(
        num_entries: usize,
        chunk_size: usize,
        range_size: usize,
        validation_split: f64,
        seed: Option<u64>,
    ) -> Result<Self, ConfigErr> {
        let layout = PartitionLayout::new(num_entries, chunk_size, range_size, validation_split)?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self::from_layout(layout, rng))
    }

    /// Creates a new `RangePartitioner` from an already validated plan.
    pub fn from_layout(layout: PartitionLayout, mut rng: StdRng) -> Self {
        let pools = build_range_pools(&layout, &mut rng);
        let partitioner = Self { layout, pools, rng };
        debug!("partition plan:\n{}", partitioner.summary());

        partitioner
    }

    /// A printable table of the partition plan.
    #[inline]
    pub fn summary(&self) -> &impl fmt::Display {
        &self.layout
    }

    #[inline]
    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    #[inline]
    pub fn subset_layout(&self, subset: Subset) -> &SubsetLayout {
        self.layout.subset(subset)
    }

    #[inline]
    pub fn pools(&self, subset: Subset) -> &SubsetPools {
        &self.pools[subset.index()]
    }

    #[inline]
    pub fn num_chunks(&self, subset: Subset) -> usize {
        self.layout.subset(subset).num_chunks()
    }

    /// Re-shuffles the subset's pools and lays them out chunk by chunk.
    ///
    /// Every full chunk takes `full_ranges_per_chunk` full ranges followed by
    /// one chunk-tail range (if the chunk size isn't a multiple of the range
    /// size). The remainder chunk takes the leftover full ranges followed by
    /// the subset's own tail range.
    pub fn new_epoch_order(&mut self, subset: Subset) -> EpochOrder {
        let layout = *self.layout.subset(subset);
        let pools = &mut self.pools[subset.index()];

        pools.full.shuffle(&mut self.rng);
        pools.chunk_tail.shuffle(&mut self.rng);

        let mut full = pools.full.iter().cloned();
        let mut chunk_tail = pools.chunk_tail.iter().cloned();
        let mut ranges = Vec::with_capacity(layout.num_ranges());

        for _ in 0..layout.full_chunks {
            ranges.extend(full.by_ref().take(layout.full_ranges_per_chunk));
            ranges.extend(chunk_tail.by_ref().take(layout.has_chunk_tail() as usize));
        }

        ranges.extend(full.by_ref().take(layout.tail_full_ranges));
        ranges.extend(pools.tail.clone());

        debug_assert_eq!(ranges.len(), layout.num_ranges());
        debug!(subset:% = subset, ranges = ranges.len(), chunks = layout.num_chunks(); "new epoch order");

        EpochOrder {
            subset,
            layout,
            ranges,
        }
    }
}
