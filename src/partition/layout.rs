use std::{fmt, ops::Range};

use super::{RangeKind, Subset};
use crate::error::ConfigErr;

/// Returns the number of validation entries, `floor(split * num_entries)`.
///
/// Products that land within rounding noise of an integer are snapped to it, so
/// that e.g. a `0.7` split of `100` entries yields `70` and not `69`.
pub fn validation_entries(num_entries: usize, split: f64) -> usize {
    let exact = split * num_entries as f64;
    let nearest = exact.round();

    if (exact - nearest).abs() <= f64::EPSILON * num_entries.max(1) as f64 * 4. {
        nearest as usize
    } else {
        exact.floor() as usize
    }
}

/// Chunk and range arithmetic of one subset.
///
/// Full chunks hold `chunk_size` entries built from `full_ranges_per_chunk` full
/// ranges plus at most one chunk-tail range. The trailing remainder chunk, if
/// any, holds `tail_full_ranges` full ranges plus at most one subset-tail range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsetLayout {
    pub entries: usize,
    pub full_chunks: usize,
    pub remainder_size: usize,
    pub full_ranges_per_chunk: usize,
    pub chunk_tail_size: usize,
    pub tail_full_ranges: usize,
    pub tail_remainder: usize,
    chunk_size: usize,
}

impl SubsetLayout {
    /// Derives the layout of a subset of `entries` entries.
    ///
    /// # Arguments
    /// * `entries` - The amount of entries in the subset.
    /// * `chunk_size` - The amount of entries per full chunk, must be > 0.
    /// * `range_size` - The amount of entries per full range, must be > 0.
    pub fn new(entries: usize, chunk_size: usize, range_size: usize) -> Self {
        let remainder_size = entries % chunk_size;

        Self {
            entries,
            full_chunks: entries / chunk_size,
            remainder_size,
            full_ranges_per_chunk: chunk_size / range_size,
            chunk_tail_size: chunk_size % range_size,
            tail_full_ranges: remainder_size / range_size,
            tail_remainder: remainder_size % range_size,
            chunk_size,
        }
    }

    #[inline]
    pub fn has_remainder_chunk(&self) -> bool {
        self.remainder_size != 0
    }

    #[inline]
    pub fn has_chunk_tail(&self) -> bool {
        self.chunk_tail_size != 0
    }

    #[inline]
    pub fn has_tail_range(&self) -> bool {
        self.tail_remainder != 0
    }

    /// Total amount of chunks in an epoch of this subset.
    #[inline]
    pub fn num_chunks(&self) -> usize {
        self.full_chunks + self.has_remainder_chunk() as usize
    }

    /// Amount of ranges that make up one full chunk.
    #[inline]
    pub fn ranges_per_full_chunk(&self) -> usize {
        self.full_ranges_per_chunk + self.has_chunk_tail() as usize
    }

    /// Amount of ranges that make up the remainder chunk.
    #[inline]
    pub fn ranges_in_remainder_chunk(&self) -> usize {
        self.tail_full_ranges + self.has_tail_range() as usize
    }

    #[inline]
    pub fn total_full_ranges(&self) -> usize {
        self.full_chunks * self.full_ranges_per_chunk + self.tail_full_ranges
    }

    #[inline]
    pub fn total_chunk_tail_ranges(&self) -> usize {
        self.full_chunks * self.has_chunk_tail() as usize
    }

    /// Total amount of ranges in an epoch order of this subset.
    #[inline]
    pub fn num_ranges(&self) -> usize {
        self.full_chunks * self.ranges_per_full_chunk() + self.ranges_in_remainder_chunk()
    }

    /// Amount of entries held by chunk `chunk`, or `None` if out of range.
    pub fn chunk_len(&self, chunk: usize) -> Option<usize> {
        if chunk < self.full_chunks {
            Some(self.chunk_size)
        } else if chunk == self.full_chunks && self.has_remainder_chunk() {
            Some(self.remainder_size)
        } else {
            None
        }
    }

    /// Positions, inside an epoch order, of the ranges belonging to `chunk`.
    pub fn chunk_span(&self, chunk: usize) -> Option<Range<usize>> {
        let per_chunk = self.ranges_per_full_chunk();

        if chunk < self.full_chunks {
            Some(chunk * per_chunk..(chunk + 1) * per_chunk)
        } else if chunk == self.full_chunks && self.has_remainder_chunk() {
            let start = self.full_chunks * per_chunk;
            Some(start..start + self.ranges_in_remainder_chunk())
        } else {
            None
        }
    }
}

/// The full partition plan: both subsets plus the range-size classes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionLayout {
    pub num_entries: usize,
    pub chunk_size: usize,
    pub range_size: usize,
    pub validation_split: f64,
    pub train: SubsetLayout,
    pub validation: SubsetLayout,
}

impl PartitionLayout {
    /// Computes the partition plan.
    ///
    /// # Returns
    /// A `ConfigErr` if any size is zero or the split lies outside `[0, 1)`.
    pub fn new(
        num_entries: usize,
        chunk_size: usize,
        range_size: usize,
        validation_split: f64,
    ) -> Result<Self, ConfigErr> {
        if num_entries == 0 {
            return Err(ConfigErr::ZeroNumEntries);
        }
        if chunk_size == 0 {
            return Err(ConfigErr::ZeroChunkSize);
        }
        if range_size == 0 {
            return Err(ConfigErr::ZeroRangeSize);
        }
        if !(0.0..1.0).contains(&validation_split) {
            return Err(ConfigErr::InvalidValidationSplit(validation_split as f32));
        }

        let num_validation = validation_entries(num_entries, validation_split);
        let num_train = num_entries - num_validation;

        Ok(Self {
            num_entries,
            chunk_size,
            range_size,
            validation_split,
            train: SubsetLayout::new(num_train, chunk_size, range_size),
            validation: SubsetLayout::new(num_validation, chunk_size, range_size),
        })
    }

    #[inline]
    pub fn subset(&self, subset: Subset) -> &SubsetLayout {
        match subset {
            Subset::Train => &self.train,
            Subset::Validation => &self.validation,
        }
    }

    /// Size of a range of the given class.
    pub fn range_len(&self, kind: RangeKind) -> usize {
        match kind {
            RangeKind::Full => self.range_size,
            RangeKind::ChunkTail => self.train.chunk_tail_size,
            RangeKind::SubsetTail(subset) => self.subset(subset).tail_remainder,
        }
    }

    /// How many ranges of the given class the plan contains.
    pub fn range_count(&self, kind: RangeKind) -> usize {
        match kind {
            RangeKind::Full => self.train.total_full_ranges() + self.validation.total_full_ranges(),
            RangeKind::ChunkTail => {
                self.train.total_chunk_tail_ranges() + self.validation.total_chunk_tail_ranges()
            }
            RangeKind::SubsetTail(subset) => self.subset(subset).has_tail_range() as usize,
        }
    }

    /// Entries recovered by summing `count * size` over every range class.
    ///
    /// Always equals `num_entries` for a consistent plan.
    pub fn entries_from_ranges(&self) -> usize {
        RangeKind::ALL
            .iter()
            .map(|&kind| self.range_count(kind) * self.range_len(kind))
            .sum()
    }
}

impl fmt::Display for PartitionLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<22}{:>12}{:>12}{:>12}",
            "", "entries", "full chunks", "remainder"
        )?;
        for subset in Subset::ALL {
            let layout = self.subset(subset);
            writeln!(
                f,
                "{:<22}{:>12}{:>12}{:>12}",
                subset.to_string(),
                layout.entries,
                layout.full_chunks,
                layout.remainder_size
            )?;
        }

        writeln!(f, "{:<22}{:>12}{:>12}", "range class", "size", "count")?;
        for kind in RangeKind::ALL {
            writeln!(
                f,
                "{:<22}{:>12}{:>12}",
                kind.to_string(),
                self.range_len(kind),
                self.range_count(kind)
            )?;
        }

        write!(
            f,
            "{:<22}{:>12}",
            "entries from ranges",
            self.entries_from_ranges()
        )
    }
}
