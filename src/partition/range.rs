use std::{fmt, ops::Range};

/// One of the two disjoint partitions of the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subset {
    Train,
    Validation,
}

impl Subset {
    pub const ALL: [Subset; 2] = [Subset::Train, Subset::Validation];

    /// Dense index, usable to address per-subset arrays.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Subset::Train => 0,
            Subset::Validation => 1,
        }
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subset::Train => f.write_str("train"),
            Subset::Validation => f.write_str("validation"),
        }
    }
}

/// The bucket a range was generated for.
///
/// Ranges carry their class from creation, so coinciding sizes (e.g. a chunk
/// tail as long as the train tail) never need to be told apart by length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeKind {
    /// `range_size` entries.
    Full,
    /// The leftover range inside a full chunk.
    ChunkTail,
    /// The leftover range inside a subset's remainder chunk.
    SubsetTail(Subset),
}

impl RangeKind {
    pub const ALL: [RangeKind; 4] = [
        RangeKind::Full,
        RangeKind::ChunkTail,
        RangeKind::SubsetTail(Subset::Train),
        RangeKind::SubsetTail(Subset::Validation),
    ];
}

impl fmt::Display for RangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeKind::Full => f.write_str("full"),
            RangeKind::ChunkTail => f.write_str("chunk tail"),
            RangeKind::SubsetTail(subset) => write!(f, "{subset} tail"),
        }
    }
}

/// A half-open interval of entry indices together with its class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedRange {
    pub range: Range<usize>,
    pub kind: RangeKind,
}

impl TaggedRange {
    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}
