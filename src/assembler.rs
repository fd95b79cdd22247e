use std::ops::Range;

use log::debug;
use rand::{Rng, seq::SliceRandom};

use crate::{
    buffer::RowBuffer,
    error::{GeneratorErr, Result, RowSourceErr},
    partition::EpochOrder,
    source::RowSource,
};

/// Materializes chunks out of a subset's epoch order.
///
/// Rows of each range are requested from the row source one range at a time
/// and placed back to back; with shuffling enabled the whole chunk is then
/// permuted uniformly at random.
#[derive(Debug, Clone)]
pub struct ChunkAssembler {
    columns: Vec<String>,
    shuffle: bool,
    scratch: RowBuffer,
    perm: Vec<usize>,
}

impl ChunkAssembler {
    /// Creates a new `ChunkAssembler`.
    ///
    /// # Arguments
    /// * `columns` - The columns to request from the row source, in output order.
    /// * `shuffle` - Whether to permute rows inside each chunk.
    pub fn new(columns: Vec<String>, shuffle: bool) -> Self {
        Self {
            columns,
            shuffle,
            scratch: RowBuffer::default(),
            perm: Vec::new(),
        }
    }

    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Loads chunk `chunk` of `order` into `out`.
    ///
    /// # Returns
    /// A `GeneratorErr::ChunkOutOfRange` if the order has no such chunk, or a
    /// `GeneratorErr::RowSource` if the source fails. Nothing is retried.
    pub fn load_chunk<S, R>(
        &mut self,
        source: &mut S,
        order: &EpochOrder,
        chunk: usize,
        rng: &mut R,
        out: &mut RowBuffer,
    ) -> Result<()>
    where
        S: RowSource + ?Sized,
        R: Rng + ?Sized,
    {
        let subset = order.subset();
        let (Some(ranges), Some(rows)) = (order.chunk(chunk), order.layout().chunk_len(chunk)) else {
            return Err(GeneratorErr::ChunkOutOfRange {
                subset,
                chunk,
                num_chunks: order.num_chunks(),
            });
        };

        self.assemble(source, ranges, rows, rng, out)
            .map_err(|source| GeneratorErr::RowSource {
                subset,
                chunk,
                source,
            })
    }

    /// Loads every chunk of `order` into a single buffer.
    ///
    /// The result holds the whole subset; with shuffling enabled the permutation
    /// spans the entire subset instead of a single chunk.
    pub fn load_subset<S, R>(
        &mut self,
        source: &mut S,
        order: &EpochOrder,
        rng: &mut R,
        out: &mut RowBuffer,
    ) -> Result<()>
    where
        S: RowSource + ?Sized,
        R: Rng + ?Sized,
    {
        let rows = order.layout().entries;
        self.assemble(source, order.ranges(), rows, rng, out)
            .map_err(|source| GeneratorErr::RowSource {
                subset: order.subset(),
                chunk: 0,
                source,
            })
    }

    /// Fetches `ranges` back to back into `out`, which is resized to `rows` rows.
    ///
    /// # Arguments
    /// * `source` - The row source to read from.
    /// * `ranges` - The ranges to read, in order; their sizes must add up to `rows`.
    /// * `rows` - Total amount of rows.
    /// * `rng` - Randomness for the intra-chunk shuffle.
    /// * `out` - The destination buffer.
    pub fn assemble<S, R>(
        &mut self,
        source: &mut S,
        ranges: &[Range<usize>],
        rows: usize,
        rng: &mut R,
        out: &mut RowBuffer,
    ) -> std::result::Result<(), RowSourceErr>
    where
        S: RowSource + ?Sized,
        R: Rng + ?Sized,
    {
        debug_assert_eq!(ranges.iter().map(|r| r.len()).sum::<usize>(), rows);
        let cols = self.columns.len();

        if self.shuffle {
            self.scratch.resize(rows, cols);
            fetch_all(source, &self.columns, ranges, &mut self.scratch)?;

            self.perm.clear();
            self.perm.extend(0..rows);
            self.perm.shuffle(rng);

            out.resize(rows, cols);
            out.gather_rows(&self.scratch, &self.perm);
        } else {
            out.resize(rows, cols);
            fetch_all(source, &self.columns, ranges, out)?;
        }

        debug!(rows = rows, ranges = ranges.len(), shuffled = self.shuffle; "assembled chunk");
        Ok(())
    }
}

fn fetch_all<S: RowSource + ?Sized>(
    source: &mut S,
    columns: &[String],
    ranges: &[Range<usize>],
    out: &mut RowBuffer,
) -> std::result::Result<(), RowSourceErr> {
    let mut offset = 0;
    for range in ranges {
        let len = range.len();
        source.fetch_rows(columns, range.clone(), out, offset)?;
        offset += len;
    }

    Ok(())
}
