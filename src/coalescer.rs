use std::{collections::VecDeque, mem};

use log::trace;

use crate::buffer::{Batch, RowBuffer};

/// Two fixed-capacity slots holding the rows that don't yet form a full batch.
///
/// Slot `head` is the primary: the oldest incomplete batch, holding `fill`
/// rows. The other slot only receives the overflow of a push that completes
/// the primary, and becomes the new primary right away, so it is always empty
/// between calls.
#[derive(Debug, Clone)]
pub struct LeftoverRing {
    slots: [RowBuffer; 2],
    head: usize,
    fill: usize,
}

impl LeftoverRing {
    /// Creates an empty ring whose slots hold up to `batch_size` rows.
    pub fn new(batch_size: usize, cols: usize) -> Self {
        Self {
            slots: [
                RowBuffer::new(batch_size, cols),
                RowBuffer::new(batch_size, cols),
            ],
            head: 0,
            fill: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots[0].rows()
    }

    /// Rows held in the primary slot.
    #[inline]
    pub fn len(&self) -> usize {
        self.fill
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }

    /// Rows the primary can take before it completes a batch.
    #[inline]
    pub fn free(&self) -> usize {
        self.capacity() - self.fill
    }

    /// Appends `rows` (fewer than `capacity`) taken from `src`.
    ///
    /// # Returns
    /// The completed batch if the primary filled up. The filled slot itself is
    /// handed out and replaced by an empty one, so its rows are never copied
    /// again.
    pub fn push(&mut self, src: &RowBuffer, start: usize, rows: usize) -> Option<Batch> {
        let capacity = self.capacity();
        debug_assert!(rows < capacity, "leftover pushes must be shorter than a batch");

        let free = self.free();
        let head = self.head;
        let fill = self.fill;

        let absorbed = rows.min(free);
        self.slots[head]
            .rows_slice_mut(fill, fill + absorbed)
            .copy_from_slice(src.rows_slice(start, start + absorbed));

        if rows < free {
            self.fill += rows;
            return None;
        }

        let overflow = rows - free;
        let secondary = head ^ 1;
        self.slots[secondary]
            .rows_slice_mut(0, overflow)
            .copy_from_slice(src.rows_slice(start + free, start + rows));

        let batch = mem::replace(&mut self.slots[head], RowBuffer::new(capacity, src.cols()));
        self.head = secondary;
        self.fill = overflow;

        debug_assert!(self.fill < capacity);
        Some(batch)
    }

    /// Takes whatever the primary holds as a short batch.
    pub fn take_partial(&mut self) -> Option<Batch> {
        if self.fill == 0 {
            return None;
        }

        let slot = &self.slots[self.head];
        let cols = slot.cols();
        let data = slot.rows_slice(0, self.fill).to_vec();
        let rows = self.fill;
        self.fill = 0;

        RowBuffer::from_vec(rows, cols, data)
    }

    /// Drops every held row.
    pub fn clear(&mut self) {
        self.head = 0;
        self.fill = 0;
    }
}

/// Repackages chunks of arbitrary size into batches of exactly `batch_size`
/// rows, carrying the rows that don't fill a batch over to the next chunk.
#[derive(Debug, Clone)]
pub struct BatchCoalescer {
    batch_size: usize,
    cols: usize,
    leftover: LeftoverRing,
    queue: VecDeque<Batch>,
    rows_ingested: usize,
    rows_emitted: usize,
}

impl BatchCoalescer {
    /// Creates a new `BatchCoalescer`.
    ///
    /// # Arguments
    /// * `batch_size` - Rows per batch, must be > 0.
    /// * `cols` - Columns per row.
    pub fn new(batch_size: usize, cols: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");

        Self {
            batch_size,
            cols,
            leftover: LeftoverRing::new(batch_size, cols),
            queue: VecDeque::new(),
            rows_ingested: 0,
            rows_emitted: 0,
        }
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Slices `chunk` into whole batches and merges its tail into the leftover.
    ///
    /// # Returns
    /// The amount of batches queued by this call.
    pub fn ingest(&mut self, chunk: &RowBuffer) -> usize {
        debug_assert_eq!(chunk.cols(), self.cols);

        let whole = chunk.rows() / self.batch_size;
        let remainder = chunk.rows() % self.batch_size;

        for i in 0..whole {
            let start = i * self.batch_size;
            let data = chunk.rows_slice(start, start + self.batch_size).to_vec();
            // SAFETY: The slice holds exactly `batch_size * cols` values.
            let batch = RowBuffer::from_vec(self.batch_size, self.cols, data).unwrap();
            self.emit(batch);
        }

        let mut queued = whole;
        if remainder > 0
            && let Some(batch) = self.leftover.push(chunk, whole * self.batch_size, remainder)
        {
            self.emit(batch);
            queued += 1;
        }

        self.rows_ingested += chunk.rows();
        trace!(
            rows = chunk.rows(),
            queued = queued,
            leftover = self.leftover.len();
            "ingested chunk"
        );

        queued
    }

    /// Queues the leftover rows as one final, shorter batch.
    ///
    /// # Returns
    /// The amount of rows flushed.
    pub fn flush_leftover(&mut self) -> usize {
        match self.leftover.take_partial() {
            Some(batch) => {
                let rows = batch.rows();
                self.emit(batch);
                rows
            }
            None => 0,
        }
    }

    /// Returns the oldest queued batch, never blocking.
    #[inline]
    pub fn pop_batch(&mut self) -> Option<Batch> {
        self.queue.pop_front()
    }

    #[inline]
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn leftover_len(&self) -> usize {
        self.leftover.len()
    }

    #[inline]
    pub fn rows_ingested(&self) -> usize {
        self.rows_ingested
    }

    #[inline]
    pub fn rows_emitted(&self) -> usize {
        self.rows_emitted
    }

    /// Drops queued batches, leftover rows and counters.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.leftover.clear();
        self.rows_ingested = 0;
        self.rows_emitted = 0;
    }

    fn emit(&mut self, batch: Batch) {
        self.rows_emitted += batch.rows();
        self.queue.push_back(batch);
    }
}
