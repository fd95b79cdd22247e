use std::{sync::Arc, thread};

use log::{debug, info, trace, warn};
use parking_lot::{Condvar, Mutex};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    assembler::ChunkAssembler,
    buffer::RowBuffer,
    coalescer::BatchCoalescer,
    config::GeneratorConfig,
    error::{GeneratorErr, Result},
    partition::{EpochOrder, RangePartitioner, Subset},
    source::RowSource,
};

use super::BatchPoll;

/// Per-subset epoch progress.
#[derive(Debug)]
pub(super) struct SubsetState {
    subset: Subset,
    /// `Some` while an epoch is running.
    pub order: Option<Arc<EpochOrder>>,
    /// The next chunk to load.
    pub cursor: usize,
    pub coalescer: BatchCoalescer,
    /// Bumped every time an epoch starts or is aborted, to tell stale loads apart.
    pub generation: u64,
    pub in_flight: bool,
    /// A load failure waiting to be reported by the next poll.
    pub error: Option<GeneratorErr>,
    pub epochs_completed: usize,
    rng: StdRng,
}

impl SubsetState {
    pub fn new(subset: Subset, coalescer: BatchCoalescer, rng: StdRng) -> Self {
        Self {
            subset,
            order: None,
            cursor: 0,
            coalescer,
            generation: 0,
            in_flight: false,
            error: None,
            epochs_completed: 0,
            rng,
        }
    }

    pub fn start_epoch(&mut self, order: EpochOrder) {
        self.generation += 1;
        self.cursor = 0;
        self.coalescer.reset();

        info!(
            subset:% = self.subset,
            epoch = self.epochs_completed + 1,
            chunks = order.num_chunks(),
            entries = order.layout().entries;
            "epoch started"
        );
        self.order = Some(Arc::new(order));
    }

    /// Drops the running epoch without counting it as completed.
    pub fn abort_epoch(&mut self) {
        self.generation += 1;
        self.order = None;
        self.cursor = 0;
        self.coalescer.reset();
        self.error = None;
    }

    fn finish_epoch(&mut self) {
        let dropped = self.coalescer.leftover_len();
        self.epochs_completed += 1;

        info!(
            subset:% = self.subset,
            epoch = self.epochs_completed,
            rows = self.coalescer.rows_emitted(),
            dropped = dropped;
            "epoch finished"
        );

        self.order = None;
        self.cursor = 0;
        self.coalescer.reset();
    }

    #[inline]
    pub fn num_chunks(&self) -> Option<usize> {
        self.order.as_ref().map(|o| o.num_chunks())
    }

    /// Every chunk was ingested and nothing is loading.
    pub fn exhausted(&self) -> bool {
        !self.in_flight && self.num_chunks().is_some_and(|n| self.cursor >= n)
    }

    /// Whether a poll could observe something different from `Pending`.
    pub fn has_news(&self) -> bool {
        self.error.is_some()
            || self.order.is_none()
            || self.coalescer.queue_depth() > 0
            || self.exhausted()
    }

    /// Reserves the next chunk for loading if the queue runs low.
    pub fn next_job(&mut self, threshold: usize) -> Option<ChunkJob> {
        let order = self.order.as_ref()?;
        if self.in_flight
            || self.error.is_some()
            || self.cursor >= order.num_chunks()
            || self.coalescer.queue_depth() >= threshold
        {
            return None;
        }

        self.in_flight = true;
        Some(ChunkJob {
            subset: self.subset,
            chunk: self.cursor,
            generation: self.generation,
            order: Arc::clone(order),
            rng: StdRng::from_rng(&mut self.rng),
        })
    }

    /// A new generator seeded from the subset's own.
    #[inline]
    pub fn fork_rng(&mut self) -> StdRng {
        StdRng::from_rng(&mut self.rng)
    }

    /// Pops the next batch or reports why there is none.
    ///
    /// Once every chunk was ingested and the queue drained, the leftover is
    /// either flushed as a short batch or dropped, and the epoch ends.
    pub fn poll_queue(&mut self, drop_remainder: bool) -> BatchPoll {
        if let Some(batch) = self.coalescer.pop_batch() {
            trace!(subset:% = self.subset, rows = batch.rows(); "batch delivered");
            return BatchPoll::Ready(batch);
        }

        if !self.exhausted() {
            return BatchPoll::Pending;
        }

        if !drop_remainder
            && self.coalescer.flush_leftover() > 0
            && let Some(batch) = self.coalescer.pop_batch()
        {
            trace!(subset:% = self.subset, rows = batch.rows(); "short batch delivered");
            return BatchPoll::Ready(batch);
        }

        self.finish_epoch();
        BatchPoll::EpochDone
    }
}

/// A reserved chunk load, carried out without holding the state lock.
pub(super) struct ChunkJob {
    subset: Subset,
    chunk: usize,
    generation: u64,
    order: Arc<EpochOrder>,
    rng: StdRng,
}

#[derive(Debug)]
pub(super) struct State {
    pub partitioner: RangePartitioner,
    pub subsets: [SubsetState; 2],
    pub active: bool,
}

impl State {
    #[inline]
    pub fn subset(&self, subset: Subset) -> &SubsetState {
        &self.subsets[subset.index()]
    }

    #[inline]
    pub fn subset_mut(&mut self, subset: Subset) -> &mut SubsetState {
        &mut self.subsets[subset.index()]
    }
}

/// The row source together with the buffers it is read into.
pub(super) struct Loader<S> {
    pub source: S,
    pub assembler: ChunkAssembler,
    pub chunk: RowBuffer,
}

/// Everything the caller and the prefetch thread share.
///
/// Lock order is `loader` before `state`; `state` is never held while waiting
/// for `loader`.
pub(super) struct Shared<S> {
    pub config: GeneratorConfig,
    pub state: Mutex<State>,
    pub loader: Mutex<Loader<S>>,
    pub changed: Condvar,
}

impl<S: RowSource> Shared<S> {
    /// Loads the reserved chunk and feeds it to its subset's coalescer.
    ///
    /// # Returns
    /// The load error, unless background prefetching is enabled, in which case
    /// it is stored for the subset's next poll. Either way the cursor is left on
    /// the failed chunk.
    pub fn run_job(&self, job: ChunkJob) -> Result<()> {
        let ChunkJob {
            subset,
            chunk,
            generation,
            order,
            mut rng,
        } = job;

        // Declared before `loader` so an unwinding source releases the loader
        // lock before the guard takes the state lock.
        let _reservation = Reservation {
            shared: self,
            subset,
        };
        let mut loader = self.loader.lock();
        let Loader {
            source,
            assembler,
            chunk: buffer,
        } = &mut *loader;
        let result = assembler.load_chunk(source, &order, chunk, &mut rng, buffer);

        let mut state = self.state.lock();
        let sub = state.subset_mut(subset);
        sub.in_flight = false;

        let outcome = if sub.generation != generation {
            debug!(subset:% = subset, chunk = chunk; "discarding chunk of an aborted epoch");
            Ok(())
        } else {
            match result {
                Ok(()) => {
                    let queued = sub.coalescer.ingest(buffer);
                    sub.cursor += 1;
                    debug!(
                        subset:% = subset,
                        chunk = chunk,
                        rows = buffer.rows(),
                        ranges = order.chunk(chunk).map_or(0, <[_]>::len),
                        queued = queued;
                        "loaded chunk"
                    );
                    Ok(())
                }
                Err(e) => {
                    warn!(subset:% = subset, chunk = chunk; "chunk load failed: {e}");
                    if self.config.background_prefetch {
                        sub.error = Some(e);
                        Ok(())
                    } else {
                        Err(e)
                    }
                }
            }
        };

        drop(state);
        drop(loader);
        self.changed.notify_all();
        outcome
    }
}

/// Releases a subset's chunk reservation if its load panics, so the chunk can
/// be reserved again once the generator is reactivated.
struct Reservation<'a, S> {
    shared: &'a Shared<S>,
    subset: Subset,
}

impl<S> Drop for Reservation<'_, S> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }

        let mut state = self.shared.state.lock();
        let sub = state.subset_mut(self.subset);
        sub.in_flight = false;
        warn!(subset:% = self.subset, chunk = sub.cursor; "chunk load panicked");

        drop(state);
        self.shared.changed.notify_all();
    }
}

/// Body of the background prefetch thread.
///
/// Keeps every subset with a running epoch topped up to the prefetch threshold
/// and returns once the generator is deactivated.
pub(super) fn prefetch<S: RowSource>(shared: Arc<Shared<S>>) {
    debug!("prefetch thread started");
    let threshold = shared.config.prefetch_threshold;

    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if !state.active {
                    debug!("prefetch thread stopped");
                    return;
                }

                if let Some(job) = state.subsets.iter_mut().find_map(|s| s.next_job(threshold)) {
                    break job;
                }

                shared.changed.wait(&mut state);
            }
        };

        // Failures are stored in the subset's state by `run_job`.
        let _ = shared.run_job(job);
    }
}
