//! The training-loop facing batch generator.
//!
//! Ties a `RangePartitioner`, a `ChunkAssembler` and one `BatchCoalescer` per
//! subset together behind a pull-based API. Chunks are loaded on the caller's
//! thread when a subset's queue runs low, or ahead of time by a background
//! prefetch thread when enabled in the config.

mod iter;
mod state;

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{info, warn};
use ndarray::Array2;
use parking_lot::{Condvar, Mutex};
use rand::{SeedableRng, rngs::StdRng};

pub use iter::{ActiveGenerator, EpochBatches};

use crate::{
    assembler::ChunkAssembler,
    buffer::{Batch, RowBuffer},
    coalescer::BatchCoalescer,
    config::GeneratorConfig,
    error::{ConfigErr, GeneratorErr, Result},
    partition::{PartitionLayout, RangePartitioner, Subset},
    source::RowSource,
};
use state::{Loader, Shared, State, SubsetState};

/// How often a caller blocked on the prefetch thread checks that it's alive.
const LIVENESS_CHECK: Duration = Duration::from_millis(50);

/// The outcome of a non-blocking batch request.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchPoll {
    /// The next batch of the subset.
    Ready(Batch),
    /// No batch is queued yet but the epoch has chunks left to load.
    Pending,
    /// Every batch of the epoch was delivered; the next poll starts a new one.
    EpochDone,
}

/// The lifecycle of a `BatchGenerator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Idle,
    Active,
    /// Active with at least one subset in the middle of an epoch.
    EpochActive,
}

/// Produces fixed-size training and validation batches from a row source.
///
/// The generator starts `Idle` and must be activated before batches can be
/// requested. Deactivating it stops chunk loading but keeps already queued
/// batches available.
pub struct BatchGenerator<S: RowSource + Send + 'static> {
    shared: Arc<Shared<S>>,
    layout: PartitionLayout,
    feature_indices: Vec<usize>,
    target_indices: Vec<usize>,
    prefetcher: Option<JoinHandle<()>>,
}

impl<S: RowSource + Send + 'static> BatchGenerator<S> {
    /// Creates a new `BatchGenerator`.
    ///
    /// # Arguments
    /// * `config` - The generator's configuration.
    /// * `source` - Where rows are read from.
    ///
    /// # Returns
    /// A `ConfigErr` if the config is invalid.
    pub fn new(config: GeneratorConfig, source: S) -> std::result::Result<Self, ConfigErr> {
        config.validate()?;

        let layout = PartitionLayout::new(
            config.num_entries,
            config.chunk_size,
            config.range_size,
            config.validation_split,
        )?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let partitioner = RangePartitioner::from_layout(layout, StdRng::from_rng(&mut rng));
        let cols = config.columns.len();
        let subsets = Subset::ALL.map(|subset| {
            let coalescer = BatchCoalescer::new(config.batch_size, cols);
            SubsetState::new(subset, coalescer, StdRng::from_rng(&mut rng))
        });

        let loader = Loader {
            source,
            assembler: ChunkAssembler::new(config.columns.clone(), config.shuffle),
            chunk: RowBuffer::default(),
        };

        info!(
            entries = config.num_entries,
            train = layout.train.entries,
            validation = layout.validation.entries,
            chunk_size = config.chunk_size,
            batch_size = config.batch_size,
            shuffle = config.shuffle;
            "batch generator created"
        );

        let feature_indices = config.feature_indices();
        let target_indices = config.target_indices();

        let shared = Shared {
            config,
            state: Mutex::new(State {
                partitioner,
                subsets,
                active: false,
            }),
            loader: Mutex::new(loader),
            changed: Condvar::new(),
        };

        Ok(Self {
            shared: Arc::new(shared),
            layout,
            feature_indices,
            target_indices,
            prefetcher: None,
        })
    }

    /// Allows chunk loading, spawning the prefetch thread if configured. Idempotent.
    pub fn activate(&mut self) {
        let was_active = std::mem::replace(&mut self.shared.state.lock().active, true);

        if self.shared.config.background_prefetch && self.prefetcher.is_none() {
            let shared = Arc::clone(&self.shared);
            self.prefetcher = Some(thread::spawn(move || state::prefetch(shared)));
        }

        if !was_active {
            info!(background = self.prefetcher.is_some(); "batch generator activated");
        }
    }

    /// Stops chunk loading and joins the prefetch thread, if any.
    ///
    /// Batches already queued can still be taken afterwards.
    pub fn deactivate(&mut self) {
        let was_active = std::mem::replace(&mut self.shared.state.lock().active, false);
        self.shared.changed.notify_all();

        if let Some(Err(e)) = self.prefetcher.take().map(JoinHandle::join) {
            warn!("prefetch thread panicked: {e:?}");
        }

        if was_active {
            info!("batch generator deactivated");
        }
    }

    /// Activates the generator until the returned guard is dropped.
    pub fn activated(&mut self) -> ActiveGenerator<'_, S> {
        self.activate();
        ActiveGenerator::new(self)
    }

    pub fn state(&self) -> GeneratorState {
        let state = self.shared.state.lock();

        if !state.active {
            GeneratorState::Idle
        } else if state.subsets.iter().any(|s| s.order.is_some()) {
            GeneratorState::EpochActive
        } else {
            GeneratorState::Active
        }
    }

    #[inline]
    pub fn config(&self) -> &GeneratorConfig {
        &self.shared.config
    }

    #[inline]
    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    #[inline]
    pub fn num_train_chunks(&self) -> usize {
        self.num_chunks(Subset::Train)
    }

    #[inline]
    pub fn num_validation_chunks(&self) -> usize {
        self.num_chunks(Subset::Validation)
    }

    #[inline]
    pub fn num_chunks(&self, subset: Subset) -> usize {
        self.layout.subset(subset).num_chunks()
    }

    /// The amount of batches a full epoch of `subset` delivers.
    pub fn num_batches(&self, subset: Subset) -> usize {
        let entries = self.layout.subset(subset).entries;
        let batch_size = self.shared.config.batch_size;
        let short = !self.shared.config.drop_remainder && entries % batch_size != 0;

        entries / batch_size + short as usize
    }

    /// Rows left over at the end of an epoch of `subset`, dropped or delivered
    /// as a short batch depending on `drop_remainder`.
    #[inline]
    pub fn last_batch_rows(&self, subset: Subset) -> usize {
        self.layout.subset(subset).entries % self.shared.config.batch_size
    }

    pub fn queue_depth(&self, subset: Subset) -> usize {
        self.shared.state.lock().subset(subset).coalescer.queue_depth()
    }

    pub fn epochs_completed(&self, subset: Subset) -> usize {
        self.shared.state.lock().subset(subset).epochs_completed
    }

    pub fn feature_columns(&self) -> Vec<&str> {
        let columns = &self.shared.config.columns;
        self.feature_indices.iter().map(|&i| columns[i].as_str()).collect()
    }

    pub fn target_columns(&self) -> Vec<&str> {
        let columns = &self.shared.config.columns;
        self.target_indices.iter().map(|&i| columns[i].as_str()).collect()
    }

    /// Splits a batch into its feature and target matrices.
    ///
    /// # Returns
    /// `(features, targets)`, each with the batch's rows and the columns of
    /// `feature_columns` and `target_columns` respectively.
    pub fn split_batch(&self, batch: &Batch) -> (Array2<f32>, Array2<f32>) {
        (
            batch.select_columns(&self.feature_indices),
            batch.select_columns(&self.target_indices),
        )
    }

    /// Requests the next training batch without blocking on chunk loads of
    /// other threads.
    #[inline]
    pub fn poll_train_batch(&self) -> Result<BatchPoll> {
        self.poll(Subset::Train)
    }

    #[inline]
    pub fn poll_validation_batch(&self) -> Result<BatchPoll> {
        self.poll(Subset::Validation)
    }

    /// Returns the next training batch, or `None` once the epoch is over.
    ///
    /// Waits for pending chunk loads. The call after `None` starts a new epoch.
    #[inline]
    pub fn get_train_batch(&self) -> Result<Option<Batch>> {
        self.next_batch(Subset::Train)
    }

    #[inline]
    pub fn get_validation_batch(&self) -> Result<Option<Batch>> {
        self.next_batch(Subset::Validation)
    }

    /// Iterates over the rest of the current training epoch, or over a new one.
    pub fn train_batches(&self) -> EpochBatches<'_, S> {
        EpochBatches::new(self, Subset::Train)
    }

    pub fn validation_batches(&self) -> EpochBatches<'_, S> {
        EpochBatches::new(self, Subset::Validation)
    }

    /// Aborts the running epoch of `subset`, dropping its queued batches and
    /// leftover rows. The next request starts a new epoch.
    pub fn end_epoch(&self, subset: Subset) {
        self.shared.state.lock().subset_mut(subset).abort_epoch();
        self.shared.changed.notify_all();
        info!(subset:% = subset; "epoch aborted");
    }

    /// Loads a whole subset into a single buffer, in a freshly drawn order.
    ///
    /// Running epochs are left untouched.
    pub fn load_subset(&self, subset: Subset) -> Result<Batch> {
        let (order, mut rng) = {
            let mut state = self.shared.state.lock();
            let order = state.partitioner.new_epoch_order(subset);
            (order, state.subset_mut(subset).fork_rng())
        };

        let mut loader = self.shared.loader.lock();
        let Loader {
            source, assembler, ..
        } = &mut *loader;

        let mut out = RowBuffer::default();
        assembler.load_subset(source, &order, &mut rng, &mut out)?;
        Ok(out)
    }

    /// Takes the next batch of `subset`, starting an epoch if none is running.
    fn poll(&self, subset: Subset) -> Result<BatchPoll> {
        let shared = &self.shared;
        let config = &shared.config;

        if self.prefetcher_died() {
            return Err(GeneratorErr::LoaderPanicked);
        }

        let job = {
            let mut state = shared.state.lock();
            let State {
                partitioner,
                subsets,
                active,
            } = &mut *state;
            let sub = &mut subsets[subset.index()];

            if let Some(e) = sub.error.take() {
                drop(state);
                shared.changed.notify_all();
                return Err(e);
            }

            if !*active {
                return sub
                    .coalescer
                    .pop_batch()
                    .map(BatchPoll::Ready)
                    .ok_or(GeneratorErr::Inactive);
            }

            if sub.order.is_none() {
                sub.start_epoch(partitioner.new_epoch_order(subset));
            }

            if config.background_prefetch {
                let poll = sub.poll_queue(config.drop_remainder);
                drop(state);
                shared.changed.notify_all();
                return Ok(poll);
            }

            match sub.next_job(config.prefetch_threshold) {
                Some(job) => job,
                None => return Ok(sub.poll_queue(config.drop_remainder)),
            }
        };

        shared.run_job(job)?;
        Ok(shared
            .state
            .lock()
            .subset_mut(subset)
            .poll_queue(config.drop_remainder))
    }

    fn next_batch(&self, subset: Subset) -> Result<Option<Batch>> {
        loop {
            match self.poll(subset)? {
                BatchPoll::Ready(batch) => return Ok(Some(batch)),
                BatchPoll::EpochDone => return Ok(None),
                BatchPoll::Pending => self.wait_for_progress(subset),
            }
        }
    }

    /// Blocks while a poll of `subset` could only return `Pending` and the
    /// progress depends on another thread.
    fn wait_for_progress(&self, subset: Subset) {
        let background = self.shared.config.background_prefetch;
        let mut state = self.shared.state.lock();

        loop {
            let sub = state.subset(subset);
            let blocked = state.active && !sub.has_news() && (background || sub.in_flight);
            if !blocked || self.prefetcher_died() {
                return;
            }

            self.shared.changed.wait_for(&mut state, LIVENESS_CHECK);
        }
    }

    /// The prefetch thread only exits on its own by panicking.
    fn prefetcher_died(&self) -> bool {
        self.prefetcher.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

impl<S: RowSource + Send + 'static> Drop for BatchGenerator<S> {
    fn drop(&mut self) {
        self.deactivate();
    }
}
