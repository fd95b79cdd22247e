use std::ops::{Deref, DerefMut};

use crate::{
    buffer::Batch,
    error::{GeneratorErr, Result},
    partition::Subset,
    source::RowSource,
};

use super::BatchGenerator;

/// An iterator over the batches of one epoch of a subset.
///
/// Load failures are yielded as errors and iteration may continue after them,
/// retrying the failed chunk. Ends when the epoch does or once the generator
/// turns out to be inactive.
pub struct EpochBatches<'a, S: RowSource + Send + 'static> {
    generator: &'a BatchGenerator<S>,
    subset: Subset,
    done: bool,
}

impl<'a, S: RowSource + Send + 'static> EpochBatches<'a, S> {
    pub(super) fn new(generator: &'a BatchGenerator<S>, subset: Subset) -> Self {
        Self {
            generator,
            subset,
            done: false,
        }
    }
}

impl<S: RowSource + Send + 'static> Iterator for EpochBatches<'_, S> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.generator.next_batch(self.subset) {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = matches!(e, GeneratorErr::Inactive | GeneratorErr::LoaderPanicked);
                Some(Err(e))
            }
        }
    }
}

impl<S: RowSource + Send + 'static> std::iter::FusedIterator for EpochBatches<'_, S> {}

/// Keeps a `BatchGenerator` active for as long as it lives.
pub struct ActiveGenerator<'a, S: RowSource + Send + 'static> {
    generator: &'a mut BatchGenerator<S>,
}

impl<'a, S: RowSource + Send + 'static> ActiveGenerator<'a, S> {
    pub(super) fn new(generator: &'a mut BatchGenerator<S>) -> Self {
        Self { generator }
    }
}

impl<S: RowSource + Send + 'static> Deref for ActiveGenerator<'_, S> {
    type Target = BatchGenerator<S>;

    fn deref(&self) -> &Self::Target {
        self.generator
    }
}

impl<S: RowSource + Send + 'static> DerefMut for ActiveGenerator<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.generator
    }
}

impl<S: RowSource + Send + 'static> Drop for ActiveGenerator<'_, S> {
    fn drop(&mut self) {
        self.generator.deactivate();
    }
}
