#![allow(dead_code)]

use std::{io, ops::Range};

use batch_generator::{Batch, GeneratorConfig, InMemoryRowSource, RowBuffer, RowSource, RowSourceErr};
use ndarray::Array2;

pub const COLUMNS: [&str; 3] = ["idx", "x", "label"];

/// A source whose rows carry `10 * entry` in column 0.
pub fn indexed_source(n: usize) -> InMemoryRowSource {
    let data = Array2::from_shape_fn((n, COLUMNS.len()), |(i, j)| (i * 10 + j) as f32);
    InMemoryRowSource::new(COLUMNS, data)
}

pub fn config(n: usize) -> GeneratorConfig {
    GeneratorConfig::new(n, 75, 10, 10, COLUMNS)
        .with_validation_split(0.3)
        .with_seed(2024)
}

/// The entry indices of the rows of `batch`.
pub fn entries(batch: &Batch) -> Vec<usize> {
    (0..batch.rows())
        .map(|i| batch.row(i)[0] as usize / 10)
        .collect()
}

pub fn sorted(mut entries: Vec<usize>) -> Vec<usize> {
    entries.sort_unstable();
    entries
}

/// Wraps a source, failing its `fail_at`-th fetch once.
pub struct Flaky<S> {
    pub inner: S,
    pub calls: usize,
    pub fail_at: usize,
}

impl<S> Flaky<S> {
    pub fn new(inner: S, fail_at: usize) -> Self {
        Self {
            inner,
            calls: 0,
            fail_at,
        }
    }
}

impl<S: RowSource> RowSource for Flaky<S> {
    fn fetch_rows(
        &mut self,
        columns: &[String],
        range: Range<usize>,
        out: &mut RowBuffer,
        write_offset: usize,
    ) -> Result<(), RowSourceErr> {
        self.calls += 1;
        if self.calls == self.fail_at {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out").into());
        }

        self.inner.fetch_rows(columns, range, out, write_offset)
    }
}

/// A source that panics on its first fetch.
pub struct Panicky;

impl RowSource for Panicky {
    fn fetch_rows(
        &mut self,
        _columns: &[String],
        _range: Range<usize>,
        _out: &mut RowBuffer,
        _write_offset: usize,
    ) -> Result<(), RowSourceErr> {
        panic!("source blew up");
    }
}

/// Wraps a source, panicking on its first fetch only.
pub struct PanicsOnce<S> {
    pub inner: S,
    pub panicked: bool,
}

impl<S> PanicsOnce<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            panicked: false,
        }
    }
}

impl<S: RowSource> RowSource for PanicsOnce<S> {
    fn fetch_rows(
        &mut self,
        columns: &[String],
        range: Range<usize>,
        out: &mut RowBuffer,
        write_offset: usize,
    ) -> Result<(), RowSourceErr> {
        if !self.panicked {
            self.panicked = true;
            panic!("source blew up once");
        }

        self.inner.fetch_rows(columns, range, out, write_offset)
    }
}
