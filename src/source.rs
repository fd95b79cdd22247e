use std::ops::Range;

use ndarray::{Array2, ArrayView2, s};

use crate::{buffer::RowBuffer, error::RowSourceErr};

/// Anything that can materialize a range of rows of named columns.
///
/// Calls are synchronous and never reentrant: at most one fetch is in flight
/// per source.
pub trait RowSource {
    /// Writes rows `range` of `columns`, in row order, into `out` starting at
    /// row `write_offset`. Column order in `out` follows `columns`.
    ///
    /// # Arguments
    /// * `columns` - Names of the columns to read.
    /// * `range` - Half-open interval of entry indices.
    /// * `out` - Destination buffer, must have `columns.len()` columns.
    /// * `write_offset` - First row of `out` to write.
    ///
    /// # Returns
    /// A `RowSourceErr` if the range cannot be read or doesn't fit in `out`.
    fn fetch_rows(
        &mut self,
        columns: &[String],
        range: Range<usize>,
        out: &mut RowBuffer,
        write_offset: usize,
    ) -> Result<(), RowSourceErr>;
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn fetch_rows(
        &mut self,
        columns: &[String],
        range: Range<usize>,
        out: &mut RowBuffer,
        write_offset: usize,
    ) -> Result<(), RowSourceErr> {
        (**self).fetch_rows(columns, range, out, write_offset)
    }
}

/// A row source backed by a named-column matrix held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryRowSource {
    names: Vec<String>,
    data: Array2<f32>,
}

impl InMemoryRowSource {
    /// Creates a new source from an `entries x names.len()` matrix.
    ///
    /// # Panics
    /// - if `data` doesn't have one column per name
    pub fn new<N: Into<String>>(names: impl IntoIterator<Item = N>, data: Array2<f32>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        assert_eq!(names.len(), data.ncols(), "one name per column is required");
        Self { names, data }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    #[inline]
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    #[inline]
    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    fn column_index(&self, name: &str) -> Result<usize, RowSourceErr> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| RowSourceErr::UnknownColumn(name.to_string()))
    }
}

impl RowSource for InMemoryRowSource {
    fn fetch_rows(
        &mut self,
        columns: &[String],
        range: Range<usize>,
        out: &mut RowBuffer,
        write_offset: usize,
    ) -> Result<(), RowSourceErr> {
        if range.start > range.end || range.end > self.len() {
            return Err(RowSourceErr::OutOfBounds {
                start: range.start,
                end: range.end,
                num_entries: self.len(),
            });
        }

        let available = out.rows().saturating_sub(write_offset);
        if range.len() > available {
            return Err(RowSourceErr::BufferTooSmall {
                needed: range.len(),
                available,
            });
        }

        let indices = columns
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Result<Vec<_>, _>>()?;

        if out.cols() != indices.len() {
            return Err(RowSourceErr::Other(format!(
                "output buffer has {} columns, {} were requested",
                out.cols(),
                indices.len()
            )));
        }

        let rows = self.data.slice(s![range.start..range.end, ..]);
        for (i, row) in rows.outer_iter().enumerate() {
            let dst = out.row_mut(write_offset + i);
            for (value, &col) in dst.iter_mut().zip(&indices) {
                *value = row[col];
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn source() -> InMemoryRowSource {
        InMemoryRowSource::new(
            ["a", "b", "c"],
            array![[0f32, 10., 100.], [1., 11., 101.], [2., 12., 102.], [3., 13., 103.]],
        )
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fetch_respects_column_order_and_offset() {
        let mut src = source();
        let mut out = RowBuffer::new(3, 2);

        src.fetch_rows(&cols(&["c", "a"]), 2..4, &mut out, 1).unwrap();

        assert_eq!(out.row(0), &[0., 0.]);
        assert_eq!(out.row(1), &[102., 2.]);
        assert_eq!(out.row(2), &[103., 3.]);
    }

    #[test]
    fn unknown_column() {
        let mut src = source();
        let mut out = RowBuffer::new(1, 1);

        let err = src.fetch_rows(&cols(&["z"]), 0..1, &mut out, 0).unwrap_err();
        assert!(matches!(err, RowSourceErr::UnknownColumn(name) if name == "z"));
    }

    #[test]
    fn out_of_bounds_range() {
        let mut src = source();
        let mut out = RowBuffer::new(10, 1);

        let err = src.fetch_rows(&cols(&["a"]), 2..5, &mut out, 0).unwrap_err();
        assert!(matches!(
            err,
            RowSourceErr::OutOfBounds {
                start: 2,
                end: 5,
                num_entries: 4
            }
        ));
    }

    #[test]
    fn buffer_too_small() {
        let mut src = source();
        let mut out = RowBuffer::new(2, 1);

        let err = src.fetch_rows(&cols(&["a"]), 0..2, &mut out, 1).unwrap_err();
        assert!(matches!(
            err,
            RowSourceErr::BufferTooSmall {
                needed: 2,
                available: 1
            }
        ));
    }
}
