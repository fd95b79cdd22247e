use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

/// A single fixed-size unit delivered to the training loop.
pub type Batch = RowBuffer;

/// Resizable 2D float buffer with contiguous row-major storage.
///
/// Chunks, batches and leftover slots are all `RowBuffer`s. The flat storage
/// always holds exactly `rows * cols` values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBuffer {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl RowBuffer {
    /// Creates a zeroed buffer of `rows` by `cols`.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.; rows * cols],
        }
    }

    /// Wraps an already row-major flat vector.
    ///
    /// # Returns
    /// `None` if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    /// Reshapes the buffer, reusing its allocation. The contents after a
    /// resize are unspecified and must be overwritten by the caller.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.data.resize(rows * cols, 0.);
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Returns row `i` (panics if out of bounds).
    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Returns row `i` mutably (panics if out of bounds).
    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Returns the contiguous rows `[start, end)` as one flat slice.
    #[inline]
    pub fn rows_slice(&self, start: usize, end: usize) -> &[f32] {
        &self.data[start * self.cols..end * self.cols]
    }

    /// Returns the contiguous rows `[start, end)` as one flat mutable slice.
    #[inline]
    pub fn rows_slice_mut(&mut self, start: usize, end: usize) -> &mut [f32] {
        &mut self.data[start * self.cols..end * self.cols]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Writes `src`'s rows into `self` following `perm`, so that row `i` of
    /// `self` is row `perm[i]` of `src`.
    ///
    /// # Panics
    /// If `perm.len()` differs from the row count of either buffer.
    pub fn gather_rows(&mut self, src: &RowBuffer, perm: &[usize]) {
        assert_eq!(perm.len(), self.rows, "permutation length mismatch");
        assert_eq!(src.rows, self.rows, "row count mismatch");

        if self.cols == 0 {
            return;
        }

        let cols = self.cols;
        self.data
            .par_chunks_mut(cols)
            .zip(perm.par_iter())
            .for_each(|(dst, &from)| dst.copy_from_slice(src.row(from)));
    }

    /// Borrowed `ndarray` view of the buffer.
    pub fn view(&self) -> ArrayView2<'_, f32> {
        // SAFETY: `data.len() == rows * cols` is kept by every constructor and `resize`.
        ArrayView2::from_shape((self.rows, self.cols), &self.data).unwrap()
    }

    /// Converts the buffer into an owned `ndarray` matrix.
    pub fn into_array(self) -> Array2<f32> {
        // SAFETY: `data.len() == rows * cols` is kept by every constructor and `resize`.
        Array2::from_shape_vec((self.rows, self.cols), self.data).unwrap()
    }

    /// Copies the given columns, in order, into a new matrix.
    pub fn select_columns(&self, indices: &[usize]) -> Array2<f32> {
        self.view().select(Axis(1), indices)
    }
}

impl From<Array2<f32>> for RowBuffer {
    fn from(value: Array2<f32>) -> Self {
        let (rows, cols) = value.dim();
        let data = match value.as_slice() {
            Some(slice) => slice.to_vec(),
            None => value.iter().copied().collect(),
        };

        Self { rows, cols, data }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn rows_are_contiguous_and_row_major() {
        let buf = RowBuffer::from_vec(3, 2, vec![0., 1., 10., 11., 20., 21.]).unwrap();

        assert_eq!(buf.row(1), &[10., 11.]);
        assert_eq!(buf.rows_slice(1, 3), &[10., 11., 20., 21.]);
        assert_eq!(buf.view()[[2, 0]], 20.);
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        assert!(RowBuffer::from_vec(2, 2, vec![0.; 3]).is_none());
    }

    #[test]
    fn resize_changes_shape() {
        let mut buf = RowBuffer::new(4, 3);
        buf.resize(2, 5);

        assert_eq!((buf.rows(), buf.cols()), (2, 5));
        assert_eq!(buf.as_slice().len(), 10);
    }

    #[test]
    fn gather_rows_applies_permutation() {
        let src = RowBuffer::from_vec(3, 1, vec![0., 1., 2.]).unwrap();
        let mut dst = RowBuffer::new(3, 1);

        dst.gather_rows(&src, &[2, 0, 1]);
        assert_eq!(dst.as_slice(), &[2., 0., 1.]);
    }

    #[test]
    fn select_columns_and_array_conversion() {
        let buf = RowBuffer::from(array![[1f32, 2., 3.], [4., 5., 6.]]);

        assert_eq!(buf.select_columns(&[2, 0]), array![[3f32, 1.], [6., 4.]]);
        assert_eq!(buf.into_array(), array![[1f32, 2., 3.], [4., 5., 6.]]);
    }

    #[test]
    fn non_standard_layout_is_copied_row_major() {
        let transposed = array![[1f32, 2.], [3., 4.]].reversed_axes();
        let buf = RowBuffer::from(transposed);

        assert_eq!(buf.as_slice(), &[1., 3., 2., 4.]);
    }
}
