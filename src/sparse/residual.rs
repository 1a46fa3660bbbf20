use nalgebra_sparse::CsrMatrix;

use crate::NumericOps;

use super::csr_from_rows;

/// List-of-rows binary matrix supporting cheap in-place removal.
///
/// Holds the entries of the input that no accepted pattern explains yet. Rows
/// keep their column indices sorted; the active entry count only decreases.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualMatrix {
    rows: Vec<Vec<usize>>,
    ncols: usize,
    nnz: usize,
}

impl ResidualMatrix {
    pub fn from_csr<M: NumericOps>(x: &CsrMatrix<M>) -> Self {
        let rows: Vec<Vec<usize>> = x
            .row_iter()
            .map(|row| {
                row.col_indices()
                    .iter()
                    .zip(row.values().iter())
                    .filter(|(_, v)| v.is_active())
                    .map(|(&j, _)| j)
                    .collect()
            })
            .collect();
        let nnz = rows.iter().map(Vec::len).sum();
        Self {
            rows,
            ncols: x.ncols(),
            nnz,
        }
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub fn is_empty(&self) -> bool {
        self.nnz == 0
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.rows[row].binary_search(&col).is_ok()
    }

    /// Number of `cols` still active in `row`.
    pub fn count_in_row(&self, row: usize, cols: &[usize]) -> usize {
        let entries = &self.rows[row];
        if entries.is_empty() {
            return 0;
        }
        cols.iter()
            .filter(|c| entries.binary_search(c).is_ok())
            .count()
    }

    /// Number of active entries in the `rows` × `cols` submatrix.
    pub fn count_in(&self, rows: &[usize], cols: &[usize]) -> usize {
        rows.iter().map(|&r| self.count_in_row(r, cols)).sum()
    }

    /// Clear every entry of the `rows` × `cols` rectangle and return how many
    /// were active. `cols` must be sorted.
    pub fn remove_pattern(&mut self, rows: &[usize], cols: &[usize]) -> usize {
        let mut removed = 0;
        for &r in rows {
            let entries = &mut self.rows[r];
            let before = entries.len();
            entries.retain(|c| cols.binary_search(c).is_err());
            removed += before - entries.len();
        }
        self.nnz -= removed;
        removed
    }

    pub fn clear(&mut self) {
        self.rows.iter_mut().for_each(Vec::clear);
        self.nnz = 0;
    }

    pub fn to_csr(&self) -> CsrMatrix<f64> {
        csr_from_rows(&self.rows, self.ncols)
    }
}
