//! Sparse matrix helpers: lane access, dense conversion and the residual used
//! by exact-cover synthesis.

use anyhow::anyhow;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::{Array2, ArrayView2};

use crate::NumericOps;

pub mod csc;
pub mod csr;
mod residual;

pub use residual::ResidualMatrix;

/// Sorted indices of the active entries along the storage's major lane:
/// columns of a row for CSR, rows of a column for CSC.
pub trait ActiveIndices {
    fn lanes(&self) -> usize;

    fn active_indices(&self, lane: usize) -> Vec<usize>;
}

/// Build a CSR matrix holding the active entries of a dense array.
pub fn dense_to_csr(a: ArrayView2<f64>) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(a.nrows(), a.ncols());
    for ((i, j), &value) in a.indexed_iter() {
        if value.is_active() {
            coo.push(i, j, value);
        }
    }
    CsrMatrix::from(&coo)
}

pub fn csr_to_dense<M: NumericOps>(x: &CsrMatrix<M>) -> anyhow::Result<Array2<f64>> {
    let mut dense = Array2::zeros((x.nrows(), x.ncols()));
    for (i, j, &value) in x.triplet_iter() {
        dense[[i, j]] = value
            .to_f64()
            .ok_or_else(|| anyhow!("Failed to convert to f64"))?;
    }
    Ok(dense)
}

/// Dense 0/1 indicator of the active entries of `x`.
pub fn support_mask<M: NumericOps>(x: &CsrMatrix<M>) -> Array2<f64> {
    let mut mask = Array2::zeros((x.nrows(), x.ncols()));
    for (i, j, value) in x.triplet_iter() {
        if value.is_active() {
            mask[[i, j]] = 1.0;
        }
    }
    mask
}

/// Build a 0/1 CSR matrix from per-row sorted active column lists.
pub(crate) fn csr_from_rows(rows: &[Vec<usize>], ncols: usize) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(rows.len(), ncols);
    for (i, cols) in rows.iter().enumerate() {
        for &j in cols {
            coo.push(i, j, 1.0);
        }
    }
    CsrMatrix::from(&coo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dense_roundtrip_drops_zeros() {
        let a = array![[0.0, 0.7], [0.0, 0.0], [1.0, -2.0]];
        let csr = dense_to_csr(a.view());
        assert_eq!(csr.nnz(), 2);

        let back = csr_to_dense(&csr).unwrap();
        assert_eq!(back, array![[0.0, 0.7], [0.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_support_mask() {
        let coo = CooMatrix::try_from_triplets(
            2,
            3,
            vec![0, 0, 1],
            vec![0, 2, 1],
            vec![3.0, 0.0, 1.0],
        )
        .unwrap();
        let csr = CsrMatrix::from(&coo);
        assert_eq!(support_mask(&csr), array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    }

    #[test]
    fn test_csr_from_rows() {
        let csr = csr_from_rows(&[vec![1], vec![], vec![0, 2]], 3);
        assert_eq!((csr.nrows(), csr.ncols()), (3, 3));
        let triplets: Vec<_> = csr.triplet_iter().map(|(i, j, _)| (i, j)).collect();
        assert_eq!(triplets, vec![(0, 1), (2, 0), (2, 2)]);
    }
}
