use nalgebra_sparse::CsrMatrix;

use crate::NumericOps;

use super::ActiveIndices;

impl<M: NumericOps> ActiveIndices for CsrMatrix<M> {
    fn lanes(&self) -> usize {
        self.nrows()
    }

    fn active_indices(&self, lane: usize) -> Vec<usize> {
        let row = self.row(lane);
        row.col_indices()
            .iter()
            .zip(row.values().iter())
            .filter(|(_, v)| v.is_active())
            .map(|(&j, _)| j)
            .collect()
    }
}
