use nalgebra_sparse::CscMatrix;

use crate::NumericOps;

use super::ActiveIndices;

impl<M: NumericOps> ActiveIndices for CscMatrix<M> {
    fn lanes(&self) -> usize {
        self.ncols()
    }

    fn active_indices(&self, lane: usize) -> Vec<usize> {
        let col = self.col(lane);
        col.row_indices()
            .iter()
            .zip(col.values().iter())
            .filter(|(_, v)| v.is_active())
            .map(|(&i, _)| i)
            .collect()
    }
}
