//! Scoring of matrices stacked from several sub-matrices.
//!
//! Each block is scored with its own `w`, per lane along the shared dimension,
//! and the per-block scores can then be combined.

use std::ops::Range;

use log::warn;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::{Array1, Array2, ArrayView2};

use super::coverage_score;
use crate::error::FactorizationError;
use crate::Direction;

/// Sub-matrix holding the columns (for `Direction::ROW`) or rows (for
/// `Direction::COLUMN`) in `range`, re-indexed from zero.
fn block(x: &CsrMatrix<f64>, range: Range<usize>, axis: Direction) -> CsrMatrix<f64> {
    let shape = match axis {
        Direction::ROW => (x.nrows(), range.len()),
        Direction::COLUMN => (range.len(), x.ncols()),
    };
    let mut coo = CooMatrix::new(shape.0, shape.1);
    for (i, j, &value) in x.triplet_iter() {
        match axis {
            Direction::ROW if range.contains(&j) => coo.push(i, j - range.start, value),
            Direction::COLUMN if range.contains(&i) => coo.push(i - range.start, j, value),
            _ => {}
        }
    }
    CsrMatrix::from(&coo)
}

/// Per-block coverage of a stacked matrix.
///
/// Block `b` spans `starts[b]..starts[b + 1]` and is scored with `w[b]`. With
/// `Direction::ROW` the blocks are column ranges and each block yields one
/// score per row; with `Direction::COLUMN` they are row ranges scored per
/// column. The result has one row per block.
pub fn collective_coverage(
    ground_truth: &CsrMatrix<f64>,
    predicted: &CsrMatrix<f64>,
    w: &[f64],
    axis: Direction,
    starts: &[usize],
) -> anyhow::Result<Array2<f64>> {
    if starts.len() != w.len() + 1 {
        return Err(FactorizationError::invalid_parameter(
            "starts",
            format!("{} starts given for {} sub-matrices", starts.len(), w.len()),
        )
        .into());
    }
    let (extent, lanes) = match axis {
        Direction::ROW => (ground_truth.ncols(), ground_truth.nrows()),
        Direction::COLUMN => (ground_truth.nrows(), ground_truth.ncols()),
    };
    if starts.windows(2).any(|pair| pair[0] > pair[1]) || starts.last().is_some_and(|&end| end > extent) {
        return Err(FactorizationError::invalid_parameter(
            "starts",
            format!("{:?} is not an increasing split of 0..{}", starts, extent),
        )
        .into());
    }

    let mut scores = Array2::zeros((w.len(), lanes));
    for (b, &block_w) in w.iter().enumerate() {
        let range = starts[b]..starts[b + 1];
        let score = coverage_score(
            &block(ground_truth, range.clone(), axis),
            &block(predicted, range, axis),
            block_w,
            Some(axis),
        )?;
        if let Some(per_lane) = score.per_lane() {
            scores.row_mut(b).assign(&Array1::from(per_lane.to_vec()));
        }
    }
    Ok(scores)
}

/// `weightsᵀ · scores`: one combined score per column of `scores`.
pub fn weighted_score(scores: ArrayView2<f64>, weights: &[f64]) -> anyhow::Result<Array1<f64>> {
    if weights.len() != scores.nrows() {
        return Err(FactorizationError::shape_mismatch(
            "score weights",
            (scores.nrows(), 1),
            (weights.len(), 1),
        )
        .into());
    }
    Ok(Array1::from(weights.to_vec()).dot(&scores))
}

/// Harmonic mean of each column of `scores`; NaN where any block score is NaN.
pub fn harmonic_score(scores: ArrayView2<f64>) -> Array1<f64> {
    let n = scores.nrows() as f64;
    scores
        .columns()
        .into_iter()
        .map(|column| {
            if column.iter().any(|s| s.is_nan()) {
                warn!("NaN block score encountered in harmonic score");
                return f64::NAN;
            }
            n / column.iter().map(|s| 1.0 / s).sum::<f64>()
        })
        .collect()
}
