//! # Boolean algebra
//!
//! Primitives shared by every factorization algorithm: the boolean matrix product
//! (OR of ANDs) and the weighted coverage score that rewards covering the positive
//! cells of a ground truth and penalizes covering anything else.

use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::{Array2, ArrayView2};

use crate::error::FactorizationError;
use crate::sparse::ActiveIndices;
use crate::utils::check_unit_interval;
use crate::{Direction, NumericOps};

mod collective;

pub use collective::{collective_coverage, harmonic_score, weighted_score};

/// Boolean product of `u` (m×k) and `v` (n×k): `result[i, j] = OR_c (u[i, c] AND v[j, c])`.
///
/// Computed as the ordinary sparse product `u · vᵀ` thresholded at zero, so any
/// non-negative real factors produce a strictly 0/1 result.
pub fn boolean_product(u: &CsrMatrix<f64>, v: &CsrMatrix<f64>) -> anyhow::Result<CsrMatrix<f64>> {
    if u.ncols() != v.ncols() {
        return Err(FactorizationError::shape_mismatch(
            "boolean product factors",
            (v.nrows(), u.ncols()),
            (v.nrows(), v.ncols()),
        )
        .into());
    }

    let vt = v.transpose();
    let product = u * &vt;

    let mut coo = CooMatrix::new(product.nrows(), product.ncols());
    for (i, j, value) in product.triplet_iter() {
        if value.is_active() {
            coo.push(i, j, 1.0);
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// Dense counterpart of [`boolean_product`] for factors held as `ndarray` arrays.
pub fn boolean_product_dense(u: ArrayView2<f64>, v: ArrayView2<f64>) -> anyhow::Result<Array2<f64>> {
    if u.ncols() != v.ncols() {
        return Err(FactorizationError::shape_mismatch(
            "boolean product factors",
            (v.nrows(), u.ncols()),
            v.dim(),
        )
        .into());
    }
    Ok(u.dot(&v.t()).mapv(|x| if x > 0.0 { 1.0 } else { 0.0 }))
}

/// Coverage score, overall or per lane.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageScore {
    Total(f64),
    Axis(Vec<f64>),
}

impl CoverageScore {
    pub fn total(&self) -> Option<f64> {
        match self {
            CoverageScore::Total(score) => Some(*score),
            CoverageScore::Axis(_) => None,
        }
    }

    pub fn per_lane(&self) -> Option<&[f64]> {
        match self {
            CoverageScore::Total(_) => None,
            CoverageScore::Axis(scores) => Some(scores),
        }
    }
}

/// `(1 - w) * tp / max(1, positives) - w * fp / max(1, cells)`.
pub fn score_from_counts(tp: usize, fp: usize, positives: usize, cells: usize, w: f64) -> f64 {
    let reward = tp as f64 / positives.max(1) as f64;
    let penalty = fp as f64 / cells.max(1) as f64;
    (1.0 - w) * reward - w * penalty
}

#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    tp: usize,
    fp: usize,
    positives: usize,
}

/// Weighted coverage of `ground_truth` by `predicted`.
///
/// True positives are rewarded relative to the number of positives in the ground
/// truth; predicted cells outside the ground truth are penalized relative to the
/// number of cells in scope. An all-zero ground truth scores the penalty term
/// alone.
pub fn coverage_score(
    ground_truth: &CsrMatrix<f64>,
    predicted: &CsrMatrix<f64>,
    w: f64,
    axis: Option<Direction>,
) -> anyhow::Result<CoverageScore> {
    check_unit_interval("w", w)?;
    let shape = (ground_truth.nrows(), ground_truth.ncols());
    let predicted_shape = (predicted.nrows(), predicted.ncols());
    if shape != predicted_shape {
        return Err(
            FactorizationError::shape_mismatch("predicted matrix", shape, predicted_shape).into(),
        );
    }

    let (m, n) = shape;
    let mut row_counts = vec![Counts::default(); m];
    let mut col_counts = vec![Counts::default(); n];

    for i in 0..m {
        let gt = ground_truth.active_indices(i);
        let pd = predicted.active_indices(i);
        let row = &mut row_counts[i];
        row.positives = gt.len();

        // both index lists are sorted
        let (mut a, mut b) = (0, 0);
        while a < gt.len() || b < pd.len() {
            let next_gt = gt.get(a).copied().unwrap_or(usize::MAX);
            let next_pd = pd.get(b).copied().unwrap_or(usize::MAX);
            if next_gt == next_pd {
                row.tp += 1;
                col_counts[next_gt].tp += 1;
                col_counts[next_gt].positives += 1;
                a += 1;
                b += 1;
            } else if next_gt < next_pd {
                col_counts[next_gt].positives += 1;
                a += 1;
            } else {
                row.fp += 1;
                col_counts[next_pd].fp += 1;
                b += 1;
            }
        }
    }

    let score = match axis {
        None => {
            let total = row_counts.iter().fold(Counts::default(), |acc, c| Counts {
                tp: acc.tp + c.tp,
                fp: acc.fp + c.fp,
                positives: acc.positives + c.positives,
            });
            CoverageScore::Total(score_from_counts(
                total.tp,
                total.fp,
                total.positives,
                m * n,
                w,
            ))
        }
        Some(Direction::ROW) => CoverageScore::Axis(
            row_counts
                .iter()
                .map(|c| score_from_counts(c.tp, c.fp, c.positives, n, w))
                .collect(),
        ),
        Some(Direction::COLUMN) => CoverageScore::Axis(
            col_counts
                .iter()
                .map(|c| score_from_counts(c.tp, c.fp, c.positives, m, w))
                .collect(),
        ),
    };
    Ok(score)
}
