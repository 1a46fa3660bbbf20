//! # Exhaustive row refinement
//!
//! With V fixed, each row of U is chosen independently as the bit-vector of
//! length k whose boolean product with V best covers the matching row of X. All
//! `2^k` candidates are scored, so k must stay small.

use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;

use crate::boolean::{coverage_score, score_from_counts};
use crate::error::FactorizationError;
use crate::model::{Dataset, FactorPair, FactorizationAlgorithm, FitResult, Logs, Termination};
use crate::sparse::ActiveIndices;
use crate::utils::{check_unit_interval, encoding_to_bits};

/// Largest rank accepted for exhaustive enumeration.
pub const MAX_EXHAUSTIVE_RANK: usize = 24;

/// Exhaustive per-row refinement of U for a fixed V.
#[derive(Debug, Clone)]
pub struct ExhaustiveRowRefiner {
    factors: FactorPair,
    w: f64,
}

pub struct RefineState {
    factors: FactorPair,
    refined: bool,
    logs: Logs,
    started: Instant,
}

impl ExhaustiveRowRefiner {
    pub fn k(&self) -> usize {
        self.factors.k()
    }

    pub fn w(&self) -> f64 {
        self.w
    }
}

/// Index of the winning candidate for one row.
///
/// `row` holds the sorted active columns of the ground-truth row, `patterns[c]`
/// the active rows of column `c` of V and `n` the row length. Candidates are
/// enumerated by increasing encoding (see [`encoding_to_bits`]); only a strictly
/// better score replaces the incumbent, so ties resolve to the lowest encoding.
pub fn optimal_row(row: &[usize], patterns: &[Vec<usize>], n: usize, w: f64) -> usize {
    let k = patterns.len();
    let mut predicted = vec![false; n];
    let mut marked: Vec<usize> = Vec::with_capacity(n);

    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for encoding in 0..(1usize << k) {
        for c in 0..k {
            if (encoding >> (k - 1 - c)) & 1 == 0 {
                continue;
            }
            for &j in &patterns[c] {
                if !predicted[j] {
                    predicted[j] = true;
                    marked.push(j);
                }
            }
        }

        let tp = row.iter().filter(|&&j| predicted[j]).count();
        let score = score_from_counts(tp, marked.len() - tp, row.len(), n, w);
        if score > best_score {
            best = encoding;
            best_score = score;
        }

        for &j in &marked {
            predicted[j] = false;
        }
        marked.clear();
    }
    best
}

impl FactorizationAlgorithm for ExhaustiveRowRefiner {
    type State = RefineState;

    fn initialize(&self, data: &Dataset) -> anyhow::Result<RefineState> {
        let (m, n, k) = (data.m(), data.n(), self.k());
        if self.factors.u.dim() != (m, k) {
            return Err(
                FactorizationError::shape_mismatch("initial U", (m, k), self.factors.u.dim()).into(),
            );
        }
        if self.factors.v.dim() != (n, k) {
            return Err(
                FactorizationError::shape_mismatch("initial V", (n, k), self.factors.v.dim()).into(),
            );
        }
        info!("Exhaustive refinement: m = {}, n = {}, k = {}, w = {}", m, n, k, self.w);

        Ok(RefineState {
            factors: self.factors.clone(),
            refined: false,
            logs: Logs::new(),
            started: Instant::now(),
        })
    }

    fn step(&self, data: &Dataset, state: &mut RefineState) -> anyhow::Result<()> {
        let k = state.factors.k();
        let n = data.n();
        let patterns: Vec<Vec<usize>> = state
            .factors
            .v
            .columns()
            .into_iter()
            .map(|col| {
                col.iter()
                    .enumerate()
                    .filter(|&(_, &x)| x > 0.0)
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();

        let tic = Instant::now();
        // collect keeps row order regardless of scheduling
        let winners: Vec<usize> = (0..data.m())
            .into_par_iter()
            .map(|i| optimal_row(&data.x_train.active_indices(i), &patterns, n, self.w))
            .collect();
        debug!("Exhaustive search finished in {:?}", tic.elapsed());

        for (i, &encoding) in winners.iter().enumerate() {
            for (c, bit) in encoding_to_bits(encoding, k).into_iter().enumerate() {
                state.factors.u[[i, c]] = if bit { 1.0 } else { 0.0 };
            }
        }

        let reconstruction = state.factors.boolean_reconstruction()?;
        let score = coverage_score(&data.x_train, &reconstruction, self.w, None)?
            .total()
            .unwrap_or_default();
        let mut fields = vec![("score", score)];
        if let Some(val) = &data.x_val {
            let val_score = coverage_score(val, &reconstruction, self.w, None)?
                .total()
                .unwrap_or_default();
            fields.push(("val_score", val_score));
        }
        state
            .logs
            .record("refinements", 0, state.started.elapsed(), &fields);
        info!("Refined {} rows, coverage score {:.4}", data.m(), score);

        state.refined = true;
        Ok(())
    }

    fn is_converged(&self, state: &RefineState) -> bool {
        state.refined
    }

    fn finish(&self, _data: &Dataset, state: RefineState) -> anyhow::Result<FitResult> {
        Ok(FitResult {
            factors: state.factors,
            logs: state.logs,
            termination: Termination::Completed,
            elapsed: state.started.elapsed(),
        })
    }
}

/// Builder for [`ExhaustiveRowRefiner`].
///
/// ```ignore
/// let refiner = ExhaustiveRowRefinerBuilder::new()
///     .factors(initial)
///     .w(0.3)
///     .build()?;
/// let result = refiner.fit(&x, None)?;
/// ```
pub struct ExhaustiveRowRefinerBuilder {
    factors: Option<FactorPair>,
    w: f64,
}

impl Default for ExhaustiveRowRefinerBuilder {
    fn default() -> Self {
        Self {
            factors: None,
            w: 0.5,
        }
    }
}

impl ExhaustiveRowRefinerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting factors. V is used as-is; U only fixes the rank and is replaced.
    pub fn factors(mut self, factors: FactorPair) -> Self {
        self.factors = Some(factors);
        self
    }

    /// Coverage trade-off: reward `1 - w` for covering, penalty `w` for over-covering.
    pub fn w(mut self, w: f64) -> Self {
        self.w = w;
        self
    }

    pub fn build(self) -> anyhow::Result<ExhaustiveRowRefiner> {
        let factors = self.factors.ok_or(FactorizationError::MissingRank)?;
        check_unit_interval("w", self.w)?;
        if factors.k() > MAX_EXHAUSTIVE_RANK {
            return Err(FactorizationError::RankTooLarge {
                k: factors.k(),
                max: MAX_EXHAUSTIVE_RANK,
            }
            .into());
        }
        Ok(ExhaustiveRowRefiner {
            factors,
            w: self.w,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra_sparse::{CooMatrix, CsrMatrix};
    use ndarray::{array, Array2};

    fn csr(rows: usize, cols: usize, entries: &[(usize, usize)]) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(rows, cols);
        for &(i, j) in entries {
            coo.push(i, j, 1.0);
        }
        CsrMatrix::from(&coo)
    }

    #[test]
    fn test_row_matching_one_pattern() {
        // V columns: pattern 0 = {0, 1}, pattern 1 = {2, 3}
        let patterns = vec![vec![0, 1], vec![2, 3]];
        // row x = [0 0 1 1] equals pattern 1 -> bits [0, 1] -> encoding 1
        assert_eq!(optimal_row(&[2, 3], &patterns, 4, 0.5), 1);
        // row x = [1 1 0 0] equals pattern 0 -> bits [1, 0] -> encoding 2
        assert_eq!(optimal_row(&[0, 1], &patterns, 4, 0.5), 2);
        // row x = [1 1 1 1] needs both
        assert_eq!(optimal_row(&[0, 1, 2, 3], &patterns, 4, 0.5), 3);
    }

    #[test]
    fn test_ties_resolve_to_lowest_encoding() {
        // identical patterns: encodings 1, 2 and 3 all score the same
        let patterns = vec![vec![0], vec![0]];
        assert_eq!(optimal_row(&[0], &patterns, 2, 0.5), 1);

        // empty row: selecting nothing is optimal and comes first
        assert_eq!(optimal_row(&[], &patterns, 2, 0.5), 0);
    }

    #[test]
    fn test_zero_rank() {
        assert_eq!(optimal_row(&[0, 1], &[], 3, 0.5), 0);
    }

    #[test]
    fn test_refine_selects_exact_pattern() {
        let _ = env_logger::builder().is_test(true).try_init();
        // 1x4 row equal to the second V pattern
        let x = csr(1, 4, &[(0, 2), (0, 3)]);
        let v = array![[1.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 1.0]];
        let factors = FactorPair::new(Array2::zeros((1, 2)), v.clone()).unwrap();

        let refiner = ExhaustiveRowRefinerBuilder::new()
            .factors(factors)
            .w(0.5)
            .build()
            .unwrap();
        let result = refiner.fit(&x, None).unwrap();

        assert_eq!(result.termination, Termination::Completed);
        assert_eq!(result.factors.u, array![[0.0, 1.0]]);
        assert_eq!(result.factors.v, v);
        let scores = result.logs.series("refinements", "score");
        assert_eq!(scores.len(), 1);
        assert_relative_eq!(scores[0], 0.5);
    }

    #[test]
    fn test_refine_is_deterministic_across_rows() {
        let mut entries = Vec::new();
        for i in 0..40 {
            entries.push((i, i % 5));
            if i % 3 == 0 {
                entries.push((i, 5));
            }
        }
        let x = csr(40, 6, &entries);
        let v = array![
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 0.0, 1.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 1.0]
        ];
        let refiner = ExhaustiveRowRefinerBuilder::new()
            .factors(FactorPair::new(Array2::zeros((40, 3)), v).unwrap())
            .w(0.2)
            .build()
            .unwrap();

        let a = refiner.fit(&x, Some(&x)).unwrap();
        let b = refiner.fit(&x, None).unwrap();
        assert_eq!(a.factors, b.factors);
        assert!(a.factors.is_binary());
        assert!(a.logs.get("refinements").unwrap()[0].get("val_score").is_some());
    }

    #[test]
    fn test_builder_validation() {
        assert!(matches!(
            ExhaustiveRowRefinerBuilder::new().build().unwrap_err().downcast_ref::<FactorizationError>(),
            Some(FactorizationError::MissingRank)
        ));
        assert!(ExhaustiveRowRefinerBuilder::new()
            .factors(FactorPair::zeros(2, 2, 1))
            .w(-0.1)
            .build()
            .is_err());
        assert!(matches!(
            ExhaustiveRowRefinerBuilder::new()
                .factors(FactorPair::zeros(2, 2, MAX_EXHAUSTIVE_RANK + 1))
                .build()
                .unwrap_err()
                .downcast_ref::<FactorizationError>(),
            Some(FactorizationError::RankTooLarge { .. })
        ));
    }

    #[test]
    fn test_factor_shape_checked_at_fit() {
        let x = csr(3, 4, &[(0, 0)]);
        let refiner = ExhaustiveRowRefinerBuilder::new()
            .factors(FactorPair::zeros(3, 5, 2))
            .build()
            .unwrap();
        assert!(refiner.fit(&x, None).is_err());
    }
}
