//! # Greedy exact-cover synthesis
//!
//! Builds the factors one rank-one pattern at a time. Every pattern pairs an
//! itemset (a set of columns) with the rows it covers exactly, chosen to minimize
//! `(|T| + |I|) / covered`. The globally cheapest pattern is accepted, its cells
//! are removed from the residual and the search repeats until nothing is left.

use std::time::Instant;

use log::{debug, info, warn};
use nalgebra_sparse::CscMatrix;

use crate::boolean::coverage_score;
use crate::error::FactorizationError;
use crate::model::{Dataset, FactorPair, FactorizationAlgorithm, FitResult, Logs, Termination};
use crate::sparse::{ActiveIndices, ResidualMatrix};
use crate::utils::check_unit_interval;

pub mod itemsets;

pub use itemsets::{apriori, FrequentItemset};

/// An itemset with its best transaction against the residual it was last
/// evaluated on.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub itemset: Vec<usize>,
    pub transaction: Vec<usize>,
    pub cost: f64,
}

/// Description cost of a pattern per residual cell it covers.
///
/// Infinite when the pattern covers nothing.
pub fn cost(transaction: &[usize], itemset: &[usize], residual: &ResidualMatrix) -> f64 {
    let covered = residual.count_in(transaction, itemset);
    if covered == 0 {
        return f64::INFINITY;
    }
    (transaction.len() + itemset.len()) as f64 / covered as f64
}

/// Cheapest transaction for `itemset`.
///
/// Candidate rows contain the whole itemset in the ground truth and at least one
/// of its cells in the residual. They are taken by decreasing residual overlap
/// (ascending row index on ties) for as long as the cost does not increase.
pub fn find_hyper(
    itemset: &[usize],
    ground_truth: &CscMatrix<f64>,
    residual: &ResidualMatrix,
) -> (Vec<usize>, f64) {
    let mut covered = vec![0usize; ground_truth.nrows()];
    for &c in itemset {
        for r in ground_truth.active_indices(c) {
            covered[r] += 1;
        }
    }

    let mut queue: Vec<(usize, usize)> = covered
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count == itemset.len())
        .filter_map(|(r, _)| {
            let uncovered = residual.count_in_row(r, itemset);
            (uncovered > 0).then_some((r, uncovered))
        })
        .collect();
    if queue.is_empty() {
        return (Vec::new(), f64::INFINITY);
    }
    queue.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let (first, first_uncovered) = queue[0];
    let mut transaction = vec![first];
    let mut area = first_uncovered;
    let mut best = (1 + itemset.len()) as f64 / area as f64;
    for &(r, uncovered) in &queue[1..] {
        let candidate = (transaction.len() + 1 + itemset.len()) as f64 / (area + uncovered) as f64;
        if candidate > best {
            break;
        }
        transaction.push(r);
        area += uncovered;
        best = candidate;
    }
    (transaction, best)
}

fn sort_by_cost(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| a.cost.total_cmp(&b.cost));
}

#[derive(Debug, Clone)]
pub struct GreedyHyperSynthesizer {
    min_support: f64,
    max_itemset_size: Option<usize>,
    k: Option<usize>,
    w: f64,
}

pub struct HyperState {
    candidates: Vec<Candidate>,
    residual: ResidualMatrix,
    factors: FactorPair,
    termination: Option<Termination>,
    logs: Logs,
    started: Instant,
}

impl HyperState {
    pub fn residual(&self) -> &ResidualMatrix {
        &self.residual
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }
}

impl GreedyHyperSynthesizer {
    /// Singletons for every column followed by the mined multi-column itemsets.
    pub fn init_itemsets(&self, data: &Dataset) -> Vec<Vec<usize>> {
        let mined: Vec<Vec<usize>> =
            apriori(&data.x_train_csc, self.min_support, self.max_itemset_size)
                .into_iter()
                .filter(|set| set.items.len() > 1)
                .map(|set| set.items)
                .collect();
        if mined.is_empty() {
            warn!("No itemset discovered outside singletons; try a lower min_support");
        } else {
            let max_size = mined.iter().map(Vec::len).max().unwrap_or_default();
            info!("Found {} itemsets, max size: {}", mined.len(), max_size);
        }

        (0..data.n()).map(|c| vec![c]).chain(mined).collect()
    }

    /// Accept the cheapest pattern, re-evaluating lazily. Returns the number of
    /// re-sorts it took, or `None` when no usable candidate is left.
    fn select(&self, data: &Dataset, state: &mut HyperState) -> Option<usize> {
        let mut n_resort = 0;
        loop {
            let head = state.candidates.first_mut()?;
            let (transaction, cost) = find_hyper(&head.itemset, &data.x_train_csc, &state.residual);
            if transaction.is_empty() {
                debug!("Discarding itemset {:?}: empty transaction", head.itemset);
                state.candidates.remove(0);
                continue;
            }
            head.transaction = transaction;
            head.cost = cost;

            let head_cost = state.candidates[0].cost;
            let stale = state
                .candidates
                .get(1)
                .is_some_and(|next| head_cost > next.cost);
            if !stale {
                return Some(n_resort);
            }
            sort_by_cost(&mut state.candidates);
            n_resort += 1;
        }
    }
}

impl FactorizationAlgorithm for GreedyHyperSynthesizer {
    type State = HyperState;

    fn initialize(&self, data: &Dataset) -> anyhow::Result<HyperState> {
        let started = Instant::now();
        let residual = ResidualMatrix::from_csr(&data.x_train);

        let mut candidates: Vec<Candidate> = self
            .init_itemsets(data)
            .into_iter()
            .filter_map(|itemset| {
                let (transaction, cost) = find_hyper(&itemset, &data.x_train_csc, &residual);
                (!transaction.is_empty()).then_some(Candidate {
                    itemset,
                    transaction,
                    cost,
                })
            })
            .collect();
        sort_by_cost(&mut candidates);
        info!("Initialized {} candidate patterns", candidates.len());

        let termination = residual.is_empty().then_some(Termination::Covered);
        Ok(HyperState {
            candidates,
            residual,
            factors: FactorPair::zeros(data.m(), data.n(), 0),
            termination,
            logs: Logs::new(),
            started,
        })
    }

    fn step(&self, data: &Dataset, state: &mut HyperState) -> anyhow::Result<()> {
        let Some(n_resort) = self.select(data, state) else {
            warn!(
                "Itemsets exhausted with {} entries still uncovered",
                state.residual.nnz()
            );
            state.termination = Some(Termination::Exhausted);
            return Ok(());
        };

        let accepted = &state.candidates[0];
        state
            .factors
            .push_pattern(&accepted.transaction, &accepted.itemset)?;
        let size = accepted.transaction.len() * accepted.itemset.len();
        state
            .residual
            .remove_pattern(&accepted.transaction, &accepted.itemset);

        let k = state.factors.k();
        let mut fields = vec![
            ("k", k as f64),
            ("iter", n_resort as f64),
            ("size", size as f64),
            ("uncovered", state.residual.nnz() as f64),
        ];
        if let Some(val) = &data.x_val {
            let reconstruction = state.factors.boolean_reconstruction()?;
            let val_score = coverage_score(val, &reconstruction, self.w, None)?
                .total()
                .unwrap_or_default();
            fields.push(("val_score", val_score));
        }
        state
            .logs
            .record("updates", k - 1, state.started.elapsed(), &fields);
        debug!(
            "Accepted pattern {}: {} rows x {} cols, {} entries uncovered",
            k,
            accepted.transaction.len(),
            accepted.itemset.len(),
            state.residual.nnz()
        );

        if state.residual.is_empty() {
            state.termination = Some(Termination::Covered);
        } else if self.k.is_some_and(|max| k >= max) {
            state.termination = Some(Termination::RankReached);
        } else {
            let head = &mut state.candidates[0];
            let (transaction, cost) = find_hyper(&head.itemset, &data.x_train_csc, &state.residual);
            head.transaction = transaction;
            head.cost = cost;
            sort_by_cost(&mut state.candidates);
        }
        Ok(())
    }

    fn is_converged(&self, state: &HyperState) -> bool {
        state.termination.is_some()
    }

    fn finish(&self, _data: &Dataset, mut state: HyperState) -> anyhow::Result<FitResult> {
        info!(
            "Synthesis finished with k = {}, {} entries uncovered",
            state.factors.k(),
            state.residual.nnz()
        );
        state.residual.clear();
        Ok(FitResult {
            factors: state.factors,
            logs: state.logs,
            termination: state.termination.unwrap_or(Termination::Exhausted),
            elapsed: state.started.elapsed(),
        })
    }
}

/// Builder for [`GreedyHyperSynthesizer`].
///
/// `min_support` is the fraction of rows an itemset must appear in to be mined.
pub struct GreedyHyperSynthesizerBuilder {
    min_support: f64,
    max_itemset_size: Option<usize>,
    k: Option<usize>,
    w: f64,
}

impl Default for GreedyHyperSynthesizerBuilder {
    fn default() -> Self {
        Self {
            min_support: 0.1,
            max_itemset_size: None,
            k: None,
            w: 0.5,
        }
    }
}

impl GreedyHyperSynthesizerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_support(mut self, min_support: f64) -> Self {
        self.min_support = min_support;
        self
    }

    pub fn max_itemset_size(mut self, size: usize) -> Self {
        self.max_itemset_size = Some(size);
        self
    }

    /// Stop after this many patterns even if the residual is not empty.
    pub fn k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Coverage trade-off used when scoring against validation data.
    pub fn w(mut self, w: f64) -> Self {
        self.w = w;
        self
    }

    pub fn build(self) -> anyhow::Result<GreedyHyperSynthesizer> {
        if !(self.min_support > 0.0 && self.min_support <= 1.0) {
            return Err(FactorizationError::invalid_parameter(
                "min_support",
                format!("{} is not in (0, 1]", self.min_support),
            )
            .into());
        }
        if self.max_itemset_size == Some(0) {
            return Err(
                FactorizationError::invalid_parameter("max_itemset_size", "must be positive").into(),
            );
        }
        if self.k == Some(0) {
            return Err(FactorizationError::invalid_parameter("k", "must be positive").into());
        }
        check_unit_interval("w", self.w)?;
        Ok(GreedyHyperSynthesizer {
            min_support: self.min_support,
            max_itemset_size: self.max_itemset_size,
            k: self.k,
            w: self.w,
        })
    }
}
