//! # Penalized alternating optimization
//!
//! Continuous relaxation of boolean factorization. U and V are kept non-negative
//! and updated multiplicatively to minimize
//!
//! ```text
//! 0.5 * ||W ⊙ (X - U Vᵀ)||² + λ * (0.5 * Σ(U² - U)² + 0.5 * Σ(V² - V)²)
//! ```
//!
//! while λ grows geometrically, annealing the entries toward {0, 1}. The result is
//! the relaxed pair; thresholding it is left to the caller via
//! [`FactorPair::binarize`].

use std::str::FromStr;
use std::time::Instant;

use log::{debug, info, warn};
use nalgebra_sparse::CsrMatrix;
use ndarray::{Array2, Zip};

use crate::boolean::coverage_score;
use crate::error::FactorizationError;
use crate::init::{initialize_factors, seeded_rng, InitMethod, DEFAULT_SEED};
use crate::model::{Dataset, FactorPair, FactorizationAlgorithm, FitResult, Logs, Termination};
use crate::sparse::{csr_to_dense, support_mask};
use crate::utils::{check_non_negative, check_unit_interval};

/// A factor column whose largest entry falls below this is considered collapsed.
pub const COLLAPSE_THRESHOLD: f64 = 1e-10;

/// Per-entry weighting of the reconstruction error.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightScheme {
    /// Only the positive cells of X count.
    Mask,
    /// Every cell counts equally.
    Full,
    /// Explicit m×n weights in [0, 1].
    Custom(CsrMatrix<f64>),
}

impl Default for WeightScheme {
    fn default() -> Self {
        Self::Mask
    }
}

impl FromStr for WeightScheme {
    type Err = FactorizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mask" => Ok(Self::Mask),
            "full" => Ok(Self::Full),
            _ => Err(FactorizationError::UnknownWeightScheme(s.to_string())),
        }
    }
}

impl WeightScheme {
    /// Dense weights for `x`, validated against its shape.
    pub fn resolve(&self, x: &CsrMatrix<f64>) -> anyhow::Result<Array2<f64>> {
        let shape = (x.nrows(), x.ncols());
        match self {
            WeightScheme::Mask => Ok(support_mask(x)),
            WeightScheme::Full => Ok(Array2::ones(shape)),
            WeightScheme::Custom(w) => {
                let w_shape = (w.nrows(), w.ncols());
                if w_shape != shape {
                    return Err(
                        FactorizationError::shape_mismatch("weight matrix", shape, w_shape).into(),
                    );
                }
                if w.values().iter().any(|v| !(0.0..=1.0).contains(v)) {
                    return Err(FactorizationError::invalid_parameter(
                        "weight_scheme",
                        "weights must lie in [0, 1]",
                    )
                    .into());
                }
                csr_to_dense(w)
            }
        }
    }
}

/// Current penalty weight λ and its per-iteration growth factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegularizationState {
    pub weight: f64,
    pub growth: f64,
}

impl RegularizationState {
    pub fn grow(&mut self) {
        self.weight *= self.growth;
    }
}

/// Error components at one point of the run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorTriplet {
    /// `0.5 * reconstruction + 0.5 * λ * penalty`
    pub total: f64,
    /// `Σ (W ⊙ (X - U Vᵀ))²`
    pub reconstruction: f64,
    /// `Σ (U² - U)² + Σ (V² - V)²`
    pub penalty: f64,
}

#[derive(Debug, Clone)]
pub struct PenalizedAlternatingOptimizer {
    k: Option<usize>,
    seed: u64,
    w: f64,
    weight_scheme: WeightScheme,
    init_method: InitMethod,
    regularization: f64,
    regularization_growth: f64,
    tol: f64,
    min_diff: f64,
    max_iter: usize,
    normalize_init: bool,
}

pub struct PenaltyState {
    pub factors: FactorPair,
    pub reg: RegularizationState,
    pub n_iter: usize,
    pub termination: Option<Termination>,
    x: Array2<f64>,
    w: Array2<f64>,
    /// `W ⊙ W`, the weighting seen by the gradient of the reconstruction term.
    w_sq: Array2<f64>,
    wx: Array2<f64>,
    logs: Logs,
    started: Instant,
}

impl PenaltyState {
    pub fn logs(&self) -> &Logs {
        &self.logs
    }
}

/// Replace exact zeros so the multiplicative ratio stays finite.
fn floor_denominator(x: f64) -> f64 {
    if x == 0.0 {
        f64::EPSILON
    } else {
        x
    }
}

impl PenalizedAlternatingOptimizer {
    pub fn error(&self, state: &PenaltyState) -> ErrorTriplet {
        let f = &state.factors;
        let diff = &state.x - &f.u.dot(&f.v.t());
        let reconstruction = (&state.w * &diff).mapv(|x| x * x).sum();
        let penalty = f.u.mapv(|x| (x * x - x).powi(2)).sum() + f.v.mapv(|x| (x * x - x).powi(2)).sum();
        ErrorTriplet {
            total: 0.5 * reconstruction + 0.5 * state.reg.weight * penalty,
            reconstruction,
            penalty,
        }
    }

    /// `V ← V ⊙ ((W²⊙X)ᵀU + 3λV²) / ((W²⊙UVᵀ)ᵀU + 2λV³ + λV)`
    fn update_v(&self, state: &mut PenaltyState) {
        let reg = state.reg.weight;
        let f = &mut state.factors;
        let wuvt = &state.w_sq * &f.u.dot(&f.v.t());
        let num = state.wx.t().dot(&f.u) + f.v.mapv(|x| 3.0 * reg * x * x);
        let denom = wuvt.t().dot(&f.u) + f.v.mapv(|x| 2.0 * reg * x.powi(3) + reg * x);
        Zip::from(&mut f.v)
            .and(&num)
            .and(&denom)
            .for_each(|v, &a, &b| *v *= a / floor_denominator(b));
    }

    /// `U ← U ⊙ ((W²⊙X)V + 3λU²) / ((W²⊙UVᵀ)V + 2λU³ + λU)`
    fn update_u(&self, state: &mut PenaltyState) {
        let reg = state.reg.weight;
        let f = &mut state.factors;
        let wuvt = &state.w_sq * &f.u.dot(&f.v.t());
        let num = state.wx.dot(&f.v) + f.u.mapv(|x| 3.0 * reg * x * x);
        let denom = wuvt.dot(&f.v) + f.u.mapv(|x| 2.0 * reg * x.powi(3) + reg * x);
        Zip::from(&mut f.u)
            .and(&num)
            .and(&denom)
            .for_each(|u, &a, &b| *u *= a / floor_denominator(b));
    }

    /// Columns whose U or V part has vanished entirely.
    fn collapsed_columns(&self, factors: &FactorPair) -> Vec<bool> {
        (0..factors.k())
            .map(|c| {
                let u_max = factors.u.column(c).fold(0.0f64, |acc, &x| acc.max(x));
                let v_max = factors.v.column(c).fold(0.0f64, |acc, &x| acc.max(x));
                u_max < COLLAPSE_THRESHOLD || v_max < COLLAPSE_THRESHOLD
            })
            .collect()
    }

    /// Decide whether the run stops after this iteration.
    fn early_stop(&self, state: &mut PenaltyState, penalty: f64, diff: f64) -> Option<Termination> {
        if diff < self.tol || penalty <= self.min_diff {
            info!(
                "Converged at iter {}: penalty {:.3e}, diff {:.3e}",
                state.n_iter, penalty, diff
            );
            return Some(Termination::Converged);
        }

        let collapsed = self.collapsed_columns(&state.factors);
        if collapsed.iter().any(|&c| c) {
            let order: Vec<usize> = (0..collapsed.len())
                .filter(|&c| !collapsed[c])
                .chain((0..collapsed.len()).filter(|&c| collapsed[c]))
                .collect();
            let k = collapsed.iter().filter(|&&c| !c).count();
            state.factors.select_columns(&order);
            state.factors.truncate(k);
            warn!(
                "Stopped in advance at iter {}: collapsed factor columns, got {} factor(s)",
                state.n_iter, k
            );
            return Some(Termination::EarlyStopped { k });
        }

        if state.n_iter + 1 >= self.max_iter {
            warn!("Reached max_iter = {} without converging", self.max_iter);
            return Some(Termination::MaxIterReached);
        }
        None
    }

    fn validation_score(&self, data: &Dataset, factors: &FactorPair) -> anyhow::Result<Option<f64>> {
        let Some(val) = &data.x_val else {
            return Ok(None);
        };
        let reconstruction = factors.binarize(0.5, 0.5).boolean_reconstruction()?;
        Ok(coverage_score(val, &reconstruction, self.w, None)?.total())
    }
}

impl FactorizationAlgorithm for PenalizedAlternatingOptimizer {
    type State = PenaltyState;

    fn initialize(&self, data: &Dataset) -> anyhow::Result<PenaltyState> {
        let k = match (&self.init_method, self.k) {
            (_, Some(k)) => k,
            (InitMethod::Custom(factors), None) => factors.k(),
            (_, None) => return Err(FactorizationError::MissingRank.into()),
        };
        let w = self.weight_scheme.resolve(&data.x_train)?;
        let x = csr_to_dense(&data.x_train)?;
        let w_sq = &w * &w;
        let wx = &w_sq * &x;

        let mut rng = seeded_rng(self.seed);
        let mut factors = initialize_factors(&self.init_method, &data.x_train, k, &mut rng)?;
        if self.normalize_init {
            factors.normalize();
        }
        info!(
            "Penalty optimization: m = {}, n = {}, k = {}, reg = {}, growth = {}",
            data.m(),
            data.n(),
            k,
            self.regularization,
            self.regularization_growth
        );

        Ok(PenaltyState {
            factors,
            reg: RegularizationState {
                weight: self.regularization,
                growth: self.regularization_growth,
            },
            n_iter: 0,
            termination: None,
            x,
            w,
            w_sq,
            wx,
            logs: Logs::new(),
            started: Instant::now(),
        })
    }

    fn step(&self, data: &Dataset, state: &mut PenaltyState) -> anyhow::Result<()> {
        let before = self.error(state);
        let mut fields = vec![
            ("error", before.total),
            ("rec_error", before.reconstruction),
            ("reg_error", before.penalty),
            ("reg", state.reg.weight),
        ];
        if let Some(score) = self.validation_score(data, &state.factors)? {
            fields.push(("val_score", score));
        }
        state
            .logs
            .record("updates", state.n_iter, state.started.elapsed(), &fields);

        self.update_v(state);
        self.update_u(state);

        let after = self.error(state);
        let diff = (before.penalty - after.penalty).abs();
        debug!(
            "iter: {}, reg: {:.2e}, err: {:.2e}, rec_err: {:.2e}, reg_err: {:.2e}",
            state.n_iter, state.reg.weight, after.total, after.reconstruction, after.penalty
        );

        state.termination = self.early_stop(state, after.penalty, diff);
        state.reg.grow();
        state.n_iter += 1;
        Ok(())
    }

    fn is_converged(&self, state: &PenaltyState) -> bool {
        state.termination.is_some()
    }

    fn finish(&self, _data: &Dataset, state: PenaltyState) -> anyhow::Result<FitResult> {
        let mut logs = state.logs;
        let error = {
            let f = &state.factors;
            let diff = &state.x - &f.u.dot(&f.v.t());
            (&state.w * &diff).mapv(|x| x * x).sum()
        };
        logs.record(
            "result",
            state.n_iter,
            state.started.elapsed(),
            &[("rec_error", error), ("k", state.factors.k() as f64)],
        );
        Ok(FitResult {
            factors: state.factors,
            logs,
            termination: state.termination.unwrap_or(Termination::MaxIterReached),
            elapsed: state.started.elapsed(),
        })
    }
}

/// Builder for [`PenalizedAlternatingOptimizer`].
///
/// Defaults: `reg = 2`, `reg_growth = 3`, `tol = 0.01`, `min_diff = 0`,
/// `max_iter = 100`, mask weights, uniform initialization with seed 42.
pub struct PenalizedAlternatingOptimizerBuilder {
    k: Option<usize>,
    seed: Option<u64>,
    w: f64,
    weight_scheme: WeightScheme,
    init_method: InitMethod,
    regularization: f64,
    regularization_growth: f64,
    tol: f64,
    min_diff: f64,
    max_iter: usize,
    normalize_init: bool,
}

impl Default for PenalizedAlternatingOptimizerBuilder {
    fn default() -> Self {
        Self {
            k: None,
            seed: None,
            w: 0.5,
            weight_scheme: WeightScheme::default(),
            init_method: InitMethod::default(),
            regularization: 2.0,
            regularization_growth: 3.0,
            tol: 0.01,
            min_diff: 0.0,
            max_iter: 100,
            normalize_init: false,
        }
    }
}

impl PenalizedAlternatingOptimizerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Seed for the initialization generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Coverage trade-off used when scoring against validation data.
    pub fn w(mut self, w: f64) -> Self {
        self.w = w;
        self
    }

    pub fn weight_scheme(mut self, weight_scheme: WeightScheme) -> Self {
        self.weight_scheme = weight_scheme;
        self
    }

    pub fn init_method(mut self, init_method: InitMethod) -> Self {
        self.init_method = init_method;
        self
    }

    /// Initial penalty weight λ.
    pub fn regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization;
        self
    }

    pub fn regularization_growth(mut self, growth: f64) -> Self {
        self.regularization_growth = growth;
        self
    }

    /// Convergence threshold on the change of the penalty error between iterations.
    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Stop once the penalty error itself drops to this value.
    pub fn min_diff(mut self, min_diff: f64) -> Self {
        self.min_diff = min_diff;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Balance column magnitudes of the starting factors with [`FactorPair::normalize`].
    pub fn normalize_init(mut self, normalize: bool) -> Self {
        self.normalize_init = normalize;
        self
    }

    pub fn build(self) -> anyhow::Result<PenalizedAlternatingOptimizer> {
        if self.k.is_none() && !matches!(self.init_method, InitMethod::Custom(_)) {
            return Err(FactorizationError::MissingRank.into());
        }
        if self.k == Some(0) {
            return Err(FactorizationError::invalid_parameter("k", "must be positive").into());
        }
        check_unit_interval("w", self.w)?;
        if !(self.regularization > 0.0) {
            return Err(FactorizationError::invalid_parameter(
                "regularization",
                format!("{} must be positive", self.regularization),
            )
            .into());
        }
        if !(self.regularization_growth >= 1.0) {
            return Err(FactorizationError::invalid_parameter(
                "regularization_growth",
                format!("{} must be at least 1", self.regularization_growth),
            )
            .into());
        }
        check_non_negative("tol", self.tol)?;
        check_non_negative("min_diff", self.min_diff)?;
        if self.max_iter == 0 {
            return Err(FactorizationError::invalid_parameter("max_iter", "must be positive").into());
        }

        Ok(PenalizedAlternatingOptimizer {
            k: self.k,
            seed: self.seed.unwrap_or(DEFAULT_SEED),
            w: self.w,
            weight_scheme: self.weight_scheme,
            init_method: self.init_method,
            regularization: self.regularization,
            regularization_growth: self.regularization_growth,
            tol: self.tol,
            min_diff: self.min_diff,
            max_iter: self.max_iter,
            normalize_init: self.normalize_init,
        })
    }
}
