//! # Factor model
//!
//! Types shared by all algorithms: the factor pair being optimized, the validated
//! input dataset, the fit result and the [`FactorizationAlgorithm`] capability
//! trait that drives a run.

use std::time::Duration;

use nalgebra_sparse::{CscMatrix, CsrMatrix};
use ndarray::{s, Array1, Array2, Axis};

use crate::boolean::boolean_product;
use crate::error::FactorizationError;
use crate::sparse::dense_to_csr;

mod logs;

pub use logs::{LogRecord, Logs};

/// Factors U (m×k) and V (n×k) whose boolean product approximates X.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorPair {
    pub u: Array2<f64>,
    pub v: Array2<f64>,
}

impl FactorPair {
    pub fn new(u: Array2<f64>, v: Array2<f64>) -> anyhow::Result<Self> {
        if u.ncols() != v.ncols() {
            return Err(FactorizationError::shape_mismatch(
                "factor V",
                (v.nrows(), u.ncols()),
                v.dim(),
            )
            .into());
        }
        Ok(Self { u, v })
    }

    pub fn zeros(m: usize, n: usize, k: usize) -> Self {
        Self {
            u: Array2::zeros((m, k)),
            v: Array2::zeros((n, k)),
        }
    }

    pub fn k(&self) -> usize {
        self.u.ncols()
    }

    pub fn m(&self) -> usize {
        self.u.nrows()
    }

    pub fn n(&self) -> usize {
        self.v.nrows()
    }

    /// Keep the first `k` columns of both factors.
    pub fn truncate(&mut self, k: usize) {
        let k = k.min(self.k());
        self.u = self.u.slice(s![.., ..k]).to_owned();
        self.v = self.v.slice(s![.., ..k]).to_owned();
    }

    /// Reorder columns of both factors; `order[c]` is the old index of new column `c`.
    pub fn select_columns(&mut self, order: &[usize]) {
        self.u = self.u.select(Axis(1), order);
        self.v = self.v.select(Axis(1), order);
    }

    /// Append the rank-one pattern `rows` × `cols` as a new column pair.
    pub fn push_pattern(&mut self, rows: &[usize], cols: &[usize]) -> anyhow::Result<()> {
        let mut u_col = Array1::zeros(self.m());
        let mut v_col = Array1::zeros(self.n());
        for &r in rows {
            u_col[r] = 1.0;
        }
        for &c in cols {
            v_col[c] = 1.0;
        }
        self.u.push_column(u_col.view())?;
        self.v.push_column(v_col.view())?;
        Ok(())
    }

    /// Threshold both factors: entries `>= cutoff` become 1, the rest 0.
    pub fn binarize(&self, u_cutoff: f64, v_cutoff: f64) -> FactorPair {
        FactorPair {
            u: self.u.mapv(|x| if x >= u_cutoff { 1.0 } else { 0.0 }),
            v: self.v.mapv(|x| if x >= v_cutoff { 1.0 } else { 0.0 }),
        }
    }

    /// Rescale every column pair so U and V columns share the same maximum,
    /// `sqrt(max U_c * max V_c)`. `U · Vᵀ` is unchanged.
    ///
    /// Columns where either side is all zero are left as they are.
    pub fn normalize(&mut self) {
        for c in 0..self.k() {
            let u_max = self.u.column(c).fold(0.0f64, |acc, &x| acc.max(x));
            let v_max = self.v.column(c).fold(0.0f64, |acc, &x| acc.max(x));
            if u_max <= 0.0 || v_max <= 0.0 {
                continue;
            }
            let scale = (v_max / u_max).sqrt();
            self.u.column_mut(c).mapv_inplace(|x| x * scale);
            self.v.column_mut(c).mapv_inplace(|x| x / scale);
        }
    }

    pub fn is_binary(&self) -> bool {
        self.u.iter().chain(self.v.iter()).all(|&x| x == 0.0 || x == 1.0)
    }

    /// Boolean product U ∘ Vᵀ as a sparse 0/1 matrix.
    pub fn boolean_reconstruction(&self) -> anyhow::Result<CsrMatrix<f64>> {
        boolean_product(&dense_to_csr(self.u.view()), &dense_to_csr(self.v.view()))
    }
}

/// Validated training (and optional validation) input.
///
/// The training matrix is kept in CSR for row reads and CSC for column reads.
pub struct Dataset {
    pub x_train: CsrMatrix<f64>,
    pub x_train_csc: CscMatrix<f64>,
    pub x_val: Option<CsrMatrix<f64>>,
}

impl Dataset {
    pub fn load(x_train: &CsrMatrix<f64>, x_val: Option<&CsrMatrix<f64>>) -> anyhow::Result<Self> {
        let shape = (x_train.nrows(), x_train.ncols());
        if shape.0 == 0 || shape.1 == 0 {
            return Err(FactorizationError::MissingTrainingData {
                rows: shape.0,
                cols: shape.1,
            }
            .into());
        }
        if let Some(val) = x_val {
            let val_shape = (val.nrows(), val.ncols());
            if val_shape != shape {
                return Err(
                    FactorizationError::shape_mismatch("validation matrix", shape, val_shape).into(),
                );
            }
        } else {
            log::debug!("No validation data supplied");
        }

        Ok(Self {
            x_train: x_train.clone(),
            x_train_csc: CscMatrix::from(x_train),
            x_val: x_val.cloned(),
        })
    }

    pub fn m(&self) -> usize {
        self.x_train.nrows()
    }

    pub fn n(&self) -> usize {
        self.x_train.ncols()
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Single-pass algorithm finished its pass.
    Completed,
    Converged,
    MaxIterReached,
    /// Collapsed columns were dropped; `k` is the rank actually returned.
    EarlyStopped { k: usize },
    /// The residual was fully covered.
    Covered,
    /// Candidate patterns ran out before the residual was covered.
    Exhausted,
    /// The requested maximum rank was reached.
    RankReached,
}

#[derive(Debug, Clone)]
pub struct FitResult {
    pub factors: FactorPair,
    pub logs: Logs,
    pub termination: Termination,
    pub elapsed: Duration,
}

/// Capability shared by all factorization algorithms.
///
/// An algorithm holds only its immutable configuration; all mutable run state
/// lives in `State`, owned by a single call to [`FactorizationAlgorithm::fit`].
pub trait FactorizationAlgorithm {
    type State;

    fn initialize(&self, data: &Dataset) -> anyhow::Result<Self::State>;

    fn step(&self, data: &Dataset, state: &mut Self::State) -> anyhow::Result<()>;

    fn is_converged(&self, state: &Self::State) -> bool;

    fn finish(&self, data: &Dataset, state: Self::State) -> anyhow::Result<FitResult>;

    /// Run the algorithm on `x_train`, scoring against `x_val` when given.
    fn fit(
        &self,
        x_train: &CsrMatrix<f64>,
        x_val: Option<&CsrMatrix<f64>>,
    ) -> anyhow::Result<FitResult> {
        let data = Dataset::load(x_train, x_val)?;
        let mut state = self.initialize(&data)?;
        while !self.is_converged(&state) {
            self.step(&data, &mut state)?;
        }
        self.finish(&data, state)
    }
}
