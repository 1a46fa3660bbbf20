//! Seeded initialization of continuous factors.

use std::str::FromStr;

use anyhow::anyhow;
use nalgebra_sparse::CsrMatrix;
use ndarray::Array2;
use rand::distr::Uniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::error::FactorizationError;
use crate::model::FactorPair;

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq)]
pub enum InitMethod {
    /// `|N(0, 1)|` scaled by `sqrt(mean(X) / k)`.
    Normal,
    /// `U(0, 2 * sqrt(mean(X) / k))`.
    Uniform,
    /// Caller-provided factors.
    Custom(FactorPair),
}

impl Default for InitMethod {
    fn default() -> Self {
        Self::Uniform
    }
}

impl FromStr for InitMethod {
    type Err = FactorizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "uniform" => Ok(Self::Uniform),
            _ => Err(FactorizationError::UnknownInitMethod(s.to_string())),
        }
    }
}

/// Create the generator used for initialization; nothing else draws from it.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Build a non-negative starting point for `k` factors of `x`.
pub fn initialize_factors<R: Rng>(
    method: &InitMethod,
    x: &CsrMatrix<f64>,
    k: usize,
    rng: &mut R,
) -> anyhow::Result<FactorPair> {
    let (m, n) = (x.nrows(), x.ncols());
    let avg = match method {
        InitMethod::Custom(factors) => return check_custom(factors, m, n, k),
        _ => init_scale(x, k),
    };
    if !(avg > 0.0) {
        log::warn!("Training matrix has no positive mass; starting from zero factors");
        return Ok(FactorPair::zeros(m, n, k));
    }

    let (u, v) = if *method == InitMethod::Normal {
        let mut draw = |rows: usize| {
            Array2::from_shape_simple_fn((rows, k), || {
                let z: f64 = rng.sample(StandardNormal);
                (avg * z).abs()
            })
        };
        let v = draw(n);
        let u = draw(m);
        (u, v)
    } else {
        let dist = Uniform::new(0.0, 2.0 * avg)
            .map_err(|e| anyhow!("Failed to build uniform distribution: {}", e))?;
        let v = Array2::from_shape_simple_fn((n, k), || rng.sample(&dist));
        let u = Array2::from_shape_simple_fn((m, k), || rng.sample(&dist));
        (u, v)
    };
    FactorPair::new(u, v)
}

/// `sqrt(mean(X) / k)`, the magnitude at which `U · Vᵀ` matches the mean of `X`.
fn init_scale(x: &CsrMatrix<f64>, k: usize) -> f64 {
    let cells = (x.nrows() * x.ncols()).max(1) as f64;
    let mean = x.values().iter().sum::<f64>() / cells;
    (mean / k.max(1) as f64).sqrt()
}

fn check_custom(factors: &FactorPair, m: usize, n: usize, k: usize) -> anyhow::Result<FactorPair> {
    if factors.u.dim() != (m, k) {
        return Err(FactorizationError::shape_mismatch("initial U", (m, k), factors.u.dim()).into());
    }
    if factors.v.dim() != (n, k) {
        return Err(FactorizationError::shape_mismatch("initial V", (n, k), factors.v.dim()).into());
    }
    if factors.u.iter().chain(factors.v.iter()).any(|&x| x < 0.0) {
        return Err(FactorizationError::invalid_parameter(
            "init_method",
            "custom factors must be non-negative",
        )
        .into());
    }
    Ok(factors.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn create_test_matrix() -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(4, 5);
        for i in 0..4 {
            coo.push(i, i, 1.0);
            coo.push(i, 4, 1.0);
        }
        CsrMatrix::from(&coo)
    }

    #[test]
    fn test_from_str() {
        assert_eq!("normal".parse::<InitMethod>().unwrap(), InitMethod::Normal);
        assert_eq!("Uniform".parse::<InitMethod>().unwrap(), InitMethod::Uniform);
        assert_eq!(
            "nmf".parse::<InitMethod>().unwrap_err(),
            FactorizationError::UnknownInitMethod("nmf".to_string())
        );
    }

    #[test]
    fn test_seeded_init_is_reproducible() {
        let x = create_test_matrix();
        for method in [InitMethod::Normal, InitMethod::Uniform] {
            let a = initialize_factors(&method, &x, 3, &mut seeded_rng(7)).unwrap();
            let b = initialize_factors(&method, &x, 3, &mut seeded_rng(7)).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.u.dim(), (4, 3));
            assert_eq!(a.v.dim(), (5, 3));
            assert!(a.u.iter().chain(a.v.iter()).all(|&x| x >= 0.0));
        }
    }

    #[test]
    fn test_uniform_bounds() {
        let x = create_test_matrix();
        let pair = initialize_factors(&InitMethod::Uniform, &x, 2, &mut seeded_rng(1)).unwrap();
        let upper = 2.0 * (8.0 / 20.0 / 2.0f64).sqrt();
        assert!(pair.u.iter().chain(pair.v.iter()).all(|&x| x < upper));
    }

    #[test]
    fn test_custom_shape_checked() {
        let x = create_test_matrix();
        let good = FactorPair::zeros(4, 5, 2);
        let out = initialize_factors(&InitMethod::Custom(good.clone()), &x, 2, &mut seeded_rng(0));
        assert_eq!(out.unwrap(), good);

        let bad = FactorPair::zeros(5, 4, 2);
        assert!(initialize_factors(&InitMethod::Custom(bad), &x, 2, &mut seeded_rng(0)).is_err());
    }

    #[test]
    fn test_zero_matrix_gives_zero_factors() {
        let x: CsrMatrix<f64> = CsrMatrix::zeros(3, 3);
        let pair = initialize_factors(&InitMethod::Uniform, &x, 2, &mut seeded_rng(0)).unwrap();
        assert_eq!(pair, FactorPair::zeros(3, 3, 2));
    }
}
