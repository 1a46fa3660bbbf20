use num_traits::{NumCast, Zero};

use crate::error::FactorizationError;

/// Axis along which a per-lane statistic is computed.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ROW,
    COLUMN,
}

/// Element types that can back a binary (or relaxed binary) matrix.
///
/// A stored entry counts as active when it is strictly greater than zero.
pub trait NumericOps: Copy + PartialOrd + Zero + NumCast + Send + Sync {
    fn is_active(&self) -> bool {
        *self > Self::zero()
    }
}

impl<T> NumericOps for T where T: Copy + PartialOrd + Zero + NumCast + Send + Sync {}

/// Decode the `encoding`-th candidate of a `bits`-long bit-vector.
///
/// The most significant bit maps to position 0, so enumerating encodings in
/// increasing order walks the candidates in the same order as a zero-padded
/// binary string.
pub fn encoding_to_bits(encoding: usize, bits: usize) -> Vec<bool> {
    (0..bits)
        .map(|c| (encoding >> (bits - 1 - c)) & 1 == 1)
        .collect()
}

pub(crate) fn check_unit_interval(name: &'static str, value: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(FactorizationError::invalid_parameter(
            name,
            format!("{} is not in [0, 1]", value),
        )
        .into());
    }
    Ok(())
}

pub(crate) fn check_non_negative(name: &'static str, value: f64) -> anyhow::Result<()> {
    if !(value >= 0.0) {
        return Err(FactorizationError::invalid_parameter(
            name,
            format!("{} must be non-negative", value),
        )
        .into());
    }
    Ok(())
}
