//! Error types for factorization configuration.

use thiserror::Error;

/// Configuration errors raised before any factorization work begins.
///
/// Public entry points return `anyhow::Result`; callers that need to branch on the
/// failure can `downcast_ref::<FactorizationError>()`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FactorizationError {
    /// Training matrix has no rows or no columns.
    #[error("Missing training data: got a {rows}x{cols} matrix")]
    MissingTrainingData {
        /// Number of rows supplied
        rows: usize,
        /// Number of columns supplied
        cols: usize,
    },

    /// The rank is required but neither given nor inferable from initial factors.
    #[error("Rank k is required but was not provided and cannot be inferred")]
    MissingRank,

    /// A numeric parameter is out of its valid range.
    #[error("Invalid parameter `{name}`: {message}")]
    InvalidParameter {
        /// Parameter name as exposed by the builder
        name: &'static str,
        /// What is wrong with the value
        message: String,
    },

    #[error("Unknown initialization method: {0}")]
    UnknownInitMethod(String),

    #[error("Unknown weight scheme: {0}")]
    UnknownWeightScheme(String),

    /// Two matrices that must agree in shape do not.
    #[error("Shape mismatch for {what}: expected {expected:?}, actual {actual:?}")]
    ShapeMismatch {
        /// Which operand was checked
        what: &'static str,
        /// Expected (rows, cols)
        expected: (usize, usize),
        /// Actual (rows, cols)
        actual: (usize, usize),
    },

    /// Exhaustive search would enumerate too many candidates.
    #[error("Rank {k} is too large for exhaustive search (max {max})")]
    RankTooLarge {
        /// Requested rank
        k: usize,
        /// Largest supported rank
        max: usize,
    },
}

impl FactorizationError {
    pub fn invalid_parameter(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    pub fn shape_mismatch(
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Self {
        Self::ShapeMismatch {
            what,
            expected,
            actual,
        }
    }
}
