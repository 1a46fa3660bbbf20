pub mod boolean;
pub mod error;
pub mod hyper;
pub mod init;
pub mod model;
pub mod penalty;
pub mod refine;
pub mod sparse;
mod utils;

pub use error::FactorizationError;
pub use hyper::{GreedyHyperSynthesizer, GreedyHyperSynthesizerBuilder};
pub use model::{Dataset, FactorPair, FactorizationAlgorithm, FitResult, Logs, Termination};
pub use penalty::{PenalizedAlternatingOptimizer, PenalizedAlternatingOptimizerBuilder, WeightScheme};
pub use refine::{ExhaustiveRowRefiner, ExhaustiveRowRefinerBuilder};
pub use init::InitMethod;
pub use utils::Direction;
pub use utils::NumericOps;
pub use utils::encoding_to_bits;
