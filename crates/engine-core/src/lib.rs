//! Chess engine core: position adapter, evaluation seam, transposition
//! table and the parallel iterative-deepening alpha-beta search.
//!
//! The crate is consumed by the `rchess` CLI, which owns the UCI text
//! protocol; everything protocol-shaped in here is output formatting only.

pub mod eval;
pub mod position;
pub mod search;
pub mod tb;
pub mod tt;
pub mod types;
pub mod uci;

pub use eval::{ClassicalEvaluator, Evaluator};
pub use position::Position;
pub use search::{LimitsType, SearchWorker, ThreadPool};
pub use tt::TranspositionTable;
pub use types::{Bound, Depth, Move, Value};
