//! Iterative-deepening alpha-beta search.
//!
//! Module map:
//! - `limits`: the `go` parameters handed to the pool
//! - `types`: search stack, root move list, TT score rebasing
//! - `history`: per-thread move-ordering statistics
//! - `movepicker`: staged move enumeration
//! - `breadcrumbs`: cross-thread "someone is searching this" markers
//! - `time_manager`: wall-clock budgets
//! - `alpha_beta` / `qsearch`: the search itself
//! - `thread`: the lazy SMP pool and best-thread selection
//! - `skill`: strength handicap

pub mod alpha_beta;
pub mod breadcrumbs;
pub mod history;
pub mod limits;
pub mod movepicker;
pub mod qsearch;
pub mod skill;
pub mod thread;
pub mod time_manager;
pub mod types;

pub use alpha_beta::SearchWorker;
pub use limits::LimitsType;
pub use thread::ThreadPool;

use crate::types::Depth;

/// Quiescence TT depth when checks are still generated.
pub const DEPTH_QS_CHECKS: Depth = 0;
/// Quiescence TT depth once checks are dropped.
pub const DEPTH_QS_NO_CHECKS: Depth = -1;
/// Below this quiescence depth only recaptures are considered.
pub const DEPTH_QS_RECAPTURES: Depth = -5;
/// Depth stored with eval-only TT writes.
pub const DEPTH_NONE: Depth = -6;

/// Plies covered by the low-ply history.
pub const MAX_LPH: usize = 4;

/// Continuation-history threshold for the countermove-based pruning.
pub const COUNTER_MOVE_PRUNE_THRESHOLD: i32 = 0;

/// Running tt-hit average bookkeeping.
pub const TT_HIT_AVERAGE_WINDOW: u64 = 4096;
pub const TT_HIT_AVERAGE_RESOLUTION: u64 = 1024;
