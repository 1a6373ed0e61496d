//! Tablebase probe interface.
//!
//! The search is written against this seam. No table decompression backend
//! ships with the engine, so `MAX_CARDINALITY` is zero and every probe
//! reports `ProbeState::Fail`, which the search treats as "no information".

use crate::position::Position;
use crate::search::types::RootMoves;

/// Largest piece count a compiled-in backend could serve.
pub const MAX_CARDINALITY: u32 = 0;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProbeState {
    Fail,
    Ok,
}

/// Win/draw/loss from the side to move's point of view, with the 50-move
/// qualifications.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Wdl {
    Loss = -2,
    BlessedLoss = -1,
    Draw = 0,
    CursedWin = 1,
    Win = 2,
}

impl Wdl {
    #[inline]
    pub fn signum(self) -> i32 {
        self as i32
    }
}

/// Per-search probe configuration derived from the UCI options.
#[derive(Clone, Copy, Debug)]
pub struct TbConfig {
    pub cardinality: u32,
    pub probe_depth: i32,
    pub use_rule50: bool,
}

impl Default for TbConfig {
    fn default() -> Self {
        Self {
            cardinality: 0,
            probe_depth: 1,
            use_rule50: true,
        }
    }
}

impl TbConfig {
    pub fn from_options(probe_limit: u32, probe_depth: i32, use_rule50: bool) -> Self {
        let mut cfg = TbConfig {
            cardinality: probe_limit,
            probe_depth,
            use_rule50,
        };
        if cfg.cardinality > MAX_CARDINALITY {
            cfg.cardinality = MAX_CARDINALITY;
            cfg.probe_depth = 0;
        }
        cfg
    }
}

/// WDL probe of the current position.
pub fn probe_wdl(_pos: &Position) -> (Wdl, ProbeState) {
    (Wdl::Draw, ProbeState::Fail)
}

/// Rank the root moves from DTZ/WDL tables. Returns whether the root is a
/// tablebase position; on failure every rank is zeroed.
pub fn rank_root_moves(pos: &Position, cfg: &TbConfig, root_moves: &mut RootMoves) -> bool {
    let root_in_tb = cfg.cardinality >= pos.count_all_pieces() && !pos.can_castle_any() && {
        let (_, state) = probe_wdl(pos);
        state == ProbeState::Ok
    };
    if !root_in_tb {
        for rm in root_moves.0.iter_mut() {
            rm.tb_rank = 0;
        }
    }
    root_in_tb
}
