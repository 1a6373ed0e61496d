//! Search limits parsed from the `go` command.

use std::time::Instant;

use chess::Color;

use crate::types::Move;

/// Everything a `go` command can ask for. Times are milliseconds.
#[derive(Clone, Debug)]
pub struct LimitsType {
    pub time: [i64; 2],
    pub inc: [i64; 2],
    pub movestogo: i32,
    pub depth: i32,
    pub movetime: i64,
    pub mate: i32,
    pub infinite: bool,
    pub ponder: bool,
    pub nodes: u64,
    pub search_moves: Vec<Move>,
    pub start_time: Instant,
}

impl Default for LimitsType {
    fn default() -> Self {
        Self {
            time: [0; 2],
            inc: [0; 2],
            movestogo: 0,
            depth: 0,
            movetime: 0,
            mate: 0,
            infinite: false,
            ponder: false,
            nodes: 0,
            search_moves: Vec::new(),
            start_time: Instant::now(),
        }
    }
}

impl LimitsType {
    #[inline]
    pub fn time_for(&self, side: Color) -> i64 {
        self.time[side.to_index()]
    }

    #[inline]
    pub fn inc_for(&self, side: Color) -> i64 {
        self.inc[side.to_index()]
    }

    /// Clock-based search: manage time ourselves rather than obeying a
    /// fixed depth/nodes/movetime cap.
    #[inline]
    pub fn use_time_management(&self) -> bool {
        self.time[0] != 0 || self.time[1] != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_management_only_with_clocks() {
        let mut l = LimitsType::default();
        assert!(!l.use_time_management());
        l.movetime = 1000;
        assert!(!l.use_time_management());
        l.time[0] = 60_000;
        assert!(l.use_time_management());
    }
}
