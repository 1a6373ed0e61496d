//! Move-ordering statistics.
//!
//! Strictly thread-local; each worker owns one `Histories` block.
//!
//! - `StatsEntry<D>`: bounded counter with the saturating update rule
//! - `ButterflyHistory`: [color][from_to]
//! - `LowPlyHistory`: [ply][from_to], root neighborhood only
//! - `CapturePieceToHistory`: [piece][to][captured type]
//! - `PieceToHistory`: [piece][to], the continuation-history leaf
//! - `ContinuationHistory`: [in_check][capture] -> [piece][to] -> leaf
//! - `CounterMoveHistory`: [piece][to] -> refutation move

use crate::position::PIECE_INDEX_NB;
use crate::search::MAX_LPH;
use crate::types::{Depth, Move, FROM_TO_SIZE};

use super::types::ContHistKey;

/// Bounded history cell. The update pulls the value toward the bound with
/// strength proportional to the bonus, so it can never leave [-D, D].
#[derive(Clone, Copy, Default)]
#[repr(transparent)]
pub struct StatsEntry<const D: i32> {
    value: i16,
}

impl<const D: i32> StatsEntry<D> {
    #[inline]
    pub fn get(self) -> i32 {
        self.value as i32
    }

    /// `entry += clamp(bonus) - entry * |clamp(bonus)| / D`
    #[inline]
    pub fn update(&mut self, bonus: i32) {
        let clamped = bonus.clamp(-D, D);
        let v = self.value as i32 + clamped - (self.value as i32) * clamped.abs() / D;
        debug_assert!(v.abs() <= D);
        self.value = v as i16;
    }
}

/// Main quiet-move history: [color][from-to].
pub struct ButterflyHistory {
    table: Box<[[StatsEntry<13365>; FROM_TO_SIZE]; 2]>,
}

impl ButterflyHistory {
    #[inline]
    pub fn get(&self, color: usize, m: Move) -> i32 {
        self.table[color][m.from_to()].get()
    }

    #[inline]
    pub fn update(&mut self, color: usize, m: Move, bonus: i32) {
        self.table[color][m.from_to()].update(bonus);
    }
}

/// History for the first few plies above the root: [ply][from-to].
pub struct LowPlyHistory {
    table: Box<[[StatsEntry<10692>; FROM_TO_SIZE]; MAX_LPH]>,
}

impl LowPlyHistory {
    #[inline]
    pub fn get(&self, ply: usize, m: Move) -> i32 {
        self.table[ply][m.from_to()].get()
    }

    #[inline]
    pub fn update(&mut self, ply: usize, m: Move, bonus: i32) {
        self.table[ply][m.from_to()].update(bonus);
    }

    /// At a new root two plies have been played: shift the window down and
    /// blank the top.
    pub fn shift_down_two(&mut self) {
        for ply in 0..MAX_LPH - 2 {
            self.table[ply] = self.table[ply + 2];
        }
        for ply in MAX_LPH - 2..MAX_LPH {
            self.table[ply] = [StatsEntry::default(); FROM_TO_SIZE];
        }
    }
}

/// Slot for the captured piece type; zero doubles as "nothing captured"
/// for quiet promotions routed through the capture stage.
#[inline]
pub fn captured_index(p: Option<chess::Piece>) -> usize {
    p.map_or(0, |p| p.to_index() + 1)
}

/// Capture history: [moved piece][to][captured piece type].
pub struct CapturePieceToHistory {
    table: Box<[[[StatsEntry<10692>; 7]; 64]; PIECE_INDEX_NB]>,
}

impl CapturePieceToHistory {
    #[inline]
    pub fn get(&self, piece: usize, to: usize, captured: usize) -> i32 {
        self.table[piece][to][captured].get()
    }

    #[inline]
    pub fn update(&mut self, piece: usize, to: usize, captured: usize, bonus: i32) {
        self.table[piece][to][captured].update(bonus);
    }
}

/// Continuation-history leaf: [piece][to].
#[derive(Clone, Copy)]
pub struct PieceToHistory {
    table: [[StatsEntry<29952>; 64]; PIECE_INDEX_NB],
}

impl PieceToHistory {
    #[inline]
    pub fn get(&self, piece: usize, to: usize) -> i32 {
        self.table[piece][to].get()
    }

    #[inline]
    pub fn update(&mut self, piece: usize, to: usize, bonus: i32) {
        self.table[piece][to].update(bonus);
    }
}

/// Full continuation history: four tables of [piece][to] leaves selected by
/// (in check, capture) of the move that was made.
pub struct ContinuationHistory {
    table: Box<[[[[PieceToHistory; 64]; PIECE_INDEX_NB]; 2]; 2]>,
}

impl ContinuationHistory {
    #[inline]
    pub fn leaf(&self, key: ContHistKey) -> &PieceToHistory {
        &self.table[key.in_check as usize][key.capture as usize][key.piece][key.to]
    }

    #[inline]
    pub fn leaf_mut(&mut self, key: ContHistKey) -> &mut PieceToHistory {
        &mut self.table[key.in_check as usize][key.capture as usize][key.piece][key.to]
    }
}

/// Countermove table: [piece][to] of the previous move -> refutation.
pub struct CounterMoveHistory {
    table: Box<[[Move; 64]; PIECE_INDEX_NB]>,
}

impl CounterMoveHistory {
    #[inline]
    pub fn get(&self, piece: usize, to: usize) -> Move {
        self.table[piece][to]
    }

    #[inline]
    pub fn set(&mut self, piece: usize, to: usize, m: Move) {
        self.table[piece][to] = m;
    }
}

/// One worker's complete statistics block.
pub struct Histories {
    pub main: ButterflyHistory,
    pub low_ply: LowPlyHistory,
    pub capture: CapturePieceToHistory,
    pub continuation: ContinuationHistory,
    pub counter_moves: CounterMoveHistory,
}

impl Histories {
    pub fn new() -> Box<Histories> {
        Box::new(Histories {
            main: ButterflyHistory {
                table: zeroed_box(),
            },
            low_ply: LowPlyHistory {
                table: zeroed_box(),
            },
            capture: CapturePieceToHistory {
                table: zeroed_box(),
            },
            continuation: ContinuationHistory {
                table: zeroed_box(),
            },
            counter_moves: CounterMoveHistory {
                table: zeroed_box(),
            },
        })
    }

    /// Full reset, used on `ucinewgame`.
    pub fn clear(&mut self) {
        self.main.table = zeroed_box();
        self.low_ply.table = zeroed_box();
        self.capture.table = zeroed_box();
        self.continuation.table = zeroed_box();
        self.counter_moves.table = zeroed_box();
    }

    /// Continuation-history leaf addressed by a stack frame's key.
    #[inline]
    pub fn cont_leaf(&self, key: ContHistKey) -> &PieceToHistory {
        self.continuation.leaf(key)
    }
}

/// Heap-allocate a zeroed block without touching the stack; the tables run
/// to several megabytes.
fn zeroed_box<T>() -> Box<T> {
    use std::alloc::{alloc_zeroed, handle_alloc_error, Layout};
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        // SAFETY: zero-sized, dangling is fine.
        return unsafe { Box::from_raw(std::ptr::NonNull::dangling().as_ptr()) };
    }
    // SAFETY: all history tables are plain integer/move arrays for which
    // the all-zero bit pattern is a valid value.
    unsafe {
        let ptr = alloc_zeroed(layout) as *mut T;
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        Box::from_raw(ptr)
    }
}

/// History and stats bonus by depth.
pub fn stat_bonus(d: Depth) -> i32 {
    if d > 13 {
        29
    } else {
        17 * d * d + 134 * d - 134
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Move;

    #[test]
    fn stats_entry_saturates_at_bound() {
        let mut e = StatsEntry::<13365>::default();
        for _ in 0..200 {
            e.update(13365);
        }
        assert_eq!(e.get(), 13365);
        for _ in 0..200 {
            e.update(-13365);
        }
        assert_eq!(e.get(), -13365);
    }

    #[test]
    fn stats_entry_small_updates_accumulate() {
        let mut e = StatsEntry::<13365>::default();
        e.update(100);
        let one = e.get();
        e.update(100);
        assert!(e.get() > one);
        assert!(e.get() < 200 + 1);
    }

    #[test]
    fn stat_bonus_table() {
        assert_eq!(stat_bonus(1), 17);
        assert_eq!(stat_bonus(13), 17 * 169 + 134 * 13 - 134);
        assert_eq!(stat_bonus(14), 29);
        assert_eq!(stat_bonus(100), 29);
        // Monotone over the polynomial range.
        for d in 1..13 {
            assert!(stat_bonus(d + 1) > stat_bonus(d));
        }
    }

    #[test]
    fn low_ply_shift_moves_data_down() {
        let mut h = Histories::new();
        let m = Move::from_raw(0x0123);
        h.low_ply.update(2, m, 500);
        h.low_ply.update(3, m, 700);
        let at2 = h.low_ply.get(2, m);
        let at3 = h.low_ply.get(3, m);
        h.low_ply.shift_down_two();
        assert_eq!(h.low_ply.get(0, m), at2);
        assert_eq!(h.low_ply.get(1, m), at3);
        assert_eq!(h.low_ply.get(2, m), 0);
        assert_eq!(h.low_ply.get(3, m), 0);
    }

    #[test]
    fn counter_move_round_trip() {
        let mut h = Histories::new();
        let m = Move::from_raw(0x0456);
        h.counter_moves.set(3, 12, m);
        assert_eq!(h.counter_moves.get(3, 12), m);
        assert_eq!(h.counter_moves.get(3, 13), Move::NONE);
    }
}
