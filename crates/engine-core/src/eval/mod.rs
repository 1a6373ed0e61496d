//! Static evaluation.
//!
//! The search only depends on the `Evaluator` trait; the default
//! implementation is a tapered material + piece-square evaluation. A second
//! entry point, `evaluate_hybrid`, backs the alternative quiescence flavor
//! and defaults to the primary evaluation.

use chess::{Color, Piece, Square, ALL_SQUARES};

use crate::position::Position;
use crate::types::{Value, PIECE_VALUE_EG, PIECE_VALUE_MG, TEMPO};

pub trait Evaluator: Send + Sync {
    /// Score from the side to move's point of view, tempo included.
    fn evaluate(&self, pos: &Position) -> Value;

    /// Evaluation flavor for the secondary quiescence variant.
    fn evaluate_hybrid(&self, pos: &Position) -> Value {
        self.evaluate(pos)
    }
}

/// Tapered material + piece-square evaluator.
#[derive(Default, Clone, Copy)]
pub struct ClassicalEvaluator;

// Non-pawn material bounds for the middlegame/endgame taper.
const MIDGAME_LIMIT: i32 = 15258;
const ENDGAME_LIMIT: i32 = 3915;

// Piece-square bonuses from White's point of view, a1 = index 0.
// Small nudges only; material dominates.
#[rustfmt::skip]
const PAWN_MG: [i32; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
      2,   6,   6, -10, -10,   6,   6,   2,
      2,  -4,  -2,   4,   4,  -2,  -4,   2,
      0,   0,   8,  20,  20,   8,   0,   0,
      4,   4,  10,  24,  24,  10,   4,   4,
      8,   8,  16,  28,  28,  16,   8,   8,
     40,  40,  40,  40,  40,  40,  40,  40,
      0,   0,   0,   0,   0,   0,   0,   0,
];
#[rustfmt::skip]
const PAWN_EG: [i32; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
      6,   6,   6,   6,   6,   6,   6,   6,
      6,   6,   6,   6,   6,   6,   6,   6,
     12,  12,  12,  12,  12,  12,  12,  12,
     24,  24,  24,  24,  24,  24,  24,  24,
     48,  48,  48,  48,  48,  48,  48,  48,
     96,  96,  96,  96,  96,  96,  96,  96,
      0,   0,   0,   0,   0,   0,   0,   0,
];
#[rustfmt::skip]
const KNIGHT_TABLE: [i32; 64] = [
    -50, -30, -20, -15, -15, -20, -30, -50,
    -30, -10,   0,   5,   5,   0, -10, -30,
    -20,   5,  15,  20,  20,  15,   5, -20,
    -15,  10,  20,  30,  30,  20,  10, -15,
    -15,  10,  20,  30,  30,  20,  10, -15,
    -20,   5,  15,  20,  20,  15,   5, -20,
    -30, -10,   0,   5,   5,   0, -10, -30,
    -50, -30, -20, -15, -15, -20, -30, -50,
];
#[rustfmt::skip]
const BISHOP_TABLE: [i32; 64] = [
    -20, -10, -10, -10, -10, -10, -10, -20,
    -10,  10,   0,   5,   5,   0,  10, -10,
    -10,   5,  10,  10,  10,  10,   5, -10,
    -10,   0,  12,  15,  15,  12,   0, -10,
    -10,   0,  12,  15,  15,  12,   0, -10,
    -10,   5,  10,  10,  10,  10,   5, -10,
    -10,  10,   0,   5,   5,   0,  10, -10,
    -20, -10, -10, -10, -10, -10, -10, -20,
];
#[rustfmt::skip]
const ROOK_TABLE: [i32; 64] = [
     -5,  -2,   4,   8,   8,   4,  -2,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     10,  15,  15,  15,  15,  15,  15,  10,
      5,   5,   5,   5,   5,   5,   5,   5,
];
#[rustfmt::skip]
const QUEEN_TABLE: [i32; 64] = [
    -15, -10,  -5,   0,   0,  -5, -10, -15,
    -10,   0,   5,   5,   5,   5,   0, -10,
     -5,   5,   8,   8,   8,   8,   5,  -5,
      0,   5,   8,  10,  10,   8,   5,   0,
      0,   5,   8,  10,  10,   8,   5,   0,
     -5,   5,   8,   8,   8,   8,   5,  -5,
    -10,   0,   5,   5,   5,   5,   0, -10,
    -15, -10,  -5,   0,   0,  -5, -10, -15,
];
#[rustfmt::skip]
const KING_MG: [i32; 64] = [
     35,  45,  20, -20, -20,  10,  45,  35,
     20,  20, -10, -40, -40, -10,  20,  20,
    -30, -40, -50, -60, -60, -50, -40, -30,
    -50, -60, -70, -80, -80, -70, -60, -50,
    -60, -70, -80, -90, -90, -80, -70, -60,
    -60, -70, -80, -90, -90, -80, -70, -60,
    -60, -70, -80, -90, -90, -80, -70, -60,
    -70, -80, -90, -90, -90, -90, -80, -70,
];
#[rustfmt::skip]
const KING_EG: [i32; 64] = [
    -60, -40, -30, -20, -20, -30, -40, -60,
    -40, -15,  -5,   0,   0,  -5, -15, -40,
    -30,  -5,  15,  25,  25,  15,  -5, -30,
    -20,   0,  25,  40,  40,  25,   0, -20,
    -20,   0,  25,  40,  40,  25,   0, -20,
    -30,  -5,  15,  25,  25,  15,  -5, -30,
    -40, -15,  -5,   0,   0,  -5, -15, -40,
    -60, -40, -30, -20, -20, -30, -40, -60,
];

#[inline]
fn psq(piece: Piece, sq: Square, white: bool, midgame: bool) -> i32 {
    let idx = if white {
        sq.to_index()
    } else {
        sq.to_index() ^ 56
    };
    match piece {
        Piece::Pawn => {
            if midgame {
                PAWN_MG[idx]
            } else {
                PAWN_EG[idx]
            }
        }
        Piece::Knight => KNIGHT_TABLE[idx],
        Piece::Bishop => BISHOP_TABLE[idx],
        Piece::Rook => ROOK_TABLE[idx],
        Piece::Queen => QUEEN_TABLE[idx],
        Piece::King => {
            if midgame {
                KING_MG[idx]
            } else {
                KING_EG[idx]
            }
        }
    }
}

impl Evaluator for ClassicalEvaluator {
    fn evaluate(&self, pos: &Position) -> Value {
        let board = pos.board();
        let mut mg = 0i32;
        let mut eg = 0i32;

        for &sq in ALL_SQUARES.iter() {
            let Some(piece) = board.piece_on(sq) else {
                continue;
            };
            let white = board.color_on(sq) == Some(Color::White);
            let sign = if white { 1 } else { -1 };
            let pi = piece.to_index();
            mg += sign * (PIECE_VALUE_MG[pi] + psq(piece, sq, white, true));
            eg += sign * (PIECE_VALUE_EG[pi] + psq(piece, sq, white, false));
        }

        let phase = (pos.non_pawn_material(None) - ENDGAME_LIMIT) * 128
            / (MIDGAME_LIMIT - ENDGAME_LIMIT);
        let phase = phase.clamp(0, 128);
        let white_pov = (mg * phase + eg * (128 - phase)) / 128;

        let stm = if pos.side_to_move() == Color::White {
            white_pov
        } else {
            -white_pov
        };
        Value::new(stm) + TEMPO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startpos_is_near_balanced() {
        let pos = Position::startpos();
        let v = ClassicalEvaluator.evaluate(&pos).raw();
        // Symmetric position: only tempo remains.
        assert_eq!(v, TEMPO.raw());
    }

    #[test]
    fn evaluation_is_antisymmetric_up_to_tempo() {
        let mut pos = Position::startpos();
        let m = pos.find_move("e2e4").unwrap();
        pos.do_move(m);
        let black_view = ClassicalEvaluator.evaluate(&pos).raw();
        pos.undo_move();
        let white_view = ClassicalEvaluator.evaluate(&pos).raw();
        // Both calls include one tempo for their own side.
        assert!(white_view > 0);
        assert!(white_view + black_view <= 2 * TEMPO.raw() + 64);
    }

    #[test]
    fn material_edge_shows_up() {
        // White is a queen up.
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/3QK3 w - - 0 1").unwrap();
        assert!(ClassicalEvaluator.evaluate(&pos).raw() > 2000);
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/3QK3 b - - 0 1").unwrap();
        assert!(ClassicalEvaluator.evaluate(&pos).raw() < -2000);
    }
}
