//! Compact 16-bit move handle.
//!
//! Layout: bits 0-5 destination square, bits 6-11 origin square,
//! bits 12-14 promotion piece (0 = none, 1 = knight .. 4 = queen).
//! Castling travels as the king's two-square move and en passant as the
//! pawn's diagonal step; both are disambiguated by the position, not the
//! move encoding.

use chess::{ChessMove, Piece, Square, ALL_SQUARES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Move(u16);

impl Move {
    /// No move. Also the empty slot marker in the TT and killer tables.
    pub const NONE: Move = Move(0);
    /// Null move (side to move passes). `from == to == B1`.
    pub const NULL: Move = Move(65);

    #[inline]
    pub const fn from_raw(raw: u16) -> Move {
        Move(raw)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn make(from: Square, to: Square, promotion: Option<Piece>) -> Move {
        let promo = match promotion {
            Some(Piece::Knight) => 1u16,
            Some(Piece::Bishop) => 2,
            Some(Piece::Rook) => 3,
            Some(Piece::Queen) => 4,
            _ => 0,
        };
        Move((promo << 12) | ((from.to_index() as u16) << 6) | to.to_index() as u16)
    }

    #[inline]
    pub fn from_sq(self) -> Square {
        ALL_SQUARES[((self.0 >> 6) & 0x3F) as usize]
    }

    #[inline]
    pub fn to_sq(self) -> Square {
        ALL_SQUARES[(self.0 & 0x3F) as usize]
    }

    #[inline]
    pub fn promotion(self) -> Option<Piece> {
        match (self.0 >> 12) & 0x7 {
            1 => Some(Piece::Knight),
            2 => Some(Piece::Bishop),
            3 => Some(Piece::Rook),
            4 => Some(Piece::Queen),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// A real board move: neither `NONE` nor `NULL`.
    #[inline]
    pub const fn is_ok(self) -> bool {
        (self.0 >> 6) & 0x3F != self.0 & 0x3F
    }

    /// Butterfly index combining origin and destination (12 bits).
    #[inline]
    pub const fn from_to(self) -> usize {
        (self.0 & 0xFFF) as usize
    }

    /// The same origin/destination swapped, used by the escape-a-capture
    /// reduction and the reverse-move history malus.
    #[inline]
    pub fn reverse(self) -> Move {
        Move::make(self.to_sq(), self.from_sq(), None)
    }

    /// Long algebraic notation; `NONE` prints as `0000`.
    pub fn to_uci(self) -> String {
        if !self.is_ok() {
            return "0000".to_string();
        }
        let mut s = format!("{}{}", self.from_sq(), self.to_sq());
        if let Some(p) = self.promotion() {
            s.push(match p {
                Piece::Knight => 'n',
                Piece::Bishop => 'b',
                Piece::Rook => 'r',
                _ => 'q',
            });
        }
        s
    }
}

impl From<ChessMove> for Move {
    #[inline]
    fn from(m: ChessMove) -> Move {
        Move::make(m.get_source(), m.get_dest(), m.get_promotion())
    }
}

impl From<Move> for ChessMove {
    #[inline]
    fn from(m: Move) -> ChessMove {
        ChessMove::new(m.from_sq(), m.to_sq(), m.promotion())
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_uci())
    }
}

/// Number of butterfly (from, to) cells.
pub const FROM_TO_SIZE: usize = 64 * 64;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn round_trip_through_chess_move() {
        let m = ChessMove::new(
            Square::from_str("e2").unwrap(),
            Square::from_str("e4").unwrap(),
            None,
        );
        let our: Move = m.into();
        assert_eq!(our.to_uci(), "e2e4");
        assert_eq!(ChessMove::from(our), m);

        let promo = ChessMove::new(
            Square::from_str("a7").unwrap(),
            Square::from_str("a8").unwrap(),
            Some(Piece::Queen),
        );
        let our: Move = promo.into();
        assert_eq!(our.to_uci(), "a7a8q");
        assert_eq!(ChessMove::from(our), promo);
    }

    #[test]
    fn sentinels() {
        assert!(!Move::NONE.is_ok());
        assert!(!Move::NULL.is_ok());
        assert!(Move::NULL.is_some());
        assert_eq!(Move::NONE.to_uci(), "0000");
    }

    #[test]
    fn reverse_swaps_squares() {
        let m = Move::make(
            Square::from_str("g1").unwrap(),
            Square::from_str("f3").unwrap(),
            None,
        );
        let r = m.reverse();
        assert_eq!(r.from_sq(), m.to_sq());
        assert_eq!(r.to_sq(), m.from_sq());
    }
}
