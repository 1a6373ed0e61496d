//! Position adapter.
//!
//! Wraps the `chess` crate board (bitboards, legal move generation, Zobrist
//! hashing) with the state the search needs on top: a copy-make state stack
//! for do/undo, the 50-move counter, repetition bookkeeping, static exchange
//! evaluation and the check-related move predicates.

mod see;

use std::str::FromStr;

use chess::{BitBoard, Board, BoardStatus, CastleRights, Color, MoveGen, Piece, Square, EMPTY};

use crate::types::{Move, Value, PIECE_VALUE_MG};

pub use chess::Color as Side;

/// Start position FEN.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Clone)]
struct State {
    board: Board,
    key: u64,
    rule50: i32,
    plies_from_null: i32,
    /// Piece captured by the move that produced this state.
    captured: Option<Piece>,
    /// Plies back to the previous occurrence of this position, negated when
    /// that earlier occurrence was itself a repetition. Zero if none.
    repetition: i32,
}

/// A game position plus the path of states that led to it.
#[derive(Clone)]
pub struct Position {
    stack: Vec<State>,
    game_ply: i32,
}

impl Position {
    pub fn startpos() -> Position {
        Position::from_fen(START_FEN).expect("start position FEN is valid")
    }

    pub fn from_fen(fen: &str) -> Result<Position, String> {
        let board = Board::from_str(fen).map_err(|e| format!("bad FEN '{fen}': {e}"))?;
        let mut fields = fen.split_whitespace().skip(4);
        let rule50 = fields
            .next()
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(0);
        let fullmove = fields
            .next()
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(1)
            .max(1);
        let game_ply =
            2 * (fullmove - 1) + if board.side_to_move() == Color::Black { 1 } else { 0 };

        Ok(Position {
            stack: vec![State {
                key: board.get_hash(),
                board,
                rule50,
                plies_from_null: rule50,
                captured: None,
                repetition: 0,
            }],
            game_ply,
        })
    }

    #[inline]
    fn top(&self) -> &State {
        self.stack.last().expect("state stack is never empty")
    }

    #[inline]
    pub fn board(&self) -> &Board {
        &self.top().board
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.board().side_to_move()
    }

    #[inline]
    pub fn game_ply(&self) -> i32 {
        self.game_ply
    }

    #[inline]
    pub fn key(&self) -> u64 {
        self.top().key
    }

    #[inline]
    pub fn rule50_count(&self) -> i32 {
        self.top().rule50
    }

    #[inline]
    pub fn checkers(&self) -> BitBoard {
        *self.board().checkers()
    }

    #[inline]
    pub fn in_check(&self) -> bool {
        self.checkers() != EMPTY
    }

    #[inline]
    pub fn captured_piece(&self) -> Option<Piece> {
        self.top().captured
    }

    #[inline]
    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.board().piece_on(sq)
    }

    #[inline]
    pub fn color_on(&self, sq: Square) -> Option<Color> {
        self.board().color_on(sq)
    }

    /// The piece sitting on the origin square (the move is not yet made).
    #[inline]
    pub fn moved_piece(&self, m: Move) -> Option<Piece> {
        self.piece_on(m.from_sq())
    }

    #[inline]
    pub fn count_all_pieces(&self) -> u32 {
        self.board().combined().popcnt()
    }

    pub fn can_castle_any(&self) -> bool {
        self.board().castle_rights(Color::White) != CastleRights::NoRights
            || self.board().castle_rights(Color::Black) != CastleRights::NoRights
    }

    /// Non-pawn material of `side`, or of both sides when `None`.
    pub fn non_pawn_material(&self, side: Option<Color>) -> i32 {
        let board = self.board();
        let mask = match side {
            Some(c) => *board.color_combined(c),
            None => *board.combined(),
        };
        [Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen]
            .iter()
            .map(|&p| {
                (*board.pieces(p) & mask).popcnt() as i32 * PIECE_VALUE_MG[p.to_index()]
            })
            .sum()
    }

    #[inline]
    pub fn is_en_passant(&self, m: Move) -> bool {
        self.moved_piece(m) == Some(Piece::Pawn)
            && m.from_sq().get_file() != m.to_sq().get_file()
            && self.piece_on(m.to_sq()).is_none()
    }

    #[inline]
    pub fn is_castling(&self, m: Move) -> bool {
        self.moved_piece(m) == Some(Piece::King)
            && (m.from_sq().get_file().to_index() as i32 - m.to_sq().get_file().to_index() as i32)
                .abs()
                == 2
    }

    #[inline]
    pub fn is_capture(&self, m: Move) -> bool {
        self.piece_on(m.to_sq()).is_some() || self.is_en_passant(m)
    }

    #[inline]
    pub fn capture_or_promotion(&self, m: Move) -> bool {
        self.is_capture(m) || m.promotion().is_some()
    }

    /// Moves handled by the capture stage of the move picker: captures and
    /// queen promotions.
    #[inline]
    pub fn capture_stage(&self, m: Move) -> bool {
        self.is_capture(m) || m.promotion() == Some(Piece::Queen)
    }

    /// Pawn push into the opponent's third of the board.
    #[inline]
    pub fn advanced_pawn_push(&self, m: Move) -> bool {
        self.moved_piece(m) == Some(Piece::Pawn)
            && relative_rank(self.side_to_move(), m.to_sq()) > 5
    }

    #[inline]
    pub fn legal(&self, m: Move) -> bool {
        m.is_ok() && self.board().legal(m.into())
    }

    pub fn gives_check(&self, m: Move) -> bool {
        let next = self.board().make_move_new(m.into());
        *next.checkers() != EMPTY
    }

    /// Whether `m` delivers a discovered check to the king of `!side_to_move`:
    /// after the move some checker other than the moved piece attacks it.
    pub fn is_discovery_check_on_king(&self, m: Move) -> bool {
        let next = self.board().make_move_new(m.into());
        (*next.checkers() & !BitBoard::from_square(m.to_sq())) != EMPTY
    }

    /// Zobrist key of the position after `m`, for TT prefetching.
    pub fn key_after(&self, m: Move) -> u64 {
        self.board().make_move_new(m.into()).get_hash()
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        MoveGen::new_legal(self.board()).map(Move::from).collect()
    }

    pub fn has_legal_moves(&self) -> bool {
        self.board().status() == BoardStatus::Ongoing
    }

    /// Resolve a long-algebraic move string against the legal moves.
    pub fn find_move(&self, uci: &str) -> Option<Move> {
        MoveGen::new_legal(self.board())
            .map(Move::from)
            .find(|m| m.to_uci() == uci)
    }

    pub fn do_move(&mut self, m: Move) {
        debug_assert!(self.legal(m));
        let captured = if self.is_en_passant(m) {
            Some(Piece::Pawn)
        } else {
            self.piece_on(m.to_sq())
        };
        let resets_rule50 = captured.is_some() || self.moved_piece(m) == Some(Piece::Pawn);

        let top = self.top();
        let next = top.board.make_move_new(m.into());

        let mut st = State {
            key: next.get_hash(),
            board: next,
            rule50: if resets_rule50 { 0 } else { top.rule50 + 1 },
            plies_from_null: top.plies_from_null + 1,
            captured,
            repetition: 0,
        };
        st.repetition = self.compute_repetition(&st);
        self.stack.push(st);
        self.game_ply += 1;
    }

    pub fn undo_move(&mut self) {
        debug_assert!(self.stack.len() > 1);
        self.stack.pop();
        self.game_ply -= 1;
    }

    /// Pass the turn. Only valid when not in check.
    pub fn do_null_move(&mut self) {
        debug_assert!(!self.in_check());
        let top = self.top();
        let next = top.board.null_move().expect("null move while not in check");
        let st = State {
            key: next.get_hash(),
            board: next,
            rule50: top.rule50 + 1,
            plies_from_null: 0,
            captured: None,
            repetition: 0,
        };
        self.stack.push(st);
    }

    pub fn undo_null_move(&mut self) {
        debug_assert!(self.stack.len() > 1);
        self.stack.pop();
    }

    fn compute_repetition(&self, st: &State) -> i32 {
        let end = st.rule50.min(st.plies_from_null);
        if end < 4 {
            return 0;
        }
        // The stack top is the state one ply before `st`; a repetition needs
        // an even distance of at least four plies.
        let mut i = 4;
        while i <= end {
            let idx = self.stack.len() as i32 - i;
            if idx < 0 {
                break;
            }
            let prev = &self.stack[idx as usize];
            if prev.key == st.key {
                return if prev.repetition != 0 { -i } else { i };
            }
            i += 2;
        }
        0
    }

    /// Draw by 50-move rule or by repetition inside the search path; a
    /// repetition that straddles the root only counts when it is a
    /// three-fold.
    pub fn is_draw(&self, ply: i32) -> bool {
        let st = self.top();
        if st.rule50 > 99 && (!self.in_check() || self.has_legal_moves()) {
            return true;
        }
        st.repetition != 0 && st.repetition < ply
    }

    /// Whether the position already occurred on the path leading here, so
    /// that the side to move could steer for a repetition draw.
    pub fn has_game_cycle(&self, _ply: i32) -> bool {
        self.top().repetition != 0
    }

    /// Static exchange evaluation: does the exchange sequence started by `m`
    /// net at least `threshold`?
    pub fn see_ge(&self, m: Move, threshold: Value) -> bool {
        see::see_ge(self, m, threshold)
    }

    /// Node count of the move-generation tree, for movegen validation.
    pub fn perft(&self, depth: u32) -> u64 {
        fn inner(board: &Board, depth: u32) -> u64 {
            let movegen = MoveGen::new_legal(board);
            if depth == 1 {
                return movegen.len() as u64;
            }
            let mut nodes = 0;
            for m in movegen {
                let next = board.make_move_new(m);
                nodes += inner(&next, depth - 1);
            }
            nodes
        }
        if depth == 0 {
            1
        } else {
            inner(self.board(), depth)
        }
    }
}

/// Rank of `sq` from `side`'s point of view, 1-based.
#[inline]
pub fn relative_rank(side: Color, sq: Square) -> i32 {
    let r = sq.get_rank().to_index() as i32;
    if side == Color::White {
        r + 1
    } else {
        8 - r
    }
}

/// Index of a colored piece for the continuation-history tables; 12 is the
/// no-piece sentinel.
#[inline]
pub fn piece_index(color: Color, piece: Piece) -> usize {
    color.to_index() * 6 + piece.to_index()
}

pub const PIECE_INDEX_NONE: usize = 12;
pub const PIECE_INDEX_NB: usize = 13;

#[cfg(test)]
mod tests {
    use super::*;

    const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

    #[test]
    fn startpos_basics() {
        let pos = Position::startpos();
        assert_eq!(pos.game_ply(), 0);
        assert_eq!(pos.rule50_count(), 0);
        assert!(!pos.in_check());
        assert_eq!(pos.legal_moves().len(), 20);
        assert_eq!(pos.count_all_pieces(), 32);
        assert!(pos.can_castle_any());
    }

    #[test]
    fn fen_counters_are_parsed() {
        let pos = Position::from_fen("8/8/8/4k3/8/4K3/8/8 w - - 37 61").unwrap();
        assert_eq!(pos.rule50_count(), 37);
        assert_eq!(pos.game_ply(), 120);
        assert!(!pos.can_castle_any());
    }

    #[test]
    fn do_undo_round_trip() {
        let mut pos = Position::startpos();
        let key = pos.key();
        let m = pos.find_move("e2e4").unwrap();
        pos.do_move(m);
        assert_ne!(pos.key(), key);
        assert_eq!(pos.game_ply(), 1);
        pos.undo_move();
        assert_eq!(pos.key(), key);
        assert_eq!(pos.game_ply(), 0);
    }

    #[test]
    fn capture_and_ep_predicates() {
        let mut pos = Position::startpos();
        for mv in ["e2e4", "d7d5"] {
            let m = pos.find_move(mv).unwrap();
            pos.do_move(m);
        }
        let exd5 = pos.find_move("e4d5").unwrap();
        assert!(pos.is_capture(exd5));
        assert!(!pos.is_en_passant(exd5));

        let mut pos = Position::startpos();
        for mv in ["e2e4", "a7a6", "e4e5", "d7d5"] {
            let m = pos.find_move(mv).unwrap();
            pos.do_move(m);
        }
        let exd6 = pos.find_move("e5d6").unwrap();
        assert!(pos.is_en_passant(exd6));
        assert!(pos.is_capture(exd6));
        assert_eq!(pos.rule50_count(), 0);
    }

    #[test]
    fn gives_check_detection() {
        let pos =
            Position::from_fen("rnbqkbnr/pppp1ppp/8/4p3/8/5P2/PPPPP1PP/RNBQKBNR b KQkq - 0 2")
                .unwrap();
        let check = pos.find_move("d8h4").unwrap();
        assert!(pos.gives_check(check));
        let quiet = pos.find_move("g8f6").unwrap();
        assert!(!pos.gives_check(quiet));
    }

    #[test]
    fn null_move_round_trip() {
        let mut pos = Position::startpos();
        let key = pos.key();
        pos.do_null_move();
        assert_ne!(pos.key(), key);
        assert_eq!(pos.side_to_move(), Color::Black);
        pos.undo_null_move();
        assert_eq!(pos.key(), key);
    }

    #[test]
    fn repetition_draw_inside_search() {
        let mut pos = Position::startpos();
        for mv in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            let m = pos.find_move(mv).unwrap();
            pos.do_move(m);
        }
        // Position equals the start position again, four plies later.
        assert!(pos.has_game_cycle(4));
        assert!(pos.is_draw(5));
        assert!(!pos.is_draw(3));
    }

    #[test]
    fn non_pawn_material_startpos() {
        let pos = Position::startpos();
        let npm_one_side = 2 * PIECE_VALUE_MG[Piece::Knight.to_index()]
            + 2 * PIECE_VALUE_MG[Piece::Bishop.to_index()]
            + 2 * PIECE_VALUE_MG[Piece::Rook.to_index()]
            + PIECE_VALUE_MG[Piece::Queen.to_index()];
        assert_eq!(pos.non_pawn_material(Some(Color::White)), npm_one_side);
        assert_eq!(pos.non_pawn_material(None), 2 * npm_one_side);
    }

    #[test]
    fn perft_startpos_shallow() {
        let pos = Position::startpos();
        assert_eq!(pos.perft(1), 20);
        assert_eq!(pos.perft(2), 400);
        assert_eq!(pos.perft(3), 8902);
        assert_eq!(pos.perft(4), 197_281);
    }

    #[test]
    fn perft_kiwipete_shallow() {
        let pos = Position::from_fen(KIWIPETE).unwrap();
        assert_eq!(pos.perft(1), 48);
        assert_eq!(pos.perft(2), 2039);
        assert_eq!(pos.perft(3), 97_862);
    }

    #[test]
    #[ignore = "multi-second movegen sweep; run with --ignored"]
    fn perft_deep_reference_counts() {
        let pos = Position::startpos();
        assert_eq!(pos.perft(5), 4_865_609);
        assert_eq!(pos.perft(6), 119_060_324);
        let pos = Position::from_fen(KIWIPETE).unwrap();
        assert_eq!(pos.perft(4), 4_085_603);
        assert_eq!(pos.perft(5), 193_690_690);
    }
}
