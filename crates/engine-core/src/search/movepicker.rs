//! Staged move enumeration.
//!
//! Emits moves in the order the search wants to try them: hash move, good
//! captures, killer/counter refutations, history-ordered quiets, bad
//! captures last. Evasions, ProbCut and quiescence get their own stage
//! chains. A picker is single-shot; restarting means constructing a new one.
//!
//! The history tables are not stored inside the picker: `next_move` borrows
//! them per call so the search loop can mutate histories between calls.

use chess::{MoveGen, Square};

use crate::position::{piece_index, Position};
use crate::types::{Depth, Move, Value, PIECE_VALUE_MG};

use super::history::{captured_index, Histories};
use super::types::ContHistKey;
use super::{DEPTH_QS_CHECKS, DEPTH_QS_RECAPTURES, MAX_LPH};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Stage {
    MainTT,
    CaptureInit,
    GoodCapture,
    Refutation,
    QuietInit,
    Quiet,
    BadCapture,

    EvasionTT,
    EvasionInit,
    Evasion,

    ProbCutTT,
    ProbCutInit,
    ProbCut,

    QSearchTT,
    QCaptureInit,
    QCapture,
    QCheckInit,
    QCheck,

    Done,
}

#[derive(Clone, Copy)]
struct ExtMove {
    mv: Move,
    value: i32,
}

/// Sort everything scoring at least `limit` to the front, best first; the
/// rest keeps arbitrary order behind the sorted prefix.
fn partial_insertion_sort(moves: &mut [ExtMove], limit: i32) {
    let mut sorted_end = 0usize;
    for p in 1..moves.len() {
        if moves[p].value >= limit {
            let tmp = moves[p];
            sorted_end += 1;
            moves[p] = moves[sorted_end];
            let mut q = sorted_end;
            while q > 0 && moves[q - 1].value < tmp.value {
                moves[q] = moves[q - 1];
                q -= 1;
            }
            moves[q] = tmp;
        }
    }
}

pub struct MovePicker {
    stage: Stage,
    tt_move: Move,
    refutations: [Move; 3],
    refutation_idx: usize,
    probcut_threshold: Value,
    depth: Depth,
    ply: i32,
    recapture_sq: Option<Square>,
    cont_hist: [ContHistKey; 6],

    moves: Vec<ExtMove>,
    cur: usize,
    end_captures: usize,
    bad_captures: Vec<Move>,
    bad_idx: usize,
}

impl MovePicker {
    /// Main-search constructor; selects the evasion chain when in check.
    pub fn new_main(
        pos: &Position,
        tt_move: Move,
        depth: Depth,
        ply: i32,
        killers: [Move; 2],
        countermove: Move,
        cont_hist: [ContHistKey; 6],
    ) -> Self {
        let tt_ok = tt_move.is_some() && pos.legal(tt_move);
        let stage = if pos.in_check() {
            if tt_ok {
                Stage::EvasionTT
            } else {
                Stage::EvasionInit
            }
        } else if tt_ok {
            Stage::MainTT
        } else {
            Stage::CaptureInit
        };

        MovePicker {
            stage,
            tt_move: if tt_ok { tt_move } else { Move::NONE },
            refutations: [killers[0], killers[1], countermove],
            refutation_idx: 0,
            probcut_threshold: Value::ZERO,
            depth,
            ply,
            recapture_sq: None,
            cont_hist,
            moves: Vec::new(),
            cur: 0,
            end_captures: 0,
            bad_captures: Vec::new(),
            bad_idx: 0,
        }
    }

    /// Quiescence constructor: captures, then quiet checks at the checks
    /// depth; only recaptures once the depth drops far enough.
    pub fn new_qsearch(
        pos: &Position,
        tt_move: Move,
        depth: Depth,
        recapture_sq: Option<Square>,
        cont_hist: [ContHistKey; 6],
    ) -> Self {
        let tt_ok = tt_move.is_some() && pos.legal(tt_move);
        let stage = if pos.in_check() {
            if tt_ok {
                Stage::EvasionTT
            } else {
                Stage::EvasionInit
            }
        } else if tt_ok {
            Stage::QSearchTT
        } else {
            Stage::QCaptureInit
        };

        MovePicker {
            stage,
            tt_move: if tt_ok { tt_move } else { Move::NONE },
            refutations: [Move::NONE; 3],
            refutation_idx: 0,
            probcut_threshold: Value::ZERO,
            depth,
            ply: 0,
            recapture_sq,
            cont_hist,
            moves: Vec::new(),
            cur: 0,
            end_captures: 0,
            bad_captures: Vec::new(),
            bad_idx: 0,
        }
    }

    /// ProbCut constructor: captures beating the SEE threshold only.
    pub fn new_probcut(pos: &Position, tt_move: Move, threshold: Value) -> Self {
        debug_assert!(!pos.in_check());
        let tt_ok = tt_move.is_some()
            && pos.is_capture(tt_move)
            && pos.legal(tt_move)
            && pos.see_ge(tt_move, threshold);

        MovePicker {
            stage: if tt_ok {
                Stage::ProbCutTT
            } else {
                Stage::ProbCutInit
            },
            tt_move: if tt_ok { tt_move } else { Move::NONE },
            refutations: [Move::NONE; 3],
            refutation_idx: 0,
            probcut_threshold: threshold,
            depth: 0,
            ply: 0,
            recapture_sq: None,
            cont_hist: [ContHistKey::SENTINEL; 6],
            moves: Vec::new(),
            cur: 0,
            end_captures: 0,
            bad_captures: Vec::new(),
            bad_idx: 0,
        }
    }

    /// Generate every legal move once and split captures (including queen
    /// promotions) to the front.
    fn generate(&mut self, pos: &Position) {
        let movegen = MoveGen::new_legal(pos.board());
        let mut captures = Vec::with_capacity(16);
        let mut quiets = Vec::with_capacity(48);
        for m in movegen {
            let m = Move::from(m);
            if m == self.tt_move {
                continue;
            }
            if pos.capture_stage(m) {
                captures.push(ExtMove { mv: m, value: 0 });
            } else {
                quiets.push(ExtMove { mv: m, value: 0 });
            }
        }
        self.end_captures = captures.len();
        self.moves = captures;
        self.moves.extend_from_slice(&quiets);
    }

    fn score_captures(&mut self, pos: &Position, hist: &Histories) {
        for em in &mut self.moves[..self.end_captures] {
            let m = em.mv;
            let captured = if pos.is_en_passant(m) {
                Some(chess::Piece::Pawn)
            } else {
                pos.piece_on(m.to_sq())
            };
            let moved = piece_index(
                pos.side_to_move(),
                pos.moved_piece(m).expect("legal move has a mover"),
            );
            em.value = 6 * captured.map_or(0, |p| PIECE_VALUE_MG[p.to_index()])
                + hist
                    .capture
                    .get(moved, m.to_sq().to_index(), captured_index(captured));
        }
    }

    fn score_quiets(&mut self, pos: &Position, hist: &Histories) {
        let us = pos.side_to_move().to_index();
        let ply = self.ply;
        let depth = self.depth;
        for i in self.end_captures..self.moves.len() {
            let m = self.moves[i].mv;
            let pc = piece_index(
                pos.side_to_move(),
                pos.moved_piece(m).expect("legal move has a mover"),
            );
            let to = m.to_sq().to_index();
            let mut v = hist.main.get(us, m)
                + 2 * hist.cont_leaf(self.cont_hist[0]).get(pc, to)
                + 2 * hist.cont_leaf(self.cont_hist[1]).get(pc, to)
                + 2 * hist.cont_leaf(self.cont_hist[3]).get(pc, to)
                + hist.cont_leaf(self.cont_hist[5]).get(pc, to);
            if (ply as usize) < MAX_LPH {
                v += 4.min(depth / 3) * hist.low_ply.get(ply as usize, m);
            }
            self.moves[i].value = v;
        }
    }

    fn score_evasions(&mut self, pos: &Position, hist: &Histories) {
        let us = pos.side_to_move().to_index();
        for em in &mut self.moves {
            let m = em.mv;
            let moved = pos.moved_piece(m).expect("legal move has a mover");
            em.value = if pos.is_capture(m) {
                let captured = if pos.is_en_passant(m) {
                    Some(chess::Piece::Pawn)
                } else {
                    pos.piece_on(m.to_sq())
                };
                captured.map_or(0, |p| PIECE_VALUE_MG[p.to_index()]) - moved.to_index() as i32
                    + (1 << 28)
            } else {
                let pc = piece_index(pos.side_to_move(), moved);
                hist.main.get(us, m) + hist.cont_leaf(self.cont_hist[0]).get(pc, m.to_sq().to_index())
            };
        }
    }

    #[inline]
    fn is_refutation(&self, m: Move) -> bool {
        self.refutations.contains(&m)
    }

    /// Next move in stage order; `Move::NONE` once exhausted. With
    /// `skip_quiets` the quiet stages collapse and only captures and
    /// refutations come out.
    pub fn next_move(&mut self, pos: &Position, hist: &Histories, skip_quiets: bool) -> Move {
        loop {
            match self.stage {
                Stage::MainTT | Stage::EvasionTT | Stage::QSearchTT | Stage::ProbCutTT => {
                    self.stage = match self.stage {
                        Stage::MainTT => Stage::CaptureInit,
                        Stage::EvasionTT => Stage::EvasionInit,
                        Stage::QSearchTT => Stage::QCaptureInit,
                        _ => Stage::ProbCutInit,
                    };
                    return self.tt_move;
                }

                Stage::CaptureInit | Stage::ProbCutInit | Stage::QCaptureInit => {
                    self.generate(pos);
                    self.score_captures(pos, hist);
                    self.moves[..self.end_captures]
                        .sort_by(|a, b| b.value.cmp(&a.value));
                    self.cur = 0;
                    self.stage = match self.stage {
                        Stage::CaptureInit => Stage::GoodCapture,
                        Stage::ProbCutInit => Stage::ProbCut,
                        _ => Stage::QCapture,
                    };
                }

                Stage::GoodCapture => {
                    if self.cur < self.end_captures {
                        let em = self.moves[self.cur];
                        self.cur += 1;
                        // Captures losing too much material wait behind the
                        // quiets.
                        if pos.see_ge(em.mv, Value::new(-69 * em.value / 1024)) {
                            return em.mv;
                        }
                        self.bad_captures.push(em.mv);
                        continue;
                    }
                    self.refutation_idx = 0;
                    // A countermove that duplicates a killer must not come
                    // out twice.
                    if self.refutations[2] == self.refutations[0]
                        || self.refutations[2] == self.refutations[1]
                    {
                        self.refutations[2] = Move::NONE;
                    }
                    self.stage = Stage::Refutation;
                }

                Stage::Refutation => {
                    while self.refutation_idx < 3 {
                        let m = self.refutations[self.refutation_idx];
                        self.refutation_idx += 1;
                        if m.is_some()
                            && m != self.tt_move
                            && !pos.capture_stage(m)
                            && pos.legal(m)
                        {
                            return m;
                        }
                    }
                    self.stage = Stage::QuietInit;
                }

                Stage::QuietInit => {
                    if !skip_quiets {
                        self.score_quiets(pos, hist);
                        partial_insertion_sort(
                            &mut self.moves[self.end_captures..],
                            -3000 * self.depth,
                        );
                    }
                    self.cur = self.end_captures;
                    self.stage = Stage::Quiet;
                }

                Stage::Quiet => {
                    while !skip_quiets && self.cur < self.moves.len() {
                        let m = self.moves[self.cur].mv;
                        self.cur += 1;
                        if !self.is_refutation(m) {
                            return m;
                        }
                    }
                    self.bad_idx = 0;
                    self.stage = Stage::BadCapture;
                }

                Stage::BadCapture => {
                    if self.bad_idx < self.bad_captures.len() {
                        let m = self.bad_captures[self.bad_idx];
                        self.bad_idx += 1;
                        return m;
                    }
                    self.stage = Stage::Done;
                }

                Stage::EvasionInit => {
                    self.generate(pos);
                    // Evasions are scored and emitted as one batch.
                    self.end_captures = self.moves.len();
                    self.score_evasions(pos, hist);
                    self.moves.sort_by(|a, b| b.value.cmp(&a.value));
                    self.cur = 0;
                    self.stage = Stage::Evasion;
                }

                Stage::Evasion => {
                    if self.cur < self.moves.len() {
                        let m = self.moves[self.cur].mv;
                        self.cur += 1;
                        return m;
                    }
                    self.stage = Stage::Done;
                }

                Stage::ProbCut => {
                    while self.cur < self.end_captures {
                        let m = self.moves[self.cur].mv;
                        self.cur += 1;
                        if pos.see_ge(m, self.probcut_threshold) {
                            return m;
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::QCapture => {
                    while self.cur < self.end_captures {
                        let m = self.moves[self.cur].mv;
                        self.cur += 1;
                        if self.depth <= DEPTH_QS_RECAPTURES
                            && Some(m.to_sq()) != self.recapture_sq
                        {
                            continue;
                        }
                        return m;
                    }
                    if self.depth != DEPTH_QS_CHECKS {
                        self.stage = Stage::Done;
                    } else {
                        self.stage = Stage::QCheckInit;
                    }
                }

                Stage::QCheckInit => {
                    // Reuse the quiet partition, keeping only checks.
                    self.cur = self.end_captures;
                    self.stage = Stage::QCheck;
                }

                Stage::QCheck => {
                    while self.cur < self.moves.len() {
                        let m = self.moves[self.cur].mv;
                        self.cur += 1;
                        if pos.gives_check(m) {
                            return m;
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::Done => return Move::NONE,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::history::Histories;

    fn drain(pos: &Position, mut mp: MovePicker, hist: &Histories) -> Vec<Move> {
        let mut out = Vec::new();
        loop {
            let m = mp.next_move(pos, hist, false);
            if m.is_none() {
                break;
            }
            out.push(m);
        }
        out
    }

    #[test]
    fn yields_every_legal_move_exactly_once() {
        let pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let hist = Histories::new();
        let mp = MovePicker::new_main(
            &pos,
            Move::NONE,
            8,
            2,
            [Move::NONE; 2],
            Move::NONE,
            [ContHistKey::SENTINEL; 6],
        );
        let mut got = drain(&pos, mp, &hist);
        let mut want = pos.legal_moves();
        got.sort_by_key(|m| m.raw());
        want.sort_by_key(|m| m.raw());
        assert_eq!(got, want);
    }

    #[test]
    fn tt_move_comes_first_and_is_not_repeated() {
        let pos = Position::startpos();
        let hist = Histories::new();
        let tt = pos.find_move("e2e4").unwrap();
        let mp = MovePicker::new_main(
            &pos,
            tt,
            6,
            0,
            [Move::NONE; 2],
            Move::NONE,
            [ContHistKey::SENTINEL; 6],
        );
        let got = drain(&pos, mp, &hist);
        assert_eq!(got[0], tt);
        assert_eq!(got.iter().filter(|&&m| m == tt).count(), 1);
        assert_eq!(got.len(), 20);
    }

    // Rxe4 wins a free pawn; Qxc6 sheds the queen for a pawn.
    const TWO_CAPTURES: &str = "4k3/1p6/2p5/8/4p3/2Q1R3/8/4K3 w - - 0 1";

    #[test]
    fn winning_capture_before_quiets_and_losing_captures_last() {
        let pos = Position::from_fen(TWO_CAPTURES).unwrap();
        let hist = Histories::new();
        let mp = MovePicker::new_main(
            &pos,
            Move::NONE,
            8,
            1,
            [Move::NONE; 2],
            Move::NONE,
            [ContHistKey::SENTINEL; 6],
        );
        let got = drain(&pos, mp, &hist);
        let rxe4 = pos.find_move("e3e4").unwrap();
        let qxc6 = pos.find_move("c3c6").unwrap();
        let first_quiet = got
            .iter()
            .position(|&m| !pos.capture_stage(m))
            .expect("has quiets");
        let good_at = got.iter().position(|&m| m == rxe4).unwrap();
        let bad_at = got.iter().position(|&m| m == qxc6).unwrap();
        assert!(good_at < first_quiet);
        assert!(bad_at > first_quiet);
        assert_eq!(bad_at, got.len() - 1);
    }

    #[test]
    fn killers_lead_the_quiet_moves() {
        let pos = Position::startpos();
        let hist = Histories::new();
        let killer = pos.find_move("g1f3").unwrap();
        let counter = pos.find_move("b1c3").unwrap();
        let mp = MovePicker::new_main(
            &pos,
            Move::NONE,
            6,
            0,
            [killer, Move::NONE],
            counter,
            [ContHistKey::SENTINEL; 6],
        );
        let got = drain(&pos, mp, &hist);
        assert_eq!(got[0], killer);
        assert_eq!(got[1], counter);
        assert_eq!(got.iter().filter(|&&m| m == killer).count(), 1);
    }

    #[test]
    fn skip_quiets_still_emits_captures_and_refutations() {
        let pos = Position::from_fen(TWO_CAPTURES).unwrap();
        let hist = Histories::new();
        let mut mp = MovePicker::new_main(
            &pos,
            Move::NONE,
            8,
            1,
            [Move::NONE; 2],
            Move::NONE,
            [ContHistKey::SENTINEL; 6],
        );
        let mut got = Vec::new();
        loop {
            let m = mp.next_move(&pos, &hist, true);
            if m.is_none() {
                break;
            }
            got.push(m);
        }
        assert!(!got.is_empty());
        assert!(got.iter().all(|&m| pos.capture_stage(m)));
    }

    #[test]
    fn evasions_cover_all_legal_replies_to_check() {
        // Rook check down the e-file; the king has three flight squares.
        let pos = Position::from_fen("4k3/8/8/8/4r3/8/3P4/4K3 w - - 0 1").unwrap();
        assert!(pos.in_check());
        assert!(!pos.legal_moves().is_empty());
        let hist = Histories::new();
        let mp = MovePicker::new_main(
            &pos,
            Move::NONE,
            5,
            0,
            [Move::NONE; 2],
            Move::NONE,
            [ContHistKey::SENTINEL; 6],
        );
        let mut got = drain(&pos, mp, &hist);
        let mut want = pos.legal_moves();
        got.sort_by_key(|m| m.raw());
        want.sort_by_key(|m| m.raw());
        assert_eq!(got, want);
    }

    #[test]
    fn qsearch_picker_yields_captures_only_below_checks_depth() {
        let pos = Position::from_fen(TWO_CAPTURES).unwrap();
        let hist = Histories::new();
        let mut mp = MovePicker::new_qsearch(
            &pos,
            Move::NONE,
            crate::search::DEPTH_QS_NO_CHECKS,
            None,
            [ContHistKey::SENTINEL; 6],
        );
        loop {
            let m = mp.next_move(&pos, &hist, false);
            if m.is_none() {
                break;
            }
            assert!(pos.capture_stage(m));
        }
    }

    #[test]
    fn probcut_picker_respects_threshold() {
        let pos = Position::from_fen(TWO_CAPTURES).unwrap();
        let hist = Histories::new();
        let mut mp = MovePicker::new_probcut(&pos, Move::NONE, Value::new(1));
        loop {
            let m = mp.next_move(&pos, &hist, false);
            if m.is_none() {
                break;
            }
            assert!(pos.see_ge(m, Value::new(1)));
        }
    }
}
