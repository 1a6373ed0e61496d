//! Quiescence search.
//!
//! Resolves captures (and at the boundary depth, quiet checks) until the
//! position goes quiet. Shares the worker state with the main search; the
//! `HYBRID` parameter selects the alternative evaluation flavor for the
//! whole quiescence subtree.

use crate::position::{piece_index, Position};
use crate::types::{Bound, Depth, Move, Value, MAX_PLY, PIECE_VALUE_EG};

use super::alpha_beta::{SearchContext, SearchWorker};
use super::movepicker::MovePicker;
use super::types::{value_from_tt, value_to_tt, ContHistKey, NodeType};
use super::{COUNTER_MOVE_PRUNE_THRESHOLD, DEPTH_NONE, DEPTH_QS_CHECKS, DEPTH_QS_NO_CHECKS};

const NON_PV: u8 = NodeType::NonPV as u8;
const PV: u8 = NodeType::PV as u8;

impl SearchWorker {
    /// Quiescence entry using the evaluator's hybrid flavor, for callers
    /// that want tactical resolution under the secondary evaluation.
    pub fn quiesce_hybrid(
        &mut self,
        pos: &mut Position,
        ctx: &SearchContext,
        alpha: Value,
        beta: Value,
        ply: i32,
    ) -> Value {
        self.qsearch::<PV, true>(pos, ctx, alpha, beta, 0, ply)
    }

    /// Quiescence node. `depth` starts at zero and only decreases.
    #[allow(clippy::too_many_arguments)]
    pub fn qsearch<const NT: u8, const HYBRID: bool>(
        &mut self,
        pos: &mut Position,
        ctx: &SearchContext,
        mut alpha: Value,
        beta: Value,
        depth: Depth,
        ply: i32,
    ) -> Value {
        let pv_node = NT != NON_PV;

        debug_assert!(alpha >= -Value::INFINITE && alpha < beta && beta <= Value::INFINITE);
        debug_assert!(pv_node || alpha == beta - 1);
        debug_assert!(depth <= 0);

        let old_alpha = alpha;
        if pv_node {
            self.state.ss_mut(ply).pv.clear();
        }

        let in_check = pos.in_check();
        self.state.ss_mut(ply).in_check = in_check;
        let mut best_move = Move::NONE;
        let mut move_count = 0;

        if pos.is_draw(ply) || ply >= MAX_PLY {
            return if ply >= MAX_PLY && !in_check {
                self.evaluate(pos, ctx, HYBRID)
            } else {
                Value::DRAW
            };
        }

        debug_assert!((0..MAX_PLY).contains(&ply));

        // Checks are generated only at the boundary depth, and the TT entry
        // depth follows that decision.
        let tt_depth = if in_check || depth >= DEPTH_QS_CHECKS {
            DEPTH_QS_CHECKS
        } else {
            DEPTH_QS_NO_CHECKS
        };

        let pos_key = pos.key();
        let tte = ctx.tt.probe(pos_key);
        let tt_hit = tte.found;
        self.state.ss_mut(ply).tt_hit = tt_hit;
        let tt_data = tte.data;
        let mut tt_value = if tt_hit {
            value_from_tt(tt_data.value, ply, pos.rule50_count())
        } else {
            Value::NONE
        };
        if tt_value != Value::NONE && tt_value.abs() >= Value::INFINITE {
            tt_value = Value::NONE;
        }
        let tt_move = if tt_hit && tt_data.mv.is_some() && pos.legal(tt_data.mv) {
            tt_data.mv
        } else {
            Move::NONE
        };
        let pv_hit = tt_hit && tt_data.is_pv;

        if !pv_node
            && tt_hit
            && tt_data.depth >= tt_depth
            && tt_value != Value::NONE
            && tt_data.bound.can_cutoff(tt_value, beta)
        {
            return tt_value;
        }

        // Static evaluation and stand pat.
        let mut best_value;
        let futility_base;
        if in_check {
            self.state.ss_mut(ply).static_eval = Value::NONE;
            best_value = -Value::INFINITE;
            futility_base = -Value::INFINITE;
        } else {
            if tt_hit {
                // Never assume anything about values stored in the TT.
                let mut ev = tt_data.eval;
                if ev == Value::NONE || ev.abs() >= Value::INFINITE {
                    ev = self.evaluate(pos, ctx, HYBRID);
                }
                self.state.ss_mut(ply).static_eval = ev;
                best_value = ev;

                if tt_value != Value::NONE
                    && (if tt_value > best_value {
                        tt_data.bound.is_lower()
                    } else {
                        tt_data.bound.is_upper()
                    })
                {
                    best_value = tt_value;
                }
            } else {
                let prev_move = self.state.ss(ply - 1).current_move;
                let ev = if prev_move != Move::NULL {
                    self.evaluate(pos, ctx, HYBRID)
                } else {
                    -self.state.ss(ply - 1).static_eval + 2 * crate::types::TEMPO.raw()
                };
                self.state.ss_mut(ply).static_eval = ev;
                best_value = ev;
            }

            // Stand pat.
            if best_value >= beta {
                if !tt_hit {
                    tte.write(
                        pos_key,
                        value_to_tt(best_value, ply),
                        false,
                        Bound::Lower,
                        DEPTH_NONE,
                        Move::NONE,
                        self.state.ss(ply).static_eval,
                        ctx.tt.generation(),
                    );
                }
                return best_value;
            }

            if pv_node && best_value > alpha {
                alpha = best_value;
            }

            futility_base = best_value + 155;
        }

        let cont_hist_keys = self.cont_hist_keys(ply);
        let prev_move = self.state.ss(ply - 1).current_move;
        let recapture_sq = if prev_move.is_ok() {
            Some(prev_move.to_sq())
        } else {
            None
        };

        let mut mp = MovePicker::new_qsearch(pos, tt_move, depth, recapture_sq, cont_hist_keys);

        loop {
            let m = mp.next_move(pos, &self.history, false);
            if m.is_none() {
                break;
            }

            let gives_check = pos.gives_check(m);
            let capture_or_promotion = pos.capture_or_promotion(m);

            move_count += 1;

            // Futility pruning: quiet-ish captures that cannot raise alpha.
            if best_value > Value::TB_LOSS_IN_MAX_PLY
                && !gives_check
                && futility_base > -Value::KNOWN_WIN
                && !pos.advanced_pawn_push(m)
            {
                debug_assert!(!pos.is_en_passant(m));

                if move_count > 2 {
                    continue;
                }

                let futility_value = futility_base
                    + pos
                        .piece_on(m.to_sq())
                        .map_or(0, |p| PIECE_VALUE_EG[p.to_index()]);

                if futility_value <= alpha {
                    best_value = best_value.max(futility_value);
                    continue;
                }

                if futility_base <= alpha && !pos.see_ge(m, Value::new(1)) {
                    best_value = best_value.max(futility_base);
                    continue;
                }
            }

            // Do not search losing exchanges; a discovered check is exempt
            // because the exchange square is not the point.
            if best_value > Value::TB_LOSS_IN_MAX_PLY
                && !(gives_check && pos.is_discovery_check_on_king(m))
                && !pos.see_ge(m, Value::ZERO)
            {
                continue;
            }

            ctx.tt.prefetch(pos.key_after(m));

            let us = pos.side_to_move();
            let pc = piece_index(us, pos.moved_piece(m).expect("legal move has a mover"));
            let to = m.to_sq().to_index();
            {
                let frame = self.state.ss_mut(ply);
                frame.current_move = m;
                frame.cont_hist = ContHistKey {
                    in_check,
                    capture: capture_or_promotion,
                    piece: pc,
                    to,
                };
            }

            // Countermove-based pruning, as in the main search.
            if !capture_or_promotion
                && best_value > Value::TB_LOSS_IN_MAX_PLY
                && self.history.cont_leaf(cont_hist_keys[0]).get(pc, to)
                    < COUNTER_MOVE_PRUNE_THRESHOLD
                && self.history.cont_leaf(cont_hist_keys[1]).get(pc, to)
                    < COUNTER_MOVE_PRUNE_THRESHOLD
            {
                continue;
            }

            pos.do_move(m);
            ctx.bump_nodes();
            let value =
                -self.qsearch::<NT, HYBRID>(pos, ctx, -beta, -alpha, depth - 1, ply + 1);
            pos.undo_move();

            debug_assert!(value > -Value::INFINITE && value < Value::INFINITE);

            if value > best_value {
                best_value = value;

                if value > alpha {
                    best_move = m;

                    if pv_node {
                        self.update_qsearch_pv(ply, m);
                    }

                    if pv_node && value < beta {
                        alpha = value;
                    } else {
                        break;
                    }
                }
            }
        }

        // No evasions found while in check: mate, counted from the root.
        if in_check && best_value == -Value::INFINITE {
            debug_assert!(pos.legal_moves().is_empty());
            return Value::mated_in(ply);
        }

        let bound = if best_value >= beta {
            Bound::Lower
        } else if pv_node && best_value > old_alpha {
            Bound::Exact
        } else {
            Bound::Upper
        };
        tte.write(
            pos_key,
            value_to_tt(best_value, ply),
            pv_hit,
            bound,
            tt_depth,
            best_move,
            self.state.ss(ply).static_eval,
            ctx.tt.generation(),
        );

        debug_assert!(best_value > -Value::INFINITE && best_value < Value::INFINITE);
        best_value
    }

    fn update_qsearch_pv(&mut self, ply: i32, m: Move) {
        let child_pv = self.state.ss(ply + 1).pv.clone();
        let frame = self.state.ss_mut(ply);
        frame.pv.clear();
        frame.pv.push(m);
        frame.pv.extend_from_slice(&child_pv);
    }
}
