//! Main alpha-beta search.
//!
//! One `SearchWorker` per thread; all workers run the same iterative
//! deepening over a shared transposition table and diverge only through
//! their private histories and timing (lazy SMP). The node function is
//! monomorphized over the node type so non-PV nodes carry none of the PV
//! bookkeeping.

use std::sync::atomic::Ordering;
use std::sync::LazyLock;

use chess::{Color, Piece};
use smallvec::SmallVec;

use crate::eval::Evaluator;
use crate::position::{piece_index, Position};
use crate::tb::{self, TbConfig};
use crate::tt::TranspositionTable;
use crate::types::{
    Bound, Depth, Move, Value, MAX_PLY, PAWN_VALUE_EG, PAWN_VALUE_MG, PIECE_VALUE_EG,
    ROOK_VALUE_MG,
};
use crate::uci;

use super::history::{captured_index, stat_bonus, Histories};
use super::limits::LimitsType;
use super::movepicker::MovePicker;
use super::skill::{Skill, SkillOptions};
use super::thread::SearchShared;
use super::time_manager::TimeManagement;
use super::types::{
    draw_value, new_stack, value_from_tt, value_to_tt, ContHistKey, NodeType, RootMoves, Stack,
    STACK_OFFSET,
};
use super::{
    DEPTH_NONE, MAX_LPH, TT_HIT_AVERAGE_RESOLUTION, TT_HIT_AVERAGE_WINDOW,
};

const NON_PV: u8 = NodeType::NonPV as u8;
const PV: u8 = NodeType::PV as u8;
const ROOT: u8 = NodeType::Root as u8;

/// Razoring margin at depth one.
const RAZOR_MARGIN: i32 = 510;

const MAX_MOVES: usize = 256;

/// Base LMR table indexed by depth or move number.
static REDUCTIONS: LazyLock<[i32; MAX_MOVES]> = LazyLock::new(|| {
    let mut table = [0i32; MAX_MOVES];
    for (i, slot) in table.iter_mut().enumerate().skip(1) {
        let i = i as f64;
        *slot = (21.3 * (i + 0.25 * i.ln()).ln()) as i32;
    }
    table
});

#[inline]
pub fn reduction(improving: bool, depth: Depth, move_count: i32) -> Depth {
    let d = (depth.max(0) as usize).min(MAX_MOVES - 1);
    let mn = (move_count.max(0) as usize).min(MAX_MOVES - 1);
    let r = REDUCTIONS[d] * REDUCTIONS[mn];
    (r + 503) / 1024 + ((!improving && r > 915) as i32)
}

#[inline]
pub fn futility_margin(depth: Depth, improving: bool) -> Value {
    Value::new(234 * (depth - improving as i32))
}

#[inline]
pub fn futility_move_count(improving: bool, depth: Depth) -> i32 {
    (3 + depth * depth) / (2 - improving as i32)
}

/// Immutable per-search context shared by every node of one worker.
pub struct SearchContext<'a> {
    pub tt: &'a TranspositionTable,
    pub shared: &'a SearchShared,
    pub evaluator: &'a dyn Evaluator,
    pub limits: &'a LimitsType,
    pub time: &'a TimeManagement,
    pub tb: TbConfig,
    pub thread_id: usize,
    pub num_threads: usize,
    pub multi_pv: usize,
    /// Base contempt in internal units, from the root side's perspective.
    pub contempt: i32,
    pub skill: SkillOptions,
    pub show_wdl: bool,
    /// Suppress protocol output (used by tests and worker threads).
    pub silent: bool,
}

impl SearchContext<'_> {
    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.shared.stop.load(Ordering::Relaxed)
    }

    #[inline]
    fn my_nodes(&self) -> u64 {
        self.shared.counters[self.thread_id]
            .nodes
            .load(Ordering::Relaxed)
    }

    #[inline]
    pub(super) fn bump_nodes(&self) {
        self.shared.counters[self.thread_id]
            .nodes
            .fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn is_main(&self) -> bool {
        self.thread_id == 0
    }
}

/// Cross-iteration state the main thread keeps between `go` commands.
pub struct MainDriverState {
    pub best_previous_score: Value,
    pub previous_time_reduction: f64,
    pub iter_value: [Value; 4],
}

impl Default for MainDriverState {
    fn default() -> Self {
        Self {
            best_previous_score: Value::INFINITE,
            previous_time_reduction: 1.0,
            iter_value: [Value::ZERO; 4],
        }
    }
}

/// Mutable per-thread search state.
pub struct SearchState {
    pub stack: Vec<Stack>,
    pub root_moves: RootMoves,
    pub root_depth: Depth,
    pub completed_depth: Depth,
    pub sel_depth: i32,
    pub pv_idx: usize,
    pub pv_last: usize,
    pub nmp_min_ply: i32,
    pub nmp_color: Color,
    pub tt_hit_average: u64,
    pub failed_high_cnt: i32,
    pub calls_cnt: i32,
    pub contempt: Value,
    pub root_side: Color,
    pub root_in_tb: bool,
}

impl SearchState {
    fn new() -> Self {
        Self {
            stack: new_stack(),
            root_moves: RootMoves::default(),
            root_depth: 0,
            completed_depth: 0,
            sel_depth: 0,
            pv_idx: 0,
            pv_last: 0,
            nmp_min_ply: 0,
            nmp_color: Color::White,
            tt_hit_average: TT_HIT_AVERAGE_WINDOW * TT_HIT_AVERAGE_RESOLUTION / 2,
            failed_high_cnt: 0,
            calls_cnt: 0,
            contempt: Value::ZERO,
            root_side: Color::White,
            root_in_tb: false,
        }
    }

    #[inline]
    pub fn ss(&self, ply: i32) -> &Stack {
        &self.stack[(ply + STACK_OFFSET as i32) as usize]
    }

    #[inline]
    pub fn ss_mut(&mut self, ply: i32) -> &mut Stack {
        &mut self.stack[(ply + STACK_OFFSET as i32) as usize]
    }
}

/// One search thread's worker: histories plus per-search state. Reused
/// across `go` commands so the statistics persist through the game.
pub struct SearchWorker {
    pub thread_id: usize,
    pub history: Box<Histories>,
    pub state: SearchState,
}

impl SearchWorker {
    pub fn new(thread_id: usize) -> Box<SearchWorker> {
        Box::new(SearchWorker {
            thread_id,
            history: Histories::new(),
            state: SearchState::new(),
        })
    }

    /// `ucinewgame`: drop all accumulated statistics.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Reset the per-search state; histories survive.
    pub fn prepare_search(&mut self, pos: &Position, ctx: &SearchContext) {
        let st = &mut self.state;
        st.stack = new_stack();
        st.root_depth = 0;
        st.completed_depth = 0;
        st.sel_depth = 0;
        st.pv_idx = 0;
        st.pv_last = 0;
        st.nmp_min_ply = 0;
        st.nmp_color = Color::White;
        st.tt_hit_average = TT_HIT_AVERAGE_WINDOW * TT_HIT_AVERAGE_RESOLUTION / 2;
        st.failed_high_cnt = 0;
        st.calls_cnt = 0;
        st.root_side = pos.side_to_move();
        st.root_moves = RootMoves::from_position(pos, &ctx.limits.search_moves);
        st.root_in_tb = tb::rank_root_moves(pos, &ctx.tb, &mut st.root_moves);

        // The root neighborhood moved down two plies since the last search.
        self.history.low_ply.shift_down_two();
    }

    #[inline]
    pub(super) fn evaluate(&self, pos: &Position, ctx: &SearchContext, hybrid: bool) -> Value {
        let v = if hybrid {
            ctx.evaluator.evaluate_hybrid(pos)
        } else {
            ctx.evaluator.evaluate(pos)
        };
        if pos.side_to_move() == self.state.root_side {
            v + self.state.contempt
        } else {
            v - self.state.contempt
        }
    }

    /// Continuation-history keys for the frames at ply -1, -2, -4, -6; the
    /// unused slots stay at the sentinel.
    pub(super) fn cont_hist_keys(&self, ply: i32) -> [ContHistKey; 6] {
        let mut keys = [ContHistKey::SENTINEL; 6];
        for (slot, back) in [(0usize, 1i32), (1, 2), (3, 4), (5, 6)] {
            keys[slot] = self.state.ss(ply - back).cont_hist;
        }
        keys
    }

    /// Periodic clock poll; main thread only.
    fn check_time(&mut self, ctx: &SearchContext) {
        self.state.calls_cnt -= 1;
        if self.state.calls_cnt > 0 {
            return;
        }
        self.state.calls_cnt = if ctx.limits.nodes > 0 {
            (ctx.limits.nodes / 1024).min(1024).max(1) as i32
        } else {
            1024
        };

        // Never stop on our own clock while pondering.
        if ctx.shared.ponder.load(Ordering::Relaxed) {
            return;
        }

        let elapsed = ctx.time.elapsed();
        if (ctx.time.use_time_management()
            && (elapsed > ctx.time.maximum() - 10
                || ctx.shared.stop_on_ponderhit.load(Ordering::Relaxed)))
            || (ctx.limits.movetime > 0 && elapsed >= ctx.limits.movetime)
            || (ctx.limits.nodes > 0 && ctx.shared.nodes_searched() >= ctx.limits.nodes)
        {
            ctx.shared.stop.store(true, Ordering::Relaxed);
        }
    }

    /// The iterative deepening loop: aspiration windows around the previous
    /// score, MultiPV grouping by tablebase rank, and (on the main thread)
    /// clock rescaling and UCI output.
    pub fn iterative_deepening(
        &mut self,
        pos: &mut Position,
        ctx: &SearchContext,
        mut main: Option<&mut MainDriverState>,
    ) {
        let mut last_best_move = Move::NONE;
        let mut last_best_move_depth: Depth = 0;
        let mut time_reduction = 1.0f64;
        let mut tot_best_move_changes = 0.0f64;
        let mut iter_idx = 0usize;
        let us = pos.side_to_move();

        if let Some(ref mut m) = main {
            let seed = if m.best_previous_score == Value::INFINITE {
                Value::ZERO
            } else {
                m.best_previous_score
            };
            m.iter_value = [seed; 4];
        }

        let mut rng = rand::rng();
        let mut skill = Skill::from_options(&ctx.skill, &mut rng);
        let mut multi_pv = ctx.multi_pv.max(1);
        if skill.enabled() {
            multi_pv = multi_pv.max(4);
        }
        multi_pv = multi_pv.min(self.state.root_moves.len());

        // Base contempt; the aspiration block adjusts it dynamically.
        let ct = ctx.contempt;
        self.state.contempt = Value::new(ct);

        let mut search_again_counter = 0;
        let mut best_value = -Value::INFINITE;
        let mut alpha;
        let mut beta;
        let mut delta;

        while {
            self.state.root_depth += 1;
            self.state.root_depth < MAX_PLY
                && !ctx.stop_requested()
                && !(ctx.limits.depth > 0
                    && ctx.is_main()
                    && self.state.root_depth > ctx.limits.depth)
        } {
            let root_depth = self.state.root_depth;

            // Age out the PV variability metric.
            if main.is_some() {
                tot_best_move_changes /= 2.0;
            }

            for rm in self.state.root_moves.0.iter_mut() {
                rm.previous_score = rm.score;
            }

            let mut pv_first = 0usize;
            self.state.pv_last = 0;

            if !ctx.shared.increase_depth.load(Ordering::Relaxed) {
                search_again_counter += 1;
            }

            // MultiPV loop: one full root search per line, grouping moves
            // of equal tablebase rank.
            self.state.pv_idx = 0;
            while self.state.pv_idx < multi_pv && !ctx.stop_requested() {
                if self.state.pv_idx == self.state.pv_last {
                    pv_first = self.state.pv_last;
                    self.state.pv_last += 1;
                    while self.state.pv_last < self.state.root_moves.len() {
                        if self.state.root_moves[self.state.pv_last].tb_rank
                            != self.state.root_moves[pv_first].tb_rank
                        {
                            break;
                        }
                        self.state.pv_last += 1;
                    }
                }

                self.state.sel_depth = 0;

                // Aspiration window seeded from the last iteration's score.
                delta = Value::INFINITE;
                alpha = -Value::INFINITE;
                beta = Value::INFINITE;
                if root_depth >= 4 {
                    let prev = self.state.root_moves[self.state.pv_idx].previous_score;
                    delta = Value::new(17);
                    alpha = (prev - delta).clamp(-Value::INFINITE, Value::INFINITE);
                    beta = (prev + delta).clamp(-Value::INFINITE, Value::INFINITE);

                    // Dynamic contempt follows the score trend.
                    let dct = ct + (113 - ct / 2) * prev.raw() / (prev.raw().abs() + 147);
                    self.state.contempt = Value::new(dct);
                }

                self.state.failed_high_cnt = 0;
                loop {
                    let adjusted_depth =
                        (root_depth - self.state.failed_high_cnt - search_again_counter).max(1);
                    best_value =
                        self.search::<ROOT>(pos, ctx, alpha, beta, adjusted_depth, false, 0);

                    // Stable sort: every non-improved score was reset to
                    // -INFINITE, so the previous order is preserved and
                    // only the new best move bubbles up.
                    let (from, to) = (self.state.pv_idx, self.state.pv_last);
                    self.state.root_moves.sort_range(from, to);

                    if ctx.stop_requested() {
                        break;
                    }

                    if ctx.is_main()
                        && multi_pv == 1
                        && (best_value <= alpha || best_value >= beta)
                        && ctx.time.elapsed() > 3000
                        && !ctx.silent
                    {
                        uci::print_pv(self, ctx, pos, root_depth, alpha, beta, multi_pv);
                    }

                    if best_value <= alpha {
                        beta = Value::new((alpha.raw() + beta.raw()) / 2);
                        alpha = (best_value - delta).clamp(-Value::INFINITE, Value::INFINITE);
                        self.state.failed_high_cnt = 0;
                        if main.is_some() {
                            ctx.shared
                                .stop_on_ponderhit
                                .store(false, Ordering::Relaxed);
                        }
                    } else if best_value >= beta {
                        beta = (best_value + delta).clamp(-Value::INFINITE, Value::INFINITE);
                        self.state.failed_high_cnt += 1;
                    } else {
                        break;
                    }

                    delta = delta + delta.raw() / 4 + 5;
                    debug_assert!(alpha >= -Value::INFINITE && beta <= Value::INFINITE);
                }

                let to = self.state.pv_idx + 1;
                self.state.root_moves.sort_range(pv_first, to);

                if ctx.is_main()
                    && !ctx.silent
                    && (ctx.stop_requested()
                        || self.state.pv_idx + 1 == multi_pv
                        || ctx.time.elapsed() > 3000)
                {
                    uci::print_pv(self, ctx, pos, root_depth, alpha, beta, multi_pv);
                }

                self.state.pv_idx += 1;
            }

            if !ctx.stop_requested() {
                self.state.completed_depth = root_depth;
            }

            if self.state.root_moves[0].first() != last_best_move {
                last_best_move = self.state.root_moves[0].first();
                last_best_move_depth = root_depth;
            }

            // `go mate N`: stop once a short enough mate is proven.
            if ctx.limits.mate > 0
                && best_value >= Value::MATE_IN_MAX_PLY
                && Value::MATE.raw() - best_value.raw() <= 2 * ctx.limits.mate
            {
                ctx.shared.stop.store(true, Ordering::Relaxed);
            }

            let Some(ref mut main_state) = main else {
                continue;
            };

            if skill.enabled() && skill.time_to_pick(root_depth) {
                skill.pick_best(&self.state.root_moves, multi_pv, &mut rng);
            }

            // Clock rescaling: shrink or stretch the optimum by the eval
            // trend and the stability of the best move.
            if ctx.time.use_time_management()
                && !ctx.stop_requested()
                && !ctx.shared.stop_on_ponderhit.load(Ordering::Relaxed)
            {
                let falling_eval = ((318
                    + 6 * (main_state.best_previous_score.raw() - best_value.raw())
                    + 6 * (main_state.iter_value[iter_idx].raw() - best_value.raw()))
                    as f64
                    / 825.0)
                    .clamp(0.5, 1.5);

                time_reduction = if last_best_move_depth + 9 < self.state.completed_depth {
                    1.92
                } else {
                    0.95
                };
                let reduction =
                    (1.47 + main_state.previous_time_reduction) / (2.32 * time_reduction);

                for counters in &ctx.shared.counters {
                    tot_best_move_changes +=
                        counters.best_move_changes.swap(0, Ordering::Relaxed) as f64;
                }
                let best_move_instability =
                    1.0 + 2.0 * tot_best_move_changes / ctx.num_threads as f64;

                let mut total_time = ctx.time.optimum() as f64
                    * falling_eval
                    * reduction
                    * best_move_instability;

                // One legal move: no point in thinking long.
                if self.state.root_moves.len() == 1 {
                    total_time = total_time.min(500.0);
                }

                if ctx.time.elapsed() as f64 > total_time {
                    // Out of budget: stop, or defer the stop until the GUI
                    // resolves the ponder.
                    if ctx.shared.ponder.load(Ordering::Relaxed) {
                        ctx.shared.stop_on_ponderhit.store(true, Ordering::Relaxed);
                    } else {
                        ctx.shared.stop.store(true, Ordering::Relaxed);
                    }
                } else if !ctx.shared.ponder.load(Ordering::Relaxed)
                    && ctx.time.elapsed() as f64 > total_time * 0.58
                {
                    ctx.shared.increase_depth.store(false, Ordering::Relaxed);
                } else {
                    ctx.shared.increase_depth.store(true, Ordering::Relaxed);
                }
            }

            main_state.iter_value[iter_idx] = best_value;
            iter_idx = (iter_idx + 1) & 3;
        }

        let Some(main_state) = main else {
            return;
        };

        main_state.previous_time_reduction = time_reduction;

        // Under a handicap, swap the chosen sub-optimal line to the front.
        if skill.enabled() {
            let pick = if skill.best.is_some() {
                skill.best
            } else {
                skill.pick_best(&self.state.root_moves, multi_pv, &mut rng)
            };
            if let Some(idx) = self.state.root_moves.index_of(pick) {
                self.state.root_moves.0.swap(0, idx);
            }
        }
    }

    /// The negamax node shared by root, PV and non-PV searches.
    #[allow(clippy::too_many_arguments)]
    pub fn search<const NT: u8>(
        &mut self,
        pos: &mut Position,
        ctx: &SearchContext,
        mut alpha: Value,
        mut beta: Value,
        mut depth: Depth,
        cut_node: bool,
        ply: i32,
    ) -> Value {
        let pv_node = NT != NON_PV;
        let root_node = NT == ROOT;
        let max_next_depth = if root_node { depth } else { depth + 1 };

        // An upcoming repetition draw bounds the score from below: either
        // side could steer into the cycle instead of playing on.
        if pos.rule50_count() >= 3
            && alpha < Value::DRAW
            && !root_node
            && pos.has_game_cycle(ply)
        {
            alpha = draw_value(ctx.my_nodes());
            if alpha >= beta {
                return alpha;
            }
        }

        if depth <= 0 {
            return self.qsearch::<NT, false>(pos, ctx, alpha, beta, 0, ply);
        }

        debug_assert!(-Value::INFINITE <= alpha && alpha < beta && beta <= Value::INFINITE);
        debug_assert!(pv_node || alpha == beta - 1);
        debug_assert!(0 < depth && depth < MAX_PLY);
        debug_assert!(!(pv_node && cut_node));

        let mut captures_searched: SmallVec<[Move; 32]> = SmallVec::new();
        let mut quiets_searched: SmallVec<[Move; 64]> = SmallVec::new();

        // Step 1. Initialize the node.
        let in_check = pos.in_check();
        let prior_capture = pos.captured_piece().is_some();
        let us = pos.side_to_move();
        let mut move_count = 0i32;
        let mut best_value = -Value::INFINITE;
        let mut best_move = Move::NONE;
        let mut max_value = Value::INFINITE;

        {
            let frame = self.state.ss_mut(ply);
            frame.in_check = in_check;
            frame.move_count = 0;
        }

        if ctx.is_main() {
            self.check_time(ctx);
        }

        if pv_node && self.state.sel_depth < ply + 1 {
            self.state.sel_depth = ply + 1;
        }

        if !root_node {
            // Step 2. Aborted search and immediate draws.
            if ctx.stop_requested() || pos.is_draw(ply) || ply >= MAX_PLY {
                return if ply >= MAX_PLY && !in_check {
                    self.evaluate(pos, ctx, false)
                } else {
                    draw_value(ctx.my_nodes())
                };
            }

            // Step 3. Mate distance pruning.
            alpha = alpha.max(Value::mated_in(ply));
            beta = beta.min(Value::mate_in(ply + 1));
            if alpha >= beta {
                return alpha;
            }
        }

        debug_assert!((0..MAX_PLY).contains(&ply));

        self.state.ss_mut(ply + 1).tt_pv = false;
        self.state.ss_mut(ply + 1).excluded_move = Move::NONE;
        self.state.ss_mut(ply + 2).killers = [Move::NONE; 2];
        if !root_node {
            self.state.ss_mut(ply + 2).stat_score = 0;
        }
        let prev_move = self.state.ss(ply - 1).current_move;
        let prev_sq = prev_move.to_sq();

        // Step 4. Transposition table lookup. An excluded move gets its own
        // key so singular results never overwrite the full search.
        let excluded_move = self.state.ss(ply).excluded_move;
        let pos_key = if excluded_move.is_none() {
            pos.key()
        } else {
            pos.key() ^ (0x9E37_79B9_7F4A_7C15u64.wrapping_mul(excluded_move.raw() as u64 + 1))
        };
        let tte = ctx.tt.probe(pos_key);
        let tt_hit = tte.found;
        self.state.ss_mut(ply).tt_hit = tt_hit;
        let tt_data = tte.data;
        let mut tt_value = if tt_hit {
            value_from_tt(tt_data.value, ply, pos.rule50_count())
        } else {
            Value::NONE
        };
        // Never trust raw table bytes: a torn write can smuggle any value.
        if tt_value != Value::NONE && tt_value.abs() >= Value::INFINITE {
            tt_value = Value::NONE;
        }
        let tt_move = if root_node {
            self.state.root_moves[self.state.pv_idx].first()
        } else if tt_hit && tt_data.mv.is_some() && pos.legal(tt_data.mv) {
            tt_data.mv
        } else {
            Move::NONE
        };
        if excluded_move.is_none() {
            self.state.ss_mut(ply).tt_pv = pv_node || (tt_hit && tt_data.is_pv);
        }
        let tt_pv = self.state.ss(ply).tt_pv;
        let former_pv = tt_pv && !pv_node;

        if tt_pv
            && depth > 12
            && ((ply - 1) as usize) < MAX_LPH
            && !prior_capture
            && prev_move.is_ok()
        {
            self.history
                .low_ply
                .update((ply - 1) as usize, prev_move, stat_bonus(depth - 5));
        }

        // Running average of TT hits, an LMR input.
        self.state.tt_hit_average = (TT_HIT_AVERAGE_WINDOW - 1) * self.state.tt_hit_average
            / TT_HIT_AVERAGE_WINDOW
            + TT_HIT_AVERAGE_RESOLUTION * tt_hit as u64;

        // At non-PV nodes, an early TT cutoff; suppressed when the 50-move
        // counter is high because the stored score may no longer be
        // reachable.
        if !pv_node
            && tt_hit
            && tt_data.depth >= depth
            && tt_value != Value::NONE
            && tt_data.bound.can_cutoff(tt_value, beta)
        {
            // A quiet ttMove that proves useful (or useless) updates the
            // ordering heuristics right here.
            if tt_move.is_some() {
                if tt_value >= beta {
                    if !pos.capture_or_promotion(tt_move) {
                        self.update_quiet_stats(pos, ply, tt_move, stat_bonus(depth), depth);
                    }
                    if self.state.ss(ply - 1).move_count <= 2 && !prior_capture {
                        let pc = self.prev_piece_index(pos, prev_sq);
                        self.update_continuation_histories(
                            ply - 1,
                            pc,
                            prev_sq.to_index(),
                            -stat_bonus(depth + 1),
                        );
                    }
                } else if !pos.capture_or_promotion(tt_move) {
                    let penalty = -stat_bonus(depth);
                    self.history.main.update(us.to_index(), tt_move, penalty);
                    if let Some(p) = pos.moved_piece(tt_move) {
                        self.update_continuation_histories(
                            ply,
                            piece_index(us, p),
                            tt_move.to_sq().to_index(),
                            penalty,
                        );
                    }
                }
            }

            if pos.rule50_count() < 90 {
                return tt_value;
            }
        }

        // Step 5. Tablebase probe.
        if !root_node && ctx.tb.cardinality > 0 {
            let pieces_count = pos.count_all_pieces();
            if pieces_count <= ctx.tb.cardinality
                && (pieces_count < ctx.tb.cardinality || depth >= ctx.tb.probe_depth)
                && pos.rule50_count() == 0
                && !pos.can_castle_any()
            {
                let (wdl, state) = tb::probe_wdl(pos);
                if ctx.is_main() {
                    self.state.calls_cnt = 0;
                }

                if state != tb::ProbeState::Fail {
                    ctx.shared.counters[ctx.thread_id]
                        .tb_hits
                        .fetch_add(1, Ordering::Relaxed);

                    let draw_score = ctx.tb.use_rule50 as i32;
                    let wdl = wdl.signum();
                    let value = if wdl < -draw_score {
                        Value::MATED_IN_MAX_PLY + ply + 1
                    } else if wdl > draw_score {
                        Value::MATE_IN_MAX_PLY - ply - 1
                    } else {
                        Value::DRAW + 2 * wdl * draw_score
                    };
                    let bound = if wdl < -draw_score {
                        Bound::Upper
                    } else if wdl > draw_score {
                        Bound::Lower
                    } else {
                        Bound::Exact
                    };

                    if bound == Bound::Exact
                        || (bound == Bound::Lower && value >= beta)
                        || (bound == Bound::Upper && value <= alpha)
                    {
                        tte.write(
                            pos_key,
                            value_to_tt(value, ply),
                            tt_pv,
                            bound,
                            (depth + 6).min(MAX_PLY - 1),
                            Move::NONE,
                            Value::NONE,
                            ctx.tt.generation(),
                        );
                        return value;
                    }

                    if pv_node {
                        if bound == Bound::Lower {
                            best_value = value;
                            alpha = alpha.max(best_value);
                        } else {
                            max_value = value;
                        }
                    }
                }
            }
        }

        // Step 6. Static evaluation.
        let mut eval;
        let improving;
        if in_check {
            self.state.ss_mut(ply).static_eval = Value::NONE;
            eval = Value::NONE;
            improving = false;
        } else {
            if tt_hit {
                // Never assume anything about values stored in the TT.
                eval = tt_data.eval;
                if eval == Value::NONE || eval.abs() >= Value::INFINITE {
                    eval = self.evaluate(pos, ctx, false);
                }
                self.state.ss_mut(ply).static_eval = eval;
                if eval == Value::DRAW {
                    eval = draw_value(ctx.my_nodes());
                }
                if tt_value != Value::NONE
                    && (if tt_value > eval {
                        tt_data.bound.is_lower()
                    } else {
                        tt_data.bound.is_upper()
                    })
                {
                    eval = tt_value;
                }
            } else {
                if prev_move != Move::NULL {
                    eval = self.evaluate(pos, ctx, false);
                } else {
                    eval = -self.state.ss(ply - 1).static_eval
                        + 2 * crate::types::TEMPO.raw();
                }
                self.state.ss_mut(ply).static_eval = eval;
                tte.write(
                    pos_key,
                    Value::NONE,
                    tt_pv,
                    Bound::None,
                    DEPTH_NONE,
                    Move::NONE,
                    eval,
                    ctx.tt.generation(),
                );
            }

            // Step 7. Razoring: a depth-one node hopelessly below alpha
            // resolves tactically instead.
            if !root_node && depth == 1 && eval <= alpha - RAZOR_MARGIN {
                return self.qsearch::<NT, false>(pos, ctx, alpha, beta, 0, ply);
            }

            improving = if self.state.ss(ply - 2).static_eval == Value::NONE {
                self.state.ss(ply).static_eval > self.state.ss(ply - 4).static_eval
                    || self.state.ss(ply - 4).static_eval == Value::NONE
            } else {
                self.state.ss(ply).static_eval > self.state.ss(ply - 2).static_eval
            };

            // Step 8. Futility pruning, child node.
            if !pv_node
                && depth < 8
                && eval - futility_margin(depth, improving) >= beta
                && eval < Value::KNOWN_WIN
            {
                return eval;
            }

            // Step 9. Null move search with verification.
            if !pv_node
                && prev_move != Move::NULL
                && self.state.ss(ply - 1).stat_score < 22977
                && eval >= beta
                && eval >= self.state.ss(ply).static_eval
                && self.state.ss(ply).static_eval
                    >= beta - 30 * depth - 28 * improving as i32 + 84 * tt_pv as i32 + 168
                && excluded_move.is_none()
                && pos.non_pawn_material(Some(us)) > 0
                && (ply >= self.state.nmp_min_ply || us != self.state.nmp_color)
            {
                debug_assert!(eval >= beta);

                let r = (1015 + 85 * depth) / 256 + ((eval - beta).raw() / 191).min(3);

                {
                    let frame = self.state.ss_mut(ply);
                    frame.current_move = Move::NULL;
                    frame.cont_hist = ContHistKey::SENTINEL;
                }

                pos.do_null_move();
                let mut null_value = -self.search::<NON_PV>(
                    pos,
                    ctx,
                    -beta,
                    -beta + 1,
                    depth - r,
                    !cut_node,
                    ply + 1,
                );
                pos.undo_null_move();

                if null_value >= beta {
                    // Never return an unproven mate or TB win.
                    if null_value >= Value::TB_WIN_IN_MAX_PLY {
                        null_value = beta;
                    }

                    if self.state.nmp_min_ply != 0
                        || (beta.abs() < Value::KNOWN_WIN && depth < 14)
                    {
                        return null_value;
                    }

                    debug_assert!(self.state.nmp_min_ply == 0);

                    // Verification search with null moves disabled for us
                    // until well above this ply, to dodge zugzwang traps.
                    self.state.nmp_min_ply = ply + 3 * (depth - r) / 4;
                    self.state.nmp_color = us;

                    let v =
                        self.search::<NON_PV>(pos, ctx, beta - 1, beta, depth - r, false, ply);

                    self.state.nmp_min_ply = 0;

                    if v >= beta {
                        return null_value;
                    }
                }
            }

            let probcut_beta = beta + 183 - 49 * improving as i32;

            // Step 10. ProbCut: a good capture clearing a reduced search far
            // above beta almost certainly refutes the previous move.
            if !pv_node
                && depth > 4
                && beta.abs() < Value::TB_WIN_IN_MAX_PLY
                && !(tt_hit
                    && tt_data.depth >= depth - 3
                    && tt_value != Value::NONE
                    && tt_value < probcut_beta)
            {
                if tt_hit
                    && tt_data.depth >= depth - 3
                    && tt_value != Value::NONE
                    && tt_value >= probcut_beta
                    && tt_move.is_some()
                    && pos.capture_or_promotion(tt_move)
                {
                    return probcut_beta;
                }

                debug_assert!(probcut_beta < Value::INFINITE);
                let threshold = probcut_beta - self.state.ss(ply).static_eval;
                let mut mp = MovePicker::new_probcut(pos, tt_move, threshold);
                let mut probcut_count = 0;
                let saved_tt_pv = self.state.ss(ply).tt_pv;
                self.state.ss_mut(ply).tt_pv = false;

                loop {
                    let m = mp.next_move(pos, &self.history, false);
                    if m.is_none() || probcut_count >= 2 + 2 * cut_node as i32 {
                        break;
                    }
                    if m == excluded_move {
                        continue;
                    }
                    debug_assert!(pos.capture_or_promotion(m));
                    debug_assert!(depth >= 5);
                    probcut_count += 1;

                    let pc = piece_index(us, pos.moved_piece(m).expect("mover"));
                    {
                        let frame = self.state.ss_mut(ply);
                        frame.current_move = m;
                        frame.cont_hist = ContHistKey {
                            in_check,
                            capture: true,
                            piece: pc,
                            to: m.to_sq().to_index(),
                        };
                    }

                    pos.do_move(m);
                    ctx.bump_nodes();

                    // Preliminary qsearch, then the confirming reduced search.
                    let mut value = -self.qsearch::<NON_PV, false>(
                        pos,
                        ctx,
                        -probcut_beta,
                        -probcut_beta + 1,
                        0,
                        ply + 1,
                    );
                    if value >= probcut_beta {
                        value = -self.search::<NON_PV>(
                            pos,
                            ctx,
                            -probcut_beta,
                            -probcut_beta + 1,
                            depth - 4,
                            !cut_node,
                            ply + 1,
                        );
                    }
                    pos.undo_move();

                    if value >= probcut_beta {
                        if !(tt_hit && tt_data.depth >= depth - 3 && tt_value != Value::NONE) {
                            tte.write(
                                pos_key,
                                value_to_tt(value, ply),
                                saved_tt_pv,
                                Bound::Lower,
                                depth - 3,
                                m,
                                self.state.ss(ply).static_eval,
                                ctx.tt.generation(),
                            );
                        }
                        self.state.ss_mut(ply).tt_pv = saved_tt_pv;
                        return value;
                    }
                }
                self.state.ss_mut(ply).tt_pv = saved_tt_pv;
            }

            // Step 11. A PV node this deep without a TT move was likely cut
            // before; search it shallower first.
            if pv_node && depth >= 6 && tt_move.is_none() {
                depth -= 2;
            }
        }

        // === Moves loop ===

        let cont_hist_keys = self.cont_hist_keys(ply);
        let countermove = if prev_move.is_ok() {
            let pc = self.prev_piece_index(pos, prev_sq);
            self.history.counter_moves.get(pc, prev_sq.to_index())
        } else {
            Move::NONE
        };

        let killers = self.state.ss(ply).killers;
        let mut mp = MovePicker::new_main(
            pos,
            tt_move,
            depth,
            ply,
            killers,
            countermove,
            cont_hist_keys,
        );

        let mut singular_quiet_lmr = false;
        let mut move_count_pruning = false;
        let tt_capture = tt_move.is_some() && pos.capture_or_promotion(tt_move);

        // Mark the node so sibling threads can widen their reductions here.
        let breadcrumb = ctx
            .shared
            .breadcrumbs
            .enter(ctx.thread_id, pos_key, ply);

        // Step 12. Loop over the moves.
        loop {
            let m = mp.next_move(pos, &self.history, move_count_pruning);
            if m.is_none() {
                break;
            }
            debug_assert!(pos.legal(m));

            if m == excluded_move {
                continue;
            }

            // At root, honor searchmoves and the MultiPV window.
            if root_node {
                let within = (self.state.pv_idx..self.state.pv_last)
                    .any(|i| self.state.root_moves[i].first() == m);
                if !within {
                    continue;
                }
            }

            move_count += 1;
            self.state.ss_mut(ply).move_count = move_count;

            if root_node && ctx.is_main() && ctx.time.elapsed() > 3000 && !ctx.silent {
                uci::print_currmove(depth, m, move_count + self.state.pv_idx as i32);
            }

            if pv_node {
                self.state.ss_mut(ply + 1).pv.clear();
            }

            let mut extension: Depth = 0;
            let capture_or_promotion = pos.capture_or_promotion(m);
            let moved_piece = pos.moved_piece(m).expect("legal move has a mover");
            let pc = piece_index(us, moved_piece);
            let to = m.to_sq().to_index();
            let gives_check = pos.gives_check(m);
            let is_normal_move =
                !pos.is_castling(m) && !pos.is_en_passant(m) && m.promotion().is_none();

            let mut new_depth = depth - 1;

            // Step 13. Pruning at shallow depth.
            if !root_node
                && pos.non_pawn_material(Some(us)) > 0
                && best_value > Value::TB_LOSS_IN_MAX_PLY
            {
                move_count_pruning = move_count >= futility_move_count(improving, depth);

                let lmr_depth = (new_depth - reduction(improving, depth, move_count)).max(0);

                if !capture_or_promotion && !gives_check {
                    // Countermove-based pruning.
                    let hist0 = self.history.cont_leaf(cont_hist_keys[0]).get(pc, to);
                    let hist1 = self.history.cont_leaf(cont_hist_keys[1]).get(pc, to);
                    let prune_bar = 4 + ((self.state.ss(ply - 1).stat_score > 0
                        || self.state.ss(ply - 1).move_count == 1)
                        as i32);
                    if lmr_depth < prune_bar
                        && hist0 < super::COUNTER_MOVE_PRUNE_THRESHOLD
                        && hist1 < super::COUNTER_MOVE_PRUNE_THRESHOLD
                    {
                        continue;
                    }

                    // Futility pruning, parent node.
                    let hist3 = self.history.cont_leaf(cont_hist_keys[3]).get(pc, to);
                    let hist5 = self.history.cont_leaf(cont_hist_keys[5]).get(pc, to);
                    if lmr_depth < 7
                        && !in_check
                        && self.state.ss(ply).static_eval + 266 + 170 * lmr_depth <= alpha
                        && hist0 + hist1 + hist3 + hist5 / 2 < 27376
                    {
                        continue;
                    }

                    // Negative-SEE quiets.
                    if !pos.see_ge(
                        m,
                        Value::new(-(30 - lmr_depth.min(18)) * lmr_depth * lmr_depth),
                    ) {
                        continue;
                    }
                } else {
                    // Capture-history pruning for checkless captures.
                    let captured = if pos.is_en_passant(m) {
                        Some(Piece::Pawn)
                    } else {
                        pos.piece_on(m.to_sq())
                    };
                    if !gives_check
                        && lmr_depth < 1
                        && self.history.capture.get(pc, to, captured_index(captured)) < 0
                    {
                        continue;
                    }

                    // SEE-based capture pruning.
                    if !pos.see_ge(m, Value::new(-213 * depth)) {
                        continue;
                    }
                }
            }

            // Step 14. Extensions.
            if depth >= 7
                && m == tt_move
                && !root_node
                && excluded_move.is_none()
                && tt_value != Value::NONE
                && tt_value.abs() < Value::KNOWN_WIN
                && tt_data.bound.is_lower()
                && tt_data.depth >= depth - 3
            {
                // Singular extension: everything else fails well below the
                // TT score, so the hash move deserves another ply.
                let singular_beta = tt_value - ((former_pv as i32 + 4) * depth) / 2;
                let singular_depth = (depth - 1 + 3 * former_pv as i32) / 2;
                self.state.ss_mut(ply).excluded_move = m;
                let value = self.search::<NON_PV>(
                    pos,
                    ctx,
                    singular_beta - 1,
                    singular_beta,
                    singular_depth,
                    cut_node,
                    ply,
                );
                self.state.ss_mut(ply).excluded_move = Move::NONE;

                if value < singular_beta {
                    extension = 1;
                    singular_quiet_lmr = !tt_capture;
                } else if singular_beta >= beta {
                    // Multi-cut: even without the hash move this node fails
                    // high, so prune with the soft bound.
                    return singular_beta;
                } else if tt_value >= beta {
                    // Confirm with a null-window search that some second
                    // move also clears beta.
                    self.state.ss_mut(ply).excluded_move = m;
                    let value = self.search::<NON_PV>(
                        pos,
                        ctx,
                        beta - 1,
                        beta,
                        (depth + 3) / 2,
                        cut_node,
                        ply,
                    );
                    self.state.ss_mut(ply).excluded_move = Move::NONE;
                    if value >= beta {
                        return beta;
                    }
                }
            } else if gives_check
                && (pos.is_discovery_check_on_king(m) || pos.see_ge(m, Value::ZERO))
            {
                extension = 1;
            } else if pos
                .captured_piece()
                .is_some_and(|p| PIECE_VALUE_EG[p.to_index()] > PAWN_VALUE_EG)
                && pos.non_pawn_material(None) <= 2 * ROOK_VALUE_MG
            {
                // Entering a nearly material-less endgame: resolve it.
                extension = 1;
            }

            // A hash move that resets the 50-move counter near the limit.
            if m == tt_move
                && pos.rule50_count() > 80
                && (capture_or_promotion || moved_piece == Piece::Pawn)
            {
                extension = 2;
            }

            new_depth += extension;

            ctx.tt.prefetch(pos.key_after(m));

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

            // Step 15. Make the move.
            pos.do_move(m);
            ctx.bump_nodes();

            // Step 16. Late move reduction.
            let mut value;
            let do_full_depth_search;
            let mut did_lmr = false;
            if depth >= 3
                && move_count > 1 + 2 * root_node as i32
                && (!capture_or_promotion
                    || move_count_pruning
                    || self.state.ss(ply).static_eval
                        + pos.captured_piece()
                            .map_or(0, |p| PIECE_VALUE_EG[p.to_index()])
                        <= alpha
                    || cut_node
                    || self.state.tt_hit_average
                        < 432 * TT_HIT_AVERAGE_RESOLUTION * TT_HIT_AVERAGE_WINDOW / 1024)
            {
                let mut r = reduction(improving, depth, move_count);

                // A rich TT neighborhood means a well-explored region.
                if self.state.tt_hit_average
                    > 537 * TT_HIT_AVERAGE_RESOLUTION * TT_HIT_AVERAGE_WINDOW / 1024
                {
                    r -= 1;
                }

                // Another thread is on this node: search shallower here.
                if breadcrumb.marked() {
                    r += 1;
                }

                if tt_pv {
                    r -= 2;
                }

                if (root_node || !pv_node)
                    && depth > 10
                    && ctx.shared.counters[ctx.thread_id]
                        .best_move_changes
                        .load(Ordering::Relaxed)
                        <= 2
                {
                    r += 1;
                }

                if move_count_pruning && !former_pv {
                    r += 1;
                }

                if self.state.ss(ply - 1).move_count > 13 {
                    r -= 1;
                }

                if singular_quiet_lmr {
                    r -= 1;
                }

                if !capture_or_promotion {
                    if tt_capture {
                        r += 1;
                    }

                    if root_node {
                        r += self.state.failed_high_cnt * self.state.failed_high_cnt
                            * move_count
                            / 512;
                    }

                    if cut_node {
                        r += 2;
                    } else if is_normal_move && !pos.see_ge(m.reverse(), Value::ZERO) {
                        // The move runs away from a capture.
                        r -= 2 + tt_pv as i32 - (moved_piece == Piece::Pawn) as i32;
                    }

                    let stat_score = self.history.main.get(us.to_index(), m)
                        + self.history.cont_leaf(cont_hist_keys[0]).get(pc, to)
                        + self.history.cont_leaf(cont_hist_keys[1]).get(pc, to)
                        + self.history.cont_leaf(cont_hist_keys[3]).get(pc, to)
                        - 5287;
                    self.state.ss_mut(ply).stat_score = stat_score;

                    let prev_stat = self.state.ss(ply - 1).stat_score;
                    if stat_score >= -105 && prev_stat < -103 {
                        r -= 1;
                    } else if prev_stat >= -122 && stat_score < -129 {
                        r += 1;
                    }

                    r -= stat_score / 14884;
                } else {
                    // Late captures at low depth rarely surprise.
                    if depth < 8 && move_count > 2 {
                        r += 1;
                    }

                    if !gives_check
                        && self.state.ss(ply).static_eval
                            + pos.captured_piece()
                                .map_or(0, |p| PIECE_VALUE_EG[p.to_index()])
                            + 210 * depth
                            <= alpha
                    {
                        r += 1;
                    }
                }

                let d = (new_depth - r).clamp(1, new_depth);
                value =
                    -self.search::<NON_PV>(pos, ctx, -(alpha + 1), -alpha, d, true, ply + 1);

                do_full_depth_search = value > alpha && d != new_depth;
                did_lmr = true;
            } else {
                value = Value::ZERO;
                do_full_depth_search = !pv_node || move_count > 1;
            }

            // Step 17. Full-depth null-window search when LMR was skipped
            // or failed high.
            if do_full_depth_search {
                value = -self.search::<NON_PV>(
                    pos,
                    ctx,
                    -(alpha + 1),
                    -alpha,
                    new_depth,
                    !cut_node,
                    ply + 1,
                );

                if did_lmr && !capture_or_promotion {
                    let mut bonus = if value > alpha {
                        stat_bonus(new_depth)
                    } else {
                        -stat_bonus(new_depth)
                    };
                    if m == self.state.ss(ply).killers[0] {
                        bonus += bonus / 4;
                    }
                    self.update_continuation_histories(ply, pc, to, bonus);
                }
            }

            // Full PV search on the first move, or after a fail high that
            // stays below beta (at root: any fail high).
            if pv_node
                && (move_count == 1 || (value > alpha && (root_node || value < beta)))
            {
                self.state.ss_mut(ply + 1).pv.clear();
                value = -self.search::<PV>(
                    pos,
                    ctx,
                    -beta,
                    -alpha,
                    max_next_depth.min(new_depth),
                    false,
                    ply + 1,
                );
            }

            // Step 18. Undo.
            pos.undo_move();

            debug_assert!(value > -Value::INFINITE && value < Value::INFINITE);

            // Step 19. A stop invalidates the value: bail out before any
            // best-move, PV or TT update.
            if ctx.stop_requested() {
                return Value::ZERO;
            }

            if root_node {
                let idx = self
                    .state
                    .root_moves
                    .index_of(m)
                    .expect("root move list covers every searched move");

                if move_count == 1 || value > alpha {
                    let sel_depth = self.state.sel_depth;
                    let child_pv = self.state.ss(ply + 1).pv.clone();
                    let rm = &mut self.state.root_moves[idx];
                    rm.score = value;
                    rm.sel_depth = sel_depth;
                    rm.pv.truncate(1);
                    rm.pv.extend_from_slice(&child_pv);

                    // A changing best move is a time-management signal.
                    if move_count > 1 {
                        ctx.shared.counters[ctx.thread_id]
                            .best_move_changes
                            .fetch_add(1, Ordering::Relaxed);
                    }
                } else {
                    // Keep the stable order: unimproved moves sink to the
                    // bottom with the sentinel score.
                    self.state.root_moves[idx].score = -Value::INFINITE;
                }
            }

            if value > best_value {
                best_value = value;

                if value > alpha {
                    best_move = m;

                    if pv_node && !root_node {
                        self.update_pv(ply, m);
                    }

                    if pv_node && value < beta {
                        alpha = value;
                    } else {
                        debug_assert!(value >= beta);
                        self.state.ss_mut(ply).stat_score = 0;
                        break;
                    }
                }
            }

            if m != best_move {
                if capture_or_promotion && captures_searched.len() < 32 {
                    captures_searched.push(m);
                } else if !capture_or_promotion && quiets_searched.len() < 64 {
                    quiets_searched.push(m);
                }
            }
        }
        drop(breadcrumb);

        // Step 20. Mate and stalemate detection; a singular search simply
        // fails low when only the excluded move was legal.
        if move_count == 0 {
            best_value = if excluded_move.is_some() {
                alpha
            } else if in_check {
                Value::mated_in(ply)
            } else {
                Value::DRAW
            };
        } else if best_move.is_some() {
            self.update_all_stats(
                pos,
                ply,
                best_move,
                best_value,
                beta,
                depth,
                &quiets_searched,
                &captures_searched,
            );
        } else if (depth >= 3 || pv_node) && !prior_capture && prev_move.is_ok() {
            // The previous move steered into a fail low: reward it.
            let pc = self.prev_piece_index(pos, prev_sq);
            self.update_continuation_histories(
                ply - 1,
                pc,
                prev_sq.to_index(),
                stat_bonus(depth),
            );
        }

        if pv_node {
            best_value = best_value.min(max_value);
        }

        // Keep or shed the "was on the PV" flag for this position.
        if best_value <= alpha {
            let inherited = self.state.ss(ply - 1).tt_pv && depth > 3;
            let frame = self.state.ss_mut(ply);
            frame.tt_pv = frame.tt_pv || inherited;
        } else if depth > 3 {
            let child = self.state.ss(ply + 1).tt_pv;
            let frame = self.state.ss_mut(ply);
            frame.tt_pv = frame.tt_pv && child;
        }

        if excluded_move.is_none() && !(root_node && self.state.pv_idx > 0) {
            let bound = if best_value >= beta {
                Bound::Lower
            } else if pv_node && best_move.is_some() {
                Bound::Exact
            } else {
                Bound::Upper
            };
            tte.write(
                pos_key,
                value_to_tt(best_value, ply),
                self.state.ss(ply).tt_pv,
                bound,
                depth,
                best_move,
                self.state.ss(ply).static_eval,
                ctx.tt.generation(),
            );
        }

        debug_assert!(best_value > -Value::INFINITE && best_value < Value::INFINITE);
        best_value
    }

    /// Append the child's PV behind `m` on this frame.
    fn update_pv(&mut self, ply: i32, m: Move) {
        let child_pv = self.state.ss(ply + 1).pv.clone();
        let frame = self.state.ss_mut(ply);
        frame.pv.clear();
        frame.pv.push(m);
        frame.pv.extend_from_slice(&child_pv);
    }

    /// Piece index (with color) of the opponent piece standing on the
    /// destination of the previous move.
    #[inline]
    fn prev_piece_index(&self, pos: &Position, prev_sq: chess::Square) -> usize {
        match (pos.piece_on(prev_sq), pos.color_on(prev_sq)) {
            (Some(p), Some(c)) => piece_index(c, p),
            _ => crate::position::PIECE_INDEX_NONE,
        }
    }

    /// Update the continuation histories of the plies -1, -2, -4 and -6
    /// relative to `ply` for the (piece, to) pair.
    pub(super) fn update_continuation_histories(
        &mut self,
        ply: i32,
        pc: usize,
        to: usize,
        bonus: i32,
    ) {
        let in_check = self.state.ss(ply).in_check;
        for back in [1, 2, 4, 6] {
            if in_check && back > 2 {
                break;
            }
            let frame = self.state.ss(ply - back);
            if frame.current_move.is_ok() {
                let key = frame.cont_hist;
                self.history.continuation.leaf_mut(key).update(pc, to, bonus);
            }
        }
    }

    /// Move-sorting updates for a quiet move that worked: killers, main and
    /// continuation histories, countermove, low-ply history.
    pub(super) fn update_quiet_stats(
        &mut self,
        pos: &Position,
        ply: i32,
        m: Move,
        bonus: i32,
        depth: Depth,
    ) {
        {
            let killers = &mut self.state.ss_mut(ply).killers;
            if killers[0] != m {
                killers[1] = killers[0];
                killers[0] = m;
            }
        }

        let us = pos.side_to_move();
        self.history.main.update(us.to_index(), m, bonus);
        let Some(moved) = pos.moved_piece(m) else {
            return;
        };
        let pc = piece_index(us, moved);
        self.update_continuation_histories(ply, pc, m.to_sq().to_index(), bonus);

        // Penalize the reverse shuffle for everything but pawns.
        if moved != Piece::Pawn {
            self.history.main.update(us.to_index(), m.reverse(), -bonus);
        }

        let prev_move = self.state.ss(ply - 1).current_move;
        if prev_move.is_ok() {
            let prev_sq = prev_move.to_sq();
            let pc = self.prev_piece_index(pos, prev_sq);
            self.history.counter_moves.set(pc, prev_sq.to_index(), m);
        }

        if depth > 11 && (ply as usize) < MAX_LPH {
            self.history
                .low_ply
                .update(ply as usize, m, stat_bonus(depth - 7));
        }
    }

    /// End-of-node statistics: reward the best move, penalize the rest.
    #[allow(clippy::too_many_arguments)]
    fn update_all_stats(
        &mut self,
        pos: &Position,
        ply: i32,
        best_move: Move,
        best_value: Value,
        beta: Value,
        depth: Depth,
        quiets_searched: &[Move],
        captures_searched: &[Move],
    ) {
        let us = pos.side_to_move();
        let bonus1 = stat_bonus(depth + 1);
        let bonus2 = if best_value > beta + PAWN_VALUE_MG {
            bonus1
        } else {
            stat_bonus(depth)
        };

        let best_captured = if pos.is_en_passant(best_move) {
            Some(Piece::Pawn)
        } else {
            pos.piece_on(best_move.to_sq())
        };

        if !pos.capture_or_promotion(best_move) {
            self.update_quiet_stats(pos, ply, best_move, bonus2, depth);

            for &m in quiets_searched {
                self.history.main.update(us.to_index(), m, -bonus2);
                if let Some(p) = pos.moved_piece(m) {
                    self.update_continuation_histories(
                        ply,
                        piece_index(us, p),
                        m.to_sq().to_index(),
                        -bonus2,
                    );
                }
            }
        } else if let Some(p) = pos.moved_piece(best_move) {
            self.history.capture.update(
                piece_index(us, p),
                best_move.to_sq().to_index(),
                captured_index(best_captured),
                bonus1,
            );
        }

        // Extra penalty for an early quiet move of the previous ply that
        // just got refuted.
        let prev_move = self.state.ss(ply - 1).current_move;
        if prev_move.is_ok() {
            let prev_frame = self.state.ss(ply - 1);
            let early = prev_frame.move_count == 1 + prev_frame.tt_hit as i32
                || prev_move == prev_frame.killers[0];
            if early && pos.captured_piece().is_none() {
                let prev_sq = prev_move.to_sq();
                let pc = self.prev_piece_index(pos, prev_sq);
                self.update_continuation_histories(ply - 1, pc, prev_sq.to_index(), -bonus1);
            }
        }

        for &m in captures_searched {
            let captured = if pos.is_en_passant(m) {
                Some(Piece::Pawn)
            } else {
                pos.piece_on(m.to_sq())
            };
            if let Some(p) = pos.moved_piece(m) {
                self.history.capture.update(
                    piece_index(us, p),
                    m.to_sq().to_index(),
                    captured_index(captured),
                    -bonus1,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn futility_margin_formula() {
        assert_eq!(futility_margin(3, false).raw(), 234 * 3);
        assert_eq!(futility_margin(3, true).raw(), 234 * 2);
        assert_eq!(futility_margin(1, true).raw(), 0);
    }

    #[test]
    fn futility_move_count_formula() {
        assert_eq!(futility_move_count(false, 3), 6);
        assert_eq!(futility_move_count(true, 3), 12);
        assert_eq!(futility_move_count(false, 1), 2);
    }

    #[test]
    fn reduction_grows_with_depth_and_move_count() {
        assert_eq!(reduction(true, 1, 1), 0);
        assert!(reduction(true, 30, 20) > reduction(true, 6, 20));
        assert!(reduction(true, 30, 20) > reduction(true, 30, 3));
        // The non-improving side gets reduced at least as much.
        for d in [4, 10, 24] {
            for mc in [2, 8, 30] {
                assert!(reduction(false, d, mc) >= reduction(true, d, mc));
            }
        }
    }
}
