//! Thread pool: lazy SMP over a shared transposition table.
//!
//! Every worker runs the same iterative deepening on its own copy of the
//! root position; they diverge through private histories, the staggered
//! `search_again_counter` and plain timing noise. The only synchronization
//! is a handful of relaxed atomics plus the lossy TT itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chess::Color;
use log::debug;

use crate::eval::{ClassicalEvaluator, Evaluator};
use crate::position::Position;
use crate::tb::TbConfig;
use crate::tt::TranspositionTable;
use crate::types::{Depth, Move, Value, PAWN_VALUE_EG};
use crate::uci;

use super::alpha_beta::{MainDriverState, SearchContext, SearchWorker};
use super::breadcrumbs::Breadcrumbs;
use super::limits::LimitsType;
use super::skill::{Skill, SkillOptions};
use super::time_manager::{TimeManagement, TimeOptions};

/// Relaxed per-thread counters, readable by the main thread mid-search.
#[derive(Default)]
pub struct WorkerCounters {
    pub nodes: AtomicU64,
    pub tb_hits: AtomicU64,
    pub best_move_changes: AtomicU64,
}

/// State shared by all workers of one search, plus the control flags the
/// front end flips from outside.
pub struct SearchShared {
    pub stop: AtomicBool,
    pub stop_on_ponderhit: AtomicBool,
    pub ponder: AtomicBool,
    pub increase_depth: AtomicBool,
    pub counters: Vec<WorkerCounters>,
    pub breadcrumbs: Breadcrumbs,
}

impl SearchShared {
    pub fn new(num_threads: usize) -> Self {
        Self {
            stop: AtomicBool::new(false),
            stop_on_ponderhit: AtomicBool::new(false),
            ponder: AtomicBool::new(false),
            increase_depth: AtomicBool::new(true),
            counters: (0..num_threads).map(|_| WorkerCounters::default()).collect(),
            breadcrumbs: Breadcrumbs::new(),
        }
    }

    fn reset_for_search(&self, ponder: bool) {
        self.stop.store(false, Ordering::Relaxed);
        self.stop_on_ponderhit.store(false, Ordering::Relaxed);
        self.ponder.store(ponder, Ordering::Relaxed);
        self.increase_depth.store(true, Ordering::Relaxed);
        for c in &self.counters {
            c.nodes.store(0, Ordering::Relaxed);
            c.tb_hits.store(0, Ordering::Relaxed);
            c.best_move_changes.store(0, Ordering::Relaxed);
        }
    }

    pub fn nodes_searched(&self) -> u64 {
        self.counters
            .iter()
            .map(|c| c.nodes.load(Ordering::Relaxed))
            .sum()
    }

    pub fn tb_hits(&self) -> u64 {
        self.counters
            .iter()
            .map(|c| c.tb_hits.load(Ordering::Relaxed))
            .sum()
    }

    /// External stop ("stop" command or pool shutdown). Monotonic for the
    /// duration of a search.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// The GUI played the pondered move: convert the search into a live one
    /// and release any deferred stop.
    pub fn ponderhit(&self) {
        self.ponder.store(false, Ordering::Relaxed);
        if self.stop_on_ponderhit.load(Ordering::Relaxed) {
            self.stop.store(true, Ordering::Relaxed);
        }
    }
}

/// Option values the pool needs for a search.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub threads: usize,
    pub multi_pv: usize,
    pub contempt_cp: i32,
    pub analysis_contempt: AnalysisContempt,
    pub analyse_mode: bool,
    pub skill: SkillOptions,
    pub show_wdl: bool,
    pub ponder: bool,
    pub move_overhead: i64,
    pub slow_mover: i64,
    pub minimum_thinking_time: i64,
    pub syzygy_probe_limit: u32,
    pub syzygy_probe_depth: i32,
    pub syzygy_50_move_rule: bool,
    /// Suppress protocol output; used by tests.
    pub silent: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            multi_pv: 1,
            contempt_cp: 24,
            analysis_contempt: AnalysisContempt::Both,
            analyse_mode: false,
            skill: SkillOptions::default(),
            show_wdl: false,
            ponder: false,
            move_overhead: 10,
            slow_mover: 100,
            minimum_thinking_time: 20,
            syzygy_probe_limit: 7,
            syzygy_probe_depth: 1,
            syzygy_50_move_rule: true,
            silent: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisContempt {
    Off,
    Both,
    White,
    Black,
}

/// Outcome of one `go`.
#[derive(Clone, Debug)]
pub struct SearchReport {
    pub best_move: Move,
    pub ponder_move: Move,
    pub score: Value,
    pub depth: Depth,
    pub nodes: u64,
}

/// The pool owns the workers, the shared TT and the cross-search state of
/// the main thread.
pub struct ThreadPool {
    tt: Arc<TranspositionTable>,
    shared: Arc<SearchShared>,
    workers: Vec<Box<SearchWorker>>,
    evaluator: Arc<dyn Evaluator>,
    main_state: MainDriverState,
}

impl ThreadPool {
    pub fn new(hash_mb: usize) -> Self {
        let mut pool = Self {
            tt: Arc::new(TranspositionTable::new(hash_mb)),
            shared: Arc::new(SearchShared::new(1)),
            workers: Vec::new(),
            evaluator: Arc::new(ClassicalEvaluator),
            main_state: MainDriverState::default(),
        };
        pool.set_threads(1);
        pool
    }

    /// Resize the worker set; called between searches.
    pub fn set_threads(&mut self, num_threads: usize) -> Arc<SearchShared> {
        let num_threads = num_threads.max(1);
        while self.workers.len() < num_threads {
            self.workers.push(SearchWorker::new(self.workers.len()));
        }
        self.workers.truncate(num_threads);
        if self.shared.counters.len() != num_threads {
            self.shared = Arc::new(SearchShared::new(num_threads));
        }
        self.shared.clone()
    }

    /// Handle for stop/ponderhit from another thread.
    pub fn shared(&self) -> Arc<SearchShared> {
        self.shared.clone()
    }

    pub fn tt(&self) -> Arc<TranspositionTable> {
        self.tt.clone()
    }

    pub fn set_hash(&mut self, mb: usize) {
        match Arc::get_mut(&mut self.tt) {
            Some(tt) => tt.resize(mb),
            None => self.tt = Arc::new(TranspositionTable::new(mb)),
        }
    }

    pub fn set_evaluator(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.evaluator = evaluator;
    }

    /// `ucinewgame`: clear the TT and every worker's statistics.
    pub fn clear(&mut self) {
        match Arc::get_mut(&mut self.tt) {
            Some(tt) => tt.clear(),
            None => {
                let mb = 16;
                self.tt = Arc::new(TranspositionTable::new(mb));
            }
        }
        for w in &mut self.workers {
            w.clear();
        }
        self.main_state = MainDriverState::default();
    }

    /// Run a full search for the given limits. Blocks until the search is
    /// over and the best move has been emitted; the caller runs this on a
    /// dedicated thread and flips the shared flags from outside.
    pub fn search(
        &mut self,
        root: &Position,
        limits: &LimitsType,
        opts: &EngineOptions,
    ) -> SearchReport {
        self.set_threads(opts.threads);
        self.shared.reset_for_search(limits.ponder);

        let us = root.side_to_move();
        let time_opts = TimeOptions {
            move_overhead: opts.move_overhead,
            slow_mover: opts.slow_mover,
            minimum_thinking_time: opts.minimum_thinking_time,
            ponder: opts.ponder,
        };
        let time = TimeManagement::init(limits, us, root.game_ply(), &time_opts);
        let tb = TbConfig::from_options(
            opts.syzygy_probe_limit,
            opts.syzygy_probe_depth,
            opts.syzygy_50_move_rule,
        );

        self.tt.new_search();

        // No legal root moves: mate or stalemate right here.
        let root_moves = root
            .legal_moves()
            .into_iter()
            .filter(|m| limits.search_moves.is_empty() || limits.search_moves.contains(m))
            .collect::<Vec<_>>();
        if root_moves.is_empty() {
            let score = if root.in_check() {
                -Value::MATE
            } else {
                Value::DRAW
            };
            if !opts.silent {
                println!("info depth 0 score {}", uci::format_value(score));
                println!("bestmove 0000");
            }
            return SearchReport {
                best_move: Move::NONE,
                ponder_move: Move::NONE,
                score,
                depth: 0,
                nodes: 0,
            };
        }

        // Base contempt, possibly overridden in analysis mode.
        let mut ct = opts.contempt_cp * PAWN_VALUE_EG / 100;
        if limits.infinite || opts.analyse_mode {
            ct = match opts.analysis_contempt {
                AnalysisContempt::Off => 0,
                AnalysisContempt::Both => ct,
                AnalysisContempt::White if us == Color::Black => -ct,
                AnalysisContempt::Black if us == Color::White => -ct,
                _ => ct,
            };
        }

        let num_threads = self.workers.len();
        let shared = self.shared.clone();
        let tt = self.tt.clone();
        let evaluator = self.evaluator.clone();
        let main_state = &mut self.main_state;
        let workers = &mut self.workers;

        debug!(
            "go: threads={num_threads} optimum={}ms maximum={}ms",
            time.optimum(),
            time.maximum()
        );

        thread::scope(|scope| {
            let (main_worker, helpers) = workers.split_at_mut(1);

            for worker in helpers.iter_mut() {
                let ctx = SearchContext {
                    tt: &*tt,
                    shared: &*shared,
                    evaluator: &*evaluator,
                    limits,
                    time: &time,
                    tb,
                    thread_id: worker.thread_id,
                    num_threads,
                    multi_pv: opts.multi_pv,
                    contempt: ct,
                    skill: opts.skill,
                    show_wdl: opts.show_wdl,
                    silent: true,
                };
                let mut pos = root.clone();
                let builder = thread::Builder::new()
                    .name(format!("search-{}", worker.thread_id))
                    .stack_size(8 * 1024 * 1024);
                builder
                    .spawn_scoped(scope, move || {
                        worker.prepare_search(&pos, &ctx);
                        if !worker.state.root_moves.is_empty() {
                            worker.iterative_deepening(&mut pos, &ctx, None);
                        }
                    })
                    .expect("spawn search thread");
            }

            // The main worker searches on this thread.
            let ctx = SearchContext {
                tt: &*tt,
                shared: &*shared,
                evaluator: &*evaluator,
                limits,
                time: &time,
                tb,
                thread_id: 0,
                num_threads,
                multi_pv: opts.multi_pv,
                contempt: ct,
                skill: opts.skill,
                show_wdl: opts.show_wdl,
                silent: opts.silent,
            };
            let mut pos = root.clone();
            main_worker[0].prepare_search(&pos, &ctx);
            main_worker[0].iterative_deepening(&mut pos, &ctx, Some(main_state));

            // The protocol forbids a bestmove while pondering or in an
            // infinite search: wait for "stop" or "ponderhit".
            while !shared.stop.load(Ordering::Relaxed)
                && (shared.ponder.load(Ordering::Relaxed) || limits.infinite)
            {
                thread::sleep(Duration::from_millis(1));
            }

            shared.stop.store(true, Ordering::Relaxed);
        });

        // Pick the thread to trust.
        let mut rng = rand::rng();
        let skill_enabled = Skill::from_options(&opts.skill, &mut rng).enabled();
        let best = if opts.multi_pv == 1
            && limits.depth == 0
            && !skill_enabled
            && self.workers[0].state.root_moves[0].first().is_some()
        {
            self.best_thread_index()
        } else {
            0
        };

        self.main_state.best_previous_score = self.workers[best].state.root_moves[0].score;

        // A new best thread means the GUI has stale PV info.
        if best != 0 && !opts.silent {
            let ctx = SearchContext {
                tt: &*self.tt,
                shared: &*self.shared,
                evaluator: &*self.evaluator,
                limits,
                time: &time,
                tb,
                thread_id: best,
                num_threads,
                multi_pv: opts.multi_pv,
                contempt: ct,
                skill: opts.skill,
                show_wdl: opts.show_wdl,
                silent: false,
            };
            let depth = self.workers[best].state.completed_depth;
            uci::print_pv(
                &self.workers[best],
                &ctx,
                root,
                depth,
                -Value::INFINITE,
                Value::INFINITE,
                opts.multi_pv,
            );
        }

        let nodes = self.shared.nodes_searched();
        let (best_move, ponder_move, score, depth) = {
            let worker = &mut self.workers[best];
            let need_ponder_probe = worker.state.root_moves[0].pv.len() < 2;
            if need_ponder_probe {
                let mut pos = root.clone();
                worker.state.root_moves[0].extract_ponder_from_tt(&mut pos, &self.tt);
            }
            let rm = &worker.state.root_moves[0];
            (
                rm.first(),
                rm.pv.get(1).copied().unwrap_or(Move::NONE),
                rm.score,
                worker.state.completed_depth,
            )
        };

        if !opts.silent {
            let mut line = format!("bestmove {}", best_move.to_uci());
            if ponder_move.is_some() {
                line.push_str(&format!(" ponder {}", ponder_move.to_uci()));
            }
            println!("{line}");
        }

        SearchReport {
            best_move,
            ponder_move,
            score,
            depth,
            nodes,
        }
    }

    /// Vote among the workers: deeper completed depth and better score win;
    /// proven mates and TB wins short-circuit to the shortest one.
    fn best_thread_index(&self) -> usize {
        let mut votes: HashMap<u16, i64> = HashMap::new();
        let mut min_score = Value::NONE;
        for w in &self.workers {
            min_score = min_score.min(w.state.root_moves[0].score);
        }

        let mut best = 0usize;
        for (i, w) in self.workers.iter().enumerate() {
            let rm = &w.state.root_moves[0];
            *votes.entry(rm.first().raw()).or_default() += (rm.score.raw() - min_score.raw() + 14)
                as i64
                * w.state.completed_depth as i64;

            let best_rm = &self.workers[best].state.root_moves[0];
            if best_rm.score.abs() >= Value::TB_WIN_IN_MAX_PLY {
                // Keep the shortest mate (or longest defense).
                if rm.score > best_rm.score {
                    best = i;
                }
            } else if rm.score >= Value::TB_WIN_IN_MAX_PLY
                || (rm.score > Value::TB_LOSS_IN_MAX_PLY
                    && votes[&rm.first().raw()] > votes[&best_rm.first().raw()])
            {
                best = i;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_opts() -> EngineOptions {
        EngineOptions {
            silent: true,
            ..Default::default()
        }
    }

    #[test]
    fn depth_limited_search_returns_a_move() {
        let mut pool = ThreadPool::new(4);
        let pos = Position::startpos();
        let limits = LimitsType {
            depth: 4,
            ..Default::default()
        };
        let report = pool.search(&pos, &limits, &quiet_opts());
        assert!(report.best_move.is_ok());
        assert!(report.depth >= 1);
        assert!(report.nodes > 0);
    }

    #[test]
    fn stalemate_root_reports_no_move_and_draw_score() {
        let mut pool = ThreadPool::new(1);
        let pos = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert!(pos.legal_moves().is_empty());
        let limits = LimitsType {
            depth: 5,
            ..Default::default()
        };
        let report = pool.search(&pos, &limits, &quiet_opts());
        assert_eq!(report.best_move, Move::NONE);
        assert_eq!(report.score, Value::DRAW);
        assert_eq!(report.depth, 0);
    }

    #[test]
    fn checkmated_root_reports_mate_score() {
        // Fool's mate delivered: White to move, already mated.
        let mut pool = ThreadPool::new(1);
        let pos = Position::from_fen(
            "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3",
        )
        .unwrap();
        assert!(pos.legal_moves().is_empty());
        let limits = LimitsType {
            depth: 3,
            ..Default::default()
        };
        let report = pool.search(&pos, &limits, &quiet_opts());
        assert_eq!(report.best_move, Move::NONE);
        assert_eq!(report.score, -Value::MATE);
    }

    #[test]
    fn stop_flag_cuts_a_long_search_short() {
        let mut pool = ThreadPool::new(4);
        let shared = pool.shared();
        let pos = Position::startpos();
        let limits = LimitsType {
            depth: 60,
            ..Default::default()
        };

        let stopper = {
            let shared = shared.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(80));
                shared.request_stop();
            })
        };
        let start = std::time::Instant::now();
        let report = pool.search(&pos, &limits, &quiet_opts());
        stopper.join().unwrap();

        assert!(report.best_move.is_ok());
        assert!(
            start.elapsed() < Duration::from_secs(8),
            "search must stop promptly"
        );
    }

    #[test]
    fn two_threads_share_the_table_and_agree_on_legality() {
        let mut pool = ThreadPool::new(8);
        let pos = Position::startpos();
        let limits = LimitsType {
            depth: 5,
            ..Default::default()
        };
        let opts = EngineOptions {
            threads: 2,
            silent: true,
            ..Default::default()
        };
        let report = pool.search(&pos, &limits, &opts);
        assert!(pos.legal_moves().contains(&report.best_move));
    }

    #[test]
    fn movetime_is_respected() {
        let mut pool = ThreadPool::new(4);
        let pos = Position::startpos();
        let limits = LimitsType {
            movetime: 100,
            ..Default::default()
        };
        let start = std::time::Instant::now();
        let report = pool.search(&pos, &limits, &quiet_opts());
        assert!(report.best_move.is_ok());
        assert!(start.elapsed() < Duration::from_millis(2500));
    }
}
