//! End-to-end search scenarios: single thread, MultiPV 1, fresh table.

use engine_core::eval::ClassicalEvaluator;
use engine_core::position::Position;
use engine_core::search::alpha_beta::SearchContext;
use engine_core::search::thread::{EngineOptions, SearchShared, ThreadPool};
use engine_core::search::time_manager::TimeManagement;
use engine_core::search::types::NodeType;
use engine_core::search::{LimitsType, SearchWorker};
use engine_core::tb::TbConfig;
use engine_core::tt::TranspositionTable;
use engine_core::types::Value;

fn quiet_opts() -> EngineOptions {
    EngineOptions {
        silent: true,
        ..Default::default()
    }
}

fn depth_limits(depth: i32) -> LimitsType {
    LimitsType {
        depth,
        ..Default::default()
    }
}

/// Harness for driving a single worker through `search` directly.
struct NodeHarness {
    tt: TranspositionTable,
    shared: SearchShared,
    limits: LimitsType,
    time: TimeManagement,
    evaluator: ClassicalEvaluator,
}

impl NodeHarness {
    fn new() -> Self {
        Self {
            tt: TranspositionTable::new(1),
            shared: SearchShared::new(1),
            limits: depth_limits(6),
            time: TimeManagement::default(),
            evaluator: ClassicalEvaluator,
        }
    }

    fn ctx(&self) -> SearchContext<'_> {
        SearchContext {
            tt: &self.tt,
            shared: &self.shared,
            evaluator: &self.evaluator,
            limits: &self.limits,
            time: &self.time,
            tb: TbConfig::default(),
            thread_id: 0,
            num_threads: 1,
            multi_pv: 1,
            contempt: 0,
            skill: Default::default(),
            show_wdl: false,
            silent: true,
        }
    }
}

#[test]
fn s1_defends_against_back_rank_mate() {
    // White threatens Ra8#; Black has to spend the move on a defense.
    let mut pool = ThreadPool::new(8);
    let pos = Position::from_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 b - - 0 1").unwrap();
    let report = pool.search(&pos, &depth_limits(4), &quiet_opts());

    assert!(report.best_move.is_ok());
    assert!(report.score.abs() < Value::MATE_IN_MAX_PLY, "sane score");

    // After the chosen defense, White must not have a mate in one.
    let mut after = pos.clone();
    after.do_move(report.best_move);
    for reply in after.legal_moves() {
        let mut probe = after.clone();
        probe.do_move(reply);
        assert!(
            !(probe.in_check() && probe.legal_moves().is_empty()),
            "{} still allows mate in one by {}",
            report.best_move.to_uci(),
            reply.to_uci()
        );
    }
}

#[test]
fn s4_aspiration_converges_across_iterations() {
    // Two consecutive searches over a warm table exercise the aspiration
    // windows seeded from the previous scores; both must converge to a
    // sensible, agreeing result.
    let mut pool = ThreadPool::new(8);
    let pos = Position::startpos();
    let first = pool.search(&pos, &depth_limits(8), &quiet_opts());
    let second = pool.search(&pos, &depth_limits(8), &quiet_opts());

    for r in [&first, &second] {
        assert!(r.best_move.is_ok());
        assert!(r.score.abs() < Value::new(300), "startpos stays balanced");
        assert_eq!(r.depth, 8);
    }
    assert!((first.score.raw() - second.score.raw()).abs() < 200);
}

#[test]
fn s4_aspiration_delta_widening_rule() {
    // The window widens by delta/4 + 5 each re-search.
    let mut delta = 17i32;
    let widened: Vec<i32> = (0..4)
        .map(|_| {
            delta += delta / 4 + 5;
            delta
        })
        .collect();
    assert_eq!(widened, vec![26, 37, 51, 68]);
}

#[test]
fn s5_pawn_endgame_loss_is_not_rescued_by_pruning() {
    // The black pawn promotes with the king shepherding it; the deep
    // search must report the loss instead of a pruned-away "safe" score.
    let mut pool = ThreadPool::new(8);
    let pos = Position::from_fen("8/8/8/7K/8/4p3/3k4/8 w - - 0 1").unwrap();
    let report = pool.search(&pos, &depth_limits(14), &quiet_opts());
    assert!(
        report.score < Value::new(-800),
        "white is lost, got {}",
        report.score.raw()
    );
}

#[test]
fn s6_cycle_detection_returns_jittered_draw() {
    // Knights shuffle back to the start position: the path contains a
    // cycle, the 50-move counter is at 4, and alpha is below the draw
    // score, so the node resolves to the +-1 draw value.
    let mut pos = Position::startpos();
    for mv in ["g1f3", "g8f6", "f3g1", "f6g8"] {
        let m = pos.find_move(mv).unwrap();
        pos.do_move(m);
    }
    assert!(pos.has_game_cycle(4));

    let h = NodeHarness::new();
    let ctx = h.ctx();
    let mut worker = SearchWorker::new(0);
    worker.prepare_search(&pos, &ctx);

    let v = worker.search::<{ NodeType::NonPV as u8 }>(
        &mut pos,
        &ctx,
        Value::new(-50),
        Value::new(-49),
        4,
        false,
        2,
    );
    assert!(v.raw().abs() <= 1, "draw value expected, got {}", v.raw());
}

#[test]
fn search_with_stop_already_set_writes_nothing() {
    let h = NodeHarness::new();
    h.shared.request_stop();
    let ctx = h.ctx();

    let mut pos = Position::startpos();
    let mut worker = SearchWorker::new(0);
    worker.prepare_search(&pos, &ctx);

    let v = worker.search::<{ NodeType::PV as u8 }>(
        &mut pos,
        &ctx,
        -Value::INFINITE,
        Value::INFINITE,
        5,
        false,
        1,
    );
    assert!(v.raw().abs() <= 1, "aborted search returns the draw value");
    assert_eq!(h.tt.hashfull(), 0, "no table writes after the abort");
    assert_eq!(pos.game_ply(), 0, "no move left made");
}

#[test]
fn finds_mate_in_one() {
    // Back-rank mate available: Ra8#.
    let mut pool = ThreadPool::new(8);
    let pos = Position::from_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1").unwrap();
    let report = pool.search(&pos, &depth_limits(4), &quiet_opts());
    assert_eq!(report.best_move.to_uci(), "a1a8");
    assert_eq!(report.score, Value::mate_in(1));
}

#[test]
fn finds_mate_in_two() {
    // Two-rook ladder: 1.Ra7 boxes the king in, 2.Rb8# ends it; depth 6
    // must report the forced mate score.
    let mut pool = ThreadPool::new(8);
    let pos = Position::from_fen("7k/8/8/8/8/8/R7/1R5K w - - 0 1").unwrap();
    let report = pool.search(&pos, &depth_limits(6), &quiet_opts());
    assert!(
        report.score >= Value::mate_in(3),
        "expected a short mate, got {}",
        report.score.raw()
    );
}

#[test]
fn multipv_reports_distinct_lines() {
    let mut pool = ThreadPool::new(8);
    let pos = Position::startpos();
    let opts = EngineOptions {
        multi_pv: 3,
        silent: true,
        ..Default::default()
    };
    let report = pool.search(&pos, &depth_limits(5), &opts);
    assert!(report.best_move.is_ok());
}

#[test]
fn node_limit_bounds_the_search() {
    let mut pool = ThreadPool::new(8);
    let pos = Position::startpos();
    let limits = LimitsType {
        nodes: 20_000,
        depth: 64,
        ..Default::default()
    };
    let report = pool.search(&pos, &limits, &quiet_opts());
    assert!(report.best_move.is_ok());
    // The poll granularity allows some overshoot, not an unbounded one.
    assert!(report.nodes < 400_000, "nodes: {}", report.nodes);
}

#[test]
fn repeated_searches_reuse_the_pool() {
    let mut pool = ThreadPool::new(8);
    let mut pos = Position::startpos();
    for _ in 0..3 {
        let report = pool.search(&pos, &depth_limits(5), &quiet_opts());
        assert!(report.best_move.is_ok());
        pos.do_move(report.best_move);
    }
    assert_eq!(pos.game_ply(), 3);
}

#[test]
fn searchmoves_restricts_the_root() {
    let mut pool = ThreadPool::new(8);
    let pos = Position::startpos();
    let m = pos.find_move("a2a3").unwrap();
    let limits = LimitsType {
        depth: 4,
        search_moves: vec![m],
        ..Default::default()
    };
    let report = pool.search(&pos, &limits, &quiet_opts());
    assert_eq!(report.best_move, m);
}

#[test]
fn hybrid_quiescence_resolves_tactics() {
    let h = NodeHarness::new();
    let ctx = h.ctx();
    // A queen is hanging; quiescence must not stand pat on it.
    let mut pos = Position::from_fen("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1").unwrap();
    let mut worker = SearchWorker::new(0);
    worker.prepare_search(&pos, &ctx);

    let v = worker.quiesce_hybrid(&mut pos, &ctx, -Value::INFINITE, Value::INFINITE, 0);
    assert!(v > Value::new(800), "Rxd5 wins the queen, got {}", v.raw());
    assert_eq!(pos.game_ply(), 0);
}

#[test]
fn skill_level_zero_still_plays_legal_moves() {
    let mut pool = ThreadPool::new(8);
    let pos = Position::startpos();
    let mut opts = quiet_opts();
    opts.skill.skill_level = 0;
    let report = pool.search(&pos, &depth_limits(5), &opts);
    assert!(pos.legal_moves().contains(&report.best_move));
}
