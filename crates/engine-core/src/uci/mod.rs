//! UCI output formatting: score strings, `info` lines, `currmove` chatter.
//!
//! Everything here writes straight to stdout; diagnostics go through `log`
//! so the protocol stream stays machine-readable.

use crate::position::Position;
use crate::search::alpha_beta::{SearchContext, SearchWorker};
use crate::types::{Depth, Move, Value, PAWN_VALUE_EG};

/// `cp <v>` in centipawns, or `mate <n>` in full moves (negative when
/// getting mated).
pub fn format_value(v: Value) -> String {
    if v.abs() >= Value::MATE_IN_MAX_PLY {
        let n = if v > Value::ZERO {
            (Value::MATE.raw() - v.raw() + 1) / 2
        } else {
            -(Value::MATE.raw() + v.raw()) / 2
        };
        format!("mate {n}")
    } else {
        format!("cp {}", v.raw() * 100 / PAWN_VALUE_EG)
    }
}

/// Win probability in permille for the side to move, by a logistic model of
/// the score with a game-phase dependent slope.
fn win_rate_model(v: Value, ply: i32) -> i32 {
    let m = ply.min(240) as f64 / 64.0;
    const AS: [f64; 4] = [-8.244_042_95, 64.238_923_42, -95.730_564_62, 153.864_786_79];
    const BS: [f64; 4] = [-3.403_749_42, 28.078_916_02, -39.642_804_62, 87.435_497_63];
    let a = ((AS[0] * m + AS[1]) * m + AS[2]) * m + AS[3];
    let b = ((BS[0] * m + BS[1]) * m + BS[2]) * m + BS[3];
    let x = (v.raw() as f64 * 100.0 / PAWN_VALUE_EG as f64).clamp(-1000.0, 1000.0);
    (0.5 + 1000.0 / (1.0 + ((a - x) / b).exp())) as i32
}

/// ` wdl <w> <d> <l>` for `UCI_ShowWDL`.
pub fn format_wdl(v: Value, game_ply: i32) -> String {
    let w = win_rate_model(v, game_ply);
    let l = win_rate_model(-v, game_ply);
    let d = 1000 - w - l;
    format!(" wdl {w} {d} {l}")
}

/// The periodic `info ... pv ...` block, one line per MultiPV slot.
pub fn print_pv(
    worker: &SearchWorker,
    ctx: &SearchContext,
    pos: &Position,
    depth: Depth,
    alpha: Value,
    beta: Value,
    multi_pv: usize,
) {
    let elapsed = ctx.time.elapsed().max(1);
    let nodes = ctx.shared.nodes_searched();
    let tb_hits = ctx.shared.tb_hits()
        + if worker.state.root_in_tb {
            worker.state.root_moves.len() as u64
        } else {
            0
        };
    let multi_pv = multi_pv.min(worker.state.root_moves.len());

    let mut out = String::new();
    for i in 0..multi_pv {
        let rm = &worker.state.root_moves[i];
        let updated = rm.score != -Value::INFINITE;

        if depth == 1 && !updated && i > 0 {
            continue;
        }

        let d = if updated { depth } else { (depth - 1).max(1) };
        let mut v = if updated { rm.score } else { rm.previous_score };
        if v == -Value::INFINITE {
            v = Value::ZERO;
        }

        let tb = worker.state.root_in_tb && v.abs() < Value::MATE_IN_MAX_PLY;
        if tb {
            v = rm.tb_score;
        }

        if !out.is_empty() {
            out.push('\n');
        }

        out.push_str(&format!(
            "info depth {} seldepth {} multipv {} score {}",
            d,
            rm.sel_depth,
            i + 1,
            format_value(v)
        ));

        if ctx.show_wdl {
            out.push_str(&format_wdl(v, pos.game_ply()));
        }

        if !tb && i == worker.state.pv_idx {
            if v >= beta {
                out.push_str(" lowerbound");
            } else if v <= alpha {
                out.push_str(" upperbound");
            }
        }

        out.push_str(&format!(" nodes {} nps {}", nodes, nodes * 1000 / elapsed as u64));

        if elapsed > 1000 {
            out.push_str(&format!(" hashfull {}", ctx.tt.hashfull()));
        }

        out.push_str(&format!(" tbhits {} time {} pv", tb_hits, elapsed));
        for m in &rm.pv {
            out.push(' ');
            out.push_str(&m.to_uci());
        }
    }

    if !out.is_empty() {
        println!("{out}");
    }
}

/// Progress chatter after the first few seconds of a long search.
pub fn print_currmove(depth: Depth, m: Move, number: i32) {
    println!("info depth {depth} currmove {} currmovenumber {number}", m.to_uci());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centipawn_and_mate_formatting() {
        assert_eq!(format_value(Value::ZERO), "cp 0");
        assert_eq!(format_value(Value::new(PAWN_VALUE_EG)), "cp 100");
        assert_eq!(format_value(Value::mate_in(1)), "mate 1");
        assert_eq!(format_value(Value::mate_in(2)), "mate 1");
        assert_eq!(format_value(Value::mate_in(3)), "mate 2");
        assert_eq!(format_value(Value::mated_in(0)), "mate 0");
        assert_eq!(format_value(Value::mated_in(2)), "mate -1");
    }

    #[test]
    fn wdl_components_sum_to_one_thousand() {
        for &(v, ply) in &[(0, 0), (120, 30), (-350, 90), (900, 160)] {
            let s = format_wdl(Value::new(v), ply);
            let parts: Vec<i32> = s
                .trim()
                .trim_start_matches("wdl ")
                .split(' ')
                .map(|t| t.parse().unwrap())
                .collect();
            assert_eq!(parts.len(), 3);
            assert_eq!(parts.iter().sum::<i32>(), 1000);
            assert!(parts.iter().all(|&p| (0..=1000).contains(&p)));
        }
    }

    #[test]
    fn balanced_position_is_mostly_draw_late() {
        let s = format_wdl(Value::ZERO, 200);
        let parts: Vec<i32> = s
            .trim()
            .trim_start_matches("wdl ")
            .split(' ')
            .map(|t| t.parse().unwrap())
            .collect();
        assert!(parts[1] > parts[0]);
        assert!(parts[1] > parts[2]);
    }
}
