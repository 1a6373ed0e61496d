//! `go` command parsing.

use std::time::Instant;

use engine_core::position::Position;
use engine_core::search::LimitsType;

/// Parse the tokens after `go` against the current position (needed to
/// resolve `searchmoves`). Unknown tokens are skipped, matching the usual
/// lenient engine behavior.
pub fn parse_go(cmd: &str, pos: &Position) -> LimitsType {
    let mut limits = LimitsType {
        start_time: Instant::now(),
        ..Default::default()
    };

    let mut it = cmd.split_whitespace().skip(1).peekable();
    while let Some(tok) = it.next() {
        match tok {
            "depth" => limits.depth = next_num(&mut it).unwrap_or(0) as i32,
            "nodes" => limits.nodes = next_num(&mut it).unwrap_or(0) as u64,
            "movetime" => limits.movetime = next_num(&mut it).unwrap_or(0),
            "mate" => limits.mate = next_num(&mut it).unwrap_or(0) as i32,
            "wtime" => limits.time[0] = next_num(&mut it).unwrap_or(0),
            "btime" => limits.time[1] = next_num(&mut it).unwrap_or(0),
            "winc" => limits.inc[0] = next_num(&mut it).unwrap_or(0),
            "binc" => limits.inc[1] = next_num(&mut it).unwrap_or(0),
            "movestogo" => limits.movestogo = next_num(&mut it).unwrap_or(0) as i32,
            "infinite" => limits.infinite = true,
            "ponder" => limits.ponder = true,
            "searchmoves" => {
                while let Some(&tok) = it.peek() {
                    match pos.find_move(tok) {
                        Some(m) => {
                            limits.search_moves.push(m);
                            it.next();
                        }
                        None => break,
                    }
                }
            }
            _ => {}
        }
    }
    limits
}

fn next_num<'a, I: Iterator<Item = &'a str>>(it: &mut std::iter::Peekable<I>) -> Option<i64> {
    it.next().and_then(|v| v.parse().ok()).map(|v: i64| v.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::position::Side as Color;

    #[test]
    fn clock_parameters() {
        let pos = Position::startpos();
        let l = parse_go("go wtime 60000 btime 55000 winc 1000 binc 900 movestogo 30", &pos);
        assert_eq!(l.time_for(Color::White), 60_000);
        assert_eq!(l.time_for(Color::Black), 55_000);
        assert_eq!(l.inc_for(Color::White), 1000);
        assert_eq!(l.inc_for(Color::Black), 900);
        assert_eq!(l.movestogo, 30);
        assert!(l.use_time_management());
    }

    #[test]
    fn fixed_budgets_and_flags() {
        let pos = Position::startpos();
        let l = parse_go("go depth 12 nodes 500000 movetime 750 mate 3", &pos);
        assert_eq!(l.depth, 12);
        assert_eq!(l.nodes, 500_000);
        assert_eq!(l.movetime, 750);
        assert_eq!(l.mate, 3);
        assert!(!l.use_time_management());

        let l = parse_go("go infinite", &pos);
        assert!(l.infinite);
        let l = parse_go("go ponder wtime 1000 btime 1000", &pos);
        assert!(l.ponder);
    }

    #[test]
    fn searchmoves_resolves_against_position() {
        let pos = Position::startpos();
        let l = parse_go("go depth 3 searchmoves e2e4 d2d4 notamove", &pos);
        assert_eq!(l.search_moves.len(), 2);
        assert_eq!(l.search_moves[0].to_uci(), "e2e4");
        assert_eq!(l.search_moves[1].to_uci(), "d2d4");
    }
}
