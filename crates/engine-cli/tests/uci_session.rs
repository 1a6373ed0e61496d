//! Full-binary UCI sessions.

use assert_cmd::Command;
use predicates::str::contains;

fn engine() -> Command {
    Command::cargo_bin("rchess").expect("binary builds")
}

#[test]
fn handshake_reports_identity_and_options() {
    engine()
        .write_stdin("uci\nquit\n")
        .assert()
        .success()
        .stdout(contains("id name rchess"))
        .stdout(contains("option name Hash type spin"))
        .stdout(contains("option name MultiPV type spin"))
        .stdout(contains("uciok"));
}

#[test]
fn isready_between_commands() {
    engine()
        .write_stdin("uci\nisready\nucinewgame\nisready\nquit\n")
        .assert()
        .success()
        .stdout(contains("readyok"));
}

#[test]
fn depth_limited_go_emits_info_and_bestmove() {
    engine()
        .write_stdin("uci\nposition startpos moves e2e4 e7e5\ngo depth 5\nquit\n")
        .assert()
        .success()
        .stdout(contains("info depth"))
        .stdout(contains(" pv "))
        .stdout(contains("bestmove "));
}

#[test]
fn stalemate_position_answers_bestmove_0000() {
    engine()
        .write_stdin("position fen 7k/5Q2/6K1/8/8/8/8/8 b - - 0 1\ngo depth 3\nquit\n")
        .assert()
        .success()
        .stdout(contains("info depth 0 score cp 0"))
        .stdout(contains("bestmove 0000"));
}

#[test]
fn mated_position_answers_mate_score() {
    engine()
        .write_stdin(
            "position fen rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3\n\
             go depth 2\nquit\n",
        )
        .assert()
        .success()
        .stdout(contains("info depth 0 score mate 0"))
        .stdout(contains("bestmove 0000"));
}

#[test]
fn stop_interrupts_an_infinite_search() {
    engine()
        .timeout(std::time::Duration::from_secs(20))
        .write_stdin("uci\nposition startpos\ngo infinite\nstop\nquit\n")
        .assert()
        .success()
        .stdout(contains("bestmove "));
}

#[test]
fn perft_counts_match_the_reference() {
    engine()
        .write_stdin("position startpos\ngo perft 3\nquit\n")
        .assert()
        .success()
        .stdout(contains("Nodes searched: 8902"));
}

#[test]
fn perft_kiwipete_shallow() {
    engine()
        .write_stdin(
            "position fen r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1\n\
             go perft 2\nquit\n",
        )
        .assert()
        .success()
        .stdout(contains("Nodes searched: 2039"));
}

#[test]
fn setoption_then_search_with_multipv() {
    engine()
        .write_stdin(
            "uci\nsetoption name MultiPV value 2\nposition startpos\ngo depth 4\nquit\n",
        )
        .assert()
        .success()
        .stdout(contains("multipv 2"))
        .stdout(contains("bestmove "));
}
