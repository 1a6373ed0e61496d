//! UCI driver: reads commands from stdin, owns the thread pool, and keeps
//! the protocol stream on stdout clean of diagnostics.

pub mod go;
pub mod options;

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};
use log::{info, warn};

use engine_core::position::Position;
use engine_core::search::thread::SearchShared;
use engine_core::search::ThreadPool;

use options::UciOptions;

pub const ENGINE_NAME: &str = "rchess";
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct EngineState {
    pool: Arc<Mutex<ThreadPool>>,
    options: UciOptions,
    position: Position,
    /// Control handle of the running (or last) search.
    active: Option<Arc<SearchShared>>,
    search_thread: Option<JoinHandle<()>>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    pub fn new() -> Self {
        let options = UciOptions::default();
        Self {
            pool: Arc::new(Mutex::new(ThreadPool::new(options.hash_mb))),
            options,
            position: Position::startpos(),
            active: None,
            search_thread: None,
        }
    }

    fn join_search(&mut self) {
        if let Some(handle) = self.search_thread.take() {
            let _ = handle.join();
        }
    }

    fn searching(&self) -> bool {
        self.search_thread
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

/// Run the command loop until `quit` or EOF.
pub fn run() -> Result<()> {
    let stdin = io::stdin();
    let mut state = EngineState::new();

    for line in stdin.lock().lines() {
        let line = line?;
        if !dispatch(&mut state, line.trim()) {
            break;
        }
        io::stdout().flush()?;
    }

    // Make sure a running search winds down before the process exits.
    if let Some(shared) = &state.active {
        shared.request_stop();
    }
    state.join_search();
    Ok(())
}

/// Handle one command; returns false on `quit`.
pub fn dispatch(state: &mut EngineState, line: &str) -> bool {
    let cmd = line.split_whitespace().next().unwrap_or("");
    let result = match cmd {
        "" => Ok(()),
        "uci" => {
            println!("id name {ENGINE_NAME} {ENGINE_VERSION}");
            println!("id author the {ENGINE_NAME} developers");
            println!("{}", UciOptions::describe());
            println!("uciok");
            Ok(())
        }
        "isready" => {
            println!("readyok");
            Ok(())
        }
        "setoption" => handle_setoption(state, line),
        "ucinewgame" => {
            state.join_search();
            match state.pool.try_lock() {
                Ok(mut pool) => {
                    pool.clear();
                    Ok(())
                }
                Err(_) => Err(anyhow!("ucinewgame ignored: search still running")),
            }
        }
        "position" => handle_position(state, line),
        "go" => handle_go(state, line),
        "stop" => {
            if let Some(shared) = &state.active {
                shared.request_stop();
            }
            Ok(())
        }
        "ponderhit" => {
            if let Some(shared) = &state.active {
                shared.ponderhit();
            }
            Ok(())
        }
        "quit" => return false,
        other => {
            warn!("unknown command '{other}'");
            Ok(())
        }
    };

    if let Err(e) = result {
        println!("info string error: {e}");
    }
    true
}

fn handle_setoption(state: &mut EngineState, line: &str) -> Result<()> {
    // setoption name <space separated id> [value <rest>]
    let rest = line
        .strip_prefix("setoption")
        .map(str::trim)
        .unwrap_or_default();
    let rest = rest
        .strip_prefix("name")
        .map(str::trim)
        .ok_or_else(|| anyhow!("setoption without a name"))?;

    let (name, value) = match rest.split_once(" value ") {
        Some((n, v)) => (n.trim(), v.trim()),
        None => (rest, ""),
    };

    if state.searching() {
        return Err(anyhow!("setoption ignored during search"));
    }

    let old_hash = state.options.hash_mb;
    state.options.set(name, value)?;

    if state.options.hash_mb != old_hash {
        if let Ok(mut pool) = state.pool.try_lock() {
            pool.set_hash(state.options.hash_mb);
        }
    }
    info!("option '{name}' set to '{value}'");
    Ok(())
}

fn handle_position(state: &mut EngineState, line: &str) -> Result<()> {
    let mut tokens = line.split_whitespace().skip(1).peekable();
    let mut pos = match tokens.peek().copied() {
        Some("startpos") => {
            tokens.next();
            Position::startpos()
        }
        Some("fen") => {
            tokens.next();
            let mut fen_parts = Vec::new();
            while let Some(&tok) = tokens.peek() {
                if tok == "moves" {
                    break;
                }
                fen_parts.push(tokens.next().unwrap());
            }
            Position::from_fen(&fen_parts.join(" ")).map_err(|e| anyhow!(e))?
        }
        _ => Position::startpos(),
    };

    if tokens.peek() == Some(&"moves") {
        tokens.next();
        for mv in tokens {
            let m = pos
                .find_move(mv)
                .ok_or_else(|| anyhow!("illegal move '{mv}' in position command"))?;
            pos.do_move(m);
        }
    }

    state.position = pos;
    Ok(())
}

fn handle_go(state: &mut EngineState, line: &str) -> Result<()> {
    if state.searching() {
        info!("ignoring go while searching");
        return Ok(());
    }
    state.join_search();

    // `go perft N` is a movegen check, not a search.
    let mut it = line.split_whitespace().skip(1);
    if it.next() == Some("perft") {
        let depth: u32 = it
            .next()
            .and_then(|d| d.parse().ok())
            .ok_or_else(|| anyhow!("go perft needs a depth"))?;
        let nodes = state.position.perft(depth);
        println!("info string perft {depth} nodes {nodes}");
        println!("Nodes searched: {nodes}");
        return Ok(());
    }

    let limits = go::parse_go(line, &state.position);
    let opts = state.options.engine.clone();

    // Grab the control handle before the search thread takes the pool, so
    // `stop` and `ponderhit` never have to wait on the lock.
    let shared = {
        let mut pool = state
            .pool
            .try_lock()
            .map_err(|_| anyhow!("pool is busy"))?;
        pool.set_threads(opts.threads)
    };
    state.active = Some(shared);

    let pool = Arc::clone(&state.pool);
    let position = state.position.clone();
    let handle = std::thread::Builder::new()
        .name("search-master".to_string())
        .stack_size(8 * 1024 * 1024)
        .spawn(move || {
            let mut pool = pool.lock().expect("pool lock");
            pool.search(&position, &limits, &opts);
        })?;
    state.search_thread = Some(handle);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_command_builds_the_expected_position() {
        let mut state = EngineState::new();
        assert!(dispatch(
            &mut state,
            "position startpos moves e2e4 e7e5 g1f3"
        ));
        assert_eq!(state.position.game_ply(), 3);

        assert!(dispatch(
            &mut state,
            "position fen 8/8/8/4k3/8/4K3/8/8 w - - 12 40"
        ));
        assert_eq!(state.position.rule50_count(), 12);
    }

    #[test]
    fn illegal_position_moves_are_reported_not_fatal() {
        let mut state = EngineState::new();
        // The dispatcher reports the error on the info channel and keeps
        // the previous position.
        assert!(dispatch(&mut state, "position startpos moves e2e5"));
        assert_eq!(state.position.game_ply(), 0);
    }

    #[test]
    fn quit_terminates_the_loop() {
        let mut state = EngineState::new();
        assert!(!dispatch(&mut state, "quit"));
    }

    #[test]
    fn setoption_updates_the_registry() {
        let mut state = EngineState::new();
        assert!(dispatch(&mut state, "setoption name MultiPV value 3"));
        assert_eq!(state.options.engine.multi_pv, 3);
        assert!(dispatch(&mut state, "setoption name Analysis Contempt value Off"));
    }
}
