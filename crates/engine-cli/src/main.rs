//! `rchess` entry point: logging setup, then the UCI loop.

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "rchess", version, about = "UCI chess engine")]
struct Args {
    /// Increase log verbosity (-v: info, -vv: debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Diagnostics go to stderr; stdout is reserved for the UCI stream.
    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::init_from_env(env_logger::Env::default().filter_or("RCHESS_LOG", level));

    engine_cli::run()
}
