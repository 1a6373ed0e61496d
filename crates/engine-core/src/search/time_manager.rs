//! Wall-clock budgeting.
//!
//! Converts the clock situation of a `go` command into an optimum and a
//! maximum thinking time. The iterative-deepening driver rescales the
//! optimum each iteration (falling eval, best-move stability); the hard
//! `maximum()` bound is enforced by the main thread's periodic clock check.

use std::time::Instant;

use chess::Color;

use super::limits::LimitsType;

/// Tunable inputs mirroring the corresponding UCI options.
#[derive(Clone, Copy, Debug)]
pub struct TimeOptions {
    pub move_overhead: i64,
    pub slow_mover: i64,
    pub minimum_thinking_time: i64,
    pub ponder: bool,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            move_overhead: 10,
            slow_mover: 100,
            minimum_thinking_time: 20,
            ponder: false,
        }
    }
}

/// Per-search time state, armed once at the start of each `go`.
#[derive(Clone, Debug)]
pub struct TimeManagement {
    start_time: Instant,
    optimum_time: i64,
    maximum_time: i64,
    use_time: bool,
}

impl Default for TimeManagement {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            optimum_time: 0,
            maximum_time: 0,
            use_time: false,
        }
    }
}

impl TimeManagement {
    /// Compute the budgets with a move-horizon model: assume the game lasts
    /// about fifty more moves (or `movestogo`), reserve overhead per move,
    /// and scale the slice by game progress.
    pub fn init(limits: &LimitsType, us: Color, game_ply: i32, opts: &TimeOptions) -> Self {
        let mut tm = TimeManagement {
            start_time: limits.start_time,
            optimum_time: 0,
            maximum_time: 0,
            use_time: limits.use_time_management(),
        };
        if !tm.use_time {
            return tm;
        }

        let my_time = limits.time_for(us).max(0);
        let my_inc = limits.inc_for(us).max(0);
        let mtg = if limits.movestogo > 0 {
            limits.movestogo.min(50) as i64
        } else {
            50
        };
        let ply = game_ply as f64;

        let time_left = (my_time + my_inc * (mtg - 1) - opts.move_overhead * (2 + mtg)).max(1);
        let time_left = opts.slow_mover * time_left / 100;

        let (opt_scale, max_scale) = if limits.movestogo == 0 {
            let opt = (0.0084 + (ply + 3.0).sqrt() * 0.0042)
                .min(0.2 * my_time as f64 / time_left as f64);
            let max = 7.0f64.min(4.0 + ply / 12.0);
            (opt, max)
        } else {
            let opt = ((0.8 + ply / 128.0) / mtg as f64)
                .min(0.8 * my_time as f64 / time_left as f64);
            let max = 6.3f64.min(1.5 + 0.11 * mtg as f64);
            (opt, max)
        };

        tm.optimum_time =
            ((opt_scale * time_left as f64) as i64).max(opts.minimum_thinking_time);
        tm.maximum_time = ((max_scale * tm.optimum_time as f64) as i64)
            .min(my_time * 8 / 10 - opts.move_overhead)
            .max(opts.minimum_thinking_time);

        if opts.ponder {
            tm.optimum_time += tm.optimum_time / 4;
        }
        tm.optimum_time = tm.optimum_time.min(tm.maximum_time);
        tm
    }

    #[inline]
    pub fn optimum(&self) -> i64 {
        self.optimum_time
    }

    #[inline]
    pub fn maximum(&self) -> i64 {
        self.maximum_time
    }

    /// Milliseconds since the search was started.
    #[inline]
    pub fn elapsed(&self) -> i64 {
        self.start_time.elapsed().as_millis() as i64
    }

    #[inline]
    pub fn use_time_management(&self) -> bool {
        self.use_time
    }
}
