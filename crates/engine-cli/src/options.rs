//! UCI option registry.

use anyhow::{bail, Result};
use engine_core::search::thread::{AnalysisContempt, EngineOptions};

/// All registered options with their current values. `Hash` is kept apart
/// because it resizes the shared table rather than feeding the search.
#[derive(Clone, Debug)]
pub struct UciOptions {
    pub hash_mb: usize,
    pub engine: EngineOptions,
}

impl Default for UciOptions {
    fn default() -> Self {
        Self {
            hash_mb: 16,
            engine: EngineOptions::default(),
        }
    }
}

impl UciOptions {
    /// The `option name ... type ...` block answered to `uci`.
    pub fn describe() -> String {
        [
            "option name Hash type spin default 16 min 1 max 1048576",
            "option name Threads type spin default 1 min 1 max 512",
            "option name MultiPV type spin default 1 min 1 max 500",
            "option name Contempt type spin default 24 min -100 max 100",
            "option name Analysis Contempt type combo default Both var Off var White var Black var Both",
            "option name UCI_AnalyseMode type check default false",
            "option name UCI_LimitStrength type check default false",
            "option name UCI_Elo type spin default 1350 min 1350 max 2850",
            "option name Skill Level type spin default 20 min 0 max 20",
            "option name Move Overhead type spin default 10 min 0 max 5000",
            "option name Slow Mover type spin default 100 min 10 max 1000",
            "option name Minimum Thinking Time type spin default 20 min 0 max 5000",
            "option name Ponder type check default false",
            "option name UCI_ShowWDL type check default false",
            "option name SyzygyPath type string default <empty>",
            "option name SyzygyProbeLimit type spin default 7 min 0 max 7",
            "option name SyzygyProbeDepth type spin default 1 min 1 max 100",
            "option name Syzygy50MoveRule type check default true",
        ]
        .join("\n")
    }

    /// Apply one `setoption name <id> [value <x>]` command.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let eng = &mut self.engine;
        match name.to_ascii_lowercase().as_str() {
            "hash" => self.hash_mb = parse_clamped(value, 1, 1_048_576)? as usize,
            "threads" => eng.threads = parse_clamped(value, 1, 512)? as usize,
            "multipv" => eng.multi_pv = parse_clamped(value, 1, 500)? as usize,
            "contempt" => eng.contempt_cp = parse_clamped(value, -100, 100)? as i32,
            "analysis contempt" => {
                eng.analysis_contempt = match value.to_ascii_lowercase().as_str() {
                    "off" => AnalysisContempt::Off,
                    "white" => AnalysisContempt::White,
                    "black" => AnalysisContempt::Black,
                    "both" => AnalysisContempt::Both,
                    other => bail!("unknown Analysis Contempt value '{other}'"),
                }
            }
            "uci_analysemode" => eng.analyse_mode = parse_bool(value)?,
            "uci_limitstrength" => eng.skill.uci_limit_strength = parse_bool(value)?,
            "uci_elo" => eng.skill.uci_elo = parse_clamped(value, 1350, 2850)? as i32,
            "skill level" => eng.skill.skill_level = parse_clamped(value, 0, 20)? as i32,
            "move overhead" => eng.move_overhead = parse_clamped(value, 0, 5000)?,
            "slow mover" => eng.slow_mover = parse_clamped(value, 10, 1000)?,
            "minimum thinking time" => eng.minimum_thinking_time = parse_clamped(value, 0, 5000)?,
            "ponder" => eng.ponder = parse_bool(value)?,
            "uci_showwdl" => eng.show_wdl = parse_bool(value)?,
            // Accepted for GUI compatibility; no table backend is compiled
            // in, so the path cannot be mounted.
            "syzygypath" => {
                if !value.is_empty() && value != "<empty>" {
                    log::warn!("SyzygyPath set but no tablebase backend is available");
                }
            }
            "syzygyprobelimit" => eng.syzygy_probe_limit = parse_clamped(value, 0, 7)? as u32,
            "syzygyprobedepth" => eng.syzygy_probe_depth = parse_clamped(value, 1, 100)? as i32,
            "syzygy50moverule" => eng.syzygy_50_move_rule = parse_bool(value)?,
            other => bail!("unknown option '{other}'"),
        }
        Ok(())
    }
}

fn parse_clamped(value: &str, min: i64, max: i64) -> Result<i64> {
    let v: i64 = value.trim().parse()?;
    Ok(v.clamp(min, max))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clamp_spins() {
        let mut o = UciOptions::default();
        o.set("Threads", "4").unwrap();
        assert_eq!(o.engine.threads, 4);
        o.set("Threads", "100000").unwrap();
        assert_eq!(o.engine.threads, 512);
        o.set("Hash", "0").unwrap();
        assert_eq!(o.hash_mb, 1);
    }

    #[test]
    fn combo_and_check_options() {
        let mut o = UciOptions::default();
        o.set("Analysis Contempt", "White").unwrap();
        assert_eq!(o.engine.analysis_contempt, AnalysisContempt::White);
        o.set("UCI_ShowWDL", "true").unwrap();
        assert!(o.engine.show_wdl);
        assert!(o.set("Analysis Contempt", "sideways").is_err());
        assert!(o.set("NoSuchOption", "1").is_err());
    }

    #[test]
    fn skill_options_flow_through() {
        let mut o = UciOptions::default();
        o.set("Skill Level", "5").unwrap();
        o.set("UCI_LimitStrength", "true").unwrap();
        o.set("UCI_Elo", "1500").unwrap();
        assert_eq!(o.engine.skill.skill_level, 5);
        assert!(o.engine.skill.uci_limit_strength);
        assert_eq!(o.engine.skill.uci_elo, 1500);
    }
}
