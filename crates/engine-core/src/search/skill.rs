//! Strength handicap.
//!
//! Below level 20 the engine searches with a hidden MultiPV of at least
//! four and, once the iteration depth matches the level, picks among the
//! top moves with a weakness-weighted randomized rule.

use rand::Rng;

use crate::types::{Depth, Move, Value, PAWN_VALUE_MG};

use super::types::RootMoves;

/// Options feeding the handicap calculation.
#[derive(Clone, Copy, Debug)]
pub struct SkillOptions {
    /// 0..20; 20 and above disables the handicap.
    pub skill_level: i32,
    pub uci_limit_strength: bool,
    /// Target Elo; zero means unset.
    pub uci_elo: i32,
}

impl Default for SkillOptions {
    fn default() -> Self {
        Self {
            skill_level: 20,
            uci_limit_strength: false,
            uci_elo: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Skill {
    level: i32,
    pub best: Move,
}

impl Skill {
    /// Map the options to an integer level. A fractional Elo-derived level
    /// is rounded up or down at random so the average matches the target.
    pub fn from_options<R: Rng + ?Sized>(opts: &SkillOptions, rng: &mut R) -> Self {
        let float_level = if opts.uci_limit_strength && opts.uci_elo != 0 {
            (((opts.uci_elo - 1346) as f64 / 143.4).powf(1.0 / 0.806)).clamp(0.0, 20.0)
        } else {
            opts.skill_level as f64
        };
        let int_level = float_level as i32
            + if (float_level.fract() * 1024.0) as u32 > rng.random::<u32>() % 1024 {
                1
            } else {
                0
            };

        Self {
            level: int_level.min(20),
            best: Move::NONE,
        }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.level < 20
    }

    /// The pick happens once the iteration depth reaches the level.
    #[inline]
    pub fn time_to_pick(&self, depth: Depth) -> bool {
        depth == 1 + self.level
    }

    /// Choose among the top `multi_pv` root moves: each candidate gets a
    /// deterministic push growing with its distance from the top plus a
    /// random push, both scaled by the weakness.
    pub fn pick_best<R: Rng + ?Sized>(
        &mut self,
        root_moves: &RootMoves,
        multi_pv: usize,
        rng: &mut R,
    ) -> Move {
        let multi_pv = multi_pv.min(root_moves.len());
        if multi_pv == 0 {
            return Move::NONE;
        }

        let top_score = root_moves[0].score.raw();
        let delta = (top_score - root_moves[multi_pv - 1].score.raw()).min(PAWN_VALUE_MG);
        let weakness = 120 - 2 * self.level;
        let mut max_score = -Value::INFINITE.raw();

        for i in 0..multi_pv {
            let push = (weakness * (top_score - root_moves[i].score.raw())
                + delta * (rng.random::<u32>() % weakness as u32) as i32)
                / 128;
            if root_moves[i].score.raw() + push >= max_score {
                max_score = root_moves[i].score.raw() + push;
                self.best = root_moves[i].first();
            }
        }

        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;
    use crate::search::types::RootMove;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn root_moves_with_scores(scores: &[i32]) -> RootMoves {
        let legal = Position::startpos().legal_moves();
        RootMoves(
            scores
                .iter()
                .zip(legal)
                .map(|(&s, m)| {
                    let mut rm = RootMove::new(m);
                    rm.score = Value::new(s);
                    rm
                })
                .collect(),
        )
    }

    #[test]
    fn full_strength_is_disabled() {
        let mut rng = StdRng::seed_from_u64(1);
        let s = Skill::from_options(&SkillOptions::default(), &mut rng);
        assert!(!s.enabled());
    }

    #[test]
    fn low_elo_maps_to_low_level() {
        let mut rng = StdRng::seed_from_u64(1);
        let s = Skill::from_options(
            &SkillOptions {
                skill_level: 20,
                uci_limit_strength: true,
                uci_elo: 1350,
            },
            &mut rng,
        );
        assert!(s.enabled());
        assert!(s.time_to_pick(1 + 0) || s.time_to_pick(1 + 1));
    }

    #[test]
    fn level_zero_strays_from_the_top_move_sometimes() {
        let rms = root_moves_with_scores(&[300, 280, 260, 240]);
        let mut strayed = false;
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut skill = Skill {
                level: 0,
                best: Move::NONE,
            };
            let pick = skill.pick_best(&rms, 4, &mut rng);
            assert!(rms.contains(pick));
            if pick != rms[0].first() {
                strayed = true;
            }
        }
        assert!(strayed);
    }

    #[test]
    fn high_level_with_clear_best_keeps_it() {
        let rms = root_moves_with_scores(&[900, -200, -300, -400]);
        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut skill = Skill {
                level: 19,
                best: Move::NONE,
            };
            assert_eq!(skill.pick_best(&rms, 4, &mut rng), rms[0].first());
        }
    }
}
