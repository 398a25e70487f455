//! Per-move rollout statistics and the pruning rule.

use std::collections::BTreeMap;

use hanabi_core::config::Config;
use hanabi_core::model::Move;

/// Welford-accumulated score statistics for one candidate move.
#[derive(Debug, Clone, Default)]
pub struct UcbStats {
    pub pruned: bool,
    pub mean: f64,
    pub m2: f64,
    pub n: usize,
    /// Added to the mean whenever this move is compared against others; the
    /// blueprint move carries the search threshold here.
    pub bias: f64,
}

impl UcbStats {
    pub const MIN_SAMPLES: usize = 100;
    pub const BASELINE_MIN_SAMPLES: usize = 35;
    pub const STDS: f64 = 2.0;
    /// Sentinel deviation for under-sampled moves, effectively infinity.
    const UNSAMPLED_STD: f64 = 1_000_000.0;

    pub fn add(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn std(&self) -> f64 {
        if self.n < Self::MIN_SAMPLES {
            Self::UNSAMPLED_STD
        } else {
            (self.m2 / (self.n - 1) as f64).sqrt()
        }
    }

    pub fn stderr(&self) -> f64 {
        self.std() / (self.n as f64).sqrt()
    }

    /// Baseline mode converges faster, so its sample floor is lower.
    pub fn baseline_stderr(&self) -> f64 {
        if self.n < Self::BASELINE_MIN_SAMPLES {
            Self::UNSAMPLED_STD
        } else {
            (self.m2 / (self.n - 1) as f64).sqrt() / (self.n as f64).sqrt()
        }
    }

    pub fn lcb(&self) -> f64 {
        self.mean - Self::STDS * self.stderr() + self.bias
    }

    pub fn ucb(&self) -> f64 {
        self.mean + Self::STDS * self.stderr() + self.bias
    }
}

pub type SearchStats = BTreeMap<Move, UcbStats>;

/// Whether `mv` can be eliminated from the search. In baseline mode a move
/// dies when the best mean leads it by 2.5 combined standard errors; in
/// plain UCB mode, when its upper bound falls below the best lower bound.
/// The blueprint move never prunes itself unless baseline mode is on.
pub fn can_prune_move(stats: &SearchStats, mv: Move, bp_move: Move, config: &Config) -> bool {
    if config.search_baseline && mv == bp_move {
        return false;
    }
    if !config.ucb {
        return false;
    }

    let this = &stats[&mv];
    if config.search_baseline {
        let mut best: Option<(f64, f64)> = None; // (mean + bias, stderr)
        for entry in stats.values() {
            let mean = entry.mean + entry.bias;
            if entry.pruned {
                continue;
            }
            if best.map_or(true, |(best_mean, _)| mean > best_mean) {
                best = Some((mean, entry.baseline_stderr()));
            }
        }
        let Some((best_mean, best_stderr)) = best else {
            return false;
        };
        let this_stderr = this.baseline_stderr();
        let diff = best_mean - (this.mean + this.bias);
        let combined = (this_stderr * this_stderr + best_stderr * best_stderr).sqrt();
        diff - 2.5 * combined > 0.0
    } else {
        let mut best_lcb: Option<f64> = None;
        for entry in stats.values() {
            let lcb = entry.lcb();
            if best_lcb.map_or(true, |best| lcb > best) {
                best_lcb = Some(lcb);
            }
        }
        let Some(best_lcb) = best_lcb else {
            return false;
        };
        this.ucb() < best_lcb
    }
}

/// Record one rollout outcome: raw score, win indicator, or the paired
/// blueprint-baselined difference.
pub fn accumulate_score(
    score: Option<i64>,
    bp_score: Option<i64>,
    mv: Move,
    stats: &mut SearchStats,
    win_stats: Option<&mut SearchStats>,
    config: &Config,
) {
    let Some(score) = score else {
        return; // pruned lane, nothing sampled
    };
    debug_assert!(score >= 0);

    let mut adjusted = score as f64;
    if config.search_baseline {
        let bp = bp_score.expect("baseline mode pairs every lane with a blueprint score");
        adjusted = (score - bp) as f64;
    }

    let sample = if config.optimize_wins {
        if score as usize == hanabi_core::MAX_SCORE {
            1.0
        } else {
            0.0
        }
    } else {
        adjusted
    };
    stats.entry(mv).or_default().add(sample);

    if let Some(win_stats) = win_stats {
        win_stats.entry(mv).or_default().add(
            if score as usize == hanabi_core::MAX_SCORE {
                1.0
            } else {
                0.0
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hanabi_core::config::Config;

    fn mv(index: usize) -> Move {
        Move::Play(index)
    }

    #[test]
    fn welford_matches_direct_mean_and_variance() {
        let mut stats = UcbStats::default();
        let samples = [3.0, 7.0, 7.0, 19.0];
        for &sample in &samples {
            stats.add(sample);
        }
        assert_eq!(stats.n, 4);
        assert!((stats.mean - 9.0).abs() < 1e-12);
        // sample variance: ((-6)^2 + (-2)^2 + (-2)^2 + 10^2) / 3 = 48
        assert!((stats.m2 / 3.0 - 48.0).abs() < 1e-9);
    }

    #[test]
    fn under_sampled_moves_are_never_pruned() {
        let config = Config {
            ucb: true,
            ..Config::default()
        };
        let mut stats = SearchStats::new();
        let mut strong = UcbStats::default();
        let mut weak = UcbStats::default();
        for _ in 0..UcbStats::MIN_SAMPLES - 1 {
            strong.add(20.0);
            weak.add(5.0);
        }
        stats.insert(mv(0), strong);
        stats.insert(mv(1), weak);
        // stderr is effectively infinite below the sample floor
        assert!(!can_prune_move(&stats, mv(1), mv(0), &config));
    }

    #[test]
    fn dominated_move_is_pruned_once_sampled() {
        let config = Config {
            ucb: true,
            ..Config::default()
        };
        let mut stats = SearchStats::new();
        let mut strong = UcbStats::default();
        let mut weak = UcbStats::default();
        for i in 0..200 {
            strong.add(20.0 + f64::from(i % 2));
            weak.add(5.0 + f64::from(i % 2));
        }
        stats.insert(mv(0), strong);
        stats.insert(mv(1), weak);
        assert!(can_prune_move(&stats, mv(1), mv(0), &config));
        assert!(!can_prune_move(&stats, mv(0), mv(0), &config));
    }

    #[test]
    fn baseline_mode_never_prunes_the_blueprint() {
        let config = Config {
            ucb: true,
            search_baseline: true,
            ..Config::default()
        };
        let mut stats = SearchStats::new();
        let mut bp = UcbStats::default();
        let mut rival = UcbStats::default();
        for i in 0..100 {
            bp.add(-5.0 + f64::from(i % 2)); // baseline-adjusted scores
            rival.add(5.0 + f64::from(i % 2));
        }
        stats.insert(mv(0), bp);
        stats.insert(mv(1), rival);
        assert!(!can_prune_move(&stats, mv(0), mv(0), &config));
    }

    #[test]
    fn optimize_wins_counts_perfect_games() {
        let config = Config {
            optimize_wins: true,
            ..Config::default()
        };
        let mut stats = SearchStats::new();
        accumulate_score(Some(25), None, mv(0), &mut stats, None, &config);
        accumulate_score(Some(24), None, mv(0), &mut stats, None, &config);
        accumulate_score(None, None, mv(0), &mut stats, None, &config);
        let entry = &stats[&mv(0)];
        assert_eq!(entry.n, 2);
        assert!((entry.mean - 0.5).abs() < 1e-12);
    }
}
