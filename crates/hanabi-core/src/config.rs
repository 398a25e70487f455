//! Engine configuration, read once from the environment.
//!
//! Every knob has the documented default, so `Config::default()` is the
//! reference configuration and tests can build variants explicitly.

use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    /// If true, the score is 0 when all mulligans are lost (official rules).
    pub bomb0: bool,
    /// Points subtracted from the score when bombed and `bomb0` is off.
    pub bombd: usize,
    /// OS worker threads in the shared pool.
    pub fiber_threads: usize,
    /// Logical task lanes multiplexed onto the pool.
    pub num_threads: usize,
    /// Overrides the standard hand size when set (must be >= 3).
    pub hand_size_override: Option<usize>,

    /// Margin by which a rival move must beat the blueprint.
    pub search_thresh: f64,
    /// Total rollouts per search pass.
    pub search_n: usize,
    /// Which player searches; negative counts from the end.
    pub search_player: i64,
    /// If true, every player searches independently (unsound but supported).
    pub search_all: bool,
    /// If true, run a second unbiased search to measure the score delta.
    pub double_search: bool,
    /// Enable UCB pruning of candidate moves.
    pub ucb: bool,
    /// Pair every candidate rollout with a blueprint rollout (control variate).
    pub search_baseline: bool,
    /// Optimize P(score == 25) instead of expected score.
    pub optimize_wins: bool,

    /// Multiplicative uncertainty for action-based belief pruning (0 = hard).
    pub partner_uniform_unc: f64,
    /// Mix the partner's reported action probability with this uniform floor.
    pub partner_boltzmann_unc: f64,
    /// Only apply delayed observations below this distribution size.
    pub delayed_obs_thresh: usize,

    /// Max hand-distribution size at which joint search retires a frame.
    pub range_max: usize,
    /// Shared seed for coordinated partner counterfactual search.
    pub joint_search_seed: u64,
    /// Cache per-frame range-pruning results.
    pub memoize_range_search: bool,

    /// Name of the blueprint bot.
    pub bp_bot: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bomb0: false,
            bombd: 1,
            fiber_threads: 10,
            num_threads: 1000,
            hand_size_override: None,
            search_thresh: 0.1,
            search_n: 10_000,
            search_player: -1,
            search_all: false,
            double_search: false,
            ucb: true,
            search_baseline: false,
            optimize_wins: false,
            partner_uniform_unc: 0.0,
            partner_boltzmann_unc: 0.0,
            delayed_obs_thresh: 100_000,
            range_max: 2000,
            joint_search_seed: 12345,
            memoize_range_search: false,
            bp_bot: "SmartBot".to_owned(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            bomb0: env_flag("BOMB0", defaults.bomb0),
            bombd: env_parsed("BOMBD", defaults.bombd),
            fiber_threads: env_parsed("FIBER_THREADS", defaults.fiber_threads),
            num_threads: env_parsed("NUM_THREADS", defaults.num_threads),
            hand_size_override: usize::try_from(env_parsed::<i64>("HAND_SIZE_OVERRIDE", -1))
                .ok()
                .filter(|&size| size >= 3),
            search_thresh: env_parsed("SEARCH_THRESH", defaults.search_thresh),
            search_n: env_parsed("SEARCH_N", defaults.search_n),
            search_player: env_parsed("SEARCH_PLAYER", defaults.search_player),
            search_all: env_flag("SEARCH_ALL", defaults.search_all),
            double_search: env_flag("DOUBLE_SEARCH", defaults.double_search),
            ucb: env_flag("UCB", defaults.ucb),
            search_baseline: env_flag("SEARCH_BASELINE", defaults.search_baseline),
            optimize_wins: env_flag("OPTIMIZE_WINS", defaults.optimize_wins),
            partner_uniform_unc: env_parsed("PARTNER_UNIFORM_UNC", defaults.partner_uniform_unc),
            partner_boltzmann_unc: env_parsed(
                "PARTNER_BOLTZMANN_UNC",
                defaults.partner_boltzmann_unc,
            ),
            delayed_obs_thresh: env_parsed("DELAYED_OBS_THRESH", defaults.delayed_obs_thresh),
            range_max: env_parsed("RANGE_MAX", defaults.range_max),
            joint_search_seed: env_parsed("JOINT_SEARCH_SEED", defaults.joint_search_seed),
            memoize_range_search: env_flag("MEMOIZE_RANGE_SEARCH", defaults.memoize_range_search),
            bp_bot: env::var("BPBOT").unwrap_or(defaults.bp_bot),
        }
    }

    /// Which seat performs search, with negative indices counting from the end.
    pub fn resolved_search_player(&self, num_players: usize) -> usize {
        let mut player = self.search_player;
        if player < 0 {
            player += num_players as i64;
        }
        player.clamp(0, num_players as i64 - 1) as usize
    }
}

fn env_parsed<T: FromStr + Copy>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .filter(|raw| !raw.is_empty())
        .map(|raw| raw != "0")
        .unwrap_or(default)
}

/// Table rules the server itself needs; split off so simulations can carry
/// them without the whole search configuration.
#[derive(Debug, Clone, Copy)]
pub struct Rules {
    pub bomb0: bool,
    pub bombd: usize,
    pub hand_size_override: Option<usize>,
}

impl Default for Rules {
    fn default() -> Self {
        Rules::from_config(&Config::default())
    }
}

impl Rules {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bomb0: config.bomb0,
            bombd: config.bombd,
            hand_size_override: config.hand_size_override,
        }
    }

    /// Standard hand size: 5 for 2-3 players, 4 for 4-5, unless overridden.
    pub fn hand_size_for(&self, num_players: usize) -> usize {
        self.hand_size_override
            .unwrap_or(if num_players <= 3 { 5 } else { 4 })
    }
}
