pub mod joint;
pub mod rollout;
pub mod search;
pub mod stats;

pub use joint::JointSearchBot;
pub use rollout::{do_search, SearchOutcome, SearchRequest};
pub use search::SearchBot;
pub use stats::{accumulate_score, can_prune_move, SearchStats, UcbStats};

use hanabi_core::bot::{Bot, BotRegistry};
use hanabi_core::config::Config;
use hanabi_core::game::error::Result;

/// Registers the search bots against an already-registered blueprint.
///
/// "SearchBot" follows the configured search seat (negative counts from the
/// end; `search_all` makes every seat search) and hands every other seat the
/// blueprint in permissive mode. "JointSearchBot" coordinates, so every seat
/// gets one.
pub fn register_search_bots(registry: &mut BotRegistry, config: &Config) -> Result<()> {
    let blueprint = registry.factory(&config.bp_bot)?;

    {
        let config = config.clone();
        let blueprint = blueprint.clone();
        registry.register("SearchBot", move |index, num_players, hand_size| {
            let search_player = config.resolved_search_player(num_players);
            if index == search_player || config.search_all {
                let bot =
                    SearchBot::new(index, num_players, hand_size, config.clone(), &*blueprint)?;
                Ok(Box::new(bot) as Box<dyn Bot>)
            } else {
                let mut bot = blueprint(index, num_players, hand_size)?;
                bot.set_permissive(true);
                Ok(bot)
            }
        });
    }
    {
        let config = config.clone();
        let blueprint = blueprint.clone();
        registry.register("JointSearchBot", move |index, num_players, hand_size| {
            let bot =
                JointSearchBot::new(index, num_players, hand_size, config.clone(), &*blueprint)?;
            Ok(Box::new(bot) as Box<dyn Bot>)
        });
    }
    Ok(())
}
