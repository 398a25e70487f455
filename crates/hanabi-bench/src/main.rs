//! Evaluation harness: runs games between configured bots and reports
//! per-game records plus aggregate statistics.

mod stats;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hanabi_bot::SmartBot;
use hanabi_core::bot::{Bot, BotRegistry};
use hanabi_core::config::{Config, Rules};
use hanabi_core::game::Server;
use hanabi_core::pool;

use stats::ScoreStats;

#[derive(Debug, Parser)]
#[command(name = "hanabi-bench", about = "Evaluate Hanabi bots over many games")]
struct Args {
    /// Registered bot name (SmartBot, SearchBot, JointSearchBot).
    #[arg(long, default_value = "SmartBot")]
    bot: String,

    /// Number of players at the table.
    #[arg(long, default_value_t = 2)]
    players: usize,

    /// Number of games to run.
    #[arg(long, default_value_t = 1)]
    games: u64,

    /// Base RNG seed; game i plays with seed + i.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write one JSON record per game to this file.
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct GameRecord<'a> {
    bot: &'a str,
    seed: u64,
    score: usize,
    bombed: bool,
    discards: String,
    piles: String,
}

fn build_registry(config: &Config) -> Result<BotRegistry> {
    let mut registry = BotRegistry::new();
    registry.register("SmartBot", |index, num_players, hand_size| {
        Ok(Box::new(SmartBot::new(index, num_players, hand_size)) as Box<dyn Bot>)
    });
    hanabi_search::register_search_bots(&mut registry, config)
        .context("registering search bots")?;
    Ok(registry)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    pool::init(config.fiber_threads);

    let registry = build_registry(&config)?;
    let rules = Rules::from_config(&config);
    let hand_size = rules.hand_size_for(args.players);

    let mut json_out = match &args.json {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => None,
    };

    let mut score_stats = ScoreStats::default();
    for game in 0..args.games {
        let seed = args.seed + game;
        let mut server = Server::new(args.players, rules);
        server.seed(seed);

        let mut bots: Vec<Box<dyn Bot>> = (0..args.players)
            .map(|index| registry.create(&args.bot, index, args.players, hand_size))
            .collect::<hanabi_core::Result<_>>()
            .context("constructing bots")?;

        let score = server
            .run_game(&mut bots, None)
            .with_context(|| format!("game with seed {seed}"))?;
        let bombed = server.mulligans_remaining() == 0;
        score_stats.record(score, bombed);

        info!(seed, score, bombed, "game finished");
        if let Some(out) = json_out.as_mut() {
            let record = GameRecord {
                bot: &args.bot,
                seed,
                score,
                bombed,
                discards: server.discards_as_string(),
                piles: server.piles_as_string(),
            };
            serde_json::to_writer(&mut *out, &record)?;
            out.write_all(b"\n")?;
        }
    }

    info!(
        bot = %args.bot,
        games = score_stats.games(),
        mean = score_stats.mean(),
        stderr = score_stats.stderr(),
        win_rate = score_stats.win_rate(),
        bomb_rate = score_stats.bomb_rate(),
        "run complete"
    );
    println!(
        "{}: {} games, mean {:.3} +/- {:.3}, win rate {:.3}, bomb rate {:.3}",
        args.bot,
        score_stats.games(),
        score_stats.mean(),
        score_stats.stderr(),
        score_stats.win_rate(),
        score_stats.bomb_rate()
    );
    Ok(())
}
