//! The Monte-Carlo search pass: batched parallel rollouts with UCB pruning.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use hanabi_core::belief::{sample_from_cdf, HandDist, HandDistCdf};
use hanabi_core::bot::Bot;
use hanabi_core::config::Config;
use hanabi_core::game::error::{Result, ServerError};
use hanabi_core::game::server::Server;
use hanabi_core::model::{portable_shuffle, Move};
use hanabi_core::pool;

use crate::stats::{accumulate_score, can_prune_move, SearchStats, UcbStats};

/// Everything one search pass needs. The probabilities in `dist` may be
/// stale (public, unreweighted); `cdf` is the ground truth for sampling.
pub struct SearchRequest<'a> {
    /// The seat whose move is being chosen.
    pub who: usize,
    /// The blueprint's default move; carries the threshold bias.
    pub bp_move: Move,
    /// In frame analysis, the partner move being tested; pruning it bails
    /// the whole pass.
    pub frame_move: Option<Move>,
    /// The searcher's own blueprint, cloned into each rollout.
    pub me_bot: &'a dyn Bot,
    pub dist: &'a HandDist,
    pub cdf: &'a HandDistCdf,
    pub server: &'a Server,
    pub config: &'a Config,
    pub verbose: bool,
}

pub struct SearchOutcome {
    /// `None` means the frame move was pruned and the caller should treat
    /// the answer as "not this move".
    pub chosen: Option<Move>,
    /// Rollouts actually performed.
    pub iters: usize,
}

/// One rollout: sample a hand for `who` from the CDF, rebuild and shuffle
/// the unseen deck, stand up a simulation with the conditioned partners,
/// execute the candidate move, and play the game out on blueprint policies.
fn one_rollout(req: &SearchRequest<'_>, sampled_move: Move, rng: &mut ChaCha8Rng) -> Result<i64> {
    let sampled_hand = sample_from_cdf(req.cdf, rng).clone();

    let mut deck_comp = req.server.deck_composition(Some(req.who))?;
    deck_comp.remove_all(&sampled_hand);
    let mut deck_order = deck_comp.expand();
    portable_shuffle(&mut deck_order, rng);

    let mut sim = Server::simulation_of(req.server);

    let distval = req
        .dist
        .get(&sampled_hand)
        .ok_or(ServerError::EmptyDistribution)?;
    let mut bots: Vec<Box<dyn Bot>> = Vec::with_capacity(sim.num_players());
    for player in 0..sim.num_players() {
        if player == req.who {
            bots.push(req.me_bot.clone_box());
        } else {
            bots.push(distval.partner(player)?);
        }
    }

    sim.set_hand(req.who, sampled_hand);
    sim.set_deck(deck_order);

    sim.execute_move(sampled_move, &mut bots)?;
    for player in 0..sim.num_players() {
        sim.set_observing_player(player);
        bots[player].observe_after_move(&sim)?;
    }
    sim.advance_active_player();
    debug_assert!(!sim.has_hidden_state());

    let score = sim.run_to_completion(&mut bots)?;
    Ok(score as i64)
}

/// Runs the full search pass over every legal move, returning the unpruned
/// move with the best biased mean.
pub fn do_search(
    req: &SearchRequest<'_>,
    stats: &mut SearchStats,
    mut win_stats: Option<&mut SearchStats>,
    rng: &mut ChaCha8Rng,
) -> Result<SearchOutcome> {
    let config = req.config;
    let moves = req.server.enumerate_legal_moves()?;
    let num_moves = moves.len();

    for mv in &moves {
        stats.insert(*mv, UcbStats::default());
        if let Some(win_stats) = win_stats.as_deref_mut() {
            win_stats.insert(*mv, UcbStats::default());
        }
    }
    stats
        .get_mut(&req.bp_move)
        .expect("the blueprint move is legal")
        .bias = config.search_thresh;
    let bp_mi = moves
        .iter()
        .position(|mv| *mv == req.bp_move)
        .expect("the blueprint move is legal");

    // Round the lane count down to a multiple of the move count so each
    // batch schedules exactly one rollout per move per lane group; this
    // keeps the paired-baseline arithmetic aligned.
    let mut lanes = config.num_threads - config.num_threads % num_moves;
    if lanes < num_moves {
        lanes = num_moves;
    }
    let total = config.search_n - config.search_n % lanes;

    // one seed per outer iteration, shared by the whole lane group
    let mut seeds = vec![0u64; config.search_n / num_moves + 1];
    for seed in seeds.iter_mut() {
        *seed = rng.gen_range(0..1u64 << 30);
    }

    if req.verbose {
        debug!(player = req.who, moves = num_moves, total, lanes, "search start");
    }

    let mut scores: Vec<Option<i64>> = vec![None; total];
    let mut prune_count = 0usize;
    let mut frame_bail = false;
    let mut accumed = 0usize;
    let mut iters = 0usize;

    let mut batch_start = 0usize;
    while batch_start < total {
        if frame_bail || prune_count + 1 >= num_moves {
            break;
        }
        let pruned_flags: Vec<bool> = moves.iter().map(|mv| stats[mv].pruned).collect();
        let batch: Vec<Option<i64>> = pool::install(|| {
            (batch_start..batch_start + lanes)
                .into_par_iter()
                .map(|j| {
                    let mi = j % num_moves;
                    if pruned_flags[mi] {
                        return Ok(None);
                    }
                    let g = j / num_moves;
                    let mut lane_rng = ChaCha8Rng::seed_from_u64(seeds[g]);
                    one_rollout(req, moves[mi], &mut lane_rng).map(Some)
                })
                .collect::<Result<Vec<_>>>()
        })?;
        iters += batch.iter().filter(|score| score.is_some()).count();
        for (offset, score) in batch.into_iter().enumerate() {
            scores[batch_start + offset] = score;
        }

        // accumulate-and-prune phase, once per batch; the final batch joins
        // the stragglers below
        if config.ucb && batch_start + lanes < total {
            for k in batch_start..batch_start + lanes {
                let bp_score = scores[k - (k % num_moves) + bp_mi];
                accumulate_score(
                    scores[k],
                    bp_score,
                    moves[k % num_moves],
                    stats,
                    win_stats.as_deref_mut(),
                    config,
                );
            }
            for mv in &moves {
                if !stats[mv].pruned && can_prune_move(stats, *mv, req.bp_move, config) {
                    stats
                        .get_mut(mv)
                        .expect("stats were seeded for every move")
                        .pruned = true;
                    prune_count += 1;
                    if Some(*mv) == req.frame_move {
                        frame_bail = true;
                    }
                }
            }
            accumed += lanes;
        }
        batch_start += lanes;
    }

    if frame_bail {
        // all that matters is that the observed action was not chosen
        return Ok(SearchOutcome {
            chosen: None,
            iters,
        });
    }
    if prune_count + 1 < num_moves {
        for k in accumed..total {
            let bp_score = scores[k - (k % num_moves) + bp_mi];
            accumulate_score(
                scores[k],
                bp_score,
                moves[k % num_moves],
                stats,
                win_stats.as_deref_mut(),
                config,
            );
        }
    }

    let mut best: Option<(Move, f64)> = None;
    for (mv, stat) in stats.iter() {
        if stat.pruned {
            continue;
        }
        let biased = stat.mean + stat.bias;
        if best.map_or(true, |(_, best_score)| biased > best_score) {
            best = Some((*mv, biased));
        }
    }
    let chosen = best.map(|(mv, _)| mv);

    if req.verbose {
        if let Some(chosen) = chosen {
            debug!(
                player = req.who,
                iters,
                chosen = %chosen,
                chosen_mean = stats[&chosen].mean,
                bp = %req.bp_move,
                bp_mean = stats[&req.bp_move].mean,
                "search finished"
            );
        }
        log_search_results(stats);
    }

    Ok(SearchOutcome { chosen, iters })
}

/// One summary line per candidate move.
pub fn log_search_results(stats: &SearchStats) {
    for (mv, stat) in stats {
        debug!(
            mv = %mv,
            mean = stat.mean,
            stderr = stat.stderr(),
            n = stat.n,
            pruned = stat.pruned,
            "move stats"
        );
    }
}
