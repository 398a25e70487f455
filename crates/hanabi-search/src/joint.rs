//! JointSearchBot: coordinated two-player search.
//!
//! When the partner also searches, their move carries information the
//! observer cannot immediately process: the partner's rollouts sampled hands
//! that are private to the observer. Each such move is parked in a belief
//! frame holding snapshots of both public ranges; once played cards and
//! hints shrink a frame's range below `RANGE_MAX`, the partner's search is
//! replayed for every surviving hand with the shared seed, inconsistent
//! hands are pruned, and the pruning is pushed forward to the present.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use hanabi_core::belief::{
    apply_delayed_observations, check_beliefs, clone_partner_bases, filter_consistent_with_action,
    filter_consistent_with_hint, pdf_to_cdf, populate_initial, populate_pdf, reweight_private,
    update_from_my_draw, update_from_revealed_card, HandDist, ObsThunk, ObservationFn,
};
use hanabi_core::bot::{Bot, BotFactory};
use hanabi_core::config::{Config, Rules};
use hanabi_core::game::error::{Result, ServerError};
use hanabi_core::game::server::Server;
use hanabi_core::model::{Card, CardIndices, Color, Hand, Move, Value};

use crate::rollout::{do_search, SearchRequest};
use crate::stats::SearchStats;

/// Hands pruned by replaying one frame, keyed by `(partner, frame_idx)`.
/// Both players perform the identical analysis, so whichever bot retires a
/// frame first saves the other the work. Keys only distinguish frames within
/// one game; constructing a new bot clears the cache, which keeps the keys
/// valid across games in one process.
type MemoizedRange = BTreeMap<(usize, usize), Vec<Hand>>;

static MEMOIZED_RANGE: Lazy<Mutex<MemoizedRange>> = Lazy::new(|| Mutex::new(MemoizedRange::new()));

/// One deferred belief update from a partner's search move.
#[derive(Clone)]
struct BeliefFrame {
    frame_idx: usize,
    /// The action that produced this frame.
    mv: Move,
    /// The hand owner's own latest move at frame time; relates their slot
    /// positions across frames.
    last_move: Option<Move>,
    /// For each current slot, the slot it occupied at frame time, or -1 if
    /// drawn since.
    hand_map: Vec<i64>,
    /// Ground truth at frame time, for the sanity check only.
    cheat_hand: Hand,
    simul: Server,
    hand_dist: HandDist,
    partner_hand_dist: HandDist,
}

pub struct JointSearchBot {
    me: usize,
    config: Config,
    rng: ChaCha8Rng,
    simul: Server,
    inited: bool,
    players: Vec<Box<dyn Bot>>,
    /// Public belief ranges, one per seat.
    hand_dists: Vec<HandDist>,
    /// Outstanding frames per seat, oldest first.
    history: Vec<VecDeque<BeliefFrame>>,
    num_frames: usize,
    permissive: bool,

    player_about_to_draw: Option<usize>,
    last_move: Vec<Option<Move>>,
    last_active_card: Option<Card>,

    changed_moves: usize,
    score_difference: f64,
    unbiased_score_difference: f64,
    unbiased_win_difference: f64,
    total_iters: usize,
}

impl JointSearchBot {
    pub fn new(
        index: usize,
        num_players: usize,
        hand_size: usize,
        config: Config,
        blueprint: &BotFactory,
    ) -> Result<Self> {
        if num_players != 2 {
            return Err(ServerError::TwoPlayersOnly);
        }
        let mut players = Vec::with_capacity(num_players);
        for player in 0..num_players {
            let mut bot = blueprint(player, num_players, hand_size)?;
            bot.set_permissive(true);
            players.push(bot);
        }
        // frame indices restart with every game, so stale entries from an
        // earlier game in this process must go
        MEMOIZED_RANGE
            .lock()
            .expect("memoized range lock is never poisoned")
            .clear();

        let simul = Server::simulation(num_players, Rules::from_config(&config));
        Ok(Self {
            me: index,
            rng: ChaCha8Rng::seed_from_u64(0),
            config,
            simul,
            inited: false,
            players,
            hand_dists: Vec::new(),
            history: vec![VecDeque::new(), VecDeque::new()],
            num_frames: 0,
            permissive: false,
            player_about_to_draw: None,
            last_move: vec![None; num_players],
            last_active_card: None,
            changed_moves: 0,
            score_difference: 0.0,
            unbiased_score_difference: 0.0,
            unbiased_win_difference: 0.0,
            total_iters: 0,
        })
    }

    /// Both seats get a public range: neither distribution conditions on
    /// hands only one player can see.
    fn init(&mut self, server: &Server) -> Result<()> {
        debug_assert!(self.hand_dists.is_empty());
        for player in 0..server.num_players() {
            let partners = clone_partner_bases(&self.players, player);
            self.hand_dists
                .push(populate_initial(server, None, &partners)?);
        }
        Ok(())
    }

    fn apply_to_all(&mut self, func: Arc<ObservationFn>) -> Result<()> {
        let snapshot = Arc::new(self.simul.clone());
        for player in 0..self.players.len() {
            if player == self.me {
                self.simul.set_observing_player(self.me);
                func(self.players[self.me].as_mut(), &self.simul)?;
            }
            for (hand, val) in self.hand_dists[player].iter_mut() {
                val.push_observation(ObsThunk {
                    server: snapshot.clone(),
                    func: func.clone(),
                    who: player,
                    hand: Arc::new(hand.clone()),
                });
            }
        }
        Ok(())
    }

    fn check_all_beliefs(&self, server: &Server) -> Result<()> {
        for player in 0..self.players.len() {
            check_beliefs(
                server,
                player,
                &self.hand_dists[player],
                server.cheat_get_hand(player),
            )?;
            for frame in &self.history[player] {
                check_beliefs(server, player, &frame.hand_dist, &frame.cheat_hand)?;
            }
        }
        Ok(())
    }

    /// Drops `hand` from the next frame's range (or the live range), mapping
    /// it through the draw that separates the two, and keeps pushing forward.
    fn propagate_pruned_hand(&mut self, who: usize, frame_idx: usize, hand: &Hand) {
        let is_last = frame_idx + 1 == self.history[who].len();
        let next_move = if is_last {
            None
        } else {
            self.history[who][frame_idx + 1].last_move
        };
        let draw_index = match next_move {
            Some(Move::Play(index)) | Some(Move::Discard(index)) => Some(index),
            _ => None,
        };

        match draw_index {
            None => {
                let removed = if is_last {
                    self.hand_dists[who].remove(hand).is_some()
                } else {
                    self.history[who][frame_idx + 1].hand_dist.remove(hand).is_some()
                };
                if removed && !is_last {
                    self.propagate_pruned_hand(who, frame_idx + 1, hand);
                }
            }
            Some(draw_index) => {
                let mut new_hand = hand.clone();
                if draw_index >= new_hand.len() {
                    return;
                }
                new_hand.remove(draw_index);
                for card_index in 0..25 {
                    let Some(drawn) = Card::from_index(card_index) else {
                        continue;
                    };
                    new_hand.push(drawn);
                    let removed = if is_last {
                        self.hand_dists[who].remove(&new_hand).is_some()
                    } else {
                        self.history[who][frame_idx + 1]
                            .hand_dist
                            .remove(&new_hand)
                            .is_some()
                    };
                    if removed && !is_last {
                        self.propagate_pruned_hand(who, frame_idx + 1, &new_hand);
                    }
                    new_hand.pop();
                }
            }
        }
    }

    /// Tries to retire `who`'s oldest frames: once a frame's range is small
    /// enough, replay the partner's shared-seed search on every hand and
    /// drop the ones under which the recorded move would not be chosen.
    fn update_frames(&mut self, who: usize, server: &Server) -> Result<()> {
        let from = 1 - who;
        loop {
            let (frame_idx, range_len) = match self.history[who].front() {
                Some(frame) => (frame.frame_idx, frame.hand_dist.len()),
                None => break,
            };
            if range_len > self.config.range_max {
                break;
            }
            debug!(
                player = self.me,
                who,
                frame_idx,
                range = range_len,
                "retiring belief frame"
            );

            let memo_key = (from, frame_idx);
            let memoized = MEMOIZED_RANGE
                .lock()
                .expect("memoized range lock is never poisoned")
                .get(&memo_key)
                .cloned();
            if let Some(pruned) = memoized {
                debug!(frame_idx, pruned = pruned.len(), "using memoized range pruning");
                for hand in pruned {
                    debug_assert!(self.history[who][0].hand_dist.contains_key(&hand));
                    if self.history[who][0].hand_dist.remove(&hand).is_some() {
                        self.propagate_pruned_hand(who, 0, &hand);
                    }
                }
                self.check_all_beliefs(server)?;
                self.history[who].pop_front();
                continue;
            }

            {
                let frame = &mut self.history[who][0];
                apply_delayed_observations(&mut frame.hand_dist, &self.config)?;
                apply_delayed_observations(&mut frame.partner_hand_dist, &self.config)?;
            }
            let keys: Vec<Hand> = self.history[who][0].hand_dist.keys().cloned().collect();
            let public_pdf = populate_pdf(&self.history[who][0].partner_hand_dist);
            let frame_mv = self.history[who][0].mv;
            let frame_simul = self.history[who][0].simul.clone();

            let mut newly_pruned: Vec<Hand> = Vec::new();
            for hand in keys {
                let mut my_server = frame_simul.clone();
                my_server.set_hand(who, hand.clone());
                let mut from_bot = self.history[who][0]
                    .hand_dist
                    .get(&hand)
                    .expect("keys snapshot taken from this frame")
                    .partner(from)?;
                let bp_move = my_server.simulate_player_move(from, from_bot.as_mut())?;
                my_server.set_observing_player(from);

                let mut private_pdf = public_pdf.clone();
                let public_deck = my_server.deck_composition(None)?;
                let alive = reweight_private(
                    &mut private_pdf,
                    &hand,
                    &public_deck,
                    self.config.num_threads,
                );
                if alive == 0 {
                    continue;
                }
                pdf_to_cdf(&mut private_pdf)?;

                // both players run this with the same seed, so the pruning
                // stays consistent without communication
                let mut search_rng = ChaCha8Rng::seed_from_u64(self.config.joint_search_seed);
                let mut stats = SearchStats::new();
                let outcome = {
                    let frame = &self.history[who][0];
                    let request = SearchRequest {
                        who: from,
                        bp_move,
                        frame_move: Some(frame_mv),
                        me_bot: from_bot.as_ref(),
                        dist: &frame.partner_hand_dist,
                        cdf: &private_pdf,
                        server: &my_server,
                        config: &self.config,
                        verbose: false,
                    };
                    do_search(&request, &mut stats, None, &mut search_rng)?
                };

                if outcome.chosen != Some(frame_mv) {
                    self.history[who][0].hand_dist.remove(&hand);
                    if self.config.memoize_range_search {
                        newly_pruned.push(hand.clone());
                    }
                    self.propagate_pruned_hand(who, 0, &hand);
                    self.check_all_beliefs(server)?;
                }
            }
            if self.config.memoize_range_search {
                MEMOIZED_RANGE
                    .lock()
                    .expect("memoized range lock is never poisoned")
                    .insert(memo_key, newly_pruned);
            }
            debug!(
                who,
                frame_idx,
                range = self.history[who][0].hand_dist.len(),
                "filtered historical range"
            );
            self.check_all_beliefs(server)?;
            self.history[who].pop_front();
            if self.history[who].is_empty() {
                debug!(who, "frames pushed up to the present");
            }
        }
        Ok(())
    }

    fn joint_filter_hint(
        &mut self,
        mv: Move,
        card_indices: CardIndices,
        server: &Server,
    ) -> Result<()> {
        let to = match mv {
            Move::HintColor { to, .. } | Move::HintValue { to, .. } => to,
            Move::Play(_) | Move::Discard(_) => return Ok(()),
        };
        for frame in self.history[to].iter_mut() {
            let mut hist_indices = CardIndices::new();
            let mut relevant = CardIndices::new();
            for (slot, &mapped) in frame.hand_map.iter().enumerate() {
                if mapped >= 0 {
                    relevant.add(mapped as usize);
                    if card_indices.contains(slot) {
                        hist_indices.add(mapped as usize);
                    }
                }
            }
            filter_consistent_with_hint(&mut frame.hand_dist, mv, hist_indices, Some(relevant));
        }
        filter_consistent_with_hint(&mut self.hand_dists[to], mv, card_indices, None);
        self.check_all_beliefs(server)
    }

    fn joint_filter_action(&mut self, mv: Move, from: usize, server: &Server) -> Result<()> {
        debug_assert_eq!(server.num_players(), 2);
        let who = 1 - from;
        self.update_frames(from, server)?;

        if !self.history[from].is_empty() {
            // The actor has outstanding frames, so they did not know their
            // own beliefs and fell back to the blueprint: the update is an
            // ordinary hard filter. At most one player is in that state, so
            // `who`'s range is current.
            debug_assert!(self.history[who].is_empty());
            apply_delayed_observations(&mut self.hand_dists[who], &self.config)?;
            let mut hard = self.config.clone();
            hard.partner_uniform_unc = 0.0;
            hard.partner_boltzmann_unc = 0.0;
            let sim = Server::simulation_of(server);
            filter_consistent_with_action(
                &mut self.hand_dists[who],
                mv,
                from,
                who,
                &sim,
                &hard,
            )?;
            self.check_all_beliefs(server)
        } else {
            // The actor searched; the update must wait in a frame until the
            // range is small enough to replay their search.
            debug!(
                player = self.me,
                from,
                who,
                frames = self.history[who].len() + 1,
                "actor searched; deferring belief update"
            );
            let frame = BeliefFrame {
                frame_idx: self.num_frames,
                mv,
                last_move: self.last_move[who],
                hand_map: (0..server.size_of_hand_of_player(who)?)
                    .map(|slot| slot as i64)
                    .collect(),
                cheat_hand: server.cheat_get_hand(who).to_vec(),
                simul: Server::simulation_of(server),
                hand_dist: self.hand_dists[who].clone(),
                partner_hand_dist: self.hand_dists[1 - who].clone(),
            };
            self.history[who].push_back(frame);
            self.num_frames += 1;
            Ok(())
        }
    }

    fn update_after_draw(&mut self, who: usize, server: &Server) -> Result<()> {
        let played_card = self
            .last_active_card
            .take()
            .expect("a play or discard recorded the active card");
        let card_index = match self.last_move[who] {
            Some(Move::Play(index)) | Some(Move::Discard(index)) => index,
            _ => unreachable!("draws only follow plays and discards"),
        };

        update_from_my_draw(
            &mut self.hand_dists[who],
            card_index,
            played_card,
            server,
            who,
            true,
        )?;
        self.check_all_beliefs(server)?;

        // frames track the played card through the hand map, then shift it
        for index in 0..self.history[who].len() {
            let frame = &mut self.history[who][index];
            let old_index = frame.hand_map[card_index];
            if old_index >= 0 {
                frame
                    .hand_dist
                    .retain(|hand, _| hand[old_index as usize] == played_card);
            }
            frame.hand_map.remove(card_index);
            frame.hand_map.push(-1);
        }
        self.check_all_beliefs(server)?;

        // the played card left circulation for every public range
        for player in 0..self.players.len() {
            update_from_revealed_card(
                &mut self.hand_dists[player],
                played_card,
                server,
                None,
                None,
            )?;
            for index in 0..self.history[player].len() {
                let relevant: CardIndices = self.history[player][index]
                    .hand_map
                    .iter()
                    .filter(|&&mapped| mapped >= 0)
                    .map(|&mapped| mapped as usize)
                    .collect();
                let frame = &mut self.history[player][index];
                update_from_revealed_card(
                    &mut frame.hand_dist,
                    played_card,
                    server,
                    None,
                    Some(relevant),
                )?;
            }
        }
        self.check_all_beliefs(server)
    }
}

impl Bot for JointSearchBot {
    fn observe_before_move(&mut self, server: &Server) -> Result<()> {
        self.simul.sync(server);
        if !self.inited {
            self.init(server)?;
            self.inited = true;
        }
        self.apply_to_all(Arc::new(|bot: &mut dyn Bot, server: &Server| {
            bot.observe_before_move(server)
        }))?;
        self.update_frames(server.active_player(), server)
    }

    fn make_move(&mut self, server: &mut Server) -> Result<()> {
        self.update_frames(self.me, server)?;
        self.simul.sync(server);
        let bp_move = self
            .simul
            .simulate_player_move(self.me, self.players[self.me].as_mut())?;
        debug!(
            player = self.me,
            frame = self.num_frames,
            bp = %bp_move,
            partner_range = self.hand_dists[1 - self.me].len(),
            "joint move selection"
        );

        let chosen = if !self.history[self.me].is_empty() {
            // my own range is still deferred, so I cannot sample my hand
            debug!(player = self.me, "own beliefs unknown; playing blueprint");
            bp_move
        } else {
            apply_delayed_observations(&mut self.hand_dists[self.me], &self.config)?;
            let mut pdf = populate_pdf(&self.hand_dists[self.me]);
            let partner = 1 - self.me;
            let partner_hand = server.hand_of_player(partner)?.to_vec();
            let public_deck = server.deck_composition(None)?;
            let alive = reweight_private(
                &mut pdf,
                &partner_hand,
                &public_deck,
                self.config.num_threads,
            );
            if alive == 0 {
                return Err(ServerError::EmptyDistribution);
            }
            pdf_to_cdf(&mut pdf)?;
            let cdf = pdf;

            let mut stats = SearchStats::new();
            let mut search_rng = ChaCha8Rng::seed_from_u64(self.config.joint_search_seed);
            let request = SearchRequest {
                who: self.me,
                bp_move,
                frame_move: None,
                me_bot: self.players[self.me].as_ref(),
                dist: &self.hand_dists[self.me],
                cdf: &cdf,
                server: &*server,
                config: &self.config,
                verbose: true,
            };
            let outcome = do_search(&request, &mut stats, None, &mut search_rng)?;
            self.total_iters += outcome.iters;
            let chosen = outcome.chosen.unwrap_or(bp_move);
            if chosen != bp_move {
                self.changed_moves += 1;
                self.score_difference += stats[&chosen].mean - stats[&bp_move].mean;
                info!(player = self.me, bp = %bp_move, chosen = %chosen, "joint search changed the move");
                if self.config.double_search {
                    let mut unbiased = SearchStats::new();
                    let mut wins = SearchStats::new();
                    let second = SearchRequest {
                        verbose: false,
                        ..request
                    };
                    do_search(&second, &mut unbiased, Some(&mut wins), &mut self.rng)?;
                    self.unbiased_score_difference +=
                        unbiased[&chosen].mean - unbiased[&bp_move].mean;
                    self.unbiased_win_difference += wins[&chosen].mean - wins[&bp_move].mean;
                }
            }
            chosen
        };
        server.submit_move(chosen)
    }

    fn observe_before_discard(
        &mut self,
        server: &Server,
        from: usize,
        card_index: usize,
    ) -> Result<()> {
        self.simul.sync(server);
        let mv = Move::Discard(card_index);
        self.last_move[from] = Some(mv);
        self.last_active_card = Some(if from == self.me {
            server.active_card()?
        } else {
            server.hand_of_player(from)?[card_index]
        });
        self.player_about_to_draw = Some(from);
        self.joint_filter_action(mv, from, server)?;
        self.apply_to_all(Arc::new(move |bot: &mut dyn Bot, server: &Server| {
            bot.observe_before_discard(server, from, card_index)
        }))
    }

    fn observe_before_play(
        &mut self,
        server: &Server,
        from: usize,
        card_index: usize,
    ) -> Result<()> {
        self.simul.sync(server);
        let mv = Move::Play(card_index);
        self.last_move[from] = Some(mv);
        self.last_active_card = Some(if from == self.me {
            server.active_card()?
        } else {
            server.hand_of_player(from)?[card_index]
        });
        self.player_about_to_draw = Some(from);
        self.joint_filter_action(mv, from, server)?;
        self.apply_to_all(Arc::new(move |bot: &mut dyn Bot, server: &Server| {
            bot.observe_before_play(server, from, card_index)
        }))
    }

    fn observe_color_hint(
        &mut self,
        server: &Server,
        from: usize,
        to: usize,
        color: Color,
        card_indices: CardIndices,
    ) -> Result<()> {
        self.simul.sync(server);
        let mv = Move::HintColor { color, to };
        self.last_move[from] = Some(mv);
        self.joint_filter_hint(mv, card_indices, server)?;
        self.joint_filter_action(mv, from, server)?;
        self.apply_to_all(Arc::new(move |bot: &mut dyn Bot, server: &Server| {
            bot.observe_color_hint(server, from, to, color, card_indices)
        }))
    }

    fn observe_value_hint(
        &mut self,
        server: &Server,
        from: usize,
        to: usize,
        value: Value,
        card_indices: CardIndices,
    ) -> Result<()> {
        self.simul.sync(server);
        let mv = Move::HintValue { value, to };
        self.last_move[from] = Some(mv);
        self.joint_filter_hint(mv, card_indices, server)?;
        self.joint_filter_action(mv, from, server)?;
        self.apply_to_all(Arc::new(move |bot: &mut dyn Bot, server: &Server| {
            bot.observe_value_hint(server, from, to, value, card_indices)
        }))
    }

    fn observe_after_move(&mut self, server: &Server) -> Result<()> {
        self.simul.sync(server);
        if let Some(who) = self.player_about_to_draw.take() {
            self.update_after_draw(who, server)?;
        }
        self.apply_to_all(Arc::new(|bot: &mut dyn Bot, server: &Server| {
            bot.observe_after_move(server)
        }))?;

        if server.game_over() || server.final_countdown() == server.num_players() {
            info!(
                player = self.me,
                changed_moves = self.changed_moves,
                score_difference = self.score_difference,
                unbiased_score_difference = self.unbiased_score_difference,
                unbiased_win_difference = self.unbiased_win_difference,
                total_iters = self.total_iters,
                frames = self.num_frames,
                "joint search game summary"
            );
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Bot> {
        Box::new(JointSearchBot {
            me: self.me,
            config: self.config.clone(),
            rng: self.rng.clone(),
            simul: self.simul.clone(),
            inited: self.inited,
            players: self.players.iter().map(|bot| bot.clone_box()).collect(),
            hand_dists: self.hand_dists.clone(),
            history: self.history.clone(),
            num_frames: self.num_frames,
            permissive: self.permissive,
            player_about_to_draw: self.player_about_to_draw,
            last_move: self.last_move.clone(),
            last_active_card: self.last_active_card,
            changed_moves: self.changed_moves,
            score_difference: self.score_difference,
            unbiased_score_difference: self.unbiased_score_difference,
            unbiased_win_difference: self.unbiased_win_difference,
            total_iters: self.total_iters,
        })
    }

    fn set_permissive(&mut self, permissive: bool) {
        self.permissive = permissive;
    }
}
