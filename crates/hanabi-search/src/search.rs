//! SearchBot: single-agent Monte-Carlo search over a blueprint policy.
//!
//! On every event the bot syncs its simulation server, updates the exact
//! hand distribution (and the factorized summary), and queues the event
//! onto every conditioned partner snapshot. On its own turn it asks the
//! blueprint for a default move and deviates only when rollouts find a
//! significantly better one.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info};

use hanabi_core::belief::{
    apply_delayed_observations, check_beliefs, clone_partner_bases, filter_consistent_with_action,
    filter_consistent_with_hint, populate_cdf, populate_initial, update_from_my_draw,
    update_from_revealed_card, FactorizedBeliefs, HandDist, ObsThunk, ObservationFn,
};
use hanabi_core::bot::{Bot, BotFactory};
use hanabi_core::config::{Config, Rules};
use hanabi_core::game::error::Result;
use hanabi_core::game::server::Server;
use hanabi_core::model::{Card, CardIndices, Color, Move, Value};

use crate::rollout::{do_search, SearchRequest};
use crate::stats::SearchStats;

pub struct SearchBot {
    me: usize,
    config: Config,
    rng: ChaCha8Rng,
    simul: Server,
    inited: bool,
    dist: HandDist,
    /// Blueprint copies, one per seat; only the own seat's copy observes the
    /// real game directly.
    players: Vec<Box<dyn Bot>>,
    /// Factorized public summaries, one per seat; included in diagnostics.
    v0: Vec<FactorizedBeliefs>,
    permissive: bool,

    /// Bridges the pre-notification to the after-move draw update.
    player_about_to_draw: Option<usize>,
    last_move: Vec<Option<Move>>,
    last_active_card: Option<Card>,

    changed_moves: usize,
    score_difference: f64,
    unbiased_score_difference: f64,
    unbiased_win_difference: f64,
    total_iters: usize,
}

impl SearchBot {
    pub fn new(
        index: usize,
        num_players: usize,
        hand_size: usize,
        config: Config,
        blueprint: &BotFactory,
    ) -> Result<Self> {
        let mut players = Vec::with_capacity(num_players);
        for player in 0..num_players {
            let mut bot = blueprint(player, num_players, hand_size)?;
            if config.partner_boltzmann_unc > 0.0 && player != index {
                bot.set_action_uncertainty(config.partner_boltzmann_unc);
            }
            // search deviates from the blueprint, so every copy must cope
            bot.set_permissive(true);
            players.push(bot);
        }
        let simul = Server::simulation(num_players, Rules::from_config(&config));
        Ok(Self {
            me: index,
            rng: ChaCha8Rng::seed_from_u64(0),
            config,
            simul,
            inited: false,
            dist: HandDist::new(),
            players,
            v0: Vec::new(),
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

    /// The distribution can only be generated once partner hands are
    /// visible, so it happens on the first observation rather than in the
    /// constructor.
    fn init(&mut self, server: &Server) -> Result<()> {
        debug_assert!(self.dist.is_empty());
        let partners = clone_partner_bases(&self.players, self.me);
        self.dist = populate_initial(server, Some(self.me), &partners)?;
        self.v0 = (0..server.num_players())
            .map(|player| FactorizedBeliefs::new(server, player))
            .collect::<Result<_>>()?;
        Ok(())
    }

    /// Applies an observation directly to the own blueprint and queues it
    /// for every conditioned partner snapshot.
    fn apply_to_all(&mut self, func: Arc<ObservationFn>) -> Result<()> {
        self.simul.set_observing_player(self.me);
        func(self.players[self.me].as_mut(), &self.simul)?;
        let snapshot = Arc::new(self.simul.clone());
        for (hand, val) in self.dist.iter_mut() {
            val.push_observation(ObsThunk {
                server: snapshot.clone(),
                func: func.clone(),
                who: self.me,
                hand: Arc::new(hand.clone()),
            });
        }
        Ok(())
    }

    fn check_my_beliefs(&self, server: &Server) -> Result<()> {
        if let Err(err) = check_beliefs(server, self.me, &self.dist, server.cheat_get_hand(self.me))
        {
            if let Ok(table) = self.v0[self.me].probabilities() {
                error!(player = self.me, slots = ?table, "factorized beliefs at failure");
            }
            return Err(err);
        }
        Ok(())
    }

    fn filter_hint(&mut self, mv: Move, card_indices: CardIndices, server: &Server) -> Result<()> {
        let to = match mv {
            Move::HintColor { to, .. } | Move::HintValue { to, .. } => to,
            Move::Play(_) | Move::Discard(_) => return Ok(()),
        };
        if to != self.me {
            return Ok(());
        }
        let (before, after) = filter_consistent_with_hint(&mut self.dist, mv, card_indices, None);
        debug!(player = self.me, mv = %mv, before, after, "filtered beliefs for hint");
        self.check_my_beliefs(server)
    }

    fn filter_action(&mut self, mv: Move, from: usize, server: &Server) -> Result<()> {
        if from == self.me {
            return Ok(());
        }
        filter_consistent_with_action(&mut self.dist, mv, from, self.me, &self.simul, &self.config)?;
        self.check_my_beliefs(server)
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

        // factorized summaries track public information only
        let public_deck = server.deck_composition(None)?;
        for beliefs in self.v0.iter_mut() {
            beliefs.update_from_revealed_card(played_card, &public_deck);
        }
        self.v0[who].update_from_draw(&public_deck, card_index, server)?;

        if who == self.me {
            update_from_my_draw(&mut self.dist, card_index, played_card, server, who, false)?;
        } else if server.size_of_hand_of_player(who)? == server.hand_size() {
            let drawn = *server
                .hand_of_player(who)?
                .last()
                .expect("a full hand has a newest card");
            update_from_revealed_card(&mut self.dist, drawn, server, Some(self.me), None)?;
        }
        self.check_my_beliefs(server)
    }
}

impl Bot for SearchBot {
    fn observe_before_move(&mut self, server: &Server) -> Result<()> {
        self.simul.sync(server);
        if !self.inited {
            self.init(server)?;
            self.inited = true;
        }
        debug_assert_eq!(server.who_am_i(), self.me);
        self.apply_to_all(Arc::new(|bot: &mut dyn Bot, server: &Server| {
            bot.observe_before_move(server)
        }))
    }

    fn make_move(&mut self, server: &mut Server) -> Result<()> {
        self.simul.sync(server);
        let bp_move = self
            .simul
            .simulate_player_move(self.me, self.players[self.me].as_mut())?;
        debug!(player = self.me, bp = %bp_move, "blueprint proposal");

        apply_delayed_observations(&mut self.dist, &self.config)?;
        let cdf = populate_cdf(&self.dist)?;

        let mut stats = SearchStats::new();
        let request = SearchRequest {
            who: self.me,
            bp_move,
            frame_move: None,
            me_bot: self.players[self.me].as_ref(),
            dist: &self.dist,
            cdf: &cdf,
            server: &*server,
            config: &self.config,
            verbose: true,
        };
        let outcome = do_search(&request, &mut stats, None, &mut self.rng)?;
        self.total_iters += outcome.iters;
        let chosen = outcome.chosen.unwrap_or(bp_move);

        if chosen != bp_move {
            self.changed_moves += 1;
            self.score_difference += stats[&chosen].mean - stats[&bp_move].mean;
            info!(
                player = self.me,
                bp = %bp_move,
                chosen = %chosen,
                bp_mean = stats[&bp_move].mean,
                chosen_mean = stats[&chosen].mean,
                "search changed the move"
            );
            if self.config.double_search {
                // a second, unbiased pass estimates the true score delta
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
        self.filter_action(mv, from, server)?;
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
        self.filter_action(mv, from, server)?;
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
        self.filter_hint(mv, card_indices, server)?;
        self.filter_action(mv, from, server)?;
        self.v0[to].update_from_hint(mv, card_indices, server)?;
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
        self.filter_hint(mv, card_indices, server)?;
        self.filter_action(mv, from, server)?;
        self.v0[to].update_from_hint(mv, card_indices, server)?;
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
                "search game summary"
            );
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Bot> {
        Box::new(SearchBot {
            me: self.me,
            config: self.config.clone(),
            rng: self.rng.clone(),
            simul: self.simul.clone(),
            inited: self.inited,
            dist: self.dist.clone(),
            players: self.players.iter().map(|bot| bot.clone_box()).collect(),
            v0: self.v0.clone(),
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
