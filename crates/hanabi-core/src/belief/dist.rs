//! The exact hand-distribution engine.
//!
//! For an observer, the posterior over a player's possible hands is a map
//! from ordered hands to a probability weight plus the partner bots
//! conditioned on that hand. Partner snapshots are immutable bases with an
//! append-only log of observation thunks; a concrete partner is realized
//! only when requested, by cloning the base and replaying the log.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::bot::Bot;
use crate::config::Config;
use crate::game::error::{Result, ServerError};
use crate::game::server::Server;
use crate::model::{
    hand_as_string, move_to_index, Card, CardIndices, DeckComposition, Hand, Move, NUM_COLORS,
    NUM_VALUES,
};
use crate::pool;

pub type ObservationFn = dyn Fn(&mut dyn Bot, &Server) -> Result<()> + Send + Sync;

/// One deferred observation: the event closure, the observing player it will
/// be replayed for, the server snapshot that witnessed it, and the
/// hypothetical hand the snapshot is conditioned on.
#[derive(Clone)]
pub struct ObsThunk {
    pub server: Arc<Server>,
    pub func: Arc<ObservationFn>,
    pub who: usize,
    pub hand: Arc<Hand>,
}

impl ObsThunk {
    fn replay(&self, observer: usize, bot: &mut dyn Bot) -> Result<()> {
        debug_assert_ne!(observer, self.who);
        let mut sim = (*self.server).clone();
        sim.set_hand(self.who, (*self.hand).clone());
        sim.set_observing_player(observer);
        (self.func)(bot, &sim)
    }
}

/// Distribution value for one hypothetical hand.
#[derive(Clone)]
pub struct DistVal {
    /// Unnormalized probability weight.
    pub prob: f64,
    partners: Vec<Option<Arc<dyn Bot>>>,
    delayed: Vec<ObsThunk>,
}

impl DistVal {
    pub fn new(prob: f64, partners: Vec<Option<Arc<dyn Bot>>>) -> Self {
        Self {
            prob,
            partners,
            delayed: Vec::new(),
        }
    }

    pub fn push_observation(&mut self, thunk: ObsThunk) {
        self.delayed.push(thunk);
    }

    pub fn pending_observations(&self) -> usize {
        self.delayed.len()
    }

    /// The partner bot for `who`, conditioned on this hand: a clone of the
    /// base snapshot with every queued observation replayed onto it.
    pub fn partner(&self, who: usize) -> Result<Box<dyn Bot>> {
        let base = self.partners[who]
            .as_ref()
            .ok_or(ServerError::InvalidPlayer(who))?;
        let mut bot = base.clone_box();
        for thunk in &self.delayed {
            thunk.replay(who, bot.as_mut())?;
        }
        Ok(bot)
    }

    /// Realizes every partner and drains the queue; each queued observation
    /// is applied exactly once.
    pub fn apply_observations(&mut self) -> Result<()> {
        if self.delayed.is_empty() {
            return Ok(());
        }
        let mut realized = Vec::with_capacity(self.partners.len());
        for who in 0..self.partners.len() {
            if self.partners[who].is_some() {
                realized.push(Some(Arc::from(self.partner(who)?)));
            } else {
                realized.push(None);
            }
        }
        self.partners = realized;
        self.delayed.clear();
        Ok(())
    }
}

pub type HandDist = std::collections::BTreeMap<Hand, DistVal>;

/// Base partner snapshots shared by every hand: a clone of each bot except
/// the observer's own slot.
pub fn clone_partner_bases(
    players: &[Box<dyn Bot>],
    observer: usize,
) -> Vec<Option<Arc<dyn Bot>>> {
    players
        .iter()
        .enumerate()
        .map(|(index, bot)| {
            if index == observer {
                None
            } else {
                Some(Arc::from(bot.clone_box()))
            }
        })
        .collect()
}

/// Enumerates every ordered hand drawable from the unseen deck, weighted by
/// the falling-factorial probability of that exact draw sequence. The
/// viewpoint picks the composition: `Some(observer)` for a private range,
/// `None` for the public one.
pub fn populate_initial(
    server: &Server,
    viewpoint: Option<usize>,
    partners: &[Option<Arc<dyn Bot>>],
) -> Result<HandDist> {
    info!(viewpoint = ?viewpoint, "generating initial hand distribution");
    let mut deck = server.deck_composition(viewpoint)?;
    let mut dist = HandDist::new();
    let mut hand = Vec::with_capacity(server.hand_size());
    populate_rec(
        &mut dist,
        &mut deck,
        &mut hand,
        1.0,
        server.hand_size(),
        partners,
    );
    info!(hands = dist.len(), "hand distribution ready");
    Ok(dist)
}

fn populate_rec(
    dist: &mut HandDist,
    deck: &mut DeckComposition,
    hand: &mut Hand,
    prob: f64,
    hand_size: usize,
    partners: &[Option<Arc<dyn Bot>>],
) {
    if hand.len() == hand_size {
        if !dist.is_empty() && dist.len() % 1_000_000 == 0 {
            info!(hands = dist.len(), "still generating hands");
        }
        dist.insert(hand.clone(), DistVal::new(prob, partners.to_vec()));
        return;
    }
    for index in 0..NUM_COLORS * NUM_VALUES {
        let card = match Card::from_index(index) {
            Some(card) => card,
            None => continue,
        };
        let count = deck.count(card);
        if count == 0 {
            continue;
        }
        deck.remove(card);
        hand.push(card);
        populate_rec(dist, deck, hand, prob * count as f64, hand_size, partners);
        hand.pop();
        deck.add(card);
    }
}

fn hint_touches(mv: Move, card: Card) -> bool {
    match mv {
        Move::HintColor { color, .. } => card.color == color,
        Move::HintValue { value, .. } => card.value == value,
        Move::Play(_) | Move::Discard(_) => false,
    }
}

/// Keeps only hands where, slot by slot, membership in `card_indices`
/// matches whether the slot carries the hinted attribute. When
/// `relevant_indices` is given, slots outside it are ignored.
pub fn filter_consistent_with_hint(
    dist: &mut HandDist,
    mv: Move,
    card_indices: CardIndices,
    relevant_indices: Option<CardIndices>,
) -> (usize, usize) {
    let before = dist.len();
    dist.retain(|hand, _| {
        hand.iter().enumerate().all(|(slot, &card)| {
            if let Some(relevant) = relevant_indices {
                if !relevant.contains(slot) {
                    return true;
                }
            }
            card_indices.contains(slot) == hint_touches(mv, card)
        })
    });
    (before, dist.len())
}

/// Downweights every hand under which the actor's simulated blueprint move
/// differs from the move actually observed. An uncertainty of 0 prunes hard;
/// 1 disables the update entirely. In Boltzmann mode the partner's reported
/// probability of the observed move (plus the uniform floor) is used when
/// the partner exposes one.
pub fn filter_consistent_with_action(
    dist: &mut HandDist,
    mv: Move,
    from: usize,
    me: usize,
    sim: &Server,
    config: &Config,
) -> Result<(usize, usize)> {
    let before = dist.len();
    if (config.partner_uniform_unc - 1.0).abs() < f64::EPSILON {
        return Ok((before, before));
    }
    apply_delayed_observations(dist, config)?;

    let keys: Vec<Hand> = dist.keys().cloned().collect();
    let move_index = move_to_index(mv, sim.hand_size(), sim.num_players(), from);
    let factors: Vec<f64> = {
        let dist_ref: &HandDist = dist;
        let chunk = pool::chunk_size(keys.len(), config.num_threads);
        let chunks: Vec<Vec<f64>> = pool::install(|| {
            keys.par_chunks(chunk)
                .map(|chunk_keys| -> Result<Vec<f64>> {
                    let mut my_sim = sim.clone();
                    let mut out = Vec::with_capacity(chunk_keys.len());
                    for hand in chunk_keys {
                        let val = dist_ref
                            .get(hand)
                            .expect("key snapshot taken from this distribution");
                        let mut bot = val.partner(from)?;
                        my_sim.set_hand(me, hand.clone());
                        let factor = if config.partner_boltzmann_unc > 0.0 {
                            match bot.action_probs() {
                                Some(probs) => {
                                    probs.get(&move_index).copied().unwrap_or(0.0)
                                        + config.partner_uniform_unc
                                }
                                None => {
                                    let cf = my_sim.simulate_player_move(from, bot.as_mut())?;
                                    if cf == mv {
                                        1.0
                                    } else {
                                        config.partner_uniform_unc
                                    }
                                }
                            }
                        } else {
                            let cf = my_sim.simulate_player_move(from, bot.as_mut())?;
                            if cf == mv {
                                1.0
                            } else {
                                config.partner_uniform_unc
                            }
                        };
                        out.push(factor);
                    }
                    Ok(out)
                })
                .collect::<Result<Vec<_>>>()
        })?;
        chunks.into_iter().flatten().collect()
    };

    for (hand, factor) in keys.iter().zip(factors) {
        if factor != 1.0 {
            if let Some(val) = dist.get_mut(hand) {
                val.prob *= factor;
            }
        }
    }
    dist.retain(|_, val| val.prob > 0.0);
    debug!(
        actor = from,
        mv = %mv,
        before,
        after = dist.len(),
        "filtered beliefs against observed action"
    );
    Ok((before, dist.len()))
}

/// After the observer plays or discards slot `card_index`: keep only hands
/// holding `played_card` there, shift the remainder down, and append every
/// possible replacement weighted by the remaining deck composition. With an
/// empty deck the hands simply shrink.
pub fn update_from_my_draw(
    dist: &mut HandDist,
    card_index: usize,
    played_card: Card,
    server: &Server,
    who: usize,
    public_beliefs: bool,
) -> Result<(usize, usize)> {
    let before = dist.len();
    let viewpoint = if public_beliefs { None } else { Some(who) };
    let base_deck = server.deck_composition(viewpoint)?;
    let drew = server.size_of_hand_of_player(who)? == server.hand_size();

    let mut next = HandDist::new();
    for (hand, val) in std::mem::take(dist) {
        if hand.get(card_index) != Some(&played_card) {
            continue;
        }
        let mut new_hand = hand;
        new_hand.remove(card_index);
        if drew {
            let mut deck = base_deck;
            deck.remove_all(&new_hand);
            for (card, count) in deck.iter() {
                if count == 0 {
                    continue;
                }
                let mut candidate = new_hand.clone();
                candidate.push(card);
                let mut new_val = val.clone();
                new_val.prob *= count as f64;
                debug_assert!(!next.contains_key(&candidate));
                next.insert(candidate, new_val);
            }
        } else {
            debug_assert!(server.cards_remaining_in_deck() == 0 || server.game_over());
            next.insert(new_hand, val);
        }
    }
    *dist = next;
    debug!(player = who, before, after = dist.len(), "updated beliefs from own draw");
    Ok((before, dist.len()))
}

/// A card left circulation (a partner drew it, or it became public): scale
/// every hand containing it by `(remaining - in_hand) / remaining` using the
/// pre-draw count, dropping hands that hit zero.
pub fn update_from_revealed_card(
    dist: &mut HandDist,
    revealed: Card,
    server: &Server,
    viewpoint: Option<usize>,
    relevant_indices: Option<CardIndices>,
) -> Result<(usize, usize)> {
    let before = dist.len();
    let deck = server.deck_composition(viewpoint)?;
    let remaining = deck.count(revealed) + 1; // count before the draw
    for (hand, val) in dist.iter_mut() {
        let in_hand = hand
            .iter()
            .enumerate()
            .filter(|(slot, &card)| {
                relevant_indices.map_or(true, |relevant| relevant.contains(*slot))
                    && card == revealed
            })
            .count();
        if in_hand == 0 {
            continue;
        }
        val.prob *= remaining.saturating_sub(in_hand) as f64 / remaining as f64;
    }
    dist.retain(|_, val| val.prob > 0.0);
    debug!(
        card = %revealed,
        before,
        after = dist.len(),
        "updated beliefs from revealed card"
    );
    Ok((before, dist.len()))
}

/// Batch-realizes every queued thunk in parallel. Skipped above the
/// configured size threshold as a memory safeguard.
pub fn apply_delayed_observations(dist: &mut HandDist, config: &Config) -> Result<()> {
    if dist.len() > config.delayed_obs_thresh {
        return Ok(());
    }
    let pending = dist
        .values()
        .next()
        .map(DistVal::pending_observations)
        .unwrap_or(0);
    if pending == 0 {
        return Ok(());
    }
    debug!(hands = dist.len(), pending, "applying delayed observations");
    let mut entries: Vec<&mut DistVal> = dist.values_mut().collect();
    let chunk = pool::chunk_size(entries.len(), config.num_threads);
    pool::install(|| {
        entries
            .par_chunks_mut(chunk)
            .try_for_each(|chunk_vals| -> Result<()> {
                for val in chunk_vals.iter_mut() {
                    val.apply_observations()?;
                }
                Ok(())
            })
    })
}

/// Sanity check: the observer's true hand must never fall out of their own
/// distribution. Violations dump diagnostics and are fatal.
pub fn check_beliefs(server: &Server, who: usize, dist: &HandDist, true_hand: &[Card]) -> Result<()> {
    if dist.contains_key(true_hand) {
        return Ok(());
    }
    error!(
        player = who,
        true_hand = %hand_as_string(true_hand),
        hands = %server.hands_as_string(),
        discards = %server.discards_as_string(),
        piles = %server.piles_as_string(),
        count = dist.len(),
        "true hand missing from belief distribution"
    );
    for (index, hand) in dist.keys().take(100).enumerate() {
        error!(sample = index, hand = %hand_as_string(hand), "belief entry");
    }
    Err(ServerError::BeliefInconsistency { player: who })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Rules;
    use crate::model::{Color, Value};

    /// Counts events it observes and reports the count through the optional
    /// probability capability, so tests can see how far a snapshot replayed.
    #[derive(Clone, Default)]
    struct CountingBot {
        observed: usize,
    }

    impl Bot for CountingBot {
        fn observe_before_move(&mut self, _: &Server) -> Result<()> {
            self.observed += 1;
            Ok(())
        }
        fn make_move(&mut self, server: &mut Server) -> Result<()> {
            server.please_play(0)
        }
        fn observe_before_discard(&mut self, _: &Server, _: usize, _: usize) -> Result<()> {
            self.observed += 1;
            Ok(())
        }
        fn observe_before_play(&mut self, _: &Server, _: usize, _: usize) -> Result<()> {
            self.observed += 1;
            Ok(())
        }
        fn observe_color_hint(
            &mut self,
            _: &Server,
            _: usize,
            _: usize,
            _: Color,
            _: CardIndices,
        ) -> Result<()> {
            self.observed += 1;
            Ok(())
        }
        fn observe_value_hint(
            &mut self,
            _: &Server,
            _: usize,
            _: usize,
            _: Value,
            _: CardIndices,
        ) -> Result<()> {
            self.observed += 1;
            Ok(())
        }
        fn observe_after_move(&mut self, _: &Server) -> Result<()> {
            self.observed += 1;
            Ok(())
        }
        fn clone_box(&self) -> Box<dyn Bot> {
            Box::new(self.clone())
        }
        fn set_permissive(&mut self, _: bool) {}
        fn action_probs(&self) -> Option<std::collections::BTreeMap<usize, f64>> {
            let mut probs = std::collections::BTreeMap::new();
            probs.insert(0, self.observed as f64);
            Some(probs)
        }
    }

    fn card(color: Color, value: Value) -> Card {
        Card::new(color, value)
    }

    /// Two players, three-card hands, observer 0.
    fn rigged_server() -> Server {
        let rules = Rules {
            hand_size_override: Some(3),
            ..Rules::default()
        };
        let mut server = Server::new(2, rules);
        server.set_hand(
            0,
            vec![
                card(Color::Red, Value::One),
                card(Color::Blue, Value::Two),
                card(Color::Red, Value::Three),
            ],
        );
        server.set_hand(
            1,
            vec![
                card(Color::Green, Value::Five),
                card(Color::Yellow, Value::One),
                card(Color::Yellow, Value::One),
            ],
        );
        server.set_deck(vec![card(Color::Green, Value::One); 10]);
        server.set_observing_player(0);
        server
    }

    fn counting_partners() -> Vec<Option<Arc<dyn Bot>>> {
        vec![None, Some(Arc::new(CountingBot::default()))]
    }

    /// Independent sequence counter over a composition, for cross-checking
    /// the enumeration.
    fn count_sequences(deck: &mut DeckComposition, len: usize) -> usize {
        if len == 0 {
            return 1;
        }
        let mut total = 0;
        for index in 0..NUM_COLORS * NUM_VALUES {
            let card = Card::from_index(index).expect("card index in range");
            if deck.count(card) == 0 {
                continue;
            }
            deck.remove(card);
            total += count_sequences(deck, len - 1);
            deck.add(card);
        }
        total
    }

    #[test]
    fn initial_enumeration_matches_sequence_count_and_holds_true_hand() {
        let server = rigged_server();
        let partners = counting_partners();
        let dist = populate_initial(&server, Some(0), &partners).expect("populates");

        let mut deck = server.deck_composition(Some(0)).expect("composition");
        let expected = count_sequences(&mut deck, 3);
        assert_eq!(dist.len(), expected);
        assert!(dist.contains_key(server.cheat_get_hand(0)));
        assert!(dist.values().all(|val| val.prob > 0.0));

        // a hand drawing three copies of a two-copy card cannot appear
        let impossible = vec![card(Color::Red, Value::Two); 3];
        assert!(!dist.contains_key(&impossible));
    }

    #[test]
    fn hint_filter_keeps_exactly_the_consistent_hands() {
        let server = rigged_server();
        let partners = counting_partners();
        let mut dist = populate_initial(&server, Some(0), &partners).expect("populates");

        // color hint: red touches slots 0 and 2 (the observer's true layout)
        let mv = Move::HintColor { color: Color::Red, to: 0 };
        let indices: CardIndices = [0, 2].into_iter().collect();
        let keys: Vec<Hand> = dist.keys().cloned().collect();
        let expected = keys
            .iter()
            .filter(|hand| {
                hand.iter().enumerate().all(|(slot, c)| {
                    (c.color == Color::Red) == indices.contains(slot)
                })
            })
            .count();

        let (before, after) = filter_consistent_with_hint(&mut dist, mv, indices, None);
        assert_eq!(before, keys.len());
        assert_eq!(after, expected);
        assert!(dist.contains_key(server.cheat_get_hand(0)));
        check_beliefs(&server, 0, &dist, server.cheat_get_hand(0)).expect("true hand kept");
    }

    #[test]
    fn my_draw_shifts_slots_and_weights_replacements() {
        let mut server = rigged_server();
        let partners = counting_partners();
        let mut dist = populate_initial(&server, Some(0), &partners).expect("populates");

        // the observer plays slot 0, which really was the red one; the
        // server state afterwards has a replacement drawn
        let played = card(Color::Red, Value::One);
        server.set_hand(
            0,
            vec![
                card(Color::Blue, Value::Two),
                card(Color::Red, Value::Three),
                card(Color::Green, Value::One),
            ],
        );

        let (before, after) =
            update_from_my_draw(&mut dist, 0, played, &server, 0, false).expect("updates");
        assert!(before > 0 && after > 0);
        for hand in dist.keys() {
            assert_eq!(hand.len(), 3);
        }
        assert!(dist.contains_key(server.cheat_get_hand(0)));

        // replacements are weighted by remaining copies: a hand ending in a
        // yellow one (one copy left unseen) is lighter than one ending in a
        // green two (two copies left), all else equal
        let base = vec![card(Color::Blue, Value::Two), card(Color::Red, Value::Three)];
        let mut light = base.clone();
        light.push(card(Color::Yellow, Value::One));
        let mut heavy = base.clone();
        heavy.push(card(Color::Green, Value::Two));
        let light_prob = dist.get(&light).expect("light hand present").prob;
        let heavy_prob = dist.get(&heavy).expect("heavy hand present").prob;
        assert!(heavy_prob > light_prob);
    }

    #[test]
    fn revealed_card_scales_by_remaining_copies() {
        let mut server = rigged_server();
        let partners = counting_partners();
        let mut dist = populate_initial(&server, Some(0), &partners).expect("populates");

        // the partner drew a blue two, so one of its two copies is spoken
        // for: single-copy hands halve, double-copy hands die
        let revealed = card(Color::Blue, Value::Two);
        server.set_hand(
            1,
            vec![card(Color::Green, Value::Five), card(Color::Yellow, Value::One), revealed],
        );

        let copies =
            |hand: &Hand| hand.iter().filter(|&&c| c == revealed).count();
        let single: Hand = dist
            .keys()
            .find(|hand| copies(hand) == 1)
            .cloned()
            .expect("a single-copy hand exists");
        let double: Hand = dist
            .keys()
            .find(|hand| copies(hand) == 2)
            .cloned()
            .expect("a double-copy hand exists");
        let untouched: Hand = dist
            .keys()
            .find(|hand| copies(hand) == 0)
            .cloned()
            .expect("an untouched hand exists");
        let single_before = dist[&single].prob;
        let untouched_before = dist[&untouched].prob;

        update_from_revealed_card(&mut dist, revealed, &server, Some(0), None).expect("updates");

        assert!((dist[&single].prob - single_before * 0.5).abs() < 1e-9);
        assert!(!dist.contains_key(&double));
        assert!((dist[&untouched].prob - untouched_before).abs() < f64::EPSILON);
        assert!(dist.contains_key(server.cheat_get_hand(0)));
    }

    #[test]
    fn delayed_observations_replay_lazily_and_drain_once() {
        let server = rigged_server();
        let partners = counting_partners();
        let mut val = DistVal::new(1.0, partners);
        let hand = server.cheat_get_hand(0).to_vec();

        let snapshot = Arc::new(Server::simulation_of(&server));
        let func: Arc<ObservationFn> =
            Arc::new(|bot: &mut dyn Bot, server: &Server| bot.observe_before_move(server));
        for _ in 0..3 {
            val.push_observation(ObsThunk {
                server: snapshot.clone(),
                func: func.clone(),
                who: 0,
                hand: Arc::new(hand.clone()),
            });
        }
        assert_eq!(val.pending_observations(), 3);

        // realization replays the full log onto a fresh clone
        let partner = val.partner(1).expect("partner realizes");
        assert_eq!(partner.action_probs().unwrap()[&0], 3.0);
        // the base snapshot is untouched; a second request replays again
        let partner = val.partner(1).expect("partner realizes again");
        assert_eq!(partner.action_probs().unwrap()[&0], 3.0);

        val.apply_observations().expect("applies");
        assert_eq!(val.pending_observations(), 0);
        let partner = val.partner(1).expect("partner after drain");
        assert_eq!(partner.action_probs().unwrap()[&0], 3.0);
    }
}
