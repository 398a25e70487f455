//! Simulation surface: detached server copies that can be synced to a real
//! game, loaded with hypothetical hidden information, and asked what move a
//! bot would make without anything actually happening.

use crate::bot::Bot;
use crate::config::Rules;
use crate::game::error::Result;
use crate::game::server::Server;
use crate::model::{Card, Color, Hand, Move, Value};

/// Placeholder filling masked hands and decks; accessors refuse to hand it
/// out, so any read of hidden state surfaces as an error instead of a
/// plausible-looking card.
const MASKED_CARD: Card = Card::new(Color::Red, Value::One);

impl Server {
    /// A blank detached server, never used for a real game.
    pub fn simulation(num_players: usize, rules: Rules) -> Self {
        Server::new(num_players, rules)
    }

    /// A detached copy consistent with everything `source`'s observer can
    /// see; the observer's own hand and the deck are masked.
    pub fn simulation_of(source: &Server) -> Self {
        let mut sim = source.clone();
        sim.sync(source);
        sim
    }

    /// Re-copies all observable state from `source`. Hidden information (the
    /// observer's own hand, the remaining deck) is replaced with masked
    /// placeholders until `set_hand` / `set_deck` fill it in.
    pub fn sync(&mut self, source: &Server) {
        self.rules = *source.rules();
        self.num_players = source.num_players();
        self.observing_player = source.who_am_i();
        self.active_player = source.active_player();
        self.active_card = source.active_card().ok();
        self.final_countdown = source.final_countdown();
        self.piles = Color::ALL.map(|color| source.pile_of(color));
        self.discards = source.discards().to_vec();
        self.hint_stones_remaining = source.hint_stones_remaining();
        self.mulligans_remaining = source.mulligans_remaining();

        let me = source.who_am_i();
        self.hands.clear();
        self.hidden_hands.clear();
        for player in 0..source.num_players() {
            if player == me {
                let size = source.size_of_hand_of_player(player).unwrap_or(0);
                self.hands.push(vec![MASKED_CARD; size]);
                self.hidden_hands.push(true);
            } else {
                // a hand already hidden in the source stays hidden here
                self.hands.push(source.hands[player].clone());
                self.hidden_hands.push(source.hidden_hands[player]);
            }
        }

        self.deck = vec![MASKED_CARD; source.cards_remaining_in_deck()];
        self.deck_hidden = true;
    }

    /// Injects a hypothetical hand for `player` and unmasks it.
    pub fn set_hand(&mut self, player: usize, hand: Hand) {
        self.hands[player] = hand;
        self.hidden_hands[player] = false;
    }

    /// Injects a concrete draw pile (the back is drawn first) and unmasks it.
    pub fn set_deck(&mut self, deck: Vec<Card>) {
        self.deck = deck;
        self.deck_hidden = false;
    }

    /// Retargets all observer-relative queries to `player`.
    pub fn set_observing_player(&mut self, player: usize) {
        debug_assert!(player < self.num_players);
        self.observing_player = player;
    }

    /// Asks `bot` what it would do as `player` in this state. The staged move
    /// is recorded and returned without being applied.
    pub fn simulate_player_move(&mut self, player: usize, bot: &mut dyn Bot) -> Result<Move> {
        self.active_player = player;
        self.observing_player = player;
        self.begin_move();
        bot.make_move(self)?;
        self.take_staged_move()
    }
}
