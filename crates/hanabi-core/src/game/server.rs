//! The authoritative rule engine and observer dispatch.
//!
//! Bots never mutate state directly: a `please_*` mutator validates and
//! stages exactly one move, and the turn driver performs the
//! pre-notification pass, applies the mutation, then the after-move pass.
//! This keeps the original notify-inside-mutator protocol observable to bots
//! without the server and its players aliasing each other.

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::bot::Bot;
use crate::config::Rules;
use crate::game::error::{Result, ServerError};
use crate::model::{
    full_deck, hand_as_string, portable_shuffle, Card, CardIndices, Color, DeckComposition, Hand,
    Move, Pile, Value, NUM_COLORS,
};

pub const NUM_HINTS: usize = 8;
pub const NUM_MULLIGANS: usize = 3;
pub const MAX_SCORE: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    Idle,
    AwaitingMove,
    Moved(Move),
}

#[derive(Debug, Clone)]
pub struct Server {
    pub(crate) rules: Rules,
    rng: ChaCha8Rng,
    pub(crate) num_players: usize,
    pub(crate) observing_player: usize,
    pub(crate) active_player: usize,
    phase: TurnPhase,
    pub(crate) active_card: Option<Card>,
    pub(crate) final_countdown: usize,
    pub(crate) piles: [Pile; NUM_COLORS],
    pub(crate) discards: Vec<Card>,
    pub(crate) hint_stones_remaining: usize,
    pub(crate) mulligans_remaining: usize,
    pub(crate) hands: Vec<Hand>,
    pub(crate) hidden_hands: Vec<bool>,
    /// Draw pile; the back of the vector is the top.
    pub(crate) deck: Vec<Card>,
    pub(crate) deck_hidden: bool,
}

impl Server {
    pub fn new(num_players: usize, rules: Rules) -> Self {
        Self {
            rules,
            rng: ChaCha8Rng::seed_from_u64(0),
            num_players,
            observing_player: 0,
            active_player: 0,
            phase: TurnPhase::Idle,
            active_card: None,
            final_countdown: 0,
            piles: Color::ALL.map(Pile::new),
            discards: Vec::new(),
            hint_stones_remaining: NUM_HINTS,
            mulligans_remaining: NUM_MULLIGANS,
            hands: vec![Vec::new(); num_players],
            hidden_hands: vec![false; num_players],
            deck: Vec::new(),
            deck_hidden: false,
        }
    }

    /// Seed the shuffle RNG; the same seed reproduces the same deal.
    pub fn seed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Deals a new game and runs it to its conclusion. A stacked deck, when
    /// provided, is taken top-first (index 0 is drawn first).
    pub fn run_game(
        &mut self,
        bots: &mut [Box<dyn Bot>],
        stacked_deck: Option<&[Card]>,
    ) -> Result<usize> {
        debug_assert_eq!(bots.len(), self.num_players);

        self.piles = Color::ALL.map(Pile::new);
        self.mulligans_remaining = NUM_MULLIGANS;
        self.hint_stones_remaining = NUM_HINTS;
        self.final_countdown = 0;
        self.discards.clear();
        self.active_card = None;
        self.phase = TurnPhase::Idle;
        self.hidden_hands = vec![false; self.num_players];
        self.deck_hidden = false;

        self.deck = match stacked_deck {
            Some(stacked) => {
                let mut deck = stacked.to_vec();
                deck.reverse(); // cards are drawn from the back
                deck
            }
            None => {
                let mut deck = full_deck();
                portable_shuffle(&mut deck, &mut self.rng);
                deck
            }
        };

        let hand_size = self.hand_size();
        self.hands = vec![Vec::new(); self.num_players];
        for player in 0..self.num_players {
            for _ in 0..hand_size {
                if let Some(card) = self.deck.pop() {
                    self.hands[player].push(card);
                }
            }
        }

        self.active_player = 0;
        self.run_to_completion(bots)
    }

    /// Drives an already set-up game to the end and returns the score.
    pub fn run_to_completion(&mut self, bots: &mut [Box<dyn Bot>]) -> Result<usize> {
        while !self.game_over() {
            debug!(
                deck = self.deck.len(),
                countdown = self.final_countdown,
                mulligans = self.mulligans_remaining,
                score = self.current_score(),
                "turn start"
            );
            for i in 0..self.num_players {
                self.observing_player = i;
                bots[i].observe_before_move(self)?;
            }
            self.observing_player = self.active_player;
            self.phase = TurnPhase::AwaitingMove;
            bots[self.active_player].make_move(self)?;
            let mv = self.take_staged_move()?;
            self.apply_move(mv, bots)?;
            for i in 0..self.num_players {
                self.observing_player = i;
                bots[i].observe_after_move(self)?;
            }
            self.advance_active_player();
        }
        Ok(self.current_score())
    }

    /// Stages and applies one move with its notification passes, without
    /// advancing the active player. Used to branch simulations.
    pub fn execute_move(&mut self, mv: Move, bots: &mut [Box<dyn Bot>]) -> Result<()> {
        self.phase = TurnPhase::AwaitingMove;
        self.submit_move(mv)?;
        let staged = self.take_staged_move()?;
        self.apply_move(staged, bots)
    }

    /// Routes a move value through the corresponding mutator.
    pub fn submit_move(&mut self, mv: Move) -> Result<()> {
        match mv {
            Move::Play(index) => self.please_play(index),
            Move::Discard(index) => self.please_discard(index),
            Move::HintColor { color, to } => self.please_give_color_hint(to, color),
            Move::HintValue { value, to } => self.please_give_value_hint(to, value),
        }
    }

    pub(crate) fn take_staged_move(&mut self) -> Result<Move> {
        match std::mem::replace(&mut self.phase, TurnPhase::Idle) {
            TurnPhase::Moved(mv) => Ok(mv),
            _ => Err(ServerError::NoMoveMade),
        }
    }

    pub(crate) fn begin_move(&mut self) {
        self.phase = TurnPhase::AwaitingMove;
    }

    /// Rotates the turn and advances the endgame countdown; simulations use
    /// this after branching a move by hand.
    pub fn advance_active_player(&mut self) {
        self.active_player = (self.active_player + 1) % self.num_players;
        debug_assert!(self.final_countdown <= self.num_players);
        if self.deck.is_empty() {
            self.final_countdown += 1;
        }
    }

    fn apply_move(&mut self, mv: Move, bots: &mut [Box<dyn Bot>]) -> Result<()> {
        let active = self.active_player;
        match mv {
            Move::Play(index) => {
                let card = self.hands[active][index];
                self.active_card = Some(card);
                for i in 0..self.num_players {
                    self.observing_player = i;
                    bots[i].observe_before_play(self, active, index)?;
                }
                self.active_card = None;

                if self.piles[card.color.index()].next_value_is(card.value) {
                    self.piles[card.color.index()].increment();
                    debug!(player = active, card = %card, "played");
                    if card.value == Value::Five {
                        // completing a pile regains a hint stone
                        self.regain_hint_stone();
                    }
                } else {
                    debug!(player = active, card = %card, "misplayed");
                    self.discards.push(card);
                    self.lose_mulligan();
                }
                self.remove_and_redraw(active, index);
            }
            Move::Discard(index) => {
                let card = self.hands[active][index];
                self.active_card = Some(card);
                for i in 0..self.num_players {
                    self.observing_player = i;
                    bots[i].observe_before_discard(self, active, index)?;
                }
                self.active_card = None;

                debug!(player = active, card = %card, "discarded");
                self.discards.push(card);
                self.remove_and_redraw(active, index);
                self.regain_hint_stone();
            }
            Move::HintColor { color, to } => {
                let indices = self.color_hint_indices(to, color)?;
                for i in 0..self.num_players {
                    self.observing_player = i;
                    bots[i].observe_color_hint(self, active, to, color, indices)?;
                }
                debug!(player = active, to, color = %color, touched = indices.len(), "color hint");
                self.hint_stones_remaining -= 1;
            }
            Move::HintValue { value, to } => {
                let indices = self.value_hint_indices(to, value)?;
                for i in 0..self.num_players {
                    self.observing_player = i;
                    bots[i].observe_value_hint(self, active, to, value, indices)?;
                }
                debug!(player = active, to, value = %value, touched = indices.len(), "value hint");
                self.hint_stones_remaining -= 1;
            }
        }
        Ok(())
    }

    fn remove_and_redraw(&mut self, player: usize, index: usize) {
        self.hands[player].remove(index);
        if self.mulligans_remaining > 0 && !self.deck.is_empty() {
            if let Some(card) = self.deck.pop() {
                debug!(player, card = %card, "drew replacement");
                self.hands[player].push(card);
            }
        }
    }

    fn regain_hint_stone(&mut self) {
        if self.hint_stones_remaining < NUM_HINTS {
            self.hint_stones_remaining += 1;
            debug!(remaining = self.hint_stones_remaining, "hint stone returned");
        }
    }

    fn lose_mulligan(&mut self) {
        debug_assert!(self.mulligans_remaining > 0);
        self.mulligans_remaining -= 1;
        debug!(remaining = self.mulligans_remaining, "mulligan lost");
    }

    /*================= MUTATORS (staging) ====================*/

    /// Stage a play of the card at `index` in the active player's hand.
    pub fn please_play(&mut self, index: usize) -> Result<()> {
        self.ensure_awaiting()?;
        let hand_len = self.hands[self.active_player].len();
        if index >= hand_len {
            return Err(ServerError::InvalidCardIndex { index, hand_len });
        }
        self.phase = TurnPhase::Moved(Move::Play(index));
        Ok(())
    }

    /// Stage a discard. Fails while all hint stones are available.
    pub fn please_discard(&mut self, index: usize) -> Result<()> {
        self.ensure_awaiting()?;
        let hand_len = self.hands[self.active_player].len();
        if index >= hand_len {
            return Err(ServerError::InvalidCardIndex { index, hand_len });
        }
        if !self.discarding_is_allowed() {
            return Err(ServerError::DiscardingNotAllowed);
        }
        self.phase = TurnPhase::Moved(Move::Discard(index));
        Ok(())
    }

    pub fn please_give_color_hint(&mut self, to: usize, color: Color) -> Result<()> {
        self.ensure_awaiting()?;
        self.validate_hint_target(to)?;
        if self.color_hint_indices(to, color)?.is_empty() {
            return Err(ServerError::EmptyHint);
        }
        self.phase = TurnPhase::Moved(Move::HintColor { color, to });
        Ok(())
    }

    pub fn please_give_value_hint(&mut self, to: usize, value: Value) -> Result<()> {
        self.ensure_awaiting()?;
        self.validate_hint_target(to)?;
        if self.value_hint_indices(to, value)?.is_empty() {
            return Err(ServerError::EmptyHint);
        }
        self.phase = TurnPhase::Moved(Move::HintValue { value, to });
        Ok(())
    }

    fn ensure_awaiting(&self) -> Result<()> {
        match self.phase {
            TurnPhase::AwaitingMove => Ok(()),
            TurnPhase::Moved(_) => Err(ServerError::MovedTwice),
            TurnPhase::Idle => Err(ServerError::MoveOutOfTurn),
        }
    }

    fn validate_hint_target(&self, to: usize) -> Result<()> {
        if to >= self.num_players {
            return Err(ServerError::InvalidPlayer(to));
        }
        if to == self.active_player {
            return Err(ServerError::CannotHintSelf);
        }
        if self.hint_stones_remaining == 0 {
            return Err(ServerError::NoHintStones);
        }
        Ok(())
    }

    fn color_hint_indices(&self, to: usize, color: Color) -> Result<CardIndices> {
        self.target_hand(to).map(|hand| {
            hand.iter()
                .enumerate()
                .filter(|(_, card)| card.color == color)
                .map(|(index, _)| index)
                .collect()
        })
    }

    fn value_hint_indices(&self, to: usize, value: Value) -> Result<CardIndices> {
        self.target_hand(to).map(|hand| {
            hand.iter()
                .enumerate()
                .filter(|(_, card)| card.value == value)
                .map(|(index, _)| index)
                .collect()
        })
    }

    fn target_hand(&self, to: usize) -> Result<&[Card]> {
        if to >= self.num_players {
            return Err(ServerError::InvalidPlayer(to));
        }
        if self.hidden_hands[to] {
            return Err(ServerError::HiddenHand(to));
        }
        Ok(&self.hands[to])
    }

    /*================= QUERIES ==============================*/

    pub fn num_players(&self) -> usize {
        self.num_players
    }

    pub fn hand_size(&self) -> usize {
        self.rules.hand_size_for(self.num_players)
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// The player currently querying the server.
    pub fn who_am_i(&self) -> usize {
        self.observing_player
    }

    pub fn active_player(&self) -> usize {
        self.active_player
    }

    pub fn size_of_hand_of_player(&self, player: usize) -> Result<usize> {
        if player >= self.num_players {
            return Err(ServerError::InvalidPlayer(player));
        }
        Ok(self.hands[player].len())
    }

    /// A player's hand, visible to everyone but that player.
    pub fn hand_of_player(&self, player: usize) -> Result<&[Card]> {
        if player >= self.num_players {
            return Err(ServerError::InvalidPlayer(player));
        }
        if player == self.observing_player {
            return Err(ServerError::CannotObserveOwnHand);
        }
        if self.hidden_hands[player] {
            return Err(ServerError::HiddenHand(player));
        }
        Ok(&self.hands[player])
    }

    /// The card about to be played or discarded; valid only during the
    /// corresponding pre-notification.
    pub fn active_card(&self) -> Result<Card> {
        self.active_card.ok_or(ServerError::ActiveCardNotObservable)
    }

    pub fn pile_of(&self, color: Color) -> Pile {
        self.piles[color.index()]
    }

    /// All discards, oldest first, including misplayed cards.
    pub fn discards(&self) -> &[Card] {
        &self.discards
    }

    pub fn hint_stones_used(&self) -> usize {
        NUM_HINTS - self.hint_stones_remaining
    }

    pub fn hint_stones_remaining(&self) -> usize {
        self.hint_stones_remaining
    }

    pub fn discarding_is_allowed(&self) -> bool {
        self.hint_stones_remaining != NUM_HINTS
    }

    pub fn mulligans_used(&self) -> usize {
        NUM_MULLIGANS - self.mulligans_remaining
    }

    pub fn mulligans_remaining(&self) -> usize {
        self.mulligans_remaining
    }

    pub fn cards_remaining_in_deck(&self) -> usize {
        self.deck.len()
    }

    pub fn final_countdown(&self) -> usize {
        self.final_countdown
    }

    pub fn game_over(&self) -> bool {
        if self.deck.is_empty() && self.final_countdown == self.num_players + 1 {
            return true;
        }
        if self.mulligans_remaining == 0 {
            return true;
        }
        self.current_score() == MAX_SCORE
    }

    /// Sum of pile sizes, with the configured bomb-out penalty applied.
    pub fn current_score(&self) -> usize {
        if self.mulligans_remaining == 0 && self.rules.bomb0 {
            return 0;
        }
        let sum: usize = self.piles.iter().map(Pile::size).sum();
        if self.mulligans_remaining == 0 {
            sum.saturating_sub(self.rules.bombd)
        } else {
            sum
        }
    }

    /// Remaining card counts from a viewpoint: `None` excludes no hands (the
    /// public composition); `Some(p)` additionally treats `p`'s own hand as
    /// unseen.
    pub fn deck_composition(&self, viewpoint: Option<usize>) -> Result<DeckComposition> {
        let mut deck = DeckComposition::full();
        deck.remove_all(&self.discards);
        for pile in &self.piles {
            for value in Value::ALL {
                if pile.contains(value) {
                    deck.remove(Card::new(pile.color(), value));
                }
            }
        }
        if let Some(who) = viewpoint {
            for player in 0..self.num_players {
                if player == who {
                    continue;
                }
                if self.hidden_hands[player] {
                    return Err(ServerError::HiddenHand(player));
                }
                deck.remove_all(&self.hands[player]);
            }
        }
        Ok(deck)
    }

    /// Every legal move for the observing player, in canonical order.
    pub fn enumerate_legal_moves(&self) -> Result<Vec<Move>> {
        let me = self.observing_player;
        let mut moves = BTreeSet::new();
        for index in 0..self.hands[me].len() {
            moves.insert(Move::Play(index));
            if self.discarding_is_allowed() {
                moves.insert(Move::Discard(index));
            }
        }
        if self.hint_stones_remaining > 0 {
            for player in 0..self.num_players {
                if player == me {
                    continue;
                }
                for &card in self.hand_of_player(player)? {
                    moves.insert(Move::HintColor {
                        color: card.color,
                        to: player,
                    });
                    moves.insert(Move::HintValue {
                        value: card.value,
                        to: player,
                    });
                }
            }
        }
        Ok(moves.into_iter().collect())
    }

    /*================= DEBUGGING TOOLS ======================*/

    /// Ground-truth hand access; for sanity checks and tests only.
    pub fn cheat_get_hand(&self, player: usize) -> &[Card] {
        &self.hands[player]
    }

    /// True while any hand or the deck still holds masked placeholders.
    pub fn has_hidden_state(&self) -> bool {
        self.deck_hidden || self.hidden_hands.iter().any(|&hidden| hidden)
    }

    pub fn hands_as_string(&self) -> String {
        self.hands
            .iter()
            .map(|hand| hand_as_string(hand))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn piles_as_string(&self) -> String {
        self.piles
            .iter()
            .map(|pile| format!("{}{}", pile.size(), pile.color().letter()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn discards_as_string(&self) -> String {
        self.discards
            .iter()
            .map(|card| card.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
