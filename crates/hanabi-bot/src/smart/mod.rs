//! The SmartBot blueprint policy.
//!
//! A conventioned heuristic: color hints mean "your newest touched card is
//! playable", value hints to the player about to discard are valuable-card
//! warnings, and a knowingly-discarded playable card is a finesse pointing
//! at someone's newest card. SmartBot tracks what every player knows about
//! their own hand and plays the resulting cascade.

mod knowledge;

pub use knowledge::{CardKnowledge, Trivalue};

use hanabi_core::bot::Bot;
use hanabi_core::game::error::Result;
use hanabi_core::game::server::Server;
use hanabi_core::model::{Card, CardIndices, Color, Value, NUM_COLORS, NUM_VALUES};

use knowledge::{bump, count_of, CountTable, TableView};

/// A candidate hint with its entropy-reduction fitness.
#[derive(Debug, Clone, Copy)]
struct Hint {
    fitness: i64,
    to: usize,
    color: Option<Color>,
    value: Option<Value>,
}

impl Hint {
    fn none(to: usize) -> Self {
        Self {
            fitness: -1,
            to,
            color: None,
            value: None,
        }
    }

    fn includes(&self, card: Card) -> bool {
        if let Some(color) = self.color {
            return card.color == color;
        }
        if let Some(value) = self.value {
            return card.value == value;
        }
        false
    }

    fn give(&self, server: &mut Server) -> Result<()> {
        if let Some(color) = self.color {
            server.please_give_color_hint(self.to, color)
        } else if let Some(value) = self.value {
            server.please_give_value_hint(self.to, value)
        } else {
            unreachable!("a fitness-positive hint names a color or value")
        }
    }
}

fn reduction_in_entropy(
    old_knols: &[CardKnowledge],
    new_knols: &[CardKnowledge],
    permissive: bool,
) -> i64 {
    old_knols
        .iter()
        .zip(new_knols)
        .map(|(old, new)| {
            old.possibilities(permissive) as i64 - new.possibilities(permissive) as i64
        })
        .sum()
}

#[derive(Clone)]
pub struct SmartBot {
    me: usize,
    my_hand_size: usize,
    permissive: bool,
    /// What each player knows about their own hand.
    hand_knowledge: Vec<Vec<CardKnowledge>>,
    /// Cards played or discarded, gone from circulation.
    played_count: CountTable,
    /// Cards in hands whose identity is public knowledge.
    located_count: CountTable,
    /// Cards in hands that this player in particular can see.
    eyesight_count: CountTable,
}

impl SmartBot {
    pub fn new(index: usize, num_players: usize, hand_size: usize) -> Self {
        Self {
            me: index,
            my_hand_size: hand_size,
            permissive: false,
            hand_knowledge: vec![vec![CardKnowledge::new(); hand_size]; num_players],
            played_count: [[0; NUM_VALUES]; NUM_COLORS],
            located_count: [[0; NUM_VALUES]; NUM_COLORS],
            eyesight_count: [[0; NUM_VALUES]; NUM_COLORS],
        }
    }

    fn num_players(&self) -> usize {
        self.hand_knowledge.len()
    }

    fn view(&self, server: &Server) -> TableView {
        TableView::from_server(server, &self.played_count, self.permissive)
    }

    fn see_public_card(&mut self, card: Card) {
        bump(&mut self.played_count, card);
        debug_assert!(
            count_of(&self.played_count, card) as usize <= card.multiplicity() || self.permissive
        );
    }

    /// The other cards shift down and a new one is drawn at the end.
    fn invalidate_knol(&mut self, player: usize, card_index: usize, draw_new_card: bool) {
        let knols = &mut self.hand_knowledge[player];
        knols.remove(card_index);
        if draw_new_card {
            knols.push(CardKnowledge::new());
        }
    }

    fn update_eyesight_count(&mut self, server: &Server) -> Result<()> {
        self.eyesight_count = [[0; NUM_VALUES]; NUM_COLORS];
        for player in 0..self.num_players() {
            if player == self.me {
                for index in 0..self.my_hand_size.min(self.hand_knowledge[player].len()) {
                    if let Some(card) = self.hand_knowledge[player][index].known_card() {
                        bump(&mut self.eyesight_count, card);
                    }
                }
            } else {
                for &card in server.hand_of_player(player)? {
                    bump(&mut self.eyesight_count, card);
                }
            }
        }
        Ok(())
    }

    fn update_located_count(&mut self) -> bool {
        let mut fresh: CountTable = [[0; NUM_VALUES]; NUM_COLORS];
        for knols in &self.hand_knowledge {
            for knol in knols {
                if let Some(card) = knol.known_card() {
                    bump(&mut fresh, card);
                }
            }
        }
        if fresh != self.located_count {
            self.located_count = fresh;
            return true;
        }
        false
    }

    /// The card the player would discard next: their oldest card not known
    /// to be valuable. `None` when they should be playing or have nothing
    /// discardable.
    fn next_discard_index(&self, view: &TableView, player: usize) -> Option<usize> {
        let mut best_fitness = 0.0;
        let mut best_index = None;
        for (index, knol) in self.hand_knowledge[player].iter().enumerate() {
            if knol.playable(view) == Trivalue::Yes {
                return None; // they should just play it
            }
            if knol.worthless(view) == Trivalue::Yes {
                return None; // they should already have discarded it
            }
            if knol.valuable(view) == Trivalue::Yes {
                continue; // never discard this
            }
            let fitness = 100.0 + knol.probability_worthless(view);
            if fitness > best_fitness {
                best_fitness = fitness;
                best_index = Some(index);
            }
        }
        best_index
    }

    /// Whatever just happened was not a warning, so the player expecting one
    /// can mark their next discard as safe.
    fn no_valuable_warning_was_given(&mut self, server: &Server, from: usize) {
        if server.cards_remaining_in_deck() == 0 || server.hint_stones_remaining() == 0 {
            return;
        }
        let expecting = (from + 1) % self.num_players();
        let view = self.view(server);
        if let Some(discard_index) = self.next_discard_index(&view, expecting) {
            self.hand_knowledge[expecting][discard_index].set_is_valuable(&view, false);
        }
    }

    fn best_hint_for_player_given_constraint<F>(
        &self,
        server: &Server,
        to: usize,
        is_okay: F,
    ) -> Result<Hint>
    where
        F: Fn(&Hint, &[CardKnowledge], &[CardKnowledge]) -> bool,
    {
        let partners_hand = server.hand_of_player(to)?.to_vec();
        let mut colors = [false; NUM_COLORS];
        let mut values = [false; NUM_VALUES];
        for card in &partners_hand {
            colors[card.color.index()] = true;
            values[card.value.as_usize() - 1] = true;
        }

        let old_knols = &self.hand_knowledge[to];
        let mut best = Hint::none(to);
        for color in Color::ALL {
            if !colors[color.index()] {
                continue;
            }
            let mut hint = Hint::none(to);
            hint.color = Some(color);
            let mut new_knols = old_knols.clone();
            for (slot, knol) in new_knols.iter_mut().enumerate() {
                if partners_hand[slot].color == color {
                    knol.set_must_be_color(color);
                } else {
                    knol.set_cannot_be_color(color);
                }
            }
            if is_okay(&hint, old_knols, &new_knols) {
                hint.fitness = reduction_in_entropy(old_knols, &new_knols, self.permissive);
                if hint.fitness > best.fitness {
                    best = hint;
                }
            }
        }
        for value in Value::ALL {
            if !values[value.as_usize() - 1] {
                continue;
            }
            let mut hint = Hint::none(to);
            hint.value = Some(value);
            let mut new_knols = old_knols.clone();
            for (slot, knol) in new_knols.iter_mut().enumerate() {
                if partners_hand[slot].value == value {
                    knol.set_must_be_value(value);
                } else {
                    knol.set_cannot_be_value(value);
                }
            }
            if is_okay(&hint, old_knols, &new_knols) {
                hint.fitness = reduction_in_entropy(old_knols, &new_knols, self.permissive);
                if hint.fitness > best.fitness {
                    best = hint;
                }
            }
        }
        Ok(best)
    }

    fn best_hint_for_player(&self, server: &Server, partner: usize) -> Result<Hint> {
        debug_assert_ne!(partner, self.me);
        let view = self.view(server);
        let partners_hand = server.hand_of_player(partner)?.to_vec();

        let is_really_playable: Vec<bool> = partners_hand
            .iter()
            .map(|card| server.pile_of(card.color).next_value_is(card.value))
            .collect();

        // Avoid hints that would be misinterpreted as valuable warnings.
        let mut value_to_avoid = None;
        if partner == (self.me + 1) % self.num_players() {
            if let Some(discard_index) = self.next_discard_index(&view, partner) {
                let knol = &self.hand_knowledge[partner][discard_index];
                let value = partners_hand[discard_index].value;
                if knol.could_be_valuable_with_value(&view, value.as_usize()) {
                    value_to_avoid = Some(value);
                }
            }
        }

        self.best_hint_for_player_given_constraint(server, partner, |hint, old_knols, new_knols| {
            if hint.value.is_some() && hint.value == value_to_avoid {
                return false;
            }
            // A good hint either unambiguously reveals a playable card, or
            // touches a newest-possible card that really is playable. A hint
            // whose newest touched maybe-playable card is not actually
            // playable is misleading and must not be given.
            let mut reveals_playable = false;
            let mut is_misleading = Trivalue::Maybe;
            for slot in (0..partners_hand.len()).rev() {
                if old_knols[slot].playable(&view) != Trivalue::Maybe {
                    continue;
                }
                if new_knols[slot].playable(&view) == Trivalue::Yes {
                    reveals_playable = true;
                } else if new_knols[slot].playable(&view) == Trivalue::Maybe
                    && hint.includes(partners_hand[slot])
                    && is_misleading == Trivalue::Maybe
                {
                    is_misleading = if is_really_playable[slot] {
                        Trivalue::No
                    } else {
                        Trivalue::Yes
                    };
                }
            }
            reveals_playable || is_misleading == Trivalue::No
        })
    }

    fn maybe_give_valuable_warning(&mut self, server: &mut Server) -> Result<bool> {
        if server.hint_stones_remaining() == 0 {
            return Ok(false);
        }
        let player_to_warn = (self.me + 1) % self.num_players();
        let view = self.view(server);
        let Some(discard_index) = self.next_discard_index(&view, player_to_warn) else {
            return Ok(false);
        };
        let target_card = server.hand_of_player(player_to_warn)?[discard_index];
        if !view.is_valuable(target_card) {
            return Ok(false);
        }

        // Warn them before they throw it away; a hint that redirects them to
        // a play is even better.
        let best_hint = self.best_hint_for_player(server, player_to_warn)?;
        if best_hint.fitness > 0 {
            best_hint.give(server)?;
            return Ok(true);
        }
        server.please_give_value_hint(player_to_warn, target_card.value)?;
        Ok(true)
    }

    fn maybe_discard_finesse(&mut self, server: &mut Server) -> Result<bool> {
        if !server.discarding_is_allowed() {
            return Ok(false);
        }
        let view = self.view(server);
        let mut playable_cards = Vec::new();
        let mut playable_indices = Vec::new();
        for (index, knol) in self.hand_knowledge[self.me].iter().enumerate() {
            if let Some(card) = knol.known_card() {
                if knol.valuable(&view) == Trivalue::No && knol.playable(&view) == Trivalue::Yes {
                    playable_cards.push(card);
                    playable_indices.push(index);
                }
            }
        }
        if playable_cards.is_empty() {
            return Ok(false);
        }

        let mut others_newest = Vec::new();
        for offset in 1..self.num_players() {
            let partner = (self.me + offset) % self.num_players();
            if let Some(&newest) = server.hand_of_player(partner)?.last() {
                others_newest.push(newest);
            }
        }

        for (card, &index) in playable_cards.iter().zip(&playable_indices) {
            if others_newest.iter().filter(|&&c| c == *card).count() == 1 {
                server.please_discard(index)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn maybe_play_lowest_playable_card(&mut self, server: &mut Server) -> Result<bool> {
        let view = self.view(server);
        let mut best_index = None;
        let mut best_fitness = 0.0;
        for index in 0..self.my_hand_size {
            let knol = self.hand_knowledge[self.me][index];
            if knol.playable(&view) == Trivalue::No {
                continue;
            }
            // Prefer a card nobody else knows I know is playable, so a hint
            // is not wasted on it; otherwise play low.
            let mut eye_knol = knol;
            eye_knol.rule_out_exhausted(&view, &self.eyesight_count);
            if eye_knol.playable(&view) != Trivalue::Yes {
                continue;
            }
            let eye_value = eye_knol
                .identity()
                .1
                .map(|value| value.as_usize() as f64)
                .unwrap_or(-1.0);
            let mut fitness = 6.0 - eye_value;
            if knol.playable(&view) != Trivalue::Yes {
                fitness += 100.0;
            }
            if fitness > best_fitness {
                best_index = Some(index);
                best_fitness = fitness;
            }
        }
        if let Some(index) = best_index {
            server.please_play(index)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn maybe_give_helpful_hint(&mut self, server: &mut Server) -> Result<bool> {
        if server.hint_stones_remaining() == 0 {
            return Ok(false);
        }
        let mut best = Hint::none(0);
        for offset in 1..self.num_players() {
            let partner = (self.me + offset) % self.num_players();
            let candidate = self.best_hint_for_player(server, partner)?;
            if candidate.fitness > best.fitness {
                best = candidate;
            }
        }
        if best.fitness <= 0 {
            return Ok(false);
        }
        best.give(server)?;
        Ok(true)
    }

    fn maybe_play_mystery_card(&mut self, server: &mut Server) -> Result<bool> {
        // With the deck nearly gone and mulligans to spare, forcing a draw
        // with a hopeful play beats temporizing.
        const TABLE: [i64; 4] = [-99, 1, 1, 3];
        if (server.cards_remaining_in_deck() as i64)
            > TABLE[server.mulligans_remaining().min(3)]
        {
            return Ok(false);
        }
        let view = self.view(server);
        let mut best_fitness = 0.0;
        let mut best_index = None;
        for index in (0..self.hand_knowledge[self.me].len()).rev() {
            let mut eye_knol = self.hand_knowledge[self.me][index];
            eye_knol.rule_out_exhausted(&view, &self.eyesight_count);
            if eye_knol.playable(&view) == Trivalue::Maybe {
                let fitness = eye_knol.probability_playable(&view);
                if fitness > best_fitness {
                    best_fitness = fitness;
                    best_index = Some(index);
                }
            }
        }
        if let Some(index) = best_index {
            server.please_play(index)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn maybe_discard_worthless_card(&mut self, server: &mut Server) -> Result<bool> {
        let view = self.view(server);
        let mut best_index = None;
        let mut best_fitness = 0.0;
        for index in 0..self.my_hand_size {
            let knol = self.hand_knowledge[self.me][index];
            if knol.worthless(&view) == Trivalue::No {
                continue;
            }
            if knol.worthless(&view) == Trivalue::Maybe {
                let mut eye_knol = knol;
                eye_knol.rule_out_exhausted(&view, &self.eyesight_count);
                if eye_knol.worthless(&view) != Trivalue::Yes {
                    continue;
                }
            }
            // prefer the copy nobody else knows I can place
            let fitness = 2.0 - knol.probability_worthless(&view);
            if fitness > best_fitness {
                best_index = Some(index);
                best_fitness = fitness;
            }
        }
        if let Some(index) = best_index {
            server.please_discard(index)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn maybe_discard_old_card(&mut self, server: &mut Server) -> Result<bool> {
        let view = self.view(server);
        if let Some(index) = self.next_discard_index(&view, self.me) {
            server.please_discard(index)?;
            return Ok(true);
        }
        Ok(false)
    }
}

impl Bot for SmartBot {
    fn observe_before_move(&mut self, server: &Server) -> Result<()> {
        debug_assert_eq!(server.who_am_i(), self.me);
        self.my_hand_size = server.size_of_hand_of_player(self.me)?;

        if !self.permissive {
            for player in 0..self.num_players() {
                debug_assert_eq!(
                    self.hand_knowledge[player].len(),
                    server.size_of_hand_of_player(player)?
                );
            }
        }

        // Propagate located-card knowledge to a fixpoint: each newly
        // identified card can rule out possibilities elsewhere.
        self.located_count = [[0; NUM_VALUES]; NUM_COLORS];
        self.update_located_count();
        loop {
            let view = self.view(server);
            let located = self.located_count;
            for knols in self.hand_knowledge.iter_mut() {
                for knol in knols.iter_mut() {
                    knol.rule_out_exhausted(&view, &located);
                }
            }
            if !self.update_located_count() {
                break;
            }
        }

        self.update_eyesight_count(server)?;

        if !self.permissive {
            for color in Color::ALL {
                for value in Value::ALL {
                    let card = Card::new(color, value);
                    debug_assert!(
                        count_of(&self.located_count, card) <= count_of(&self.eyesight_count, card)
                    );
                }
            }
        }
        Ok(())
    }

    fn make_move(&mut self, server: &mut Server) -> Result<()> {
        debug_assert_eq!(server.who_am_i(), self.me);
        debug_assert_eq!(server.active_player(), self.me);

        if server.cards_remaining_in_deck() == 0 {
            if self.maybe_play_lowest_playable_card(server)? {
                return Ok(());
            }
            if self.maybe_play_mystery_card(server)? {
                return Ok(());
            }
        }
        if self.maybe_give_valuable_warning(server)? {
            return Ok(());
        }
        if self.maybe_discard_finesse(server)? {
            return Ok(());
        }
        if self.maybe_play_lowest_playable_card(server)? {
            return Ok(());
        }
        if self.maybe_give_helpful_hint(server)? {
            return Ok(());
        }
        if self.maybe_play_mystery_card(server)? {
            return Ok(());
        }

        if !server.discarding_is_allowed() {
            // Cannot discard with a full hint pool; burn a stone on the
            // right-hand partner's oldest card instead. Deep in the endgame
            // a partner's hand may already be empty, so walk right to left
            // for one that still holds cards.
            let num_players = server.num_players();
            for offset in 1..num_players {
                let partner = (self.me + num_players - offset) % num_players;
                if let Some(card) = server.hand_of_player(partner)?.first() {
                    return server.please_give_value_hint(partner, card.value);
                }
            }
            server.please_play(0)
        } else {
            if self.maybe_discard_worthless_card(server)? {
                return Ok(());
            }
            if self.maybe_discard_old_card(server)? {
                return Ok(());
            }
            if self.my_hand_size == 0 {
                // nothing left to shed; spend a stone instead
                for offset in 1..server.num_players() {
                    let partner = (self.me + offset) % server.num_players();
                    if let Some(card) = server.hand_of_player(partner)?.first() {
                        return server.please_give_value_hint(partner, card.value);
                    }
                }
            }
            // The whole hand looks valuable; shed the card that blocks the
            // least progress.
            let mut best_index = 0;
            let mut best_value = -1i64;
            for index in 0..self.my_hand_size {
                let value = self.hand_knowledge[self.me][index]
                    .identity()
                    .1
                    .map(|value| value.as_usize() as i64)
                    .unwrap_or(-1);
                if value > best_value {
                    best_value = value;
                    best_index = index;
                }
            }
            server.please_discard(best_index)
        }
    }

    fn observe_before_discard(
        &mut self,
        server: &Server,
        from: usize,
        card_index: usize,
    ) -> Result<()> {
        debug_assert_eq!(server.who_am_i(), self.me);
        let card = server.active_card()?;

        self.no_valuable_warning_was_given(server, from);

        let view = self.view(server);
        let knol = self.hand_knowledge[from][card_index];
        if knol.known() && knol.playable(&view) == Trivalue::Yes {
            // A knowing discard of a playable card is a finesse: the same
            // card is someone's newest. If I cannot see it, it is mine.
            let mut seen_it = false;
            for partner in 0..self.num_players() {
                if partner == from || partner == self.me {
                    continue;
                }
                if server.hand_of_player(partner)?.last() == Some(&card) {
                    if let Some(newest) = self.hand_knowledge[partner].last_mut() {
                        newest.set_must_be_color(card.color);
                        newest.set_must_be_value(card.value);
                    }
                    seen_it = true;
                    break;
                }
            }
            if !seen_it {
                if let Some(newest) = self.hand_knowledge[self.me].last_mut() {
                    newest.set_must_be_color(card.color);
                    newest.set_must_be_value(card.value);
                }
            }
        }

        self.see_public_card(card);
        self.invalidate_knol(from, card_index, server.cards_remaining_in_deck() != 0);
        Ok(())
    }

    fn observe_before_play(
        &mut self,
        server: &Server,
        from: usize,
        card_index: usize,
    ) -> Result<()> {
        debug_assert_eq!(server.who_am_i(), self.me);
        let card = server.active_card()?;

        self.no_valuable_warning_was_given(server, from);

        self.see_public_card(card);
        self.invalidate_knol(from, card_index, server.cards_remaining_in_deck() != 0);
        Ok(())
    }

    fn observe_color_hint(
        &mut self,
        server: &Server,
        from: usize,
        to: usize,
        color: Color,
        card_indices: CardIndices,
    ) -> Result<()> {
        debug_assert_eq!(server.who_am_i(), self.me);

        // By convention a color hint says the newest (possibly) playable
        // touched card is playable right now.
        let view = self.view(server);
        let num_cards = server.size_of_hand_of_player(to)?;
        let mut identified_playable = false;
        let mut inferred_playable_index = None;
        for index in (0..num_cards).rev() {
            let knol = &mut self.hand_knowledge[to][index];
            let was_maybe_playable = knol.playable(&view) == Trivalue::Maybe;
            if card_indices.contains(index) {
                knol.set_must_be_color(color);
                if was_maybe_playable {
                    match knol.playable(&view) {
                        Trivalue::Yes => identified_playable = true,
                        Trivalue::Maybe => {
                            if inferred_playable_index.is_none() {
                                inferred_playable_index = Some(index);
                            }
                        }
                        Trivalue::No => {}
                    }
                }
            } else {
                knol.set_cannot_be_color(color);
                if was_maybe_playable && knol.playable(&view) == Trivalue::Yes {
                    identified_playable = true;
                }
            }
        }
        if !identified_playable {
            if let Some(index) = inferred_playable_index {
                self.hand_knowledge[to][index].set_is_playable(&view, true);
            }
        }

        let player_expecting_warning = (from + 1) % self.num_players();
        if to != player_expecting_warning {
            self.no_valuable_warning_was_given(server, from);
        }
        Ok(())
    }

    fn observe_value_hint(
        &mut self,
        server: &Server,
        from: usize,
        to: usize,
        value: Value,
        card_indices: CardIndices,
    ) -> Result<()> {
        debug_assert_eq!(server.who_am_i(), self.me);

        // A value hint touching the card its receiver was about to discard
        // is a warning that the card is valuable; otherwise it works like a
        // color hint. A forced hint at full stones carries no meaning.
        let view = self.view(server);
        let player_expecting_warning = (from + 1) % self.num_players();
        let discard_index = self.next_discard_index(&view, player_expecting_warning);

        let is_hint_stone_reclaim = !server.discarding_is_allowed()
            && from == (to + 1) % server.num_players()
            && card_indices.contains(0);
        let is_warning = !is_hint_stone_reclaim
            && to == player_expecting_warning
            && discard_index.is_some_and(|index| {
                card_indices.contains(index)
                    && self.hand_knowledge[to][index]
                        .could_be_valuable_with_value(&view, value.as_usize())
            });

        if is_warning {
            let index = discard_index.expect("warning implies a discard target");
            self.hand_knowledge[to][index].set_is_valuable(&view, true);
        }

        let num_cards = server.size_of_hand_of_player(to)?;
        let mut identified_playable = false;
        let mut inferred_playable_index = None;
        for index in (0..num_cards).rev() {
            let knol = &mut self.hand_knowledge[to][index];
            let was_maybe_playable = knol.playable(&view) == Trivalue::Maybe;
            if card_indices.contains(index) {
                knol.set_must_be_value(value);
                if was_maybe_playable {
                    match knol.playable(&view) {
                        Trivalue::Yes => identified_playable = true,
                        Trivalue::Maybe => {
                            if inferred_playable_index.is_none() {
                                inferred_playable_index = Some(index);
                            }
                        }
                        Trivalue::No => {}
                    }
                }
            } else {
                knol.set_cannot_be_value(value);
                if was_maybe_playable && knol.playable(&view) == Trivalue::Yes {
                    identified_playable = true;
                }
            }
        }
        if !is_warning && !is_hint_stone_reclaim && !identified_playable {
            if let Some(index) = inferred_playable_index {
                self.hand_knowledge[to][index].set_is_playable(&view, true);
            }
        }
        if to != player_expecting_warning {
            debug_assert!(!is_warning);
            self.no_valuable_warning_was_given(server, from);
        }
        Ok(())
    }

    fn observe_after_move(&mut self, server: &Server) -> Result<()> {
        debug_assert_eq!(server.who_am_i(), self.me);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Bot> {
        Box::new(self.clone())
    }

    fn set_permissive(&mut self, permissive: bool) {
        self.permissive = permissive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hanabi_core::config::Rules;
    use hanabi_core::model::Move;

    fn rigged(hand0: Vec<Card>, hand1: Vec<Card>, deck: Vec<Card>) -> Server {
        let mut server = Server::new(2, Rules::default());
        server.set_hand(0, hand0);
        server.set_hand(1, hand1);
        server.set_deck(deck);
        server
    }

    fn bots() -> Vec<Box<dyn Bot>> {
        vec![
            Box::new(SmartBot::new(0, 2, 5)),
            Box::new(SmartBot::new(1, 2, 5)),
        ]
    }

    fn card(color: Color, value: Value) -> Card {
        Card::new(color, value)
    }

    #[test]
    fn color_hint_marks_touched_card_playable() {
        let mut bot = SmartBot::new(0, 2, 5);
        let server = rigged(
            vec![card(Color::Green, Value::One); 5],
            vec![
                card(Color::Red, Value::One),
                card(Color::Blue, Value::Two),
                card(Color::Blue, Value::Three),
                card(Color::Green, Value::Two),
                card(Color::Green, Value::Three),
            ],
            vec![card(Color::Yellow, Value::One); 10],
        );
        let indices: CardIndices = [0].into_iter().collect();
        bot.observe_color_hint(&server, 0, 1, Color::Red, indices)
            .expect("hint observed");

        let view = bot.view(&server);
        assert_eq!(bot.hand_knowledge[1][0].playable(&view), Trivalue::Yes);
        assert!(bot.hand_knowledge[1][0].must_be_color(Color::Red));
        assert!(bot.hand_knowledge[1][1].cannot_be_color(Color::Red));
    }

    #[test]
    fn plays_a_card_hinted_playable() {
        let hand0 = vec![
            card(Color::Red, Value::One),
            card(Color::Blue, Value::Four),
            card(Color::Green, Value::Four),
            card(Color::Yellow, Value::Four),
            card(Color::Orange, Value::Four),
        ];
        let hand1 = vec![card(Color::Blue, Value::One); 5];
        let mut server = rigged(hand0, hand1, vec![card(Color::Yellow, Value::One); 10]);
        let mut player = SmartBot::new(0, 2, 5);

        // someone told us our oldest card is red
        let indices: CardIndices = [0].into_iter().collect();
        player
            .observe_color_hint(&server, 1, 0, Color::Red, indices)
            .expect("hint observed");

        server.set_observing_player(0);
        let mv = server
            .simulate_player_move(0, &mut player)
            .expect("bot proposes a move");
        assert_eq!(mv, Move::Play(0));
    }

    #[test]
    fn discards_oldest_when_nothing_is_known() {
        let hand0 = vec![
            card(Color::Red, Value::Four),
            card(Color::Blue, Value::Four),
            card(Color::Green, Value::Four),
            card(Color::Yellow, Value::Four),
            card(Color::Orange, Value::Four),
        ];
        // partner has nothing playable or warnable either
        let hand1 = vec![
            card(Color::Red, Value::Three),
            card(Color::Blue, Value::Three),
            card(Color::Green, Value::Three),
            card(Color::Yellow, Value::Three),
            card(Color::Orange, Value::Three),
        ];
        let mut server = rigged(hand0, hand1, vec![card(Color::Yellow, Value::One); 10]);
        let mut bots = bots();
        // spend one stone so discarding is legal, then ask player 0
        server
            .execute_move(
                Move::HintValue {
                    value: Value::Three,
                    to: 1,
                },
                &mut bots,
            )
            .expect("hint executes");

        let mut player = SmartBot::new(0, 2, 5);
        player.set_permissive(true);
        server.set_observing_player(0);
        let mv = server
            .simulate_player_move(0, &mut player)
            .expect("bot proposes a move");
        assert!(matches!(mv, Move::Discard(_) | Move::HintColor { .. } | Move::HintValue { .. }));
    }

    #[test]
    fn full_game_between_smartbots_is_deterministic_and_scores() {
        let run = |seed: u64| -> (usize, String) {
            let mut server = Server::new(2, Rules::default());
            server.seed(seed);
            let mut players = bots();
            let score = server.run_game(&mut players, None).expect("game completes");
            (score, server.discards_as_string())
        };
        let (score_a, discards_a) = run(7);
        let (score_b, discards_b) = run(7);
        assert_eq!(score_a, score_b);
        assert_eq!(discards_a, discards_b);
        assert!(score_a > 5, "blueprint play should beat random: {score_a}");
    }

    #[test]
    fn clone_is_independent() {
        let mut original = SmartBot::new(0, 2, 5);
        let cloned = original.clone();
        original.see_public_card(card(Color::Red, Value::One));
        assert_eq!(
            count_of(&original.played_count, card(Color::Red, Value::One)),
            1
        );
        assert_eq!(
            count_of(&cloned.played_count, card(Color::Red, Value::One)),
            0
        );
    }
}
