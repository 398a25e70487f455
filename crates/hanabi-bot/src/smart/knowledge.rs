//! Per-card knowledge tables.
//!
//! Each card slot carries a cant-be grid over the 25 card kinds. Everything
//! else (identity, playability, value) is derived on demand from the grid
//! plus a copied table view of the public state, so knowledge can be cloned
//! and speculatively constrained without back-references.

use hanabi_core::game::server::Server;
use hanabi_core::model::{Card, Color, Value, NUM_COLORS, NUM_VALUES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trivalue {
    No,
    Maybe,
    Yes,
}

/// Counts per (color, value), `[color][value - 1]`.
pub(crate) type CountTable = [[u8; NUM_VALUES]; NUM_COLORS];

pub(crate) fn count_of(table: &CountTable, card: Card) -> u8 {
    table[card.color.index()][card.value.as_usize() - 1]
}

pub(crate) fn bump(table: &mut CountTable, card: Card) {
    table[card.color.index()][card.value.as_usize() - 1] += 1;
}

/// A value snapshot of the public state that card classification needs:
/// pile heights and how many of each card are gone for good.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableView {
    pub piles: [usize; NUM_COLORS],
    pub played: CountTable,
    pub permissive: bool,
}

impl TableView {
    pub fn from_server(server: &Server, played: &CountTable, permissive: bool) -> Self {
        let mut piles = [0usize; NUM_COLORS];
        for color in Color::ALL {
            piles[color.index()] = server.pile_of(color).size();
        }
        Self {
            piles,
            played: *played,
            permissive,
        }
    }

    pub fn is_playable(&self, card: Card) -> bool {
        card.value.as_usize() == self.piles[card.color.index()] + 1
    }

    /// The last surviving copy of a not-yet-played, still-reachable card.
    pub fn is_valuable(&self, card: Card) -> bool {
        if count_of(&self.played, card) as usize != card.multiplicity() - 1 {
            return false;
        }
        !self.is_worthless(card)
    }

    /// Already played, or unreachable because a lower value is exhausted.
    pub fn is_worthless(&self, card: Card) -> bool {
        let playable_value = self.piles[card.color.index()] + 1;
        if card.value.as_usize() < playable_value {
            return true;
        }
        let mut value = card.value.as_usize();
        while value > playable_value {
            value -= 1;
            let below = Card::new(
                card.color,
                Value::from_usize(value).expect("value in range"),
            );
            if count_of(&self.played, below) as usize == below.multiplicity() {
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CardKnowledge {
    cant_be: [[bool; NUM_VALUES]; NUM_COLORS],
}

impl Default for CardKnowledge {
    fn default() -> Self {
        Self::new()
    }
}

impl CardKnowledge {
    pub fn new() -> Self {
        Self {
            cant_be: [[false; NUM_VALUES]; NUM_COLORS],
        }
    }

    fn possible(&self, card: Card) -> bool {
        !self.cant_be[card.color.index()][card.value.as_usize() - 1]
    }

    fn rule_out(&mut self, card: Card) {
        self.cant_be[card.color.index()][card.value.as_usize() - 1] = true;
    }

    fn possible_cards(&self) -> impl Iterator<Item = Card> + '_ {
        Color::ALL.into_iter().flat_map(move |color| {
            Value::ALL
                .into_iter()
                .map(move |value| Card::new(color, value))
                .filter(|&card| self.possible(card))
        })
    }

    /// Unique color/value when determined; `None` when ambiguous or (in
    /// permissive degradation) when nothing remains possible.
    pub fn identity(&self) -> (Option<Color>, Option<Value>) {
        let mut color = None;
        let mut value = None;
        let mut color_conflict = false;
        let mut value_conflict = false;
        for card in self.possible_cards() {
            match color {
                None => color = Some(card.color),
                Some(seen) if seen != card.color => color_conflict = true,
                _ => {}
            }
            match value {
                None => value = Some(card.value),
                Some(seen) if seen != card.value => value_conflict = true,
                _ => {}
            }
        }
        (
            if color_conflict { None } else { color },
            if value_conflict { None } else { value },
        )
    }

    pub fn known(&self) -> bool {
        let (color, value) = self.identity();
        color.is_some() && value.is_some()
    }

    pub fn known_card(&self) -> Option<Card> {
        match self.identity() {
            (Some(color), Some(value)) => Some(Card::new(color, value)),
            _ => None,
        }
    }

    pub fn must_be_color(&self, color: Color) -> bool {
        self.identity().0 == Some(color)
    }

    pub fn must_be_value(&self, value: Value) -> bool {
        self.identity().1 == Some(value)
    }

    pub fn cannot_be_card(&self, card: Card) -> bool {
        !self.possible(card)
    }

    pub fn cannot_be_color(&self, color: Color) -> bool {
        Value::ALL
            .into_iter()
            .all(|value| !self.possible(Card::new(color, value)))
    }

    pub fn cannot_be_value(&self, value: Value) -> bool {
        Color::ALL
            .into_iter()
            .all(|color| !self.possible(Card::new(color, value)))
    }

    /// Count of still-possible cards; degrades to the documented fallback of
    /// 10 when a confused (permissive) bot has ruled everything out.
    pub fn possibilities(&self, permissive: bool) -> usize {
        let count = self.possible_cards().count();
        if count == 0 {
            debug_assert!(permissive);
            return 10;
        }
        count
    }

    pub fn set_must_be_color(&mut self, color: Color) {
        for other in Color::ALL {
            if other == color {
                continue;
            }
            for value in Value::ALL {
                self.rule_out(Card::new(other, value));
            }
        }
    }

    pub fn set_must_be_value(&mut self, value: Value) {
        for color in Color::ALL {
            for other in Value::ALL {
                if other != value {
                    self.rule_out(Card::new(color, other));
                }
            }
        }
    }

    pub fn set_must_be_card(&mut self, card: Card) {
        self.set_must_be_color(card.color);
        self.set_must_be_value(card.value);
    }

    pub fn set_cannot_be_color(&mut self, color: Color) {
        for value in Value::ALL {
            self.rule_out(Card::new(color, value));
        }
    }

    pub fn set_cannot_be_value(&mut self, value: Value) {
        for color in Color::ALL {
            self.rule_out(Card::new(color, value));
        }
    }

    fn classify<F: Fn(Card) -> bool>(&self, view: &TableView, predicate: F) -> (Trivalue, f64) {
        let mut total = 0usize;
        let mut yes = 0usize;
        for card in self.possible_cards() {
            total += 1;
            if predicate(card) {
                yes += 1;
            }
        }
        if total == 0 {
            debug_assert!(view.permissive);
            return (Trivalue::Maybe, 0.5);
        }
        let tri = if yes == total {
            Trivalue::Yes
        } else if yes > 0 {
            Trivalue::Maybe
        } else {
            Trivalue::No
        };
        (tri, yes as f64 / total as f64)
    }

    pub(crate) fn playable(&self, view: &TableView) -> Trivalue {
        self.classify(view, |card| view.is_playable(card)).0
    }

    pub(crate) fn probability_playable(&self, view: &TableView) -> f64 {
        self.classify(view, |card| view.is_playable(card)).1
    }

    pub(crate) fn valuable(&self, view: &TableView) -> Trivalue {
        self.classify(view, |card| view.is_valuable(card)).0
    }

    pub(crate) fn worthless(&self, view: &TableView) -> Trivalue {
        self.classify(view, |card| view.is_worthless(card)).0
    }

    pub(crate) fn probability_worthless(&self, view: &TableView) -> f64 {
        self.classify(view, |card| view.is_worthless(card)).1
    }

    pub(crate) fn set_is_playable(&mut self, view: &TableView, known_playable: bool) {
        let cards: Vec<Card> = self.possible_cards().collect();
        for card in cards {
            if view.is_playable(card) != known_playable {
                self.rule_out(card);
            }
        }
    }

    pub(crate) fn set_is_valuable(&mut self, view: &TableView, known_valuable: bool) {
        let cards: Vec<Card> = self.possible_cards().collect();
        for card in cards {
            if view.is_valuable(card) != known_valuable {
                self.rule_out(card);
            }
        }
    }

    pub(crate) fn could_be_playable_with_value(&self, view: &TableView, value: usize) -> bool {
        let Some(value) = Value::from_usize(value) else {
            return false;
        };
        if self.cannot_be_value(value) || self.playable(view) != Trivalue::Maybe {
            return false;
        }
        let mut constrained = *self;
        constrained.set_must_be_value(value);
        constrained.playable(view) != Trivalue::No
    }

    pub(crate) fn could_be_valuable_with_value(&self, view: &TableView, value: usize) -> bool {
        let Some(value) = Value::from_usize(value) else {
            return false;
        };
        if self.cannot_be_value(value) || self.valuable(view) != Trivalue::Maybe {
            return false;
        }
        let mut constrained = *self;
        constrained.set_must_be_value(value);
        constrained.valuable(view) != Trivalue::No
    }

    /// Rules out cards whose copies are all accounted for between the played
    /// table and `held` (either publicly located cards or everything the
    /// observer can see). Identified cards are exempt: they are themselves
    /// part of the held table.
    pub(crate) fn rule_out_exhausted(&mut self, view: &TableView, held: &CountTable) {
        if self.known() {
            return;
        }
        let cards: Vec<Card> = self.possible_cards().collect();
        for card in cards {
            let total = card.multiplicity();
            let played = count_of(&view.played, card) as usize;
            let held_count = count_of(held, card) as usize;
            debug_assert!(played + held_count <= total || view.permissive);
            if played + held_count >= total {
                self.rule_out(card);
            }
        }
    }
}
