use crate::model::card::{Card, NUM_COLORS, NUM_VALUES};
use rand::RngCore;

/// Remaining count per (color, value), indexed by `Card::index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeckComposition {
    counts: [u8; NUM_COLORS * NUM_VALUES],
}

impl DeckComposition {
    /// Composition of a fresh 50-card deck.
    pub fn full() -> Self {
        let mut counts = [0u8; NUM_COLORS * NUM_VALUES];
        for (index, slot) in counts.iter_mut().enumerate() {
            let card = Card::from_index(index).expect("card index in range");
            *slot = card.multiplicity() as u8;
        }
        Self { counts }
    }

    pub fn empty() -> Self {
        Self {
            counts: [0u8; NUM_COLORS * NUM_VALUES],
        }
    }

    pub fn count(&self, card: Card) -> usize {
        self.counts[card.index()] as usize
    }

    pub fn add(&mut self, card: Card) {
        self.counts[card.index()] += 1;
    }

    pub fn remove(&mut self, card: Card) {
        debug_assert!(
            self.counts[card.index()] > 0,
            "removing {card} from an exhausted composition"
        );
        self.counts[card.index()] = self.counts[card.index()].saturating_sub(1);
    }

    pub fn add_all(&mut self, cards: &[Card]) {
        for &card in cards {
            self.add(card);
        }
    }

    pub fn remove_all(&mut self, cards: &[Card]) {
        for &card in cards {
            self.remove(card);
        }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|&count| count as usize).sum()
    }

    /// Iterates (card, count) pairs in card-index order, including zeros.
    pub fn iter(&self) -> impl Iterator<Item = (Card, usize)> + '_ {
        self.counts.iter().enumerate().map(|(index, &count)| {
            let card = Card::from_index(index).expect("card index in range");
            (card, count as usize)
        })
    }

    /// Expands the composition into a concrete card vector in index order.
    pub fn expand(&self) -> Vec<Card> {
        let mut cards = Vec::with_capacity(self.total());
        for (card, count) in self.iter() {
            for _ in 0..count {
                cards.push(card);
            }
        }
        cards
    }

    pub fn as_counts(&self) -> [u8; NUM_COLORS * NUM_VALUES] {
        self.counts
    }
}

/// The full 50-card deck in card-index order.
pub fn full_deck() -> Vec<Card> {
    DeckComposition::full().expand()
}

/// The reference Fisher-Yates shuffle: `j = g() % (i + 1)` over the raw
/// `next_u32` stream, so a seed fully determines the permutation.
pub fn portable_shuffle<T, R: RngCore + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in 0..items.len() {
        let j = (rng.next_u32() as usize) % (i + 1);
        if j != i {
            items.swap(i, j);
        }
    }
}
