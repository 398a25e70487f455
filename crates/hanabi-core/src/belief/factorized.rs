//! Factorized per-slot card beliefs ("V0" beliefs).
//!
//! A cheap summary of public knowledge about one player's hand: for each
//! slot, a 2-bit remaining count per card, plus per-slot bitsets of which
//! color and rank hints have touched it. Normalized to probabilities only on
//! query. Exact conditioning lives in the full hand distribution; this table
//! is what gets dumped alongside belief-failure diagnostics.

use crate::game::error::{Result, ServerError};
use crate::game::server::Server;
use crate::model::{Card, CardIndices, DeckComposition, Move, NUM_COLORS, NUM_VALUES};

const NUM_CARDS: usize = NUM_COLORS * NUM_VALUES;
const MAX_SLOTS: usize = 5;

/// 32 two-bit counters packed into a u64.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwoBitArray {
    bits: u64,
}

impl TwoBitArray {
    pub fn get(&self, index: usize) -> u8 {
        debug_assert!(index < 32);
        ((self.bits >> (index * 2)) & 0x3) as u8
    }

    pub fn set(&mut self, index: usize, value: u8) {
        debug_assert!(index < 32);
        debug_assert!(value < 4);
        self.bits =
            (self.bits & !(0x3u64 << (index * 2))) | ((value as u64 & 0x3) << (index * 2));
    }
}

#[derive(Debug, Clone)]
pub struct FactorizedBeliefs {
    counts: [TwoBitArray; MAX_SLOTS],
    color_revealed: TwoBitArray,
    rank_revealed: TwoBitArray,
    hand_size: usize,
    player: usize,
}

impl FactorizedBeliefs {
    pub fn new(server: &Server, player: usize) -> Result<Self> {
        let public_deck = server.deck_composition(None)?;
        let mut counts = [TwoBitArray::default(); MAX_SLOTS];
        for slot in 0..MAX_SLOTS {
            for index in 0..NUM_CARDS {
                let card = Card::from_index(index).expect("card index in range");
                let count = if slot < server.hand_size() {
                    public_deck.count(card) as u8
                } else {
                    0
                };
                counts[slot].set(index, count);
            }
        }
        Ok(Self {
            counts,
            color_revealed: TwoBitArray::default(),
            rank_revealed: TwoBitArray::default(),
            hand_size: server.size_of_hand_of_player(player)?,
            player,
        })
    }

    pub fn player(&self) -> usize {
        self.player
    }

    /// Zero out cards inconsistent with the hint, slot by slot, and record
    /// which attribute each touched slot had revealed. Untouched slots are
    /// negatively informed.
    pub fn update_from_hint(
        &mut self,
        mv: Move,
        card_indices: CardIndices,
        server: &Server,
    ) -> Result<()> {
        self.hand_size = server.size_of_hand_of_player(self.player)?;
        for index in 0..NUM_CARDS {
            let card = Card::from_index(index).expect("card index in range");
            let matches = match mv {
                Move::HintColor { color, .. } => card.color == color,
                Move::HintValue { value, .. } => card.value == value,
                Move::Play(_) | Move::Discard(_) => return Ok(()),
            };
            for slot in 0..self.hand_size {
                let consistent = if card_indices.contains(slot) {
                    matches
                } else {
                    !matches
                };
                if !consistent {
                    self.counts[slot].set(index, 0);
                }
            }
        }
        match mv {
            Move::HintColor { color, .. } => {
                for slot in 0..self.hand_size {
                    if card_indices.contains(slot) {
                        self.color_revealed.set(slot * NUM_COLORS + color.index(), 1);
                    }
                }
            }
            Move::HintValue { value, .. } => {
                for slot in 0..self.hand_size {
                    if card_indices.contains(slot) {
                        self.rank_revealed
                            .set(slot * NUM_VALUES + value.as_usize() - 1, 1);
                    }
                }
            }
            Move::Play(_) | Move::Discard(_) => {}
        }
        Ok(())
    }

    /// A copy of `played_card` left circulation; `deck` is the public
    /// composition after the play, so slot counts drop to the new remaining.
    pub fn update_from_revealed_card(&mut self, played_card: Card, deck: &DeckComposition) {
        let card_index = played_card.index();
        let remaining = deck.count(played_card) as u8;
        for slot in 0..self.hand_size {
            let count = self.counts[slot].get(card_index);
            debug_assert!(count == remaining + 1 || count == 0);
            if count != 0 {
                self.counts[slot].set(card_index, remaining);
            }
        }
    }

    /// The player's slot `card_index` left their hand: shift later slots
    /// down and open a fresh slot (or nil the last one when the deck is dry).
    pub fn update_from_draw(
        &mut self,
        deck: &DeckComposition,
        card_index: usize,
        server: &Server,
    ) -> Result<()> {
        self.hand_size = server.size_of_hand_of_player(self.player)?;
        let full_size = server.hand_size();

        for slot in card_index..self.hand_size.min(full_size - 1) {
            self.counts[slot] = self.counts[slot + 1];
            for attr in 0..NUM_COLORS {
                self.color_revealed.set(
                    slot * NUM_COLORS + attr,
                    self.color_revealed.get((slot + 1) * NUM_COLORS + attr),
                );
                self.rank_revealed.set(
                    slot * NUM_VALUES + attr,
                    self.rank_revealed.get((slot + 1) * NUM_VALUES + attr),
                );
            }
        }

        if self.hand_size == full_size {
            // a fresh draw lands in the newest slot; nothing revealed yet
            let newest = self.hand_size - 1;
            for index in 0..NUM_CARDS {
                self.counts[newest].set(index, 0);
            }
            for (card, count) in deck.iter() {
                self.counts[newest].set(card.index(), count as u8);
            }
            for attr in 0..NUM_COLORS {
                self.color_revealed.set(newest * NUM_COLORS + attr, 0);
                self.rank_revealed.set(newest * NUM_VALUES + attr, 0);
            }
        } else {
            debug_assert!(self.hand_size < full_size);
            for index in 0..NUM_CARDS {
                self.counts[self.hand_size].set(index, 0);
            }
            for attr in 0..NUM_COLORS {
                self.color_revealed.set(self.hand_size * NUM_COLORS + attr, 0);
                self.rank_revealed.set(self.hand_size * NUM_VALUES + attr, 0);
            }
        }
        Ok(())
    }

    /// Per-slot probabilities, normalized on query; slots past the current
    /// hand size are zero.
    pub fn probabilities(&self) -> Result<[[f32; NUM_CARDS]; MAX_SLOTS]> {
        let mut out = [[0.0f32; NUM_CARDS]; MAX_SLOTS];
        for slot in 0..self.hand_size {
            let total: u32 = (0..NUM_CARDS)
                .map(|index| self.counts[slot].get(index) as u32)
                .sum();
            if total == 0 {
                return Err(ServerError::EmptyDistribution);
            }
            for index in 0..NUM_CARDS {
                out[slot][index] = self.counts[slot].get(index) as f32 / total as f32;
            }
        }
        Ok(out)
    }

    pub fn color_revealed(&self, slot: usize, color: crate::model::Color) -> bool {
        self.color_revealed.get(slot * NUM_COLORS + color.index()) != 0
    }

    pub fn rank_revealed(&self, slot: usize, value: crate::model::Value) -> bool {
        self.rank_revealed.get(slot * NUM_VALUES + value.as_usize() - 1) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::TwoBitArray;

    #[test]
    fn two_bit_array_roundtrips_all_counts() {
        let mut array = TwoBitArray::default();
        for index in 0..32 {
            array.set(index, (index % 4) as u8);
        }
        for index in 0..32 {
            assert_eq!(array.get(index), (index % 4) as u8);
        }
        array.set(7, 0);
        assert_eq!(array.get(7), 0);
        assert_eq!(array.get(6), 2);
        assert_eq!(array.get(8), 0);
    }
}
