use core::fmt;
use serde::{Deserialize, Serialize};

use crate::model::card::{Color, Value, NUM_COLORS, NUM_VALUES};

/// One of the four legal actions. The derived ordering (variant, then value,
/// then target) is the canonical total order used by search statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Move {
    Play(usize),
    Discard(usize),
    HintColor { color: Color, to: usize },
    HintValue { value: Value, to: usize },
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Move::Play(index) => write!(f, "Play {index}"),
            Move::Discard(index) => write!(f, "Discard {index}"),
            Move::HintColor { color, to } => write!(f, "Hint {} to player {to}", color.name()),
            Move::HintValue { value, to } => write!(f, "Hint {value} to player {to}"),
        }
    }
}

/// Which hand positions a hint touched, as a bitmask over slots 0..8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardIndices {
    mask: u32,
}

impl CardIndices {
    pub const fn new() -> Self {
        Self { mask: 0 }
    }

    pub fn add(&mut self, index: usize) {
        debug_assert!(index < 8);
        self.mask |= 1 << index;
    }

    pub fn contains(&self, index: usize) -> bool {
        index < 8 && self.mask & (1 << index) != 0
    }

    pub fn len(&self) -> usize {
        self.mask.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..8).filter(|&index| self.contains(index))
    }
}

impl FromIterator<usize> for CardIndices {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut indices = CardIndices::new();
        for index in iter {
            indices.add(index);
        }
        indices
    }
}

/// Packs a move into the canonical wire index, numbered relative to `me`:
/// discards, then plays, then color hints, then value hints.
pub fn move_to_index(mv: Move, hand_size: usize, num_players: usize, me: usize) -> usize {
    let target_offset = |to: usize| (to + num_players - me) % num_players;
    match mv {
        Move::Discard(index) => index,
        Move::Play(index) => index + hand_size,
        Move::HintColor { color, to } => {
            (target_offset(to) - 1) * NUM_COLORS + color.index() + 2 * hand_size
        }
        Move::HintValue { value, to } => {
            (target_offset(to) - 1) * NUM_VALUES + (value.as_usize() - 1)
                + 2 * hand_size
                + (num_players - 1) * NUM_COLORS
        }
    }
}

/// Inverse of [`move_to_index`]; `None` when the index is out of range.
pub fn index_to_move(
    index: usize,
    hand_size: usize,
    num_players: usize,
    me: usize,
) -> Option<Move> {
    let from_offset = |offset: usize| (me + offset + 1) % num_players;
    if index < hand_size {
        return Some(Move::Discard(index));
    }
    let index = index - hand_size;
    if index < hand_size {
        return Some(Move::Play(index));
    }
    let index = index - hand_size;
    let color_block = (num_players - 1) * NUM_COLORS;
    if index < color_block {
        let color = Color::from_index(index % NUM_COLORS)?;
        return Some(Move::HintColor {
            color,
            to: from_offset(index / NUM_COLORS),
        });
    }
    let index = index - color_block;
    if index < (num_players - 1) * NUM_VALUES {
        let value = Value::from_usize(index % NUM_VALUES + 1)?;
        return Some(Move::HintValue {
            value,
            to: from_offset(index / NUM_VALUES),
        });
    }
    None
}
