use core::fmt;
use serde::{Deserialize, Serialize};

/// Firework colors. Bots may assume these correspond to the indices 0..4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Color {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
}

pub const NUM_COLORS: usize = 5;
pub const NUM_VALUES: usize = 5;

impl Color {
    pub const ALL: [Color; NUM_COLORS] = [
        Color::Red,
        Color::Orange,
        Color::Yellow,
        Color::Green,
        Color::Blue,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Color::Red),
            1 => Some(Color::Orange),
            2 => Some(Color::Yellow),
            3 => Some(Color::Green),
            4 => Some(Color::Blue),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Orange => "orange",
            Color::Yellow => "yellow",
            Color::Green => "green",
            Color::Blue => "blue",
        }
    }

    pub const fn letter(self) -> char {
        match self {
            Color::Red => 'r',
            Color::Orange => 'o',
            Color::Yellow => 'y',
            Color::Green => 'g',
            Color::Blue => 'b',
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Card values. Bots may assume these correspond to their integer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
    Five = 5,
}

impl Value {
    pub const ALL: [Value; NUM_VALUES] =
        [Value::One, Value::Two, Value::Three, Value::Four, Value::Five];

    pub const fn as_usize(self) -> usize {
        self as usize
    }

    pub const fn from_usize(value: usize) -> Option<Self> {
        match value {
            1 => Some(Value::One),
            2 => Some(Value::Two),
            3 => Some(Value::Three),
            4 => Some(Value::Four),
            5 => Some(Value::Five),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_usize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Card {
    pub color: Color,
    pub value: Value,
}

impl Card {
    pub const fn new(color: Color, value: Value) -> Self {
        Self { color, value }
    }

    /// Number of copies of this card in a fresh deck.
    pub const fn multiplicity(self) -> usize {
        match self.value {
            Value::One => 3,
            Value::Two | Value::Three | Value::Four => 2,
            Value::Five => 1,
        }
    }

    /// Unique ID in 0..25: color-major, then value.
    pub const fn index(self) -> usize {
        self.color.index() * NUM_VALUES + (self.value.as_usize() - 1)
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        if index >= NUM_COLORS * NUM_VALUES {
            return None;
        }
        let color = match Color::from_index(index / NUM_VALUES) {
            Some(c) => c,
            None => return None,
        };
        let value = match Value::from_usize(index % NUM_VALUES + 1) {
            Some(v) => v,
            None => return None,
        };
        Some(Card::new(color, value))
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.color)
    }
}

/// An ordered hand; index 0 is the oldest card, the last index the newest.
pub type Hand = Vec<Card>;

pub fn hand_as_string(hand: &[Card]) -> String {
    hand.iter()
        .map(|card| card.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::{Card, Color, Value};

    #[test]
    fn card_index_roundtrip() {
        for index in 0..25 {
            let card = Card::from_index(index).expect("valid index");
            assert_eq!(card.index(), index);
        }
        assert_eq!(Card::from_index(25), None);
    }

    #[test]
    fn multiplicities_sum_to_fifty() {
        let total: usize = (0..25)
            .map(|index| Card::from_index(index).unwrap().multiplicity())
            .sum();
        assert_eq!(total, 50);
    }

    #[test]
    fn ordering_is_color_major() {
        let r5 = Card::new(Color::Red, Value::Five);
        let o1 = Card::new(Color::Orange, Value::One);
        assert!(r5 < o1);
    }

    #[test]
    fn serde_roundtrip_is_identity() {
        let card = Card::new(Color::Green, Value::Three);
        let json = serde_json::to_string(&card).expect("serialize");
        let back: Card = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(card, back);
    }

    #[test]
    fn display_is_value_then_color_letter() {
        assert_eq!(Card::new(Color::Blue, Value::Four).to_string(), "4b");
    }
}
