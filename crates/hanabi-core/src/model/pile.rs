use crate::model::card::{Card, Color, Value};

/// One firework pile. A pile of size `n` contains the values 1..=n of its
/// color; value `v` is playable iff `v == n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pile {
    color: Color,
    size: usize,
}

impl Pile {
    pub const fn new(color: Color) -> Self {
        Self { color, size: 0 }
    }

    pub const fn color(&self) -> Color {
        self.color
    }

    pub const fn empty(&self) -> bool {
        self.size == 0
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    pub fn top_card(&self) -> Option<Card> {
        Value::from_usize(self.size).map(|value| Card::new(self.color, value))
    }

    pub fn next_value_is(&self, value: Value) -> bool {
        value.as_usize() == self.size + 1
    }

    pub fn contains(&self, value: Value) -> bool {
        (1..=self.size).contains(&value.as_usize())
    }

    pub(crate) fn increment(&mut self) {
        debug_assert!(self.size < 5);
        self.size += 1;
    }
}
