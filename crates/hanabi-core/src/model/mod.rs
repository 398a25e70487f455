pub mod card;
pub mod deck;
pub mod mov;
pub mod pile;

pub use card::{hand_as_string, Card, Color, Hand, Value, NUM_COLORS, NUM_VALUES};
pub use deck::{full_deck, portable_shuffle, DeckComposition};
pub use mov::{index_to_move, move_to_index, CardIndices, Move};
pub use pile::Pile;
