pub mod smart;

pub use smart::{CardKnowledge, SmartBot, Trivalue};
