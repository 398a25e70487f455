pub mod belief;
pub mod bot;
pub mod config;
pub mod game;
pub mod model;
pub mod pool;

pub use bot::{Bot, BotFactory, BotRegistry};
pub use config::{Config, Rules};
pub use game::{Result, Server, ServerError, MAX_SCORE, NUM_HINTS, NUM_MULLIGANS};
