pub mod error;
pub mod server;
mod simul;

pub use error::{Result, ServerError};
pub use server::{Server, MAX_SCORE, NUM_HINTS, NUM_MULLIGANS};
