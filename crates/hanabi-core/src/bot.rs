//! The capability surface the engine expects from every player bot.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::game::error::{Result, ServerError};
use crate::game::server::Server;
use crate::model::{CardIndices, Color, Value};

/// Observer callbacks plus `make_move`. Implementations must be deep-cloneable
/// so search can condition partner snapshots on hypothetical hands; every
/// mutation of a clone leaves the original untouched.
pub trait Bot: Send + Sync {
    fn observe_before_move(&mut self, server: &Server) -> Result<()>;

    /// Must stage exactly one move through a `Server` mutator.
    fn make_move(&mut self, server: &mut Server) -> Result<()>;

    fn observe_before_discard(
        &mut self,
        server: &Server,
        from: usize,
        card_index: usize,
    ) -> Result<()>;

    fn observe_before_play(
        &mut self,
        server: &Server,
        from: usize,
        card_index: usize,
    ) -> Result<()>;

    fn observe_color_hint(
        &mut self,
        server: &Server,
        from: usize,
        to: usize,
        color: Color,
        card_indices: CardIndices,
    ) -> Result<()>;

    fn observe_value_hint(
        &mut self,
        server: &Server,
        from: usize,
        to: usize,
        value: Value,
        card_indices: CardIndices,
    ) -> Result<()>;

    fn observe_after_move(&mut self, server: &Server) -> Result<()>;

    /// Independent deep copy.
    fn clone_box(&self) -> Box<dyn Bot>;

    /// Relax internal assertions: search may feed the bot hypothetical states
    /// that violate the assumptions it was built around.
    fn set_permissive(&mut self, permissive: bool);

    /// Optional capability: per-move-index action probabilities, used by the
    /// Boltzmann belief update. Bots without a probabilistic policy return
    /// `None` and the engine falls back to move comparison.
    fn action_probs(&self) -> Option<BTreeMap<usize, f64>> {
        None
    }

    /// Optional capability paired with `action_probs`.
    fn set_action_uncertainty(&mut self, _uncertainty: f64) {}
}

/// Constructor signature: (player index, num players, hand size).
pub type BotFactory = dyn Fn(usize, usize, usize) -> Result<Box<dyn Bot>> + Send + Sync;

/// An explicit bot registry, constructed by the harness and passed where
/// needed; nothing registers itself at process init.
#[derive(Default, Clone)]
pub struct BotRegistry {
    factories: BTreeMap<String, Arc<BotFactory>>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(usize, usize, usize) -> Result<Box<dyn Bot>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_owned(), Arc::new(factory));
    }

    pub fn factory(&self, name: &str) -> Result<Arc<BotFactory>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::UnknownBot(name.to_owned()))
    }

    pub fn create(
        &self,
        name: &str,
        index: usize,
        num_players: usize,
        hand_size: usize,
    ) -> Result<Box<dyn Bot>> {
        self.factory(name)?(index, num_players, hand_size)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
