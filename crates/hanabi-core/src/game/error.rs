use thiserror::Error;

/// Fatal contract violations. Rule violations and observer misuse are bot
/// bugs; belief inconsistency means an engine invariant broke. None of these
/// are recoverable mid-game.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    // rule violations
    #[error("card index {index} out of range for a hand of {hand_len}")]
    InvalidCardIndex { index: usize, hand_len: usize },
    #[error("player index {0} out of range")]
    InvalidPlayer(usize),
    #[error("no hint stones remaining")]
    NoHintStones,
    #[error("cannot give a hint to oneself")]
    CannotHintSelf,
    #[error("hint must touch at least one card")]
    EmptyHint,
    #[error("discarding is not allowed while all hint stones are available")]
    DiscardingNotAllowed,

    // observer misuse
    #[error("cannot observe own hand")]
    CannotObserveOwnHand,
    #[error("hand of player {0} is hidden in this simulation")]
    HiddenHand(usize),
    #[error("active card is only observable during a play or discard notification")]
    ActiveCardNotObservable,
    #[error("bot attempted to move twice")]
    MovedTwice,
    #[error("called a mutator outside of make_move")]
    MoveOutOfTurn,
    #[error("bot failed to make a move")]
    NoMoveMade,

    // beliefs
    #[error("player {player}'s true hand fell out of their belief distribution")]
    BeliefInconsistency { player: usize },
    #[error("belief distribution has no probability mass")]
    EmptyDistribution,

    // configuration
    #[error("unknown bot '{0}'")]
    UnknownBot(String),
    #[error("joint search supports exactly two players")]
    TwoPlayersOnly,
}

pub type Result<T> = std::result::Result<T, ServerError>;
