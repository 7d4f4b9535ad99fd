use buzzwire_protocol::{GameId, PlayerId};

/// Errors surfaced by the session state machine.
///
/// Most misuse (a decision outside `answering`, a duplicate buzz) is
/// logged and swallowed rather than surfaced; only conditions the caller
/// must relay to a client become errors.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The session no longer accepts joins.
    #[error("game {0} is finalized and not accepting new players")]
    Finalized(GameId),

    /// The referenced player is not registered with any session.
    #[error("player {0} is not registered with any game")]
    UnknownPlayer(PlayerId),
}
