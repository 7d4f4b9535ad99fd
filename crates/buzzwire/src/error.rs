//! Unified error type for the Buzzwire engine.

use buzzwire_game::GameError;
use buzzwire_protocol::ProtocolError;
use buzzwire_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `buzzwire` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BuzzwireError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session state machine error (finalized game, unknown player).
    #[error(transparent)]
    Game(#[from] GameError),

    /// The referenced session exists neither in memory nor in the store.
    #[error("game identified by {0} not found")]
    GameNotFound(String),

    /// A mandatory field of a join/creation request was missing or empty.
    #[error("{0} is required")]
    MissingField(&'static str),
}

impl BuzzwireError {
    /// The HTTP-convention code sent to clients for this error.
    pub fn code(&self) -> u16 {
        match self {
            Self::GameNotFound(_) => 404,
            Self::Game(GameError::Finalized(_)) => 409,
            Self::Game(GameError::UnknownPlayer(_)) => 404,
            _ => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buzzwire_protocol::GameId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let bw: BuzzwireError = err.into();
        assert!(matches!(bw, BuzzwireError::Transport(_)));
        assert!(bw.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let bw: BuzzwireError = err.into();
        assert!(matches!(bw, BuzzwireError::Protocol(_)));
    }

    #[test]
    fn test_from_game_error() {
        let err = GameError::Finalized(GameId(3));
        let bw: BuzzwireError = err.into();
        assert!(matches!(bw, BuzzwireError::Game(_)));
        assert_eq!(bw.code(), 409);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(BuzzwireError::GameNotFound("ABCDE".into()).code(), 404);
        assert_eq!(BuzzwireError::MissingField("name").code(), 400);
    }
}
