//! Unified error type for the Mapforge engine.

use mapforge_deck::DeckError;
use mapforge_protocol::ProtocolError;
use mapforge_session::SessionError;
use mapforge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When embedding the `mapforge` meta-crate you deal with this single
/// type; the `#[from]` attributes let `?` convert sub-crate errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum MapforgeError {
    /// A transport-level error (bind, connect, accept).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unknown tag).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (save/load, host-only operations).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A deck-level error (definitions, duplicate names).
    #[error(transparent)]
    Deck(#[from] DeckError),

    /// The join handshake did not complete within its deadline.
    #[error("join did not complete within the deadline")]
    JoinTimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::NotListening;
        let top: MapforgeError = err.into();
        assert!(matches!(top, MapforgeError::Transport(_)));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownTag(99);
        let top: MapforgeError = err.into();
        assert!(matches!(top, MapforgeError::Protocol(_)));
        assert!(top.to_string().contains("99"));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::NotHost;
        let top: MapforgeError = err.into();
        assert!(matches!(top, MapforgeError::Session(_)));
    }

    #[test]
    fn test_from_deck_error() {
        let err = DeckError::AlreadyExists("Tarot".into());
        let top: MapforgeError = err.into();
        assert!(matches!(top, MapforgeError::Deck(_)));
    }
}
