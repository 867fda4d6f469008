//! Error types for the session layer.

use mapforge_protocol::ProtocolError;

/// Errors that can occur during session operations.
///
/// Inbound-packet problems never surface here — a malformed or unexpected
/// packet is logged and dropped where it is decoded. These errors come
/// from local operator actions: deck creation, save/load, joining.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A host-only operation was attempted while joined.
    #[error("operation requires hosting the session")]
    NotHost,

    /// A save file carried an unsupported format version.
    #[error("unsupported save format version {0}")]
    SaveVersion(u32),

    /// A save file or map blob failed its all-or-nothing replay.
    #[error("corrupt map data: {0}")]
    SaveCorrupt(&'static str),

    /// A packet inside a save file failed to decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A deck operation failed.
    #[error(transparent)]
    Deck(#[from] mapforge_deck::DeckError),

    /// Local file I/O failed.
    #[error("i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
