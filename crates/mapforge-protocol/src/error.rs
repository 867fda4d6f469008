//! Error types for the protocol layer.
//!
//! Each crate in Mapforge defines its own error enum. A `ProtocolError`
//! always means a packet could not be encoded or decoded — never a
//! networking or session problem.

/// Errors that can occur while decoding a packet.
///
/// All of these are fatal for the offending packet only: the session logs
/// and drops it without tearing down the connection it came from.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The packet ended before a field could be read.
    #[error("packet truncated")]
    Truncated,

    /// A string field was not valid UTF-8.
    #[error("invalid string: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),

    /// The leading type tag names no registered message kind. The framing
    /// is length-based, not self-describing beyond the tag, so the payload
    /// cannot be safely skipped or partially applied.
    #[error("unknown packet tag {0}")]
    UnknownTag(u32),

    /// A field held a value outside its closed set (grid mode, reject
    /// reason, boolean byte).
    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    /// Decoding finished with bytes left over — the shape did not match.
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),
}
