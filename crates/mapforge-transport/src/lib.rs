//! Transport layer for Mapforge.
//!
//! Owns zero or more TCP connections — one when joined, many when hosting —
//! and surfaces everything that happened on them to a single consumer:
//! received packets, newly accepted connections, and connections that died.
//! Reading and writing happen on per-connection tasks; the owner drains the
//! results with [`TcpTransport::poll`] on its own schedule and never blocks
//! on the network.
//!
//! Sending is fire-and-forget. A connection whose writer fails is reported
//! dropped exactly once and removed; retry, if any, is a caller concern.

mod error;
mod framing;
mod tcp;

pub use error::TransportError;
pub use framing::{MAX_FRAME_SIZE, read_frame, write_frame};
pub use tcp::{TcpTransport, TransportPoll};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
    }
}
