//! Session events: the boundary to rendering and dialog UI.
//!
//! The session never calls into UI code. Instead it queues events that the
//! embedding application drains with
//! [`Session::take_events`](crate::Session::take_events) after each pump.
//!
//! During a join, everything received before the host's `LoginComplete`
//! sentinel is bulk initial state, not a live user action — those packets
//! apply silently and queue no "something changed" events.

use mapforge_protocol::{Card, PlayerId, Point, RejectReason};

/// Something the embedding UI may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A chat HTML fragment to append to the log.
    Chat { body: String },
    /// The player roster changed (join, leave, rename).
    RosterChanged,
    /// The drawing surface changed (lines, pogs, grid).
    MapChanged,
    /// The shared view was recentered.
    ViewRecentered { center: Point, zoom: u32 },
    /// A transient pointer ping from another player.
    PointerPing {
        player: PlayerId,
        position: Point,
        pointing: bool,
    },
    /// The host refused our join; the session is back to offline.
    JoinRejected { reason: RejectReason },
    /// The host connection is gone; the session cannot continue.
    SessionEnded,
    /// The join handshake finished; live updates begin now.
    LoginComplete,
    /// The broadcast deck-name list changed.
    DeckListChanged,
    /// Cards we drew arrived from the host.
    CardsReceived { cards: Vec<Card> },
    /// A previously missing asset is now on disk.
    AssetReceived { filename: String },
}
