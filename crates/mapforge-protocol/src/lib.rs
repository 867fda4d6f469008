//! Wire protocol for Mapforge.
//!
//! This crate defines the "language" that the host and joiners speak:
//!
//! - **Wire primitives** ([`wire::PacketWriter`], [`wire::PacketReader`]) —
//!   big-endian integers, length-prefixed strings and blobs.
//! - **Types** ([`Pog`], [`LineSegment`], [`Card`], the id newtypes) — the
//!   domain structures packets carry.
//! - **Messages** ([`Message`], [`PacketTag`]) — the closed catalogue of
//!   packet kinds, each a tag plus fields.
//! - **Dispatch** ([`DispatchTable`]) — the tag → decoder registration
//!   table built once at startup.
//!
//! The protocol layer sits between transport (raw frames) and session
//! (replicated state). It never mutates session state — encode functions
//! are pure, and decoding hands a typed [`Message`] to the session.

mod dispatch;
mod error;
mod message;
mod types;
pub mod wire;

pub use dispatch::{DecodeFn, DispatchTable};
pub use error::ProtocolError;
pub use message::{
    Message, PacketTag, MIME_MAP, MIME_PNG, PROTOCOL_VERSION,
};
pub use types::{
    Card, GridMode, LineSegment, PlayerId, PlayerInfo, Pog, PogId, Point,
    Recipient, Rect, RejectReason, StateId,
};
