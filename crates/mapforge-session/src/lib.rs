//! Session state machine and replicated state for Mapforge.
//!
//! This crate is the authority layer of the tabletop: it decides what a
//! packet *means*, who may mutate what, and what every peer must be told.
//!
//! # How it fits in the stack
//!
//! ```text
//! Engine (above)    ← owns the transport and the tick loop
//!     ↕ directives / raw packets
//! Session (this crate) ← roster, map, history, decks, assets
//!     ↕ typed messages
//! Protocol (below)  ← encoding, decoding, dispatch
//! ```
//!
//! The session never performs I/O on the wire. Inbound packets come in as
//! bytes through [`Session::handle_packet`]; everything it wants sent
//! comes back out as [`Directive`]s for the engine to write. All mutation
//! of replicated state happens on the engine's single tick context, which
//! is the system's sole concurrency-safety mechanism.

mod assets;
mod error;
mod event;
mod history;
mod map;
mod roster;
mod save;
mod session;

pub use assets::{AssetStore, AssetTransfers, PNG_SIGNATURE};
pub use error::SessionError;
pub use event::SessionEvent;
pub use history::{DrawCommand, DrawHistory};
pub use map::{crop_segment, MapState};
pub use roster::{Player, Roster};
pub use save::{decode_map, encode_map, SAVE_FORMAT_VERSION};
pub use session::{Directive, Role, Session, SessionConfig};
