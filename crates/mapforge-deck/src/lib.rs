//! Host-owned card decks for Mapforge.
//!
//! The deck subsystem is a host-owned resource: only the host holds real
//! deck contents, and joiners reference decks by name. This crate covers
//! the host's side of that contract:
//!
//! 1. **Definitions** — declarative XML card-type files ([`DeckDefinition`])
//! 2. **Decks** — live draw/discard piles ([`Deck`])
//! 3. **The manager** — name registry plus per-player issued-card
//!    bookkeeping ([`DeckManager`])
//!
//! Wiring draws and discards to the wire (request/response exchanges
//! mediated by the host) lives in `mapforge-session`; this crate is pure
//! bookkeeping.

mod deck;
mod definition;
mod error;
mod manager;

pub use deck::Deck;
pub use definition::{CardTypeDef, DeckDefinition};
pub use error::DeckError;
pub use manager::{DeckManager, DrawOutcome, ShuffleScope};
