//! # Mapforge
//!
//! A shared virtual-tabletop session: several participants view and edit
//! a common drawing surface (lines, pogs, a card-deck subsystem) while
//! one participant acts as the authoritative host.
//!
//! This meta-crate wires the layers together:
//!
//! ```text
//! mapforge (Engine, tick loop, host binary)
//!   ├── mapforge-session   session state machine, replicated stores
//!   │     └── mapforge-deck   host-owned decks
//!   ├── mapforge-protocol  binary packet codec + dispatch
//!   └── mapforge-transport TCP connections + framing
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mapforge::Engine;
//!
//! # async fn run() -> Result<(), mapforge::MapforgeError> {
//! // Host a session:
//! let mut host = Engine::builder()
//!     .display_name("GM")
//!     .password("mellon")
//!     .build();
//! host.host().await?;
//!
//! // ...or join one:
//! let mut player = Engine::builder().display_name("Aran").password("mellon").build();
//! player.join("table.example.net:6812").await?;
//! player.run().await
//! # }
//! ```

mod engine;
mod error;

pub use engine::{Engine, EngineBuilder, EngineConfig, DEFAULT_PORT};
pub use error::MapforgeError;

pub mod prelude {
    pub use crate::{Engine, EngineBuilder, MapforgeError, DEFAULT_PORT};
    pub use mapforge_deck::{DeckDefinition, ShuffleScope};
    pub use mapforge_protocol::{
        Card, GridMode, LineSegment, Message, PlayerId, Pog, PogId, Point,
        Rect, StateId,
    };
    pub use mapforge_session::{
        Directive, Role, Session, SessionConfig, SessionEvent,
    };
}
