//! The session state machine.
//!
//! One [`Session`] per node, in one of three roles: `Disconnected`
//! (solo/offline), `Hosting` (authoritative), or `Joined`. It owns every
//! replicated store — roster, public map, draw history, decks, asset
//! bookkeeping — and is the only place they are mutated.
//!
//! The session is synchronous and transport-free. Every local operation
//! and every inbound packet returns a list of [`Directive`]s — outbound
//! messages paired with a routing [`Recipient`], plus connection closes —
//! which the embedding engine writes to the transport. That keeps the
//! whole replication protocol testable without a socket in sight, and it
//! serializes all state mutation on the engine's single tick context.
//!
//! # The replication rule
//!
//! Every mutating operation follows the same shape: apply locally first,
//! then (a) broadcast if hosting, or (b) forward the request to the host
//! if joined. The host relays a joiner's mutation to everyone *except*
//! the originating connection, which already applied it optimistically.
//! Operations needing a total order (line adds, erases) are the
//! exception: only the host mints their [`StateId`], so a joiner's local
//! apply stays provisional until the host's stamped echo — broadcast to
//! everyone *including* the originator — replaces it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mapforge_deck::{DeckDefinition, DeckManager, ShuffleScope};
use mapforge_protocol::{
    Card, DispatchTable, GridMode, LineSegment, Message, PlayerId,
    PlayerInfo, Pog, PogId, Point, Recipient, Rect, RejectReason, StateId,
    MIME_MAP, MIME_PNG, PROTOCOL_VERSION,
};
use mapforge_transport::ConnectionId;

use crate::assets::{AssetStore, AssetTransfers};
use crate::event::SessionEvent;
use crate::history::{DrawCommand, DrawHistory};
use crate::map::MapState;
use crate::roster::Roster;
use crate::SessionError;

/// The local node's current role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Solo/offline play. Mutations apply locally and go nowhere.
    Disconnected,
    /// The authoritative host.
    Hosting,
    /// Connected to a host.
    Joined {
        /// The host link.
        host: ConnectionId,
        /// `false` until the host's `LoginComplete` sentinel arrives;
        /// everything before it is bulk initial state.
        login_complete: bool,
    },
}

/// One instruction for the embedding engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Encode and send a message to the given recipients.
    Send(Recipient, Message),
    /// Close a connection (after flushing anything queued to it).
    Close(ConnectionId),
}

/// Operator-facing session parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub display_name: String,
    pub character_name: String,
    /// The shared plaintext password gate.
    pub password: String,
    /// Root directory for assets and saved maps.
    pub data_root: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display_name: "Anonymous".to_string(),
            character_name: "Anonymous".to_string(),
            password: String::new(),
            data_root: PathBuf::from("."),
        }
    }
}

/// One node's view of a shared tabletop session.
pub struct Session {
    config: SessionConfig,
    role: Role,
    roster: Roster,
    /// The replicated drawing surface.
    map: MapState,
    /// Card-backed pogs on this node's private layer; never replicated.
    private_map: MapState,
    history: DrawHistory,
    /// Real decks while hosting; empty otherwise.
    decks: DeckManager,
    /// The replicated deck-name list. For joiners these names are the
    /// whole placeholder deck: enough to validate and display.
    deck_names: Vec<String>,
    /// Cards currently in the local player's hand.
    held_cards: Vec<Card>,
    assets: AssetStore,
    transfers: AssetTransfers,
    table: DispatchTable,
    events: Vec<SessionEvent>,
    /// Next state id to mint (host and offline play).
    next_state_id: u64,
    /// Per-node pog id counter (the low word of [`PogId`]).
    next_pog_counter: u32,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let assets = AssetStore::new(&config.data_root);
        let roster = Roster::solo(&config.display_name, &config.character_name);
        Self {
            config,
            role: Role::Disconnected,
            roster,
            map: MapState::new(),
            private_map: MapState::new(),
            history: DrawHistory::new(),
            decks: DeckManager::new(),
            deck_names: Vec::new(),
            held_cards: Vec::new(),
            assets,
            transfers: AssetTransfers::new(),
            table: DispatchTable::new(),
            events: Vec::new(),
            next_state_id: 1,
            next_pog_counter: 1,
        }
    }

    // -- Accessors ---------------------------------------------------------

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_hosting(&self) -> bool {
        matches!(self.role, Role::Hosting)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn map(&self) -> &MapState {
        &self.map
    }

    pub fn private_map(&self) -> &MapState {
        &self.private_map
    }

    pub fn deck_names(&self) -> &[String] {
        &self.deck_names
    }

    pub fn held_cards(&self) -> &[Card] {
        &self.held_cards
    }

    pub fn local_player_id(&self) -> PlayerId {
        self.roster.local_id()
    }

    /// The draw-command history (undo/redo menus read this).
    pub fn draw_history(&self) -> &DrawHistory {
        &self.history
    }

    /// Drains the queued UI events.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Lifecycle ---------------------------------------------------------

    /// `Disconnected → Hosting`: claim id 0 and start from a clean
    /// authoritative slate — every replicated collection is cleared and
    /// state ids restart.
    pub fn begin_hosting(&mut self) {
        self.map.clear();
        self.private_map.clear();
        self.history.clear();
        self.decks = DeckManager::new();
        self.deck_names.clear();
        self.held_cards.clear();
        self.transfers = AssetTransfers::new();
        self.next_state_id = 1;
        self.roster.begin_hosting();
        self.role = Role::Hosting;
        tracing::info!("hosting session started");
    }

    /// `Disconnected → Joined`: the engine has opened the host link; send
    /// the join request and wait for the roster.
    pub fn begin_join(&mut self, host: ConnectionId) -> Vec<Directive> {
        self.map.clear();
        self.private_map.clear();
        self.history.clear();
        self.decks = DeckManager::new();
        self.deck_names.clear();
        self.held_cards.clear();
        self.transfers = AssetTransfers::new();
        self.roster.reset();
        self.role = Role::Joined { host, login_complete: false };
        tracing::info!(%host, "join requested");
        vec![Directive::Send(
            Recipient::Peer(host),
            Message::Join {
                protocol_version: PROTOCOL_VERSION,
                password: self.config.password.clone(),
                display_name: self.config.display_name.clone(),
                character_name: self.config.character_name.clone(),
                host_flag: false,
            },
        )]
    }

    /// Any role → `Disconnected`: back to a single unidentified local
    /// player. The drawing surface survives for offline play; session
    /// resources (decks, hands, transfers) do not.
    pub fn end_session(&mut self) {
        self.role = Role::Disconnected;
        self.roster.reset();
        self.decks = DeckManager::new();
        self.deck_names.clear();
        self.held_cards.clear();
        self.private_map.clear();
        self.transfers = AssetTransfers::new();
        tracing::info!("session ended");
    }

    // -- Replication helpers -----------------------------------------------

    /// The uniform replication rule for already-applied mutations:
    /// broadcast when hosting, forward to the host when joined, nothing
    /// when offline.
    fn replicate(&self, message: Message) -> Vec<Directive> {
        match self.role {
            Role::Hosting => {
                vec![Directive::Send(Recipient::All, message)]
            }
            Role::Joined { host, .. } => {
                vec![Directive::Send(Recipient::Peer(host), message)]
            }
            Role::Disconnected => Vec::new(),
        }
    }

    fn push_event(&mut self, event: SessionEvent) {
        // Pre-login traffic is bulk initial state, not user actions: it
        // must not fire change notifications.
        if let Role::Joined { login_complete: false, .. } = self.role {
            if !matches!(
                event,
                SessionEvent::JoinRejected { .. }
                    | SessionEvent::SessionEnded
                    | SessionEvent::LoginComplete
            ) {
                return;
            }
        }
        self.events.push(event);
    }

    fn mint_state_id(&mut self) -> StateId {
        let id = StateId(self.next_state_id);
        self.next_state_id += 1;
        id
    }

    /// Builds a new pog for the public layer, minting its id and sort.
    pub fn create_pog(
        &mut self,
        filename: &str,
        face_size: u32,
        position: Point,
    ) -> Pog {
        let counter = self.next_pog_counter;
        self.next_pog_counter += 1;
        Pog {
            id: PogId::compose(self.roster.local_id(), counter),
            sort_order: self.map.next_sort_order(),
            position,
            filename: filename.to_string(),
            face_size,
            angle: 0.0,
            scale: 1.0,
            flip_horizontal: false,
            flip_vertical: false,
            locked: false,
            tinted: false,
            name: String::new(),
            attributes: BTreeMap::new(),
            card: None,
        }
    }

    // -- Local drawing operations ------------------------------------------

    /// Adds line segments drawn by the local player.
    pub fn draw_lines(&mut self, lines: Vec<LineSegment>) -> Vec<Directive> {
        let command = DrawCommand::Lines { lines };
        self.apply_local_draw(command)
    }

    /// Applies an erase rectangle drawn by the local player.
    pub fn erase(
        &mut self,
        rect: Rect,
        color_specific: bool,
        color: u32,
    ) -> Vec<Directive> {
        let command = DrawCommand::Erase { rect, color_specific, color };
        self.apply_local_draw(command)
    }

    /// The state-id exception to the replication rule: only the host
    /// stamps; a joiner applies provisionally and the host echoes to
    /// everyone, originator included.
    fn apply_local_draw(&mut self, command: DrawCommand) -> Vec<Directive> {
        let author = self.roster.local_id();
        let directives = match self.role {
            Role::Hosting | Role::Disconnected => {
                let state_id = self.mint_state_id();
                self.history.record_stamped(state_id, author, command.clone());
                match self.role {
                    Role::Hosting => vec![Directive::Send(
                        Recipient::All,
                        command.to_message(author, state_id),
                    )],
                    _ => Vec::new(),
                }
            }
            Role::Joined { host, .. } => {
                self.history.record_provisional(command.clone());
                vec![Directive::Send(
                    Recipient::Peer(host),
                    command.to_message(author, StateId::PROVISIONAL),
                )]
            }
        };
        self.map.set_lines(self.history.rebuild_lines());
        self.push_event(SessionEvent::MapChanged);
        directives
    }

    /// Undoes the command stamped with `state_id`.
    pub fn undo(&mut self, state_id: StateId) -> Vec<Directive> {
        if self.history.undo(state_id) {
            self.map.set_lines(self.history.rebuild_lines());
            self.push_event(SessionEvent::MapChanged);
        }
        self.replicate(Message::Undo { state_id })
    }

    /// Redoes the command stamped with `state_id`.
    pub fn redo(&mut self, state_id: StateId) -> Vec<Directive> {
        if self.history.redo(state_id) {
            self.map.set_lines(self.history.rebuild_lines());
            self.push_event(SessionEvent::MapChanged);
        }
        self.replicate(Message::Redo { state_id })
    }

    // -- Local pog operations ----------------------------------------------

    /// Places a pog. Private pogs stay on this node; public pogs follow
    /// the replication rule.
    pub fn add_pog(&mut self, pog: Pog, public: bool) -> Vec<Directive> {
        if public {
            self.map.add_pog(pog.clone());
            self.push_event(SessionEvent::MapChanged);
            self.replicate(Message::AddPog { public: true, pog })
        } else {
            self.private_map.add_pog(pog);
            self.push_event(SessionEvent::MapChanged);
            Vec::new()
        }
    }

    pub fn remove_pogs(&mut self, ids: Vec<PogId>) -> Vec<Directive> {
        self.map.remove_pogs(&ids);
        self.private_map.remove_pogs(&ids);
        self.push_event(SessionEvent::MapChanged);
        self.replicate(Message::RemovePogs { ids })
    }

    pub fn move_pog(&mut self, id: PogId, position: Point) -> Vec<Directive> {
        if self.private_map.move_pog(id, position) {
            self.push_event(SessionEvent::MapChanged);
            return Vec::new();
        }
        if !self.map.move_pog(id, position) {
            return Vec::new();
        }
        self.push_event(SessionEvent::MapChanged);
        self.replicate(Message::MovePog { id, position })
    }

    pub fn set_pog_data(
        &mut self,
        id: PogId,
        name: Option<String>,
        set_attributes: BTreeMap<String, String>,
        clear_attributes: Vec<String>,
    ) -> Vec<Directive> {
        let changed = self.map.set_pog_data(
            id,
            name.as_deref(),
            &set_attributes,
            &clear_attributes,
        ) || self.private_map.set_pog_data(
            id,
            name.as_deref(),
            &set_attributes,
            &clear_attributes,
        );
        if !changed {
            return Vec::new();
        }
        self.push_event(SessionEvent::MapChanged);
        self.replicate(Message::PogData {
            id,
            name,
            set_attributes,
            clear_attributes,
        })
    }

    pub fn reorder_pogs(&mut self, orders: Vec<(PogId, u64)>) -> Vec<Directive> {
        if !self.map.reorder_pogs(&orders) {
            return Vec::new();
        }
        self.push_event(SessionEvent::MapChanged);
        self.replicate(Message::PogReorder { orders })
    }

    pub fn set_pog_size(&mut self, id: PogId, face_size: u32) -> Vec<Directive> {
        if !self.map.set_pog_size(id, face_size) {
            return Vec::new();
        }
        self.push_event(SessionEvent::MapChanged);
        self.replicate(Message::PogSize { id, face_size })
    }

    pub fn rotate_pog(&mut self, id: PogId, angle: f32) -> Vec<Directive> {
        if !self.map.rotate_pog(id, angle) {
            return Vec::new();
        }
        self.push_event(SessionEvent::MapChanged);
        self.replicate(Message::RotatePog { id, angle })
    }

    pub fn flip_pog(
        &mut self,
        id: PogId,
        horizontal: bool,
        vertical: bool,
    ) -> Vec<Directive> {
        if !self.map.flip_pog(id, horizontal, vertical) {
            return Vec::new();
        }
        self.push_event(SessionEvent::MapChanged);
        self.replicate(Message::FlipPog { id, horizontal, vertical })
    }

    pub fn lock_pog(&mut self, id: PogId, locked: bool) -> Vec<Directive> {
        if !self.map.lock_pog(id, locked) {
            return Vec::new();
        }
        self.push_event(SessionEvent::MapChanged);
        self.replicate(Message::LockPog { id, locked })
    }

    // -- Local view / grid / chat ------------------------------------------

    pub fn set_grid_mode(&mut self, mode: GridMode) -> Vec<Directive> {
        self.map.set_grid(mode);
        self.push_event(SessionEvent::MapChanged);
        self.replicate(Message::GridMode { mode })
    }

    pub fn recenter(&mut self, center: Point, zoom: u32) -> Vec<Directive> {
        self.map.set_view(center, zoom);
        self.push_event(SessionEvent::ViewRecentered { center, zoom });
        self.replicate(Message::Recenter { center, zoom })
    }

    /// Posts a chat fragment from the local player.
    pub fn post_chat(&mut self, body: String) -> Vec<Directive> {
        self.push_event(SessionEvent::Chat { body: body.clone() });
        self.replicate(Message::Text { body })
    }

    /// Shows or moves the local player's pointer ping.
    pub fn pointer(&mut self, position: Point, pointing: bool) -> Vec<Directive> {
        self.replicate(Message::Point {
            player: self.roster.local_id(),
            position,
            pointing,
        })
    }

    /// The host's periodic keep-alive. Replies are logged only; liveness
    /// detection stays with the transport's connection-failure signal.
    pub fn keepalive(&mut self) -> Vec<Directive> {
        match self.role {
            Role::Hosting => {
                vec![Directive::Send(Recipient::All, Message::Ping)]
            }
            _ => Vec::new(),
        }
    }

    // -- Deck operations ---------------------------------------------------

    /// Creates a deck from a definition. Host-owned: joiners cannot.
    pub fn create_deck(
        &mut self,
        deck_name: &str,
        definition: &DeckDefinition,
    ) -> Result<Vec<Directive>, SessionError> {
        if matches!(self.role, Role::Joined { .. }) {
            return Err(SessionError::NotHost);
        }
        self.decks.create(deck_name, definition)?;
        self.deck_names = self.decks.deck_names();
        self.push_event(SessionEvent::DeckListChanged);
        Ok(self.broadcast_deck_list())
    }

    /// Creates a deck from a definition file.
    pub fn create_deck_from_file(
        &mut self,
        path: &Path,
        deck_name: &str,
    ) -> Result<Vec<Directive>, SessionError> {
        let definition = DeckDefinition::load(path)?;
        self.create_deck(deck_name, &definition)
    }

    /// Destroys a deck: every held card of it is discarded across all
    /// players, every pog it backs disappears.
    pub fn destroy_deck(&mut self, deck_name: &str) -> Result<Vec<Directive>, SessionError> {
        if matches!(self.role, Role::Joined { .. }) {
            return Err(SessionError::NotHost);
        }
        if !self.decks.destroy(deck_name) {
            return Ok(Vec::new());
        }
        let mut directives = Vec::new();
        if self.is_hosting() {
            directives.push(Directive::Send(
                Recipient::All,
                Message::DeckRecall { deck_name: deck_name.to_string() },
            ));
        }
        directives.extend(self.drop_local_deck_cards(deck_name));
        self.deck_names = self.decks.deck_names();
        self.push_event(SessionEvent::DeckListChanged);
        directives.extend(self.broadcast_deck_list());
        Ok(directives)
    }

    /// Shuffles a deck. [`ShuffleScope::All`] recalls every player's
    /// cards of that deck first.
    pub fn shuffle_deck(
        &mut self,
        deck_name: &str,
        scope: ShuffleScope,
    ) -> Result<Vec<Directive>, SessionError> {
        if matches!(self.role, Role::Joined { .. }) {
            return Err(SessionError::NotHost);
        }
        if self.decks.shuffle(deck_name, scope).is_none() {
            return Ok(Vec::new());
        }
        let mut directives = Vec::new();
        if scope == ShuffleScope::All {
            if self.is_hosting() {
                directives.push(Directive::Send(
                    Recipient::All,
                    Message::DeckRecall { deck_name: deck_name.to_string() },
                ));
            }
            directives.extend(self.drop_local_deck_cards(deck_name));
        }
        Ok(directives)
    }

    /// Draws cards for the local player. Joiners send the request to the
    /// host; the host (and offline play) draws directly.
    pub fn draw_cards(&mut self, deck_name: &str, count: i32) -> Vec<Directive> {
        match self.role {
            Role::Joined { host, .. } => {
                // Placeholder-deck validation: a name the host never
                // announced is refused locally. Non-positive counts
                // decline gracefully instead of bothering the host.
                if count <= 0 || !self.deck_names.iter().any(|n| n == deck_name) {
                    tracing::debug!(deck = deck_name, count, "draw request refused");
                    return Vec::new();
                }
                vec![Directive::Send(
                    Recipient::Peer(host),
                    Message::DeckDraw { deck_name: deck_name.to_string(), count },
                )]
            }
            Role::Hosting | Role::Disconnected => {
                let player = self.roster.local_id();
                let Some(outcome) = self.decks.draw(player, deck_name, count)
                else {
                    tracing::debug!(deck = deck_name, "draw from unknown deck ignored");
                    return Vec::new();
                };
                let mut directives = self.receive_cards(outcome.cards);
                if outcome.exhausted {
                    directives.extend(self.deck_out_notice(deck_name));
                }
                directives
            }
        }
    }

    /// Discards cards from the local player's hand.
    pub fn discard_cards(&mut self, cards: Vec<Card>) -> Vec<Directive> {
        for card in &cards {
            if let Some(pos) = self.held_cards.iter().position(|held| held == card) {
                self.held_cards.remove(pos);
            }
        }
        let removed_private = self.private_map.remove_card_pogs(&cards);
        if !removed_private.is_empty() {
            self.push_event(SessionEvent::MapChanged);
        }
        match self.role {
            Role::Joined { host, .. } => {
                vec![Directive::Send(
                    Recipient::Peer(host),
                    Message::DeckDiscard { cards },
                )]
            }
            Role::Hosting | Role::Disconnected => {
                let player = self.roster.local_id();
                self.decks.discard(player, &cards);
                let removed_public = self.map.remove_card_pogs(&cards);
                if removed_public.is_empty() {
                    Vec::new()
                } else {
                    self.push_event(SessionEvent::MapChanged);
                    self.replicate(Message::RemovePogs { ids: removed_public })
                }
            }
        }
    }

    fn broadcast_deck_list(&self) -> Vec<Directive> {
        match self.role {
            Role::Hosting => vec![Directive::Send(
                Recipient::All,
                Message::DeckList { deck_names: self.deck_names.clone() },
            )],
            _ => Vec::new(),
        }
    }

    /// Drops the local hand and pogs tied to a recalled/destroyed deck.
    fn drop_local_deck_cards(&mut self, deck_name: &str) -> Vec<Directive> {
        self.held_cards.retain(|card| card.deck_name != deck_name);
        let private_removed = self.private_map.remove_deck_pogs(deck_name);
        let public_removed = self.map.remove_deck_pogs(deck_name);
        if !(private_removed.is_empty() && public_removed.is_empty()) {
            self.push_event(SessionEvent::MapChanged);
        }
        if public_removed.is_empty() {
            Vec::new()
        } else {
            self.replicate(Message::RemovePogs { ids: public_removed })
        }
    }

    fn deck_out_notice(&mut self, deck_name: &str) -> Vec<Directive> {
        let body = format!("The deck '{deck_name}' is out of cards.");
        self.push_event(SessionEvent::Chat { body: body.clone() });
        match self.role {
            Role::Hosting => {
                vec![Directive::Send(Recipient::All, Message::Text { body })]
            }
            _ => Vec::new(),
        }
    }

    /// Puts drawn cards into the local hand and materializes private pogs
    /// for card types with art.
    fn receive_cards(&mut self, cards: Vec<Card>) -> Vec<Directive> {
        if cards.is_empty() {
            return Vec::new();
        }
        let mut directives = Vec::new();
        for card in &cards {
            self.held_cards.push(card.clone());
            if card.art_file.is_empty() {
                continue;
            }
            let counter = self.next_pog_counter;
            self.next_pog_counter += 1;
            let pog = Pog {
                id: PogId::compose(self.roster.local_id(), counter),
                sort_order: self.private_map.next_sort_order(),
                position: Point::new(0, 0),
                filename: card.art_file.clone(),
                face_size: 1,
                angle: 0.0,
                scale: 1.0,
                flip_horizontal: false,
                flip_vertical: false,
                locked: false,
                tinted: false,
                name: card.card_name.clone(),
                attributes: BTreeMap::new(),
                card: Some(card.clone()),
            };
            self.private_map.add_pog(pog);
            if let Role::Joined { host, .. } = self.role {
                directives.extend(self.ensure_asset(&card.art_file, host));
            }
        }
        self.push_event(SessionEvent::CardsReceived { cards });
        self.push_event(SessionEvent::MapChanged);
        directives
    }

    // -- Save / load -------------------------------------------------------

    /// Saves the public map as a packet replay log.
    pub fn save_map(&self, path: &Path) -> Result<(), SessionError> {
        let blob = crate::save::encode_map(&self.map, &self.history);
        std::fs::write(path, blob)?;
        tracing::info!(path = %path.display(), "map saved");
        Ok(())
    }

    /// Loads a saved map, replacing the public map. While hosting, the
    /// loaded map is pushed whole to every joiner.
    pub fn load_map(&mut self, path: &Path) -> Result<Vec<Directive>, SessionError> {
        let blob = std::fs::read(path)?;
        self.install_map_blob(&blob)?;
        tracing::info!(path = %path.display(), "map loaded");
        if self.is_hosting() {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(vec![Directive::Send(
                Recipient::All,
                Message::File { mime: MIME_MAP.to_string(), filename, data: blob },
            )])
        } else {
            Ok(Vec::new())
        }
    }

    /// All-or-nothing replacement of the public map from a replay blob.
    fn install_map_blob(&mut self, blob: &[u8]) -> Result<(), SessionError> {
        let packets = crate::save::decode_map(blob, &self.table)?;
        self.map.clear();
        self.history.clear();
        for packet in packets {
            match packet {
                Message::Lines { author, state_id, lines } => {
                    self.history.record_stamped(
                        state_id,
                        author,
                        DrawCommand::Lines { lines },
                    );
                }
                Message::AddPog { pog, .. } => self.map.add_pog(pog),
                Message::GridMode { mode } => self.map.set_grid(mode),
                _ => unreachable!("decode_map admits only map packets"),
            }
        }
        self.map.set_lines(self.history.rebuild_lines());
        self.next_state_id =
            self.next_state_id.max(self.history.highest_state_id().0 + 1);
        self.push_event(SessionEvent::MapChanged);
        Ok(())
    }

    // -- Inbound -----------------------------------------------------------

    /// Handles one raw packet off the wire. Malformed or unknown packets
    /// are fatal for the packet only: logged and dropped.
    pub fn handle_packet(
        &mut self,
        origin: ConnectionId,
        bytes: &[u8],
    ) -> Vec<Directive> {
        let message = match self.table.decode(bytes) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(%origin, %error, "malformed packet dropped");
                return Vec::new();
            }
        };
        match self.role {
            Role::Hosting => self.handle_as_host(origin, message),
            Role::Joined { host, .. } if origin == host => {
                self.handle_as_joiner(message)
            }
            _ => {
                tracing::warn!(%origin, "packet from unexpected connection dropped");
                Vec::new()
            }
        }
    }

    /// Handles a dropped connection. For the host that is a departing
    /// player; for a joiner, losing the host link ends the session.
    pub fn handle_connection_dropped(
        &mut self,
        connection: ConnectionId,
    ) -> Vec<Directive> {
        self.transfers.forget_connection(connection);
        match self.role {
            Role::Hosting => {
                let Some(player) = self.roster.remove_by_connection(connection)
                else {
                    return Vec::new();
                };
                tracing::info!(
                    player = %player.info.id,
                    name = %player.info.display_name,
                    "player departed"
                );
                // Their hand goes back to the discard piles; pogs backed
                // by those cards disappear everywhere.
                let hand = self.decks.discard_all_from(player.info.id);
                let removed = self.map.remove_card_pogs(&hand);
                let mut directives = self.broadcast_cast();
                if !removed.is_empty() {
                    self.push_event(SessionEvent::MapChanged);
                    directives.push(Directive::Send(
                        Recipient::All,
                        Message::RemovePogs { ids: removed },
                    ));
                }
                let body =
                    format!("{} has left the session.", player.info.display_name);
                self.push_event(SessionEvent::Chat { body: body.clone() });
                directives.push(Directive::Send(
                    Recipient::All,
                    Message::Text { body },
                ));
                self.push_event(SessionEvent::RosterChanged);
                directives
            }
            Role::Joined { host, .. } if connection == host => {
                self.push_event(SessionEvent::SessionEnded);
                self.end_session();
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    // -- Host-side handlers ------------------------------------------------

    fn handle_as_host(
        &mut self,
        origin: ConnectionId,
        message: Message,
    ) -> Vec<Directive> {
        // The join handshake is the one packet a connection may send
        // before it has a roster entry.
        if let Message::Join {
            protocol_version,
            password,
            display_name,
            character_name,
            ..
        } = message
        {
            return self.handle_join_request(
                origin,
                protocol_version,
                &password,
                display_name,
                character_name,
            );
        }

        let Some(player) = self.roster.by_connection(origin) else {
            tracing::warn!(%origin, "packet from connection that never joined");
            return Vec::new();
        };
        let player_id = player.info.id;

        match message {
            Message::Text { body } => {
                self.push_event(SessionEvent::Chat { body: body.clone() });
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::Text { body },
                )]
            }
            Message::Lines { lines, .. } => {
                // The joiner's stamp is provisional; the wire author is
                // ignored in favor of the connection's identity.
                let state_id = self.mint_state_id();
                let command = DrawCommand::Lines { lines };
                self.history.record_stamped(state_id, player_id, command.clone());
                self.map.set_lines(self.history.rebuild_lines());
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::All,
                    command.to_message(player_id, state_id),
                )]
            }
            Message::Erase { rect, color_specific, color, .. } => {
                let state_id = self.mint_state_id();
                let command = DrawCommand::Erase { rect, color_specific, color };
                self.history.record_stamped(state_id, player_id, command.clone());
                self.map.set_lines(self.history.rebuild_lines());
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::All,
                    command.to_message(player_id, state_id),
                )]
            }
            Message::Undo { state_id } => {
                if self.history.undo(state_id) {
                    self.map.set_lines(self.history.rebuild_lines());
                    self.push_event(SessionEvent::MapChanged);
                }
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::Undo { state_id },
                )]
            }
            Message::Redo { state_id } => {
                if self.history.redo(state_id) {
                    self.map.set_lines(self.history.rebuild_lines());
                    self.push_event(SessionEvent::MapChanged);
                }
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::Redo { state_id },
                )]
            }
            Message::AddPog { public: true, pog } => {
                self.map.add_pog(pog.clone());
                self.push_event(SessionEvent::MapChanged);
                let mut directives = self.ensure_asset(&pog.filename, origin);
                directives.push(Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::AddPog { public: true, pog },
                ));
                directives
            }
            Message::AddPog { public: false, .. } => {
                tracing::warn!(%origin, "private pog add over the wire dropped");
                Vec::new()
            }
            Message::RemovePogs { ids } => {
                self.map.remove_pogs(&ids);
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::RemovePogs { ids },
                )]
            }
            Message::MovePog { id, position } => {
                if !self.map.move_pog(id, position) {
                    return Vec::new();
                }
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::MovePog { id, position },
                )]
            }
            Message::PogData { id, name, set_attributes, clear_attributes } => {
                if !self.map.set_pog_data(
                    id,
                    name.as_deref(),
                    &set_attributes,
                    &clear_attributes,
                ) {
                    return Vec::new();
                }
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::PogData { id, name, set_attributes, clear_attributes },
                )]
            }
            Message::PogReorder { orders } => {
                if !self.map.reorder_pogs(&orders) {
                    return Vec::new();
                }
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::PogReorder { orders },
                )]
            }
            Message::PogSize { id, face_size } => {
                if !self.map.set_pog_size(id, face_size) {
                    return Vec::new();
                }
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::PogSize { id, face_size },
                )]
            }
            Message::RotatePog { id, angle } => {
                if !self.map.rotate_pog(id, angle) {
                    return Vec::new();
                }
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::RotatePog { id, angle },
                )]
            }
            Message::FlipPog { id, horizontal, vertical } => {
                if !self.map.flip_pog(id, horizontal, vertical) {
                    return Vec::new();
                }
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::FlipPog { id, horizontal, vertical },
                )]
            }
            Message::LockPog { id, locked } => {
                if !self.map.lock_pog(id, locked) {
                    return Vec::new();
                }
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::LockPog { id, locked },
                )]
            }
            Message::GridMode { mode } => {
                self.map.set_grid(mode);
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::GridMode { mode },
                )]
            }
            Message::Recenter { center, zoom } => {
                self.map.set_view(center, zoom);
                self.push_event(SessionEvent::ViewRecentered { center, zoom });
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::Recenter { center, zoom },
                )]
            }
            Message::Point { position, pointing, .. } => {
                self.push_event(SessionEvent::PointerPing {
                    player: player_id,
                    position,
                    pointing,
                });
                vec![Directive::Send(
                    Recipient::AllExcept(origin),
                    Message::Point { player: player_id, position, pointing },
                )]
            }
            Message::PngRequest { filename } => self.serve_png(origin, &filename),
            Message::File { mime, filename, data } if mime == MIME_PNG => {
                self.receive_png(&filename, &data)
            }
            Message::Ping => {
                // Replies are observed but unused; liveness stays with
                // the transport's failure signal.
                tracing::trace!(%origin, "ping reply");
                Vec::new()
            }
            Message::DeckDraw { deck_name, count } => {
                self.handle_deck_draw(origin, player_id, &deck_name, count)
            }
            Message::DeckDiscard { cards } => {
                self.decks.discard(player_id, &cards);
                let removed = self.map.remove_card_pogs(&cards);
                if removed.is_empty() {
                    return Vec::new();
                }
                self.push_event(SessionEvent::MapChanged);
                vec![Directive::Send(
                    Recipient::All,
                    Message::RemovePogs { ids: removed },
                )]
            }
            other => {
                tracing::warn!(
                    %origin,
                    tag = ?other.tag(),
                    "host-bound packet of unexpected kind dropped"
                );
                Vec::new()
            }
        }
    }

    /// The host side of the join handshake: version gate, password gate,
    /// id assignment, cast broadcast, full state replay, login sentinel.
    fn handle_join_request(
        &mut self,
        origin: ConnectionId,
        protocol_version: u32,
        password: &str,
        display_name: String,
        character_name: String,
    ) -> Vec<Directive> {
        if self.roster.by_connection(origin).is_some() {
            tracing::warn!(%origin, "duplicate join request dropped");
            return Vec::new();
        }
        if protocol_version != PROTOCOL_VERSION {
            tracing::info!(
                %origin,
                theirs = protocol_version,
                ours = PROTOCOL_VERSION,
                "join rejected: protocol version mismatch"
            );
            return vec![
                Directive::Send(
                    Recipient::Peer(origin),
                    Message::Reject { reason: RejectReason::VersionMismatch },
                ),
                Directive::Close(origin),
            ];
        }
        if password != self.config.password {
            tracing::info!(%origin, "join rejected: bad password");
            return vec![
                Directive::Send(
                    Recipient::Peer(origin),
                    Message::Reject { reason: RejectReason::BadPassword },
                ),
                Directive::Close(origin),
            ];
        }

        let id = self.roster.assign_next_id();
        tracing::info!(%origin, %id, name = %display_name, "player joined");
        let body = format!("{display_name} has joined the session.");
        self.roster.add(
            PlayerInfo {
                display_name,
                character_name,
                id,
                is_host: false,
            },
            origin,
        );
        self.push_event(SessionEvent::RosterChanged);

        let mut directives = self.broadcast_cast();

        // Full state replay, to the new player alone. Everything it
        // receives before LoginComplete is bulk state, not live updates.
        for packet in self.history.replay_packets() {
            directives.push(Directive::Send(Recipient::Peer(origin), packet));
        }
        for pog in self.map.pogs_in_draw_order() {
            directives.push(Directive::Send(
                Recipient::Peer(origin),
                Message::AddPog { public: true, pog: (*pog).clone() },
            ));
        }
        directives.push(Directive::Send(
            Recipient::Peer(origin),
            Message::GridMode { mode: self.map.grid() },
        ));
        let (center, zoom) = self.map.view();
        directives.push(Directive::Send(
            Recipient::Peer(origin),
            Message::Recenter { center, zoom },
        ));
        directives.push(Directive::Send(
            Recipient::Peer(origin),
            Message::DeckList { deck_names: self.deck_names.clone() },
        ));
        directives.push(Directive::Send(
            Recipient::Peer(origin),
            Message::LoginComplete,
        ));

        // The join announcement reaches the new player after the
        // sentinel, as its first live update.
        self.push_event(SessionEvent::Chat { body: body.clone() });
        directives.push(Directive::Send(Recipient::All, Message::Text { body }));
        directives
    }

    /// Each player gets the roster plus their own index in it.
    fn broadcast_cast(&self) -> Vec<Directive> {
        let infos = self.roster.infos();
        self.roster
            .connections()
            .map(|(index, connection)| {
                Directive::Send(
                    Recipient::Peer(connection),
                    Message::Cast {
                        players: infos.clone(),
                        your_index: index as i32,
                    },
                )
            })
            .collect()
    }

    fn handle_deck_draw(
        &mut self,
        origin: ConnectionId,
        player: PlayerId,
        deck_name: &str,
        count: i32,
    ) -> Vec<Directive> {
        // A draw racing the deck's destruction resolves as a silent
        // no-op, not an error.
        let Some(outcome) = self.decks.draw(player, deck_name, count) else {
            tracing::debug!(
                %origin,
                deck = deck_name,
                "draw for vanished deck ignored"
            );
            return Vec::new();
        };
        if count <= 0 {
            return Vec::new();
        }
        let mut directives = vec![Directive::Send(
            Recipient::Peer(origin),
            Message::DeckCards { cards: outcome.cards },
        )];
        if outcome.exhausted {
            directives.extend(self.deck_out_notice(deck_name));
        }
        directives
    }

    // -- Joiner-side handlers ----------------------------------------------

    fn handle_as_joiner(&mut self, message: Message) -> Vec<Directive> {
        let host = match self.role {
            Role::Joined { host, .. } => host,
            _ => unreachable!("joiner handler outside Joined role"),
        };
        match message {
            Message::Reject { reason } => {
                tracing::info!(%reason, "join rejected by host");
                self.push_event(SessionEvent::JoinRejected { reason });
                self.end_session();
                Vec::new()
            }
            Message::Cast { players, your_index } => {
                self.roster.replace_from_cast(players, your_index);
                self.push_event(SessionEvent::RosterChanged);
                Vec::new()
            }
            Message::Text { body } => {
                self.push_event(SessionEvent::Chat { body });
                Vec::new()
            }
            Message::Lines { author, state_id, lines } => {
                let command = DrawCommand::Lines { lines };
                self.record_host_stamped(author, state_id, command);
                Vec::new()
            }
            Message::Erase { author, state_id, rect, color_specific, color } => {
                let command = DrawCommand::Erase { rect, color_specific, color };
                self.record_host_stamped(author, state_id, command);
                Vec::new()
            }
            Message::Undo { state_id } => {
                if self.history.undo(state_id) {
                    self.map.set_lines(self.history.rebuild_lines());
                    self.push_event(SessionEvent::MapChanged);
                }
                Vec::new()
            }
            Message::Redo { state_id } => {
                if self.history.redo(state_id) {
                    self.map.set_lines(self.history.rebuild_lines());
                    self.push_event(SessionEvent::MapChanged);
                }
                Vec::new()
            }
            Message::AddPog { public, pog } => {
                let directives = self.ensure_asset(&pog.filename, host);
                if public {
                    self.map.add_pog(pog);
                } else {
                    self.private_map.add_pog(pog);
                }
                self.push_event(SessionEvent::MapChanged);
                directives
            }
            Message::RemovePogs { ids } => {
                self.map.remove_pogs(&ids);
                self.private_map.remove_pogs(&ids);
                self.push_event(SessionEvent::MapChanged);
                Vec::new()
            }
            Message::MovePog { id, position } => {
                if self.map.move_pog(id, position) {
                    self.push_event(SessionEvent::MapChanged);
                }
                Vec::new()
            }
            Message::PogData { id, name, set_attributes, clear_attributes } => {
                if self.map.set_pog_data(
                    id,
                    name.as_deref(),
                    &set_attributes,
                    &clear_attributes,
                ) {
                    self.push_event(SessionEvent::MapChanged);
                }
                Vec::new()
            }
            Message::PogReorder { orders } => {
                if self.map.reorder_pogs(&orders) {
                    self.push_event(SessionEvent::MapChanged);
                }
                Vec::new()
            }
            Message::PogSize { id, face_size } => {
                if self.map.set_pog_size(id, face_size) {
                    self.push_event(SessionEvent::MapChanged);
                }
                Vec::new()
            }
            Message::RotatePog { id, angle } => {
                if self.map.rotate_pog(id, angle) {
                    self.push_event(SessionEvent::MapChanged);
                }
                Vec::new()
            }
            Message::FlipPog { id, horizontal, vertical } => {
                if self.map.flip_pog(id, horizontal, vertical) {
                    self.push_event(SessionEvent::MapChanged);
                }
                Vec::new()
            }
            Message::LockPog { id, locked } => {
                if self.map.lock_pog(id, locked) {
                    self.push_event(SessionEvent::MapChanged);
                }
                Vec::new()
            }
            Message::GridMode { mode } => {
                self.map.set_grid(mode);
                self.push_event(SessionEvent::MapChanged);
                Vec::new()
            }
            Message::Recenter { center, zoom } => {
                self.map.set_view(center, zoom);
                self.push_event(SessionEvent::ViewRecentered { center, zoom });
                Vec::new()
            }
            Message::Point { player, position, pointing } => {
                self.push_event(SessionEvent::PointerPing {
                    player,
                    position,
                    pointing,
                });
                Vec::new()
            }
            Message::File { mime, filename, data } => {
                if mime == MIME_PNG {
                    self.receive_png(&filename, &data)
                } else if mime == MIME_MAP {
                    if let Err(error) = self.install_map_blob(&data) {
                        tracing::warn!(%error, "map push rejected");
                    }
                    Vec::new()
                } else {
                    tracing::warn!(%mime, "file payload of unknown mime dropped");
                    Vec::new()
                }
            }
            Message::PngRequest { filename } => self.serve_png(host, &filename),
            Message::LoginComplete => {
                self.role = Role::Joined { host, login_complete: true };
                self.push_event(SessionEvent::LoginComplete);
                tracing::info!("login complete; live updates begin");
                Vec::new()
            }
            Message::Ping => {
                vec![Directive::Send(Recipient::Peer(host), Message::Ping)]
            }
            Message::DeckList { deck_names } => {
                self.deck_names = deck_names;
                self.push_event(SessionEvent::DeckListChanged);
                Vec::new()
            }
            Message::DeckCards { cards } => self.receive_cards(cards),
            Message::DeckRecall { deck_name } => {
                self.held_cards.retain(|card| card.deck_name != deck_name);
                let removed = self.private_map.remove_deck_pogs(&deck_name);
                if !removed.is_empty() {
                    self.push_event(SessionEvent::MapChanged);
                }
                Vec::new()
            }
            other => {
                tracing::warn!(
                    tag = ?other.tag(),
                    "joiner-bound packet of unexpected kind dropped"
                );
                Vec::new()
            }
        }
    }

    /// Applies a host-stamped draw command, reconciling it against our
    /// provisional FIFO when it is the echo of our own operation.
    fn record_host_stamped(
        &mut self,
        author: PlayerId,
        state_id: StateId,
        command: DrawCommand,
    ) {
        let ours = author == self.roster.local_id()
            && state_id.is_stamped()
            && self.history.pending_count() > 0;
        if ours {
            self.history.confirm_provisional(state_id, author, command);
        } else {
            self.history.record_stamped(state_id, author, command);
        }
        self.map.set_lines(self.history.rebuild_lines());
        self.push_event(SessionEvent::MapChanged);
    }

    // -- Asset transfer ----------------------------------------------------

    /// Requests a pog's art from the connection it arrived on, unless the
    /// file exists locally or a request is already outstanding.
    fn ensure_asset(&mut self, filename: &str, origin: ConnectionId) -> Vec<Directive> {
        if filename.is_empty() || self.assets.has(filename) {
            return Vec::new();
        }
        if !self.transfers.begin_request(filename) {
            // Already outstanding: coalesced with the in-flight request.
            return Vec::new();
        }
        tracing::debug!(filename, %origin, "requesting missing asset");
        vec![Directive::Send(
            Recipient::Peer(origin),
            Message::PngRequest { filename: filename.to_string() },
        )]
    }

    /// Serves an asset request, or parks the requester until the file
    /// arrives here.
    fn serve_png(&mut self, requester: ConnectionId, filename: &str) -> Vec<Directive> {
        match self.assets.read(filename) {
            Ok(data) => vec![Directive::Send(
                Recipient::Peer(requester),
                Message::File {
                    mime: MIME_PNG.to_string(),
                    filename: filename.to_string(),
                    data,
                },
            )],
            Err(_) => {
                // Not here yet (possibly mid-transfer ourselves): park
                // the requester for the fulfillment pass.
                tracing::debug!(filename, %requester, "asset not local; request parked");
                self.transfers.add_pending(filename, requester);
                Vec::new()
            }
        }
    }

    /// Validates and stores received asset bytes, then serves every
    /// parked requester for that filename in one pass.
    fn receive_png(&mut self, filename: &str, data: &[u8]) -> Vec<Directive> {
        match self.assets.write_png(filename, data) {
            Ok(path) => {
                tracing::debug!(filename, path = %path.display(), "asset stored");
            }
            Err(error) => {
                tracing::warn!(filename, %error, "asset transfer rejected");
                return Vec::new();
            }
        }
        self.transfers.complete(filename);
        self.push_event(SessionEvent::AssetReceived {
            filename: filename.to_string(),
        });
        self.transfers
            .take_pending(filename)
            .into_iter()
            .map(|waiter| {
                Directive::Send(
                    Recipient::Peer(waiter),
                    Message::File {
                        mime: MIME_PNG.to_string(),
                        filename: filename.to_string(),
                        data: data.to_vec(),
                    },
                )
            })
            .collect()
    }
}
