//! The message catalogue: every packet kind the protocol speaks.
//!
//! A closed set. Each variant encodes to a `u32` big-endian type tag
//! followed by its fields; decoding goes through the
//! [`DispatchTable`](crate::DispatchTable), which maps tags back to the
//! per-kind decoders defined at the bottom of this file. Encode functions
//! are pure (`Message` → bytes) and never touch session state.
//!
//! The protocol version travels only in [`Message::Join`]; a mismatch is a
//! hard rejection, never a negotiated downgrade.

use std::collections::BTreeMap;

use crate::types::{
    Card, GridMode, LineSegment, PlayerId, PlayerInfo, Pog, PogId, Point,
    Rect, RejectReason, StateId,
};
use crate::wire::{PacketReader, PacketWriter};
use crate::ProtocolError;

/// The protocol version embedded in every join request. Bumped on any wire
/// layout change; there is no backward compatibility window.
pub const PROTOCOL_VERSION: u32 = 1;

/// MIME tag for PNG asset payloads in [`Message::File`].
pub const MIME_PNG: &str = "image/png";

/// MIME tag for full map-state blobs in [`Message::File`].
pub const MIME_MAP: &str = "application/x-mapforge-map";

/// Packet type tags. The numeric values are the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketTag {
    Join = 0,
    Reject = 1,
    Cast = 2,
    Text = 3,
    Lines = 4,
    Erase = 5,
    AddPog = 6,
    RemovePogs = 7,
    MovePog = 8,
    PogData = 9,
    PogReorder = 10,
    PogSize = 11,
    RotatePog = 12,
    FlipPog = 13,
    LockPog = 14,
    Point = 15,
    Recenter = 16,
    File = 17,
    PngRequest = 18,
    GridMode = 19,
    LoginComplete = 20,
    Ping = 21,
    Undo = 22,
    Redo = 23,
    DeckList = 24,
    DeckDraw = 25,
    DeckCards = 26,
    DeckDiscard = 27,
    DeckRecall = 28,
}

impl PacketTag {
    /// Number of defined tags; the dispatch table is indexed `0..COUNT`.
    pub const COUNT: usize = 29;
}

/// One decoded packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Join request: the first packet a joiner sends.
    Join {
        protocol_version: u32,
        password: String,
        display_name: String,
        character_name: String,
        host_flag: bool,
    },
    /// Host → joiner: join refused; the connection closes after this.
    Reject { reason: RejectReason },
    /// Host → each player: the full roster plus that player's own index.
    Cast {
        players: Vec<PlayerInfo>,
        your_index: i32,
    },
    /// A chat HTML fragment.
    Text { body: String },
    /// Line segments added to the drawing surface.
    Lines {
        author: PlayerId,
        state_id: StateId,
        lines: Vec<LineSegment>,
    },
    /// An erase rectangle applied to the drawing surface.
    Erase {
        author: PlayerId,
        state_id: StateId,
        rect: Rect,
        color_specific: bool,
        color: u32,
    },
    /// A pog placed on the public (replicated) or private layer.
    AddPog { public: bool, pog: Pog },
    RemovePogs { ids: Vec<PogId> },
    MovePog { id: PogId, position: Point },
    /// Pog rename and attribute edits.
    PogData {
        id: PogId,
        name: Option<String>,
        set_attributes: BTreeMap<String, String>,
        clear_attributes: Vec<String>,
    },
    /// Bulk z-order reassignment.
    PogReorder { orders: Vec<(PogId, u64)> },
    PogSize { id: PogId, face_size: u32 },
    RotatePog { id: PogId, angle: f32 },
    FlipPog {
        id: PogId,
        horizontal: bool,
        vertical: bool,
    },
    LockPog { id: PogId, locked: bool },
    /// Transient pointer ping; no state mutation.
    Point {
        player: PlayerId,
        position: Point,
        pointing: bool,
    },
    /// Shared view recenter.
    Recenter { center: Point, zoom: u32 },
    /// A mime-tagged binary payload: PNG asset or full map blob.
    File {
        mime: String,
        filename: String,
        data: Vec<u8>,
    },
    /// Request for a missing asset by filename.
    PngRequest { filename: String },
    GridMode { mode: GridMode },
    /// Host → joiner: initial state replay is complete; everything after
    /// this is a live incremental update.
    LoginComplete,
    /// Keep-alive. The host emits it on a cadence; joiners echo it.
    Ping,
    Undo { state_id: StateId },
    Redo { state_id: StateId },
    /// Full deck-name list, broadcast whenever decks change.
    DeckList { deck_names: Vec<String> },
    /// Draw request. Joiners send it; the host fulfills it.
    DeckDraw { deck_name: String, count: i32 },
    /// Host → requester: the drawn cards.
    DeckCards { cards: Vec<Card> },
    /// Cards returned to their decks' discard piles.
    DeckDiscard { cards: Vec<Card> },
    /// Host → all: drop every held card of the named deck.
    DeckRecall { deck_name: String },
}

impl Message {
    /// The packet's type tag.
    pub fn tag(&self) -> PacketTag {
        match self {
            Message::Join { .. } => PacketTag::Join,
            Message::Reject { .. } => PacketTag::Reject,
            Message::Cast { .. } => PacketTag::Cast,
            Message::Text { .. } => PacketTag::Text,
            Message::Lines { .. } => PacketTag::Lines,
            Message::Erase { .. } => PacketTag::Erase,
            Message::AddPog { .. } => PacketTag::AddPog,
            Message::RemovePogs { .. } => PacketTag::RemovePogs,
            Message::MovePog { .. } => PacketTag::MovePog,
            Message::PogData { .. } => PacketTag::PogData,
            Message::PogReorder { .. } => PacketTag::PogReorder,
            Message::PogSize { .. } => PacketTag::PogSize,
            Message::RotatePog { .. } => PacketTag::RotatePog,
            Message::FlipPog { .. } => PacketTag::FlipPog,
            Message::LockPog { .. } => PacketTag::LockPog,
            Message::Point { .. } => PacketTag::Point,
            Message::Recenter { .. } => PacketTag::Recenter,
            Message::File { .. } => PacketTag::File,
            Message::PngRequest { .. } => PacketTag::PngRequest,
            Message::GridMode { .. } => PacketTag::GridMode,
            Message::LoginComplete => PacketTag::LoginComplete,
            Message::Ping => PacketTag::Ping,
            Message::Undo { .. } => PacketTag::Undo,
            Message::Redo { .. } => PacketTag::Redo,
            Message::DeckList { .. } => PacketTag::DeckList,
            Message::DeckDraw { .. } => PacketTag::DeckDraw,
            Message::DeckCards { .. } => PacketTag::DeckCards,
            Message::DeckDiscard { .. } => PacketTag::DeckDiscard,
            Message::DeckRecall { .. } => PacketTag::DeckRecall,
        }
    }

    /// Encodes this message into a packet blob (tag first).
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::new(self.tag() as u32);
        match self {
            Message::Join {
                protocol_version,
                password,
                display_name,
                character_name,
                host_flag,
            } => {
                w.write_u32(*protocol_version);
                w.write_str(password);
                w.write_str(display_name);
                w.write_str(character_name);
                w.write_bool(*host_flag);
            }
            Message::Reject { reason } => {
                w.write_u32(reason.as_u32());
            }
            Message::Cast { players, your_index } => {
                w.write_u16(players.len() as u16);
                for player in players {
                    player.encode(&mut w);
                }
                w.write_i32(*your_index);
            }
            Message::Text { body } => {
                w.write_str(body);
            }
            Message::Lines { author, state_id, lines } => {
                w.write_i32(author.0);
                w.write_u64(state_id.0);
                w.write_u16(lines.len() as u16);
                for line in lines {
                    line.encode(&mut w);
                }
            }
            Message::Erase {
                author,
                state_id,
                rect,
                color_specific,
                color,
            } => {
                w.write_i32(author.0);
                w.write_u64(state_id.0);
                rect.encode(&mut w);
                w.write_bool(*color_specific);
                w.write_u32(*color);
            }
            Message::AddPog { public, pog } => {
                w.write_bool(*public);
                pog.encode(&mut w);
            }
            Message::RemovePogs { ids } => {
                w.write_u16(ids.len() as u16);
                for id in ids {
                    w.write_u64(id.0);
                }
            }
            Message::MovePog { id, position } => {
                w.write_u64(id.0);
                position.encode(&mut w);
            }
            Message::PogData {
                id,
                name,
                set_attributes,
                clear_attributes,
            } => {
                w.write_u64(id.0);
                match name {
                    Some(name) => {
                        w.write_bool(true);
                        w.write_str(name);
                    }
                    None => w.write_bool(false),
                }
                w.write_u16(set_attributes.len() as u16);
                for (key, value) in set_attributes {
                    w.write_str(key);
                    w.write_str(value);
                }
                w.write_u16(clear_attributes.len() as u16);
                for key in clear_attributes {
                    w.write_str(key);
                }
            }
            Message::PogReorder { orders } => {
                w.write_u16(orders.len() as u16);
                for (id, sort) in orders {
                    w.write_u64(id.0);
                    w.write_u64(*sort);
                }
            }
            Message::PogSize { id, face_size } => {
                w.write_u64(id.0);
                w.write_u32(*face_size);
            }
            Message::RotatePog { id, angle } => {
                w.write_u64(id.0);
                w.write_f32(*angle);
            }
            Message::FlipPog { id, horizontal, vertical } => {
                w.write_u64(id.0);
                w.write_bool(*horizontal);
                w.write_bool(*vertical);
            }
            Message::LockPog { id, locked } => {
                w.write_u64(id.0);
                w.write_bool(*locked);
            }
            Message::Point { player, position, pointing } => {
                w.write_i32(player.0);
                position.encode(&mut w);
                w.write_bool(*pointing);
            }
            Message::Recenter { center, zoom } => {
                center.encode(&mut w);
                w.write_u32(*zoom);
            }
            Message::File { mime, filename, data } => {
                w.write_str(mime);
                w.write_str(filename);
                w.write_bytes(data);
            }
            Message::PngRequest { filename } => {
                w.write_str(filename);
            }
            Message::GridMode { mode } => {
                w.write_u32(mode.as_u32());
            }
            Message::LoginComplete | Message::Ping => {}
            Message::Undo { state_id } | Message::Redo { state_id } => {
                w.write_u64(state_id.0);
            }
            Message::DeckList { deck_names } => {
                w.write_u16(deck_names.len() as u16);
                for name in deck_names {
                    w.write_str(name);
                }
            }
            Message::DeckDraw { deck_name, count } => {
                w.write_str(deck_name);
                w.write_i32(*count);
            }
            Message::DeckCards { cards } | Message::DeckDiscard { cards } => {
                w.write_u16(cards.len() as u16);
                for card in cards {
                    card.encode(&mut w);
                }
            }
            Message::DeckRecall { deck_name } => {
                w.write_str(deck_name);
            }
        }
        w.into_bytes()
    }
}

// ---------------------------------------------------------------------------
// Per-kind decoders (registered in the dispatch table)
// ---------------------------------------------------------------------------

pub(crate) fn decode_join(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::Join {
        protocol_version: r.read_u32()?,
        password: r.read_string()?,
        display_name: r.read_string()?,
        character_name: r.read_string()?,
        host_flag: r.read_bool()?,
    })
}

pub(crate) fn decode_reject(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::Reject {
        reason: RejectReason::from_u32(r.read_u32()?)?,
    })
}

pub(crate) fn decode_cast(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    let count = r.read_u16()?;
    let mut players = Vec::with_capacity(count as usize);
    for _ in 0..count {
        players.push(PlayerInfo::decode(r)?);
    }
    Ok(Message::Cast {
        players,
        your_index: r.read_i32()?,
    })
}

pub(crate) fn decode_text(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::Text { body: r.read_string()? })
}

pub(crate) fn decode_lines(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    let author = PlayerId(r.read_i32()?);
    let state_id = StateId(r.read_u64()?);
    let count = r.read_u16()?;
    let mut lines = Vec::with_capacity(count as usize);
    for _ in 0..count {
        lines.push(LineSegment::decode(r)?);
    }
    Ok(Message::Lines { author, state_id, lines })
}

pub(crate) fn decode_erase(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::Erase {
        author: PlayerId(r.read_i32()?),
        state_id: StateId(r.read_u64()?),
        rect: Rect::decode(r)?,
        color_specific: r.read_bool()?,
        color: r.read_u32()?,
    })
}

pub(crate) fn decode_add_pog(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::AddPog {
        public: r.read_bool()?,
        pog: Pog::decode(r)?,
    })
}

pub(crate) fn decode_remove_pogs(
    r: &mut PacketReader<'_>,
) -> Result<Message, ProtocolError> {
    let count = r.read_u16()?;
    let mut ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        ids.push(PogId(r.read_u64()?));
    }
    Ok(Message::RemovePogs { ids })
}

pub(crate) fn decode_move_pog(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::MovePog {
        id: PogId(r.read_u64()?),
        position: Point::decode(r)?,
    })
}

pub(crate) fn decode_pog_data(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    let id = PogId(r.read_u64()?);
    let name = if r.read_bool()? { Some(r.read_string()?) } else { None };
    let set_count = r.read_u16()?;
    let mut set_attributes = BTreeMap::new();
    for _ in 0..set_count {
        let key = r.read_string()?;
        let value = r.read_string()?;
        set_attributes.insert(key, value);
    }
    let clear_count = r.read_u16()?;
    let mut clear_attributes = Vec::with_capacity(clear_count as usize);
    for _ in 0..clear_count {
        clear_attributes.push(r.read_string()?);
    }
    Ok(Message::PogData { id, name, set_attributes, clear_attributes })
}

pub(crate) fn decode_pog_reorder(
    r: &mut PacketReader<'_>,
) -> Result<Message, ProtocolError> {
    let count = r.read_u16()?;
    let mut orders = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = PogId(r.read_u64()?);
        let sort = r.read_u64()?;
        orders.push((id, sort));
    }
    Ok(Message::PogReorder { orders })
}

pub(crate) fn decode_pog_size(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::PogSize {
        id: PogId(r.read_u64()?),
        face_size: r.read_u32()?,
    })
}

pub(crate) fn decode_rotate_pog(
    r: &mut PacketReader<'_>,
) -> Result<Message, ProtocolError> {
    Ok(Message::RotatePog {
        id: PogId(r.read_u64()?),
        angle: r.read_f32()?,
    })
}

pub(crate) fn decode_flip_pog(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::FlipPog {
        id: PogId(r.read_u64()?),
        horizontal: r.read_bool()?,
        vertical: r.read_bool()?,
    })
}

pub(crate) fn decode_lock_pog(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::LockPog {
        id: PogId(r.read_u64()?),
        locked: r.read_bool()?,
    })
}

pub(crate) fn decode_point(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::Point {
        player: PlayerId(r.read_i32()?),
        position: Point::decode(r)?,
        pointing: r.read_bool()?,
    })
}

pub(crate) fn decode_recenter(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::Recenter {
        center: Point::decode(r)?,
        zoom: r.read_u32()?,
    })
}

pub(crate) fn decode_file(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::File {
        mime: r.read_string()?,
        filename: r.read_string()?,
        data: r.read_blob()?,
    })
}

pub(crate) fn decode_png_request(
    r: &mut PacketReader<'_>,
) -> Result<Message, ProtocolError> {
    Ok(Message::PngRequest { filename: r.read_string()? })
}

pub(crate) fn decode_grid_mode(
    r: &mut PacketReader<'_>,
) -> Result<Message, ProtocolError> {
    Ok(Message::GridMode {
        mode: GridMode::from_u32(r.read_u32()?)?,
    })
}

pub(crate) fn decode_login_complete(
    _r: &mut PacketReader<'_>,
) -> Result<Message, ProtocolError> {
    Ok(Message::LoginComplete)
}

pub(crate) fn decode_ping(_r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::Ping)
}

pub(crate) fn decode_undo(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::Undo { state_id: StateId(r.read_u64()?) })
}

pub(crate) fn decode_redo(r: &mut PacketReader<'_>) -> Result<Message, ProtocolError> {
    Ok(Message::Redo { state_id: StateId(r.read_u64()?) })
}

pub(crate) fn decode_deck_list(
    r: &mut PacketReader<'_>,
) -> Result<Message, ProtocolError> {
    let count = r.read_u16()?;
    let mut deck_names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        deck_names.push(r.read_string()?);
    }
    Ok(Message::DeckList { deck_names })
}

pub(crate) fn decode_deck_draw(
    r: &mut PacketReader<'_>,
) -> Result<Message, ProtocolError> {
    Ok(Message::DeckDraw {
        deck_name: r.read_string()?,
        count: r.read_i32()?,
    })
}

fn decode_card_list(r: &mut PacketReader<'_>) -> Result<Vec<Card>, ProtocolError> {
    let count = r.read_u16()?;
    let mut cards = Vec::with_capacity(count as usize);
    for _ in 0..count {
        cards.push(Card::decode(r)?);
    }
    Ok(cards)
}

pub(crate) fn decode_deck_cards(
    r: &mut PacketReader<'_>,
) -> Result<Message, ProtocolError> {
    Ok(Message::DeckCards { cards: decode_card_list(r)? })
}

pub(crate) fn decode_deck_discard(
    r: &mut PacketReader<'_>,
) -> Result<Message, ProtocolError> {
    Ok(Message::DeckDiscard { cards: decode_card_list(r)? })
}

pub(crate) fn decode_deck_recall(
    r: &mut PacketReader<'_>,
) -> Result<Message, ProtocolError> {
    Ok(Message::DeckRecall { deck_name: r.read_string()? })
}
