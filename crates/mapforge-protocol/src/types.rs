//! Core types that travel on the wire.
//!
//! Everything here has a fixed binary layout built from the primitives in
//! [`wire`](crate::wire). Composite types carry their own `encode`/`decode`
//! so the message catalogue in `message.rs` stays a flat list of field
//! sequences.

use std::collections::BTreeMap;
use std::fmt;

use mapforge_transport::ConnectionId;

use crate::wire::{PacketReader, PacketWriter};
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A host-assigned player identifier.
///
/// `-1` ([`PlayerId::UNASSIGNED`]) until the host assigns one during the
/// join handshake. The hosting player is always id `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub i32);

impl PlayerId {
    /// The id carried before the host has assigned one.
    pub const UNASSIGNED: PlayerId = PlayerId(-1);

    /// The hosting player's id.
    pub const HOST: PlayerId = PlayerId(0);

    /// Whether the host has assigned this id yet.
    pub fn is_assigned(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A host-issued ordering stamp for undoable mutations.
///
/// Strictly increasing per hosting session, never reused, and the sole
/// ordering key for undo/redo. [`StateId::PROVISIONAL`] marks a joiner's
/// optimistic local apply that the host has not stamped yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StateId(pub u64);

impl StateId {
    /// Stamp carried by a joiner's not-yet-confirmed operation.
    pub const PROVISIONAL: StateId = StateId(0);

    /// Whether the host has stamped this operation.
    pub fn is_stamped(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// A globally unique pog identifier.
///
/// The upper 32 bits are the minting player's id, the lower 32 a per-node
/// counter, so the host and offline nodes mint concurrently without
/// coordination and ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PogId(pub u64);

impl PogId {
    /// Mints an id from the creating player and that node's counter.
    pub fn compose(minter: PlayerId, counter: u32) -> Self {
        Self(((minter.0 as u32 as u64) << 32) | u64::from(counter))
    }
}

impl fmt::Display for PogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pog-{:x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A position in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub(crate) fn encode(&self, w: &mut PacketWriter) {
        w.write_i32(self.x);
        w.write_i32(self.y);
    }

    pub(crate) fn decode(r: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { x: r.read_i32()?, y: r.read_i32()? })
    }
}

/// An axis-aligned rectangle in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Left edge after normalization.
    pub fn min_x(&self) -> i32 {
        self.x.min(self.x + self.width)
    }

    /// Right edge after normalization.
    pub fn max_x(&self) -> i32 {
        self.x.max(self.x + self.width)
    }

    /// Top edge after normalization.
    pub fn min_y(&self) -> i32 {
        self.y.min(self.y + self.height)
    }

    /// Bottom edge after normalization.
    pub fn max_y(&self) -> i32 {
        self.y.max(self.y + self.height)
    }

    /// Whether `p` lies inside or on the boundary.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x()
            && p.x <= self.max_x()
            && p.y >= self.min_y()
            && p.y <= self.max_y()
    }

    pub(crate) fn encode(&self, w: &mut PacketWriter) {
        w.write_i32(self.x);
        w.write_i32(self.y);
        w.write_i32(self.width);
        w.write_i32(self.height);
    }

    pub(crate) fn decode(r: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            x: r.read_i32()?,
            y: r.read_i32()?,
            width: r.read_i32()?,
            height: r.read_i32()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Closed sets
// ---------------------------------------------------------------------------

/// The replicated grid rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridMode {
    #[default]
    None,
    Square,
    Hex,
}

impl GridMode {
    pub fn as_u32(self) -> u32 {
        match self {
            GridMode::None => 0,
            GridMode::Square => 1,
            GridMode::Hex => 2,
        }
    }

    pub fn from_u32(v: u32) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(GridMode::None),
            1 => Ok(GridMode::Square),
            2 => Ok(GridMode::Hex),
            _ => Err(ProtocolError::Malformed("grid mode out of range")),
        }
    }
}

/// Why the host refused a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BadPassword,
    VersionMismatch,
}

impl RejectReason {
    pub fn as_u32(self) -> u32 {
        match self {
            RejectReason::BadPassword => 0,
            RejectReason::VersionMismatch => 1,
        }
    }

    pub fn from_u32(v: u32) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(RejectReason::BadPassword),
            1 => Ok(RejectReason::VersionMismatch),
            _ => Err(ProtocolError::Malformed("reject reason out of range")),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::BadPassword => write!(f, "incorrect password"),
            RejectReason::VersionMismatch => write!(f, "protocol version mismatch"),
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Specifies which connections should receive an outbound message.
///
/// The session state machine pairs each outbound [`Message`](crate::Message)
/// with one of these; the engine resolves it against the live connection
/// set. The host has no connection to itself, so `All` never loops a
/// broadcast back to its originator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every connected peer.
    All,
    /// Every connected peer except one (typically the originator of the
    /// mutation being relayed, which already applied it locally).
    AllExcept(ConnectionId),
    /// One specific peer.
    Peer(ConnectionId),
}

// ---------------------------------------------------------------------------
// Roster entries
// ---------------------------------------------------------------------------

/// One roster entry as carried by the `Cast` packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub display_name: String,
    pub character_name: String,
    pub id: PlayerId,
    pub is_host: bool,
}

impl PlayerInfo {
    pub(crate) fn encode(&self, w: &mut PacketWriter) {
        w.write_str(&self.display_name);
        w.write_str(&self.character_name);
        w.write_i32(self.id.0);
        w.write_bool(self.is_host);
    }

    pub(crate) fn decode(r: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            display_name: r.read_string()?,
            character_name: r.read_string()?,
            id: PlayerId(r.read_i32()?),
            is_host: r.read_bool()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Drawing surface
// ---------------------------------------------------------------------------

/// One immutable drawn line segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
    pub start: Point,
    pub end: Point,
    /// 32-bit ARGB.
    pub color: u32,
}

impl LineSegment {
    pub fn new(start: Point, end: Point, color: u32) -> Self {
        Self { start, end, color }
    }

    pub(crate) fn encode(&self, w: &mut PacketWriter) {
        self.start.encode(w);
        self.end.encode(w);
        w.write_u32(self.color);
    }

    pub(crate) fn decode(r: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            start: Point::decode(r)?,
            end: Point::decode(r)?,
            color: r.read_u32()?,
        })
    }
}

/// One card instance, referenced by deck and card name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub deck_name: String,
    pub card_name: String,
    pub art_file: String,
    pub description: String,
}

impl Card {
    pub(crate) fn encode(&self, w: &mut PacketWriter) {
        w.write_str(&self.deck_name);
        w.write_str(&self.card_name);
        w.write_str(&self.art_file);
        w.write_str(&self.description);
    }

    pub(crate) fn decode(r: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            deck_name: r.read_string()?,
            card_name: r.read_string()?,
            art_file: r.read_string()?,
            description: r.read_string()?,
        })
    }
}

/// A placed map piece.
#[derive(Debug, Clone, PartialEq)]
pub struct Pog {
    /// Globally unique, minted by the creating node. Never reused.
    pub id: PogId,
    /// Draw order; higher sorts draw later (on top). Globally unique.
    pub sort_order: u64,
    pub position: Point,
    /// Asset filename of the pog art, relative to the asset root.
    pub filename: String,
    /// Face size in grid squares.
    pub face_size: u32,
    /// Rotation in degrees.
    pub angle: f32,
    pub scale: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub locked: bool,
    pub tinted: bool,
    pub name: String,
    /// Free-form attribute map shown in pog inspection UIs.
    pub attributes: BTreeMap<String, String>,
    /// Present when this pog is the table representation of a drawn card.
    pub card: Option<Card>,
}

impl Pog {
    pub(crate) fn encode(&self, w: &mut PacketWriter) {
        w.write_u64(self.id.0);
        w.write_u64(self.sort_order);
        self.position.encode(w);
        w.write_str(&self.filename);
        w.write_u32(self.face_size);
        w.write_f32(self.angle);
        w.write_f32(self.scale);
        w.write_bool(self.flip_horizontal);
        w.write_bool(self.flip_vertical);
        w.write_bool(self.locked);
        w.write_bool(self.tinted);
        w.write_str(&self.name);
        w.write_u16(self.attributes.len().min(u16::MAX as usize) as u16);
        for (key, value) in self.attributes.iter().take(u16::MAX as usize) {
            w.write_str(key);
            w.write_str(value);
        }
        match &self.card {
            Some(card) => {
                w.write_bool(true);
                card.encode(w);
            }
            None => w.write_bool(false),
        }
    }

    pub(crate) fn decode(r: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
        let id = PogId(r.read_u64()?);
        let sort_order = r.read_u64()?;
        let position = Point::decode(r)?;
        let filename = r.read_string()?;
        let face_size = r.read_u32()?;
        let angle = r.read_f32()?;
        let scale = r.read_f32()?;
        let flip_horizontal = r.read_bool()?;
        let flip_vertical = r.read_bool()?;
        let locked = r.read_bool()?;
        let tinted = r.read_bool()?;
        let name = r.read_string()?;
        let attr_count = r.read_u16()?;
        let mut attributes = BTreeMap::new();
        for _ in 0..attr_count {
            let key = r.read_string()?;
            let value = r.read_string()?;
            attributes.insert(key, value);
        }
        let card = if r.read_bool()? { Some(Card::decode(r)?) } else { None };
        Ok(Self {
            id,
            sort_order,
            position,
            filename,
            face_size,
            angle,
            scale,
            flip_horizontal,
            flip_vertical,
            locked,
            tinted,
            name,
            attributes,
            card,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_unassigned_and_host() {
        assert!(!PlayerId::UNASSIGNED.is_assigned());
        assert!(PlayerId::HOST.is_assigned());
        assert_eq!(PlayerId(3).to_string(), "P-3");
    }

    #[test]
    fn test_state_id_provisional_is_not_stamped() {
        assert!(!StateId::PROVISIONAL.is_stamped());
        assert!(StateId(1).is_stamped());
    }

    #[test]
    fn test_pog_id_compose_partitions_by_minter() {
        let a = PogId::compose(PlayerId(1), 7);
        let b = PogId::compose(PlayerId(2), 7);
        assert_ne!(a, b, "same counter, different minters must differ");
        assert_eq!(PogId::compose(PlayerId(1), 7), a);
    }

    #[test]
    fn test_rect_normalizes_negative_extents() {
        // A drag up-and-left produces negative width/height; edge accessors
        // must still describe the same rectangle.
        let r = Rect::new(10, 10, -4, -6);
        assert_eq!(r.min_x(), 6);
        assert_eq!(r.max_x(), 10);
        assert_eq!(r.min_y(), 4);
        assert_eq!(r.max_y(), 10);
        assert!(r.contains(Point::new(8, 7)));
        assert!(!r.contains(Point::new(11, 7)));
    }

    #[test]
    fn test_grid_mode_round_trip_and_range() {
        for mode in [GridMode::None, GridMode::Square, GridMode::Hex] {
            assert_eq!(GridMode::from_u32(mode.as_u32()).unwrap(), mode);
        }
        assert!(GridMode::from_u32(3).is_err());
    }

    #[test]
    fn test_reject_reason_round_trip_and_range() {
        for reason in [RejectReason::BadPassword, RejectReason::VersionMismatch] {
            assert_eq!(
                RejectReason::from_u32(reason.as_u32()).unwrap(),
                reason
            );
        }
        assert!(RejectReason::from_u32(9).is_err());
    }

    fn sample_pog() -> Pog {
        let mut attributes = BTreeMap::new();
        attributes.insert("HP".to_string(), "12".to_string());
        attributes.insert("AC".to_string(), "15".to_string());
        Pog {
            id: PogId::compose(PlayerId(0), 1),
            sort_order: 4,
            position: Point::new(-64, 128),
            filename: "pogs/goblin.png".to_string(),
            face_size: 1,
            angle: 90.0,
            scale: 1.0,
            flip_horizontal: true,
            flip_vertical: false,
            locked: false,
            tinted: true,
            name: "Grubnash".to_string(),
            attributes,
            card: Some(Card {
                deck_name: "Tarot".to_string(),
                card_name: "The Tower".to_string(),
                art_file: "cards/tower.png".to_string(),
                description: "Sudden upheaval.".to_string(),
            }),
        }
    }

    #[test]
    fn test_pog_round_trip_preserves_every_field() {
        let pog = sample_pog();
        let mut w = PacketWriter::new(0);
        pog.encode(&mut w);
        let bytes = w.into_bytes();

        let mut r = PacketReader::new(&bytes);
        r.read_u32().unwrap();
        let decoded = Pog::decode(&mut r).unwrap();
        r.expect_end().unwrap();
        assert_eq!(decoded, pog);
    }

    #[test]
    fn test_pog_without_card_round_trips() {
        let mut pog = sample_pog();
        pog.card = None;
        pog.attributes.clear();

        let mut w = PacketWriter::new(0);
        pog.encode(&mut w);
        let bytes = w.into_bytes();

        let mut r = PacketReader::new(&bytes);
        r.read_u32().unwrap();
        let decoded = Pog::decode(&mut r).unwrap();
        assert_eq!(decoded, pog);
    }

    #[test]
    fn test_line_segment_round_trip() {
        let seg = LineSegment::new(Point::new(0, 0), Point::new(100, -50), 0xFF00_FF00);
        let mut w = PacketWriter::new(0);
        seg.encode(&mut w);
        let bytes = w.into_bytes();

        let mut r = PacketReader::new(&bytes);
        r.read_u32().unwrap();
        assert_eq!(LineSegment::decode(&mut r).unwrap(), seg);
    }
}
