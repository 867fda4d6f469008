//! Session persistence: the save format is a replay log of the packet
//! protocol.
//!
//! A saved map is a `u32` format version, a `u32` payload length, then a
//! sequence of length-prefixed encoded `Lines` / `AddPog` / `GridMode`
//! packets — the same encodings used for live traffic, replayed through
//! the same dispatch table on load. Loading is all-or-nothing: any decode
//! failure aborts before a single packet is applied, so a truncated or
//! corrupt file cannot leave partial state behind.
//!
//! The identical blob travels inside a `File` packet (mime
//! [`MIME_MAP`](mapforge_protocol::MIME_MAP)) when the host pushes a
//! loaded map to every joiner mid-session.

use mapforge_protocol::{
    DispatchTable, Message, PlayerId, StateId,
};

use crate::history::DrawHistory;
use crate::map::MapState;
use crate::SessionError;

/// Current save format version.
pub const SAVE_FORMAT_VERSION: u32 = 1;

/// Encodes the public map as a replay blob.
///
/// Lines are flattened: the whole current line set travels as one stamped
/// `Lines` packet, so loading yields the drawn state without the erase
/// history behind it.
pub fn encode_map(map: &MapState, history: &DrawHistory) -> Vec<u8> {
    let mut packets: Vec<Message> = Vec::new();

    let lines = history.rebuild_lines();
    if !lines.is_empty() {
        packets.push(Message::Lines {
            author: PlayerId::HOST,
            state_id: StateId(1),
            lines,
        });
    }
    for pog in map.pogs_in_draw_order() {
        packets.push(Message::AddPog { public: true, pog: (*pog).clone() });
    }
    packets.push(Message::GridMode { mode: map.grid() });

    let mut payload = Vec::new();
    for packet in &packets {
        let bytes = packet.encode();
        payload.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        payload.extend_from_slice(&bytes);
    }

    let mut blob =
        Vec::with_capacity(payload.len() + 8);
    blob.extend_from_slice(&SAVE_FORMAT_VERSION.to_be_bytes());
    blob.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    blob.extend_from_slice(&payload);
    blob
}

/// Decodes a replay blob into its packets, all-or-nothing.
///
/// Only the packet kinds the save format names may appear; anything else
/// marks the blob corrupt.
pub fn decode_map(
    blob: &[u8],
    table: &DispatchTable,
) -> Result<Vec<Message>, SessionError> {
    let version = read_u32(blob, 0)
        .ok_or(SessionError::SaveCorrupt("missing format version"))?;
    if version != SAVE_FORMAT_VERSION {
        return Err(SessionError::SaveVersion(version));
    }
    let payload_len = read_u32(blob, 4)
        .ok_or(SessionError::SaveCorrupt("missing payload length"))?
        as usize;
    let payload = blob
        .get(8..8 + payload_len)
        .ok_or(SessionError::SaveCorrupt("payload shorter than declared"))?;

    let mut packets = Vec::new();
    let mut offset = 0usize;
    while offset < payload.len() {
        let frame_len = read_u32(payload, offset)
            .ok_or(SessionError::SaveCorrupt("truncated frame length"))?
            as usize;
        offset += 4;
        let frame = payload
            .get(offset..offset + frame_len)
            .ok_or(SessionError::SaveCorrupt("truncated frame"))?;
        offset += frame_len;

        let message = table.decode(frame)?;
        match message {
            Message::Lines { .. }
            | Message::AddPog { .. }
            | Message::GridMode { .. } => packets.push(message),
            _ => {
                return Err(SessionError::SaveCorrupt(
                    "unexpected packet kind in map data",
                ));
            }
        }
    }
    Ok(packets)
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}
