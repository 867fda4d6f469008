//! Tag → decoder registration table.
//!
//! Built once at session startup and consulted for every inbound packet.
//! Registration keeps the codec closed-world — every tag maps to exactly
//! one decoder — without a monolithic switch over the catalogue.

use crate::message::{self, Message, PacketTag};
use crate::wire::PacketReader;
use crate::ProtocolError;

/// A registered decoder: reads one packet body (tag already consumed).
pub type DecodeFn = fn(&mut PacketReader<'_>) -> Result<Message, ProtocolError>;

/// Maps packet tags to their decoders.
pub struct DispatchTable {
    decoders: [Option<DecodeFn>; PacketTag::COUNT],
}

impl DispatchTable {
    /// Builds the table with every message kind registered.
    pub fn new() -> Self {
        let mut table = Self { decoders: [None; PacketTag::COUNT] };
        table.register(PacketTag::Join, message::decode_join);
        table.register(PacketTag::Reject, message::decode_reject);
        table.register(PacketTag::Cast, message::decode_cast);
        table.register(PacketTag::Text, message::decode_text);
        table.register(PacketTag::Lines, message::decode_lines);
        table.register(PacketTag::Erase, message::decode_erase);
        table.register(PacketTag::AddPog, message::decode_add_pog);
        table.register(PacketTag::RemovePogs, message::decode_remove_pogs);
        table.register(PacketTag::MovePog, message::decode_move_pog);
        table.register(PacketTag::PogData, message::decode_pog_data);
        table.register(PacketTag::PogReorder, message::decode_pog_reorder);
        table.register(PacketTag::PogSize, message::decode_pog_size);
        table.register(PacketTag::RotatePog, message::decode_rotate_pog);
        table.register(PacketTag::FlipPog, message::decode_flip_pog);
        table.register(PacketTag::LockPog, message::decode_lock_pog);
        table.register(PacketTag::Point, message::decode_point);
        table.register(PacketTag::Recenter, message::decode_recenter);
        table.register(PacketTag::File, message::decode_file);
        table.register(PacketTag::PngRequest, message::decode_png_request);
        table.register(PacketTag::GridMode, message::decode_grid_mode);
        table.register(PacketTag::LoginComplete, message::decode_login_complete);
        table.register(PacketTag::Ping, message::decode_ping);
        table.register(PacketTag::Undo, message::decode_undo);
        table.register(PacketTag::Redo, message::decode_redo);
        table.register(PacketTag::DeckList, message::decode_deck_list);
        table.register(PacketTag::DeckDraw, message::decode_deck_draw);
        table.register(PacketTag::DeckCards, message::decode_deck_cards);
        table.register(PacketTag::DeckDiscard, message::decode_deck_discard);
        table.register(PacketTag::DeckRecall, message::decode_deck_recall);
        table
    }

    fn register(&mut self, tag: PacketTag, decoder: DecodeFn) {
        self.decoders[tag as usize] = Some(decoder);
    }

    /// Decodes one packet blob: reads the leading tag, runs the registered
    /// decoder, and verifies the packet was fully consumed.
    pub fn decode(&self, bytes: &[u8]) -> Result<Message, ProtocolError> {
        let mut reader = PacketReader::new(bytes);
        let tag = reader.read_u32()?;
        let decoder = self
            .decoders
            .get(tag as usize)
            .copied()
            .flatten()
            .ok_or(ProtocolError::UnknownTag(tag))?;
        let message = decoder(&mut reader)?;
        reader.expect_end()?;
        Ok(message)
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}
