//! The draw history: stamped commands, provisional echoes, undo/redo.
//!
//! Every undoable mutation of the line set (line add, erase) is a command
//! stamped with a host-issued [`StateId`]. The history is the ordered log
//! of those commands; the current line set is always a deterministic
//! replay of the still-active log, so every node that holds the same log
//! computes bit-identical lines.
//!
//! Joiner-minted commands are *provisional* until the host's stamped echo
//! arrives: they render immediately (low apparent latency) but sit in a
//! separate FIFO. The host link is ordered, so the first stamped echo of
//! our own authorship confirms the oldest provisional.

use std::collections::VecDeque;

use mapforge_protocol::{
    LineSegment, Message, PlayerId, Rect, StateId,
};

use crate::map::crop_segment;

/// One undoable mutation of the line set.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Lines { lines: Vec<LineSegment> },
    Erase {
        rect: Rect,
        color_specific: bool,
        color: u32,
    },
}

impl DrawCommand {
    /// Applies this command to a line set in place.
    fn apply(&self, lines: &mut Vec<LineSegment>) {
        match self {
            DrawCommand::Lines { lines: added } => {
                lines.extend_from_slice(added);
            }
            DrawCommand::Erase { rect, color_specific, color } => {
                *lines = lines
                    .iter()
                    .flat_map(|seg| {
                        crop_segment(seg, rect, *color_specific, *color)
                    })
                    .collect();
            }
        }
    }

    /// The wire packet carrying this command under the given stamp.
    pub fn to_message(&self, author: PlayerId, state_id: StateId) -> Message {
        match self {
            DrawCommand::Lines { lines } => Message::Lines {
                author,
                state_id,
                lines: lines.clone(),
            },
            DrawCommand::Erase { rect, color_specific, color } => {
                Message::Erase {
                    author,
                    state_id,
                    rect: *rect,
                    color_specific: *color_specific,
                    color: *color,
                }
            }
        }
    }
}

/// A stamped log entry. Inactive entries are undone; redo reactivates.
#[derive(Debug, Clone)]
struct StampedCommand {
    state_id: StateId,
    author: PlayerId,
    command: DrawCommand,
    active: bool,
}

/// The ordered command log plus the local provisional FIFO.
#[derive(Debug, Default)]
pub struct DrawHistory {
    commands: Vec<StampedCommand>,
    /// Locally applied, not yet host-stamped (joiner side only).
    pending: VecDeque<DrawCommand>,
    highest: StateId,
}

impl DrawHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Highest state id seen so far.
    pub fn highest_state_id(&self) -> StateId {
        self.highest
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Every stamped id in log order (active or not).
    pub fn stamped_ids(&self) -> Vec<StateId> {
        self.commands.iter().map(|c| c.state_id).collect()
    }

    /// Records a host-stamped command.
    pub fn record_stamped(
        &mut self,
        state_id: StateId,
        author: PlayerId,
        command: DrawCommand,
    ) {
        self.highest = self.highest.max(state_id);
        self.commands.push(StampedCommand {
            state_id,
            author,
            command,
            active: true,
        });
    }

    /// Records a local command awaiting the host's stamp.
    pub fn record_provisional(&mut self, command: DrawCommand) {
        self.pending.push_back(command);
    }

    /// The host's stamped echo of our own oldest provisional command:
    /// drop the provisional, record the stamped version in its place.
    pub fn confirm_provisional(
        &mut self,
        state_id: StateId,
        author: PlayerId,
        command: DrawCommand,
    ) {
        if self.pending.pop_front().is_none() {
            tracing::warn!(
                %state_id,
                "stamped echo with no provisional to confirm"
            );
        }
        self.record_stamped(state_id, author, command);
    }

    /// Deactivates a command. Returns whether anything changed.
    pub fn undo(&mut self, state_id: StateId) -> bool {
        match self.commands.iter_mut().find(|c| c.state_id == state_id) {
            Some(cmd) if cmd.active => {
                cmd.active = false;
                true
            }
            _ => false,
        }
    }

    /// Reactivates an undone command. Returns whether anything changed.
    pub fn redo(&mut self, state_id: StateId) -> bool {
        match self.commands.iter_mut().find(|c| c.state_id == state_id) {
            Some(cmd) if !cmd.active => {
                cmd.active = true;
                true
            }
            _ => false,
        }
    }

    /// Recomputes the line set: active stamped commands in log order,
    /// then the local provisionals on top.
    pub fn rebuild_lines(&self) -> Vec<LineSegment> {
        let mut lines = Vec::new();
        for entry in self.commands.iter().filter(|c| c.active) {
            entry.command.apply(&mut lines);
        }
        for command in &self.pending {
            command.apply(&mut lines);
        }
        lines
    }

    /// The active log as wire packets, stamps preserved — the host sends
    /// this to a new joiner so both replay identical histories.
    pub fn replay_packets(&self) -> Vec<Message> {
        self.commands
            .iter()
            .filter(|c| c.active)
            .map(|c| c.command.to_message(c.author, c.state_id))
            .collect()
    }
}
