//! The player roster: who is at the table.
//!
//! The host is the authority: it assigns ids on join and broadcasts the
//! full roster (the "cast") whenever it changes. Joiners replace their
//! whole roster from each cast rather than patching it.

use mapforge_protocol::{PlayerId, PlayerInfo};
use mapforge_transport::ConnectionId;

/// One participant as the session tracks them.
#[derive(Debug, Clone)]
pub struct Player {
    pub info: PlayerInfo,
    /// The transport connection this player is reachable on. Absent for
    /// the local player and when offline.
    pub connection: Option<ConnectionId>,
}

/// The ordered list of participants, with the local player marked.
#[derive(Debug)]
pub struct Roster {
    players: Vec<Player>,
    local_index: usize,
    next_id: i32,
}

impl Roster {
    /// A roster holding only an unidentified local player.
    pub fn solo(display_name: &str, character_name: &str) -> Self {
        Self {
            players: vec![Player {
                info: PlayerInfo {
                    display_name: display_name.to_string(),
                    character_name: character_name.to_string(),
                    id: PlayerId::UNASSIGNED,
                    is_host: false,
                },
                connection: None,
            }],
            local_index: 0,
            next_id: 1,
        }
    }

    /// Resets to a single unidentified local player, keeping the names.
    pub fn reset(&mut self) {
        let local = self.local().clone();
        *self = Self::solo(&local.info.display_name, &local.info.character_name);
    }

    /// Marks the local player as the authoritative host (id 0).
    pub fn begin_hosting(&mut self) {
        self.reset();
        let local = &mut self.players[self.local_index];
        local.info.id = PlayerId::HOST;
        local.info.is_host = true;
        self.next_id = 1;
    }

    pub fn local(&self) -> &Player {
        &self.players[self.local_index]
    }

    pub fn local_id(&self) -> PlayerId {
        self.local().info.id
    }

    /// The next unused player id.
    pub fn assign_next_id(&mut self) -> PlayerId {
        let id = PlayerId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Adds a remote player (host side, after a successful join).
    pub fn add(&mut self, info: PlayerInfo, connection: ConnectionId) {
        self.players.push(Player { info, connection: Some(connection) });
    }

    /// Removes the player on a dropped connection, returning them.
    pub fn remove_by_connection(&mut self, connection: ConnectionId) -> Option<Player> {
        let index = self
            .players
            .iter()
            .position(|p| p.connection == Some(connection))?;
        // The local player has no connection, so the local index can only
        // shift down, never be removed.
        let removed = self.players.remove(index);
        if index < self.local_index {
            self.local_index -= 1;
        }
        Some(removed)
    }

    pub fn by_connection(&self, connection: ConnectionId) -> Option<&Player> {
        self.players.iter().find(|p| p.connection == Some(connection))
    }

    pub fn by_id(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.info.id == id)
    }

    /// Replaces the whole roster from a received cast (joiner side).
    pub fn replace_from_cast(&mut self, players: Vec<PlayerInfo>, your_index: i32) {
        let your_index = your_index.max(0) as usize;
        self.players = players
            .into_iter()
            .map(|info| Player { info, connection: None })
            .collect();
        self.local_index = your_index.min(self.players.len().saturating_sub(1));
    }

    /// The roster as wire entries, in order.
    pub fn infos(&self) -> Vec<PlayerInfo> {
        self.players.iter().map(|p| p.info.clone()).collect()
    }

    /// Every remote player's connection, with its roster index.
    pub fn connections(&self) -> impl Iterator<Item = (usize, ConnectionId)> + '_ {
        self.players
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.connection.map(|c| (i, c)))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, id: i32, is_host: bool) -> PlayerInfo {
        PlayerInfo {
            display_name: name.to_string(),
            character_name: format!("Sir {name}"),
            id: PlayerId(id),
            is_host,
        }
    }

    #[test]
    fn test_solo_roster_is_unidentified() {
        let roster = Roster::solo("Aran", "Sir Aran");
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.local_id(), PlayerId::UNASSIGNED);
        assert!(!roster.local().info.is_host);
    }

    #[test]
    fn test_begin_hosting_claims_id_zero() {
        let mut roster = Roster::solo("Aran", "Sir Aran");
        roster.begin_hosting();
        assert_eq!(roster.local_id(), PlayerId::HOST);
        assert!(roster.local().info.is_host);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_assign_next_id_never_repeats() {
        let mut roster = Roster::solo("Host", "GM");
        roster.begin_hosting();
        let a = roster.assign_next_id();
        let b = roster.assign_next_id();
        assert_eq!(a, PlayerId(1));
        assert_eq!(b, PlayerId(2));
    }

    #[test]
    fn test_add_and_remove_by_connection() {
        let mut roster = Roster::solo("Host", "GM");
        roster.begin_hosting();
        let conn = ConnectionId::new(9);
        roster.add(info("Aran", 1, false), conn);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.by_connection(conn).unwrap().info.id, PlayerId(1));

        let removed = roster.remove_by_connection(conn).unwrap();
        assert_eq!(removed.info.display_name, "Aran");
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.local_id(), PlayerId::HOST, "local player survives");
    }

    #[test]
    fn test_replace_from_cast_sets_local_index() {
        let mut roster = Roster::solo("Aran", "Sir Aran");
        roster.replace_from_cast(
            vec![info("Host", 0, true), info("Aran", 1, false)],
            1,
        );
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.local_id(), PlayerId(1));
        assert_eq!(roster.by_id(PlayerId(0)).unwrap().info.display_name, "Host");
    }

    #[test]
    fn test_reset_returns_to_solo() {
        let mut roster = Roster::solo("Aran", "Sir Aran");
        roster.replace_from_cast(
            vec![info("Host", 0, true), info("Aran", 1, false)],
            1,
        );
        roster.reset();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.local_id(), PlayerId::UNASSIGNED);
        assert_eq!(roster.local().info.display_name, "Aran");
    }
}
