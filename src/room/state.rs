//! In-memory mirror of an active room

use crate::matchmaking::RoleConfig;
use crate::types::{PlayerId, RoomId, RoomSettings, RoomSnapshot};

/// Live view of a room: the member set in join order and the current host.
///
/// Invariant: `host` is always a member whenever `members` is non-empty. The
/// member list is a subset of the persisted room document at every quiescent
/// point; operations persist first and mirror after.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room_id: RoomId,
    pub host: PlayerId,
    pub members: Vec<PlayerId>,
    pub settings: RoomSettings,
    pub roles: Option<RoleConfig>,
}

impl RoomState {
    pub fn is_member(&self, player_id: &str) -> bool {
        self.members.iter().any(|m| m == player_id)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.settings.max_players
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Membership with the player removed, plus the host after the removal.
    /// When the host leaves, the next remaining member in join order takes over.
    pub fn membership_without(&self, player_id: &str) -> (Vec<PlayerId>, Option<PlayerId>) {
        let members: Vec<PlayerId> = self
            .members
            .iter()
            .filter(|m| m.as_str() != player_id)
            .cloned()
            .collect();

        let host = if members.is_empty() {
            None
        } else if self.host == player_id {
            Some(members[0].clone())
        } else {
            Some(self.host.clone())
        };

        (members, host)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id,
            host: self.host.clone(),
            members: self.members.clone(),
            settings: self.settings.clone(),
        }
    }
}
