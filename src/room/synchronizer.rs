//! Room membership synchronization
//!
//! Owns the in-memory mirror of every active room and applies join, leave,
//! host-transfer, and settings transitions against the persisted room
//! document. Each operation persists first and mirrors after, so the
//! in-memory member set is a subset of the persisted player list at every
//! quiescent point. A room whose last member leaves is deleted from both
//! stores.

use crate::error::{Result, SyncError};
use crate::matchmaking::RoleConfig;
use crate::room::state::RoomState;
use crate::room::store::{RoomDocument, RoomStore};
use crate::session::broadcast::{BroadcastOptions, Broadcaster};
use crate::types::{
    LeaveReason, OutboundEvent, PlayerId, RoomId, RoomSettings, RoomSettingsPatch, RoomSnapshot,
};
use crate::utils::{current_timestamp, generate_room_id};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Capability check against the game-phase subsystem (external collaborator):
/// settings are frozen while a match is running.
pub trait GamePhaseProbe: Send + Sync {
    fn is_game_active(&self, room_id: RoomId) -> bool;
}

/// Probe for deployments without a live game-phase service
#[derive(Debug, Default)]
pub struct IdleGamePhaseProbe;

impl GamePhaseProbe for IdleGamePhaseProbe {
    fn is_game_active(&self, _room_id: RoomId) -> bool {
        false
    }
}

/// Synchronizes in-memory room membership with persisted room documents
pub struct RoomSynchronizer {
    rooms: RwLock<HashMap<RoomId, RoomState>>,
    store: Arc<dyn RoomStore>,
    broadcaster: Arc<dyn Broadcaster>,
    game_phase: Arc<dyn GamePhaseProbe>,
}

impl RoomSynchronizer {
    pub fn new(
        store: Arc<dyn RoomStore>,
        broadcaster: Arc<dyn Broadcaster>,
        game_phase: Arc<dyn GamePhaseProbe>,
    ) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            store,
            broadcaster,
            game_phase,
        }
    }

    fn read_rooms(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<RoomId, RoomState>>> {
        self.rooms.read().map_err(|_| {
            SyncError::Internal {
                message: "Failed to acquire rooms lock".to_string(),
            }
            .into()
        })
    }

    fn write_rooms(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<RoomId, RoomState>>> {
        self.rooms.write().map_err(|_| {
            SyncError::Internal {
                message: "Failed to acquire rooms lock".to_string(),
            }
            .into()
        })
    }

    /// Create a room for a matched group. The first member (the group's
    /// anchor, the longest-waiting player) becomes host.
    pub async fn create_matched_room(
        &self,
        members: Vec<PlayerId>,
        roles: RoleConfig,
        settings: RoomSettings,
    ) -> Result<RoomSnapshot> {
        let host = members.first().cloned().ok_or_else(|| SyncError::Validation {
            reason: "Cannot create a room with no members".to_string(),
        })?;
        let room_id = generate_room_id();

        // Persist before mirroring
        self.store
            .create_room(RoomDocument {
                room_id,
                host: host.clone(),
                players: members.clone(),
                settings: settings.clone(),
                roles: Some(roles),
                created_at: current_timestamp(),
            })
            .await?;

        let state = RoomState {
            room_id,
            host,
            members: members.clone(),
            settings,
            roles: Some(roles),
        };
        let snapshot = state.snapshot();
        self.write_rooms()?.insert(room_id, state);

        info!(
            "Created room {} for matched group of {} (mafia: {}, detective: {}, doctor: {})",
            room_id,
            members.len(),
            roles.mafia,
            roles.detective,
            roles.doctor
        );

        self.broadcaster.broadcast(
            &members,
            OutboundEvent::RoomJoined {
                room: snapshot.clone(),
            },
            BroadcastOptions::default(),
        );

        Ok(snapshot)
    }

    /// Add a player to an existing room
    pub async fn join(&self, room_id: RoomId, player_id: &str) -> Result<RoomSnapshot> {
        let (players, host) = {
            let rooms = self.read_rooms()?;
            let room = rooms.get(&room_id).ok_or_else(|| SyncError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;

            if room.is_member(player_id) {
                return Err(SyncError::AlreadyMember {
                    room_id: room_id.to_string(),
                    player_id: player_id.to_string(),
                }
                .into());
            }
            if room.is_full() {
                return Err(SyncError::RoomFull {
                    room_id: room_id.to_string(),
                }
                .into());
            }

            let mut players = room.members.clone();
            players.push(player_id.to_string());
            (players, room.host.clone())
        };

        self.store
            .update_players(room_id, players.clone(), host)
            .await?;

        let snapshot = {
            let mut rooms = self.write_rooms()?;
            let room = rooms.get_mut(&room_id).ok_or_else(|| SyncError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;
            room.members = players;
            room.snapshot()
        };

        self.broadcaster.broadcast(
            &snapshot.members,
            OutboundEvent::PlayerJoined {
                room_id,
                player_id: player_id.to_string(),
                members: snapshot.members.clone(),
            },
            BroadcastOptions::default(),
        );

        debug!("Player {} joined room {}", player_id, room_id);
        Ok(snapshot)
    }

    /// Remove a player from a room, or record a soft disconnect.
    ///
    /// `Disconnect` keeps membership and only announces the drop; the session
    /// sweep later converts an unreconnected drop into a `Timeout` leave.
    pub async fn leave(&self, room_id: RoomId, player_id: &str, reason: LeaveReason) -> Result<()> {
        if reason == LeaveReason::Disconnect {
            let members = self.membership(room_id)?;
            if !members.iter().any(|m| m == player_id) {
                return Err(SyncError::PlayerNotFound {
                    player_id: player_id.to_string(),
                }
                .into());
            }
            self.broadcaster.broadcast(
                &members,
                OutboundEvent::PlayerDisconnected {
                    room_id,
                    player_id: player_id.to_string(),
                },
                BroadcastOptions::excluding(player_id),
            );
            return Ok(());
        }

        let (members, host, previous_host) = {
            let rooms = self.read_rooms()?;
            let room = rooms.get(&room_id).ok_or_else(|| SyncError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;
            if !room.is_member(player_id) {
                return Err(SyncError::PlayerNotFound {
                    player_id: player_id.to_string(),
                }
                .into());
            }
            let (members, host) = room.membership_without(player_id);
            (members, host, room.host.clone())
        };

        if members.is_empty() {
            // Last member out: destroy the room everywhere
            self.store.delete_room(room_id).await?;
            self.write_rooms()?.remove(&room_id);
            info!("Room {} emptied and deleted", room_id);
            return Ok(());
        }

        let host = host.unwrap_or_else(|| members[0].clone());
        self.store
            .update_players(room_id, members.clone(), host.clone())
            .await?;

        {
            let mut rooms = self.write_rooms()?;
            if let Some(room) = rooms.get_mut(&room_id) {
                room.members = members.clone();
                room.host = host.clone();
            }
        }

        let new_host = (host != previous_host).then_some(host);
        let event = match reason {
            LeaveReason::Timeout => OutboundEvent::PlayerTimeout {
                room_id,
                player_id: player_id.to_string(),
                new_host: new_host.clone(),
            },
            _ => OutboundEvent::PlayerLeft {
                room_id,
                player_id: player_id.to_string(),
                new_host: new_host.clone(),
            },
        };
        self.broadcaster
            .broadcast(&members, event, BroadcastOptions::default());

        debug!(
            "Player {} left room {} ({:?}), new host: {:?}",
            player_id, room_id, reason, new_host
        );
        Ok(())
    }

    /// Hand the host role to another member. Host-only.
    pub async fn transfer_host(
        &self,
        room_id: RoomId,
        current_host: &str,
        new_host: &str,
    ) -> Result<()> {
        let members = {
            let rooms = self.read_rooms()?;
            let room = rooms.get(&room_id).ok_or_else(|| SyncError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;
            if room.host != current_host {
                return Err(SyncError::Unauthorized {
                    reason: "Only the current host may transfer host".to_string(),
                }
                .into());
            }
            if !room.is_member(new_host) {
                return Err(SyncError::PlayerNotFound {
                    player_id: new_host.to_string(),
                }
                .into());
            }
            room.members.clone()
        };

        self.store
            .update_players(room_id, members.clone(), new_host.to_string())
            .await?;

        {
            let mut rooms = self.write_rooms()?;
            if let Some(room) = rooms.get_mut(&room_id) {
                room.host = new_host.to_string();
            }
        }

        self.broadcaster.broadcast(
            &members,
            OutboundEvent::HostTransferred {
                room_id,
                new_host: new_host.to_string(),
            },
            BroadcastOptions::default(),
        );
        Ok(())
    }

    /// Apply a settings patch. Host-only; rejected while a game is running.
    pub async fn update_settings(
        &self,
        room_id: RoomId,
        host_id: &str,
        patch: RoomSettingsPatch,
    ) -> Result<RoomSettings> {
        if self.game_phase.is_game_active(room_id) {
            return Err(SyncError::Validation {
                reason: "Settings cannot change while a game is in progress".to_string(),
            }
            .into());
        }

        let (settings, members) = {
            let rooms = self.read_rooms()?;
            let room = rooms.get(&room_id).ok_or_else(|| SyncError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;
            if room.host != host_id {
                return Err(SyncError::Unauthorized {
                    reason: "Only the host may update room settings".to_string(),
                }
                .into());
            }

            let mut settings = room.settings.clone();
            if let Some(max_players) = patch.max_players {
                if max_players < room.members.len() {
                    return Err(SyncError::Validation {
                        reason: format!(
                            "max_players {} below current member count {}",
                            max_players,
                            room.members.len()
                        ),
                    }
                    .into());
                }
                settings.max_players = max_players;
            }
            if let Some(game_mode) = patch.game_mode {
                settings.game_mode = game_mode;
            }
            (settings, room.members.clone())
        };

        self.store.update_settings(room_id, settings.clone()).await?;

        {
            let mut rooms = self.write_rooms()?;
            if let Some(room) = rooms.get_mut(&room_id) {
                room.settings = settings.clone();
            }
        }

        self.broadcaster.broadcast(
            &members,
            OutboundEvent::RoomSettingsUpdated {
                room_id,
                settings: settings.clone(),
            },
            BroadcastOptions::default(),
        );
        Ok(settings)
    }

    /// Fan an event out to a room's current membership
    pub fn broadcast_to_room(
        &self,
        room_id: RoomId,
        event: OutboundEvent,
        opts: BroadcastOptions,
    ) -> Result<()> {
        let members = self.membership(room_id)?;
        self.broadcaster.broadcast(&members, event, opts);
        Ok(())
    }

    /// Current member list of a room
    pub fn membership(&self, room_id: RoomId) -> Result<Vec<PlayerId>> {
        let rooms = self.read_rooms()?;
        let room = rooms.get(&room_id).ok_or_else(|| SyncError::RoomNotFound {
            room_id: room_id.to_string(),
        })?;
        Ok(room.members.clone())
    }

    /// Point-in-time view of a room, if it exists
    pub fn snapshot(&self, room_id: RoomId) -> Result<Option<RoomSnapshot>> {
        Ok(self.read_rooms()?.get(&room_id).map(|r| r.snapshot()))
    }

    pub fn active_room_count(&self) -> usize {
        self.read_rooms().map(|r| r.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::store::InMemoryRoomStore;
    use crate::session::broadcast::RecordingBroadcaster;

    fn synchronizer() -> (
        RoomSynchronizer,
        Arc<InMemoryRoomStore>,
        Arc<RecordingBroadcaster>,
    ) {
        let store = Arc::new(InMemoryRoomStore::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let sync = RoomSynchronizer::new(
            store.clone(),
            broadcaster.clone(),
            Arc::new(IdleGamePhaseProbe),
        );
        (sync, store, broadcaster)
    }

    fn group(names: &[&str]) -> Vec<PlayerId> {
        names.iter().map(|n| n.to_string()).collect()
    }

    async fn seeded_room(sync: &RoomSynchronizer, names: &[&str]) -> RoomId {
        sync.create_matched_room(
            group(names),
            RoleConfig::for_players(names.len().max(4)),
            RoomSettings::default(),
        )
        .await
        .unwrap()
        .room_id
    }

    #[tokio::test]
    async fn test_create_matched_room_persists_and_mirrors() {
        let (sync, store, broadcaster) = synchronizer();
        let room_id = seeded_room(&sync, &["a", "b", "c", "d"]).await;

        let document = store.find_room(room_id).await.unwrap().unwrap();
        assert_eq!(document.players.len(), 4);
        assert_eq!(document.host, "a");

        let snapshot = sync.snapshot(room_id).unwrap().unwrap();
        assert_eq!(snapshot.host, "a");
        assert!(snapshot.members.contains(&snapshot.host));

        // Every member got the room-joined ack
        assert_eq!(broadcaster.count_event("room-joined"), 4);
    }

    #[tokio::test]
    async fn test_join_validates_and_broadcasts() {
        let (sync, _store, broadcaster) = synchronizer();
        let room_id = seeded_room(&sync, &["a", "b", "c", "d"]).await;
        broadcaster.clear();

        let snapshot = sync.join(room_id, "e").await.unwrap();
        assert_eq!(snapshot.members.len(), 5);
        assert_eq!(broadcaster.count_event("player-joined"), 5);

        // Duplicate join rejected
        let err = sync.join(room_id, "e").await.unwrap_err();
        assert!(matches!(
            err.downcast::<SyncError>().unwrap(),
            SyncError::AlreadyMember { .. }
        ));
    }

    #[tokio::test]
    async fn test_join_full_room_rejected() {
        let (sync, _store, _broadcaster) = synchronizer();
        let members: Vec<String> = (0..10).map(|i| format!("p{i}")).collect();
        let room_id = sync
            .create_matched_room(members, RoleConfig::for_players(10), RoomSettings::default())
            .await
            .unwrap()
            .room_id;

        let err = sync.join(room_id, "late").await.unwrap_err();
        assert!(matches!(
            err.downcast::<SyncError>().unwrap(),
            SyncError::RoomFull { .. }
        ));
    }

    #[tokio::test]
    async fn test_join_unknown_room_not_found() {
        let (sync, _store, _broadcaster) = synchronizer();
        let err = sync.join(generate_room_id(), "p1").await.unwrap_err();
        assert!(matches!(
            err.downcast::<SyncError>().unwrap(),
            SyncError::RoomNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_host_leave_hands_over_in_join_order() {
        let (sync, store, broadcaster) = synchronizer();
        let room_id = seeded_room(&sync, &["h", "b", "c", "d"]).await;
        broadcaster.clear();

        sync.leave(room_id, "h", LeaveReason::Explicit).await.unwrap();

        let snapshot = sync.snapshot(room_id).unwrap().unwrap();
        assert_eq!(snapshot.host, "b");
        assert_eq!(snapshot.members, group(&["b", "c", "d"]));
        assert!(snapshot.members.contains(&snapshot.host));

        let document = store.find_room(room_id).await.unwrap().unwrap();
        assert_eq!(document.host, "b");
        assert_eq!(broadcaster.count_event("player-left"), 3);
    }

    #[tokio::test]
    async fn test_last_member_leave_deletes_room_everywhere() {
        let (sync, store, _broadcaster) = synchronizer();
        let room_id = seeded_room(&sync, &["h", "b", "c", "d"]).await;
        for player in ["b", "c", "d", "h"] {
            sync.leave(room_id, player, LeaveReason::Explicit)
                .await
                .unwrap();
        }

        assert!(sync.snapshot(room_id).unwrap().is_none());
        assert!(store.find_room(room_id).await.unwrap().is_none());
        assert_eq!(sync.active_room_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_membership() {
        let (sync, _store, broadcaster) = synchronizer();
        let room_id = seeded_room(&sync, &["h", "b", "c", "d"]).await;
        broadcaster.clear();

        sync.leave(room_id, "b", LeaveReason::Disconnect)
            .await
            .unwrap();

        let snapshot = sync.snapshot(room_id).unwrap().unwrap();
        assert_eq!(snapshot.members.len(), 4);
        // Announced to the others but not to the dropped player
        assert_eq!(broadcaster.count_event("player-disconnected"), 3);
    }

    #[tokio::test]
    async fn test_timeout_leave_broadcasts_distinct_event() {
        let (sync, _store, broadcaster) = synchronizer();
        let room_id = seeded_room(&sync, &["h", "b", "c", "d"]).await;
        broadcaster.clear();

        sync.leave(room_id, "b", LeaveReason::Timeout).await.unwrap();
        assert_eq!(broadcaster.count_event("player-timeout"), 3);
        assert_eq!(broadcaster.count_event("player-left"), 0);
    }

    #[tokio::test]
    async fn test_transfer_host_requires_current_host() {
        let (sync, _store, _broadcaster) = synchronizer();
        let room_id = seeded_room(&sync, &["h", "b", "c", "d"]).await;

        let err = sync.transfer_host(room_id, "b", "c").await.unwrap_err();
        assert!(matches!(
            err.downcast::<SyncError>().unwrap(),
            SyncError::Unauthorized { .. }
        ));

        sync.transfer_host(room_id, "h", "c").await.unwrap();
        assert_eq!(sync.snapshot(room_id).unwrap().unwrap().host, "c");
    }

    #[tokio::test]
    async fn test_update_settings_host_only() {
        let (sync, _store, broadcaster) = synchronizer();
        let room_id = seeded_room(&sync, &["h", "b", "c", "d"]).await;
        broadcaster.clear();

        let err = sync
            .update_settings(
                room_id,
                "b",
                RoomSettingsPatch {
                    max_players: Some(8),
                    game_mode: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast::<SyncError>().unwrap(),
            SyncError::Unauthorized { .. }
        ));

        let settings = sync
            .update_settings(
                room_id,
                "h",
                RoomSettingsPatch {
                    max_players: Some(8),
                    game_mode: Some("chaos".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(settings.max_players, 8);
        assert_eq!(settings.game_mode, "chaos");
        assert_eq!(broadcaster.count_event("room-settings-updated"), 4);
    }

    #[tokio::test]
    async fn test_update_settings_blocked_during_game() {
        struct ActiveGame;
        impl GamePhaseProbe for ActiveGame {
            fn is_game_active(&self, _room_id: RoomId) -> bool {
                true
            }
        }

        let store = Arc::new(InMemoryRoomStore::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let sync = RoomSynchronizer::new(store, broadcaster, Arc::new(ActiveGame));
        let room_id = seeded_room(&sync, &["h", "b", "c", "d"]).await;

        let err = sync
            .update_settings(room_id, "h", RoomSettingsPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast::<SyncError>().unwrap(),
            SyncError::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn test_settings_cannot_shrink_below_membership() {
        let (sync, _store, _broadcaster) = synchronizer();
        let room_id = seeded_room(&sync, &["h", "b", "c", "d", "e"]).await;

        let err = sync
            .update_settings(
                room_id,
                "h",
                RoomSettingsPatch {
                    max_players: Some(4),
                    game_mode: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast::<SyncError>().unwrap(),
            SyncError::Validation { .. }
        ));
    }
}
