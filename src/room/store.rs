//! Persisted room document access
//!
//! Room documents are owned by an external persistence service; the
//! synchronizer consumes it through this narrow CRUD interface and treats
//! every call as an opaque async operation that may fail.

use crate::error::{Result, SyncError};
use crate::matchmaking::RoleConfig;
use crate::types::{PlayerId, RoomId, RoomSettings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// The persisted shape of a room
#[derive(Debug, Clone)]
pub struct RoomDocument {
    pub room_id: RoomId,
    pub host: PlayerId,
    pub players: Vec<PlayerId>,
    pub settings: RoomSettings,
    pub roles: Option<RoleConfig>,
    pub created_at: DateTime<Utc>,
}

/// CRUD interface over the persisted room collection
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn create_room(&self, document: RoomDocument) -> Result<()>;

    async fn find_room(&self, room_id: RoomId) -> Result<Option<RoomDocument>>;

    /// Replace the persisted player list and host in one write
    async fn update_players(
        &self,
        room_id: RoomId,
        players: Vec<PlayerId>,
        host: PlayerId,
    ) -> Result<()>;

    async fn update_settings(&self, room_id: RoomId, settings: RoomSettings) -> Result<()>;

    async fn delete_room(&self, room_id: RoomId) -> Result<()>;
}

/// In-memory room store
#[derive(Debug, Default)]
pub struct InMemoryRoomStore {
    rooms: RwLock<HashMap<RoomId, RoomDocument>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().map(|r| r.len()).unwrap_or(0)
    }

    fn with_rooms<T>(
        &self,
        f: impl FnOnce(&mut HashMap<RoomId, RoomDocument>) -> Result<T>,
    ) -> Result<T> {
        let mut rooms = self.rooms.write().map_err(|_| SyncError::Internal {
            message: "Failed to acquire room store lock".to_string(),
        })?;
        f(&mut rooms)
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn create_room(&self, document: RoomDocument) -> Result<()> {
        self.with_rooms(|rooms| {
            rooms.insert(document.room_id, document);
            Ok(())
        })
    }

    async fn find_room(&self, room_id: RoomId) -> Result<Option<RoomDocument>> {
        let rooms = self.rooms.read().map_err(|_| SyncError::Internal {
            message: "Failed to acquire room store lock".to_string(),
        })?;
        Ok(rooms.get(&room_id).cloned())
    }

    async fn update_players(
        &self,
        room_id: RoomId,
        players: Vec<PlayerId>,
        host: PlayerId,
    ) -> Result<()> {
        self.with_rooms(|rooms| {
            let document = rooms.get_mut(&room_id).ok_or_else(|| SyncError::Persistence {
                message: format!("Room document {} missing on update", room_id),
            })?;
            document.players = players;
            document.host = host;
            Ok(())
        })
    }

    async fn update_settings(&self, room_id: RoomId, settings: RoomSettings) -> Result<()> {
        self.with_rooms(|rooms| {
            let document = rooms.get_mut(&room_id).ok_or_else(|| SyncError::Persistence {
                message: format!("Room document {} missing on settings update", room_id),
            })?;
            document.settings = settings;
            Ok(())
        })
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<()> {
        self.with_rooms(|rooms| {
            rooms.remove(&room_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{current_timestamp, generate_room_id};

    fn document(room_id: RoomId) -> RoomDocument {
        RoomDocument {
            room_id,
            host: "h".to_string(),
            players: vec!["h".to_string()],
            settings: RoomSettings::default(),
            roles: None,
            created_at: current_timestamp(),
        }
    }

    #[tokio::test]
    async fn test_create_find_delete_roundtrip() {
        let store = InMemoryRoomStore::new();
        let room_id = generate_room_id();

        store.create_room(document(room_id)).await.unwrap();
        assert!(store.find_room(room_id).await.unwrap().is_some());

        store.delete_room(room_id).await.unwrap();
        assert!(store.find_room(room_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_players_replaces_list_and_host() {
        let store = InMemoryRoomStore::new();
        let room_id = generate_room_id();
        store.create_room(document(room_id)).await.unwrap();

        store
            .update_players(
                room_id,
                vec!["b".to_string(), "c".to_string()],
                "b".to_string(),
            )
            .await
            .unwrap();

        let found = store.find_room(room_id).await.unwrap().unwrap();
        assert_eq!(found.players, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(found.host, "b");
    }

    #[tokio::test]
    async fn test_update_missing_room_is_persistence_error() {
        let store = InMemoryRoomStore::new();
        let err = store
            .update_players(generate_room_id(), vec![], "h".to_string())
            .await
            .unwrap_err();
        let err = err.downcast::<SyncError>().unwrap();
        assert!(matches!(err, SyncError::Persistence { .. }));
    }
}
