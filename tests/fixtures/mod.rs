//! Test fixtures and mock implementations for integration testing

use async_trait::async_trait;
use mafia_lobby::error::{Result, SyncError};
use mafia_lobby::room::store::{InMemoryRoomStore, RoomDocument, RoomStore};
use mafia_lobby::types::{ConnectionInfo, ConnectionQuality, PlayerId, RoomId, RoomSettings};
use std::sync::atomic::{AtomicU32, Ordering};

/// Room store whose first `failures` create calls fail, for exercising the
/// scheduler's retry and re-enqueue path
pub struct FailingRoomStore {
    inner: InMemoryRoomStore,
    failures: AtomicU32,
}

impl FailingRoomStore {
    pub fn failing(failures: u32) -> Self {
        Self {
            inner: InMemoryRoomStore::new(),
            failures: AtomicU32::new(failures),
        }
    }

    /// Fail every create call
    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }
}

#[async_trait]
impl RoomStore for FailingRoomStore {
    async fn create_room(&self, document: RoomDocument) -> Result<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.failures.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(SyncError::Persistence {
                message: "simulated persistence outage".to_string(),
            }
            .into());
        }
        self.inner.create_room(document).await
    }

    async fn find_room(&self, room_id: RoomId) -> Result<Option<RoomDocument>> {
        self.inner.find_room(room_id).await
    }

    async fn update_players(
        &self,
        room_id: RoomId,
        players: Vec<PlayerId>,
        host: PlayerId,
    ) -> Result<()> {
        self.inner.update_players(room_id, players, host).await
    }

    async fn update_settings(&self, room_id: RoomId, settings: RoomSettings) -> Result<()> {
        self.inner.update_settings(room_id, settings).await
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<()> {
        self.inner.delete_room(room_id).await
    }
}

/// A healthy same-region connection
pub fn good_connection() -> ConnectionInfo {
    ConnectionInfo {
        region: "us-east".to_string(),
        latency_ms: Some(40),
        quality: ConnectionQuality::Good,
    }
}
