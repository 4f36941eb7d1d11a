//! Connected-player session registry
//!
//! The registry exclusively owns `PlayerSession` lifetime: a session is
//! created on authenticated connection, touched on every inbound event, and
//! removed by an explicit disconnect that never reconnects or by the periodic
//! sweep. A player has at most one active session; a new connection for the
//! same player supersedes the old one.

use crate::types::{OutboundEvent, PlayerId, RoomId, TransportId};
use crate::utils::{current_timestamp, generate_transport_id};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound half of a live transport
pub type EventSink = mpsc::UnboundedSender<OutboundEvent>;

/// Liveness of a session's transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// Transport dropped; membership survives until the grace window lapses
    Disconnected { since: DateTime<Utc> },
}

/// A connected (or gracefully disconnected) player
#[derive(Debug)]
pub struct PlayerSession {
    pub player_id: PlayerId,
    pub transport_id: TransportId,
    pub sink: EventSink,
    pub room_id: Option<RoomId>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub state: ConnectionState,
}

/// A session removed by the sweep, tagged with the room needing a timeout-leave
#[derive(Debug, Clone)]
pub struct SweptSession {
    pub player_id: PlayerId,
    pub room_id: Option<RoomId>,
}

/// Registry of all live player sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<PlayerId, PlayerSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new transport for a player, superseding any prior session.
    ///
    /// The superseded transport is told to disconnect via a
    /// `session-invalidated` event. Room association survives the handover so
    /// a reconnecting player lands back in their room.
    pub fn register(&mut self, player_id: PlayerId, sink: EventSink) -> TransportId {
        let transport_id = generate_transport_id();
        let now = current_timestamp();

        let room_id = if let Some(previous) = self.sessions.remove(&player_id) {
            debug!(
                "Superseding session for player {} (old transport {})",
                player_id, previous.transport_id
            );
            let _ = previous.sink.send(OutboundEvent::SessionInvalidated {
                reason: "Session superseded by a newer connection".to_string(),
            });
            previous.room_id
        } else {
            None
        };

        self.sessions.insert(
            player_id.clone(),
            PlayerSession {
                player_id,
                transport_id,
                sink,
                room_id,
                connected_at: now,
                last_activity: now,
                state: ConnectionState::Connected,
            },
        );
        transport_id
    }

    /// Record inbound activity for a player
    pub fn touch(&mut self, player_id: &str) {
        if let Some(session) = self.sessions.get_mut(player_id) {
            session.last_activity = current_timestamp();
        }
    }

    /// Associate the session with a room
    pub fn set_room(&mut self, player_id: &str, room_id: RoomId) {
        if let Some(session) = self.sessions.get_mut(player_id) {
            session.room_id = Some(room_id);
        }
    }

    /// Clear the session's room association
    pub fn clear_room(&mut self, player_id: &str) {
        if let Some(session) = self.sessions.get_mut(player_id) {
            session.room_id = None;
        }
    }

    /// Soft disconnect: keeps the session, starting the reconnection grace window
    pub fn mark_disconnected(&mut self, player_id: &str) -> Option<RoomId> {
        let session = self.sessions.get_mut(player_id)?;
        session.state = ConnectionState::Disconnected {
            since: current_timestamp(),
        };
        session.room_id
    }

    pub fn get(&self, player_id: &str) -> Option<&PlayerSession> {
        self.sessions.get(player_id)
    }

    pub fn sink(&self, player_id: &str) -> Option<EventSink> {
        self.sessions.get(player_id).map(|s| s.sink.clone())
    }

    pub fn room_of(&self, player_id: &str) -> Option<RoomId> {
        self.sessions.get(player_id).and_then(|s| s.room_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove sessions that idled past the timeout or never reconnected within
    /// the grace window. Returned entries still carry their room so the caller
    /// can issue timeout-leaves.
    pub fn sweep_expired(
        &mut self,
        now: DateTime<Utc>,
        idle_timeout_minutes: u64,
        disconnect_grace_seconds: u64,
    ) -> Vec<SweptSession> {
        let idle_cutoff = now - Duration::minutes(idle_timeout_minutes as i64);
        let grace_cutoff = now - Duration::seconds(disconnect_grace_seconds as i64);

        let expired: Vec<PlayerId> = self
            .sessions
            .values()
            .filter(|s| match s.state {
                ConnectionState::Connected => s.last_activity < idle_cutoff,
                ConnectionState::Disconnected { since } => since < grace_cutoff,
            })
            .map(|s| s.player_id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|player_id| {
                self.sessions.remove(&player_id).map(|s| SweptSession {
                    player_id,
                    room_id: s.room_id,
                })
            })
            .collect()
    }
}
