//! Common types used throughout the matchmaking and room service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for players
pub type PlayerId = String;

/// Unique identifier for rooms
pub type RoomId = Uuid;

/// Unique identifier for a live transport (socket connection)
pub type TransportId = Uuid;

/// Skill rating used for match balance
pub type Elo = i32;

/// Network quality tier reported by the client on connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ConnectionQuality {
    /// Score contribution of this tier when pairing candidates
    pub fn tier_score(&self) -> f64 {
        match self {
            ConnectionQuality::Excellent => 40.0,
            ConnectionQuality::Good => 30.0,
            ConnectionQuality::Fair => 20.0,
            ConnectionQuality::Poor => 10.0,
        }
    }
}

/// Connection details attached to a matchmaking request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub region: String,
    pub latency_ms: Option<u32>,
    pub quality: ConnectionQuality,
}

/// Matching constraints supplied by the player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPreferences {
    /// Base tolerated elo difference
    pub skill_range: i32,
    /// Maximum queue wait before the request expires, in seconds
    pub max_wait_time: u64,
    pub preferred_region: Option<String>,
    pub game_mode: Option<String>,
}

impl Default for MatchPreferences {
    fn default() -> Self {
        Self {
            skill_range: 200,
            max_wait_time: 300,
            preferred_region: None,
            game_mode: None,
        }
    }
}

/// A pending matchmaking request. One live request per player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    pub player_id: PlayerId,
    pub preferences: MatchPreferences,
    pub connection: ConnectionInfo,
    pub enqueued_at: DateTime<Utc>,
}

impl MatchRequest {
    /// Seconds this request has been waiting at `now`
    pub fn wait_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.enqueued_at).num_seconds().max(0) as u64
    }

    /// Whether the request has outlived its `max_wait_time`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.wait_seconds(now) > self.preferences.max_wait_time
    }
}

/// Status returned to a player on enqueue or poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    /// 1-based insertion order among not-yet-matched requests
    pub position: usize,
    /// Rough wait estimate in seconds
    pub estimated_wait_time: u64,
    pub players_in_queue: usize,
    pub average_skill: f64,
}

/// Why a player left a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveReason {
    /// Player asked to leave
    Explicit,
    /// Session sweep removed an inactive or unreconnected player
    Timeout,
    /// Transport dropped; membership is kept pending reconnection
    Disconnect,
}

/// Persisted room settings, host-editable while no game is running
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSettings {
    pub max_players: usize,
    pub game_mode: String,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_players: 10,
            game_mode: "classic".to_string(),
        }
    }
}

/// Partial settings update applied by the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomSettingsPatch {
    pub max_players: Option<usize>,
    pub game_mode: Option<String>,
}

/// Point-in-time view of a room, returned to callers and broadcast on joins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub host: PlayerId,
    pub members: Vec<PlayerId>,
    pub settings: RoomSettings,
}

/// A persisted chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub room_id: RoomId,
    pub sender: PlayerId,
    pub content: String,
    pub message_type: String,
    pub sent_at: DateTime<Utc>,
}

/// Socket events received from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum InboundEvent {
    JoinRoom { room_id: RoomId },
    LeaveRoom { room_id: Option<RoomId> },
    RoomSettingsUpdate { settings: RoomSettingsPatch },
    ChatMessage { content: String, message_type: String },
    ReadyStateChange { is_ready: bool },
    VoiceStateChange { is_speaking: bool, is_muted: bool },
    Heartbeat,
}

/// Socket events delivered to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    RoomJoined {
        room: RoomSnapshot,
    },
    PlayerJoined {
        room_id: RoomId,
        player_id: PlayerId,
        members: Vec<PlayerId>,
    },
    PlayerLeft {
        room_id: RoomId,
        player_id: PlayerId,
        new_host: Option<PlayerId>,
    },
    PlayerDisconnected {
        room_id: RoomId,
        player_id: PlayerId,
    },
    PlayerTimeout {
        room_id: RoomId,
        player_id: PlayerId,
        new_host: Option<PlayerId>,
    },
    RoomSettingsUpdated {
        room_id: RoomId,
        settings: RoomSettings,
    },
    HostTransferred {
        room_id: RoomId,
        new_host: PlayerId,
    },
    ChatMessage {
        message: ChatMessage,
    },
    PlayerReadyStateChanged {
        room_id: RoomId,
        player_id: PlayerId,
        is_ready: bool,
    },
    VoiceStateChanged {
        room_id: RoomId,
        player_id: PlayerId,
        is_speaking: bool,
        is_muted: bool,
    },
    SessionInvalidated {
        reason: String,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::current_timestamp;

    #[test]
    fn test_quality_tier_scores() {
        assert_eq!(ConnectionQuality::Excellent.tier_score(), 40.0);
        assert_eq!(ConnectionQuality::Good.tier_score(), 30.0);
        assert_eq!(ConnectionQuality::Fair.tier_score(), 20.0);
        assert_eq!(ConnectionQuality::Poor.tier_score(), 10.0);
    }

    #[test]
    fn test_request_expiry() {
        let request = MatchRequest {
            player_id: "p1".to_string(),
            preferences: MatchPreferences {
                max_wait_time: 5,
                ..Default::default()
            },
            connection: ConnectionInfo {
                region: "us-east".to_string(),
                latency_ms: Some(40),
                quality: ConnectionQuality::Good,
            },
            enqueued_at: current_timestamp(),
        };

        assert!(!request.is_expired(request.enqueued_at + chrono::Duration::seconds(5)));
        assert!(request.is_expired(request.enqueued_at + chrono::Duration::seconds(6)));
    }

    #[test]
    fn test_event_wire_names() {
        let event = OutboundEvent::PlayerDisconnected {
            room_id: Uuid::new_v4(),
            player_id: "p1".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"player-disconnected\""));

        let inbound: InboundEvent =
            serde_json::from_str(r#"{"event":"ready-state-change","data":{"is_ready":true}}"#)
                .unwrap();
        assert!(matches!(
            inbound,
            InboundEvent::ReadyStateChange { is_ready: true }
        ));
    }
}
