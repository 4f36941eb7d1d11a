//! Error types for the matchmaking and room synchronization service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking and room scenarios
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Invalid request: {reason}")]
    Validation { reason: String },

    #[error("Player already queued: {player_id}")]
    AlreadyQueued { player_id: String },

    #[error("Room not found: {room_id}")]
    RoomNotFound { room_id: String },

    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: String },

    #[error("Room is full: {room_id}")]
    RoomFull { room_id: String },

    #[error("Player {player_id} is already a member of room {room_id}")]
    AlreadyMember { room_id: String, player_id: String },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Persistence operation failed: {message}")]
    Persistence { message: String },

    #[error("Internal service error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Whether this error is a caller mistake rather than a service incident.
    ///
    /// Validation and authorization failures are returned synchronously and
    /// never logged as incidents.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            SyncError::Validation { .. }
                | SyncError::AlreadyQueued { .. }
                | SyncError::AlreadyMember { .. }
                | SyncError::RoomFull { .. }
                | SyncError::Unauthorized { .. }
        )
    }
}
