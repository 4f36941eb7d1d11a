//! Player skill lookup
//!
//! Skill ratings are owned by an external player-document service; this
//! module only defines the narrow read interface the matchmaker consumes,
//! plus an in-memory implementation for tests and single-node deployments.

use crate::error::{Result, SyncError};
use crate::types::{Elo, PlayerId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Elo assigned to players without a stored rating
pub const DEFAULT_ELO: Elo = 1200;

/// Read-only access to player skill ratings
#[async_trait]
pub trait SkillProvider: Send + Sync {
    /// Look up a player's current elo, falling back to the default rating
    async fn get_elo(&self, player_id: &PlayerId) -> Result<Elo>;
}

/// In-memory skill storage
#[derive(Debug, Default)]
pub struct InMemorySkillStorage {
    ratings: RwLock<HashMap<PlayerId, Elo>>,
}

impl InMemorySkillStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_elo(&self, player_id: &str, elo: Elo) {
        if let Ok(mut ratings) = self.ratings.write() {
            ratings.insert(player_id.to_string(), elo);
        }
    }
}

#[async_trait]
impl SkillProvider for InMemorySkillStorage {
    async fn get_elo(&self, player_id: &PlayerId) -> Result<Elo> {
        let ratings = self.ratings.read().map_err(|_| SyncError::Internal {
            message: "Failed to acquire ratings lock".to_string(),
        })?;
        Ok(ratings.get(player_id).copied().unwrap_or(DEFAULT_ELO))
    }
}
