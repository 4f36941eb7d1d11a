//! Periodic matchmaking scheduler
//!
//! Drives the fixed-interval matching tick: expire stale requests, run the
//! matcher over a snapshot, then commit each produced group by atomically
//! removing it from the queue and creating its room. Phases are strictly
//! ordered within a tick so a player can never be matched twice.
//!
//! One long-lived scheduler task owns queue access; it is injected where
//! needed rather than reached through a global.

use crate::config::MatchmakingSettings;
use crate::error::{Result, SyncError};
use crate::matchmaking::matcher::{Matcher, MIN_PLAYERS};
use crate::matchmaking::queue::{MatchQueue, QueueEntry};
use crate::matchmaking::roles::RoleConfig;
use crate::metrics::MetricsCollector;
use crate::room::synchronizer::RoomSynchronizer;
use crate::session::broadcast::Broadcaster;
use crate::session::registry::SessionRegistry;
use crate::types::{OutboundEvent, PlayerId, RoomSettings};
use crate::utils::current_timestamp;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Statistics about scheduler operations
#[derive(Debug, Clone, Default)]
pub struct MatchmakingStats {
    /// Total requests accepted into the queue
    pub players_queued: u64,
    /// Total requests removed after exceeding their max wait
    pub players_expired: u64,
    /// Total groups produced and committed
    pub matches_formed: u64,
    /// Total players placed into rooms
    pub players_matched: u64,
    /// Total rooms created for matched groups
    pub rooms_created: u64,
    /// Room creations that exhausted retries and re-enqueued their group
    pub room_creation_failures: u64,
    /// Players waiting right now
    pub players_waiting: usize,
}

/// The periodic matchmaking scheduler
pub struct MatchmakingScheduler {
    queue: Arc<RwLock<MatchQueue>>,
    matcher: Arc<dyn Matcher>,
    rooms: Arc<RoomSynchronizer>,
    registry: Arc<RwLock<SessionRegistry>>,
    broadcaster: Arc<dyn Broadcaster>,
    settings: MatchmakingSettings,
    stats: Arc<RwLock<MatchmakingStats>>,
    metrics: Arc<MetricsCollector>,
}

impl MatchmakingScheduler {
    pub fn new(
        queue: Arc<RwLock<MatchQueue>>,
        matcher: Arc<dyn Matcher>,
        rooms: Arc<RoomSynchronizer>,
        registry: Arc<RwLock<SessionRegistry>>,
        broadcaster: Arc<dyn Broadcaster>,
        settings: MatchmakingSettings,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            queue,
            matcher,
            rooms,
            registry,
            broadcaster,
            settings,
            stats: Arc::new(RwLock::new(MatchmakingStats::default())),
            metrics,
        }
    }

    fn write_queue(&self) -> Result<std::sync::RwLockWriteGuard<'_, MatchQueue>> {
        self.queue.write().map_err(|_| {
            SyncError::Internal {
                message: "Failed to acquire queue lock".to_string(),
            }
            .into()
        })
    }

    fn with_stats(&self, f: impl FnOnce(&mut MatchmakingStats)) -> Result<()> {
        let mut stats = self.stats.write().map_err(|_| SyncError::Internal {
            message: "Failed to acquire stats lock".to_string(),
        })?;
        f(&mut stats);
        Ok(())
    }

    /// Run one matching pass. Returns the number of rooms created.
    pub async fn run_tick(&self) -> Result<usize> {
        let now = current_timestamp();

        // Phase 1: expiry always completes before matching
        let expired = self.write_queue()?.expire_stale(now);
        if !expired.is_empty() {
            // No notification beyond removal; waiting clients poll their status
            info!("Expired {} stale matchmaking requests", expired.len());
            self.metrics.queue_expired_total.inc_by(expired.len() as u64);
            self.with_stats(|s| s.players_expired += expired.len() as u64)?;
        }

        // Phase 2: skip a tick that cannot seat a group
        let (queue_len, snapshot) = {
            let queue = self.queue.read().map_err(|_| SyncError::Internal {
                message: "Failed to acquire queue lock".to_string(),
            })?;
            (queue.len(), queue.snapshot())
        };
        self.metrics.queue_depth.set(queue_len as i64);
        self.with_stats(|s| s.players_waiting = queue_len)?;
        if queue_len < MIN_PLAYERS {
            return Ok(0);
        }

        // Phase 3: match over the snapshot
        let groups = self.matcher.build_groups(&snapshot, now);
        if groups.is_empty() {
            debug!("Matching pass over {} candidates produced no groups", queue_len);
            return Ok(0);
        }

        // Phase 4: commit each group; one group's failure never aborts the others
        let mut rooms_created = 0;
        for group in groups {
            let player_ids = group.player_ids();

            // Compare-and-remove: a leave that raced the matcher wins here
            let removed = match self.write_queue()?.commit_group(&player_ids) {
                Some(removed) => removed,
                None => {
                    debug!(
                        "Skipping group {:?}: a member left the queue mid-tick",
                        player_ids
                    );
                    continue;
                }
            };

            self.metrics.matches_formed_total.inc();
            self.metrics
                .players_matched_total
                .inc_by(player_ids.len() as u64);
            self.with_stats(|s| {
                s.matches_formed += 1;
                s.players_matched += player_ids.len() as u64;
            })?;

            if self.create_room_for_group(&player_ids, removed).await? {
                rooms_created += 1;
            }
        }

        let remaining = self
            .queue
            .read()
            .map_err(|_| SyncError::Internal {
                message: "Failed to acquire queue lock".to_string(),
            })?
            .len();
        self.metrics.queue_depth.set(remaining as i64);
        self.with_stats(|s| s.players_waiting = remaining)?;

        Ok(rooms_created)
    }

    /// Create the room for a committed group, retrying once before giving the
    /// group back to the queue with original timestamps preserved.
    async fn create_room_for_group(
        &self,
        player_ids: &[PlayerId],
        removed: Vec<QueueEntry>,
    ) -> Result<bool> {
        let roles = RoleConfig::for_players(player_ids.len());
        let settings = RoomSettings {
            game_mode: removed[0]
                .request
                .preferences
                .game_mode
                .clone()
                .unwrap_or_else(|| RoomSettings::default().game_mode),
            ..RoomSettings::default()
        };

        let mut attempt = 0;
        loop {
            match self
                .rooms
                .create_matched_room(player_ids.to_vec(), roles, settings.clone())
                .await
            {
                Ok(snapshot) => {
                    info!(
                        "Matched {} players into room {} (mafia: {}, specials: {})",
                        player_ids.len(),
                        snapshot.room_id,
                        roles.mafia,
                        roles.detective + roles.doctor
                    );

                    // Bind each member's live session to the room so
                    // disconnects and reconnects resolve to it
                    match self.registry.write() {
                        Ok(mut registry) => {
                            for player_id in player_ids {
                                registry.set_room(player_id, snapshot.room_id);
                            }
                        }
                        Err(_) => warn!("Session registry lock poisoned, room binding skipped"),
                    }

                    self.metrics.rooms_created_total.inc();
                    self.metrics.rooms_active.set(self.rooms.active_room_count() as i64);
                    self.with_stats(|s| s.rooms_created += 1)?;
                    return Ok(true);
                }
                Err(e) if attempt < self.settings.room_creation_retries => {
                    attempt += 1;
                    warn!(
                        "Room creation failed for group {:?} (attempt {}): {}",
                        player_ids, attempt, e
                    );
                }
                Err(e) => {
                    error!(
                        "Room creation failed for group {:?} after {} retries, re-enqueueing: {}",
                        player_ids, attempt, e
                    );
                    self.metrics.room_creation_failures_total.inc();
                    self.with_stats(|s| s.room_creation_failures += 1)?;

                    // Matched players must not be dropped: restore them with
                    // their original enqueue timestamps and tell each one.
                    self.write_queue()?.restore(removed);
                    for player_id in player_ids {
                        self.broadcaster.send_to(
                            player_id,
                            OutboundEvent::Error {
                                message: "Match found but room creation failed; you are back in the queue"
                                    .to_string(),
                            },
                        );
                    }
                    return Ok(false);
                }
            }
        }
    }

    /// Get current scheduler statistics
    pub fn stats(&self) -> Result<MatchmakingStats> {
        let stats = self.stats.read().map_err(|_| SyncError::Internal {
            message: "Failed to acquire stats lock".to_string(),
        })?;
        Ok(stats.clone())
    }

    /// Start the periodic tick task
    pub fn start_tick_task(self: Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(&self);
        let tick = std::time::Duration::from_secs(self.settings.tick_interval_seconds);

        let handle = tokio::spawn(async move {
            let mut tick_interval = interval(tick);

            loop {
                tick_interval.tick().await;

                match scheduler.run_tick().await {
                    Ok(rooms) if rooms > 0 => {
                        debug!("Matchmaking tick created {} rooms", rooms);
                    }
                    Ok(_) => {}
                    Err(e) => error!("Error during matchmaking tick: {}", e),
                }
            }
        });

        info!(
            "Started matchmaking scheduler (tick every {}s)",
            self.settings.tick_interval_seconds
        );
        handle
    }
}
