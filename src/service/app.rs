//! Main application state and service coordination
//!
//! Wires the queue, scheduler, session registry, room synchronizer, and
//! metrics together, owns the background tasks, and exposes the operations
//! the transport edge calls: queue entry points plus the socket event
//! dispatcher.

use crate::chat::{ChatStore, InMemoryChatStore};
use crate::config::AppConfig;
use crate::error::{Result, SyncError};
use crate::matchmaking::{
    GreedyMatcher, MatchQueue, MatchmakingScheduler, MatchmakingStats, QueueEntry,
};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector};
use crate::room::store::{InMemoryRoomStore, RoomStore};
use crate::room::synchronizer::{GamePhaseProbe, IdleGamePhaseProbe, RoomSynchronizer};
use crate::session::broadcast::{BroadcastOptions, SessionBroadcaster};
use crate::session::registry::{EventSink, SessionRegistry};
use crate::skill::{InMemorySkillStorage, SkillProvider};
use crate::types::{
    ChatMessage, ConnectionInfo, InboundEvent, LeaveReason, MatchPreferences, MatchRequest,
    OutboundEvent, QueueStatus, RoomId, TransportId,
};
use crate::utils::current_timestamp;
use anyhow::anyhow;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// External collaborators the service consumes behind traits. Defaults are
/// the in-memory implementations; deployments substitute real backends.
pub struct ServiceBackends {
    pub room_store: Arc<dyn RoomStore>,
    pub skill_provider: Arc<dyn SkillProvider>,
    pub chat_store: Arc<dyn ChatStore>,
    pub game_phase: Arc<dyn GamePhaseProbe>,
}

impl Default for ServiceBackends {
    fn default() -> Self {
        Self {
            room_store: Arc::new(InMemoryRoomStore::new()),
            skill_provider: Arc::new(InMemorySkillStorage::new()),
            chat_store: Arc::new(InMemoryChatStore::new()),
            game_phase: Arc::new(IdleGamePhaseProbe),
        }
    }
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,
    registry: Arc<RwLock<SessionRegistry>>,
    queue: Arc<RwLock<MatchQueue>>,
    rooms: Arc<RoomSynchronizer>,
    scheduler: Arc<MatchmakingScheduler>,
    skill_provider: Arc<dyn SkillProvider>,
    chat_store: Arc<dyn ChatStore>,
    metrics: Arc<MetricsCollector>,
    health_server: Arc<HealthServer>,
    background_tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Initialize with in-memory backends
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::with_backends(config, ServiceBackends::default())
    }

    /// Initialize the application with injected backends
    pub fn with_backends(config: AppConfig, backends: ServiceBackends) -> Result<Self> {
        info!("Initializing {} service", config.service.name);

        let metrics = Arc::new(MetricsCollector::new()?);
        let registry = Arc::new(RwLock::new(SessionRegistry::new()));
        let broadcaster = Arc::new(SessionBroadcaster::new(registry.clone()));

        let rooms = Arc::new(RoomSynchronizer::new(
            backends.room_store,
            broadcaster.clone(),
            backends.game_phase,
        ));

        let queue = Arc::new(RwLock::new(MatchQueue::new(
            config.matchmaking.tick_interval_seconds,
        )));
        let scheduler = Arc::new(MatchmakingScheduler::new(
            queue.clone(),
            Arc::new(GreedyMatcher::new()),
            rooms.clone(),
            registry.clone(),
            broadcaster,
            config.matchmaking.clone(),
            metrics.clone(),
        ));

        let health_server = Arc::new(HealthServer::new(
            HealthServerConfig {
                port: config.service.health_port,
                ..HealthServerConfig::default()
            },
            metrics.clone(),
            config.service.name.clone(),
        ));

        Ok(Self {
            config,
            registry,
            queue,
            rooms,
            scheduler,
            skill_provider: backends.skill_provider,
            chat_store: backends.chat_store,
            metrics,
            health_server,
            background_tasks: Vec::new(),
        })
    }

    /// Start the health server, scheduler tick, and session sweep
    pub fn start(&mut self) {
        info!("Starting {} service", self.config.service.name);

        let health_server = self.health_server.clone();
        self.background_tasks.push(tokio::spawn(async move {
            if let Err(e) = health_server.start().await {
                error!("Health server failed: {}", e);
            }
        }));

        self.background_tasks
            .push(self.scheduler.clone().start_tick_task());
        self.background_tasks.push(self.start_sweep_task());

        info!("Service started with {} background tasks", self.background_tasks.len());
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) {
        info!("Starting graceful shutdown");
        self.health_server.stop();

        for task in self.background_tasks.drain(..) {
            task.abort();
        }

        match self.scheduler.stats() {
            Ok(stats) => info!("Final matchmaking statistics: {:?}", stats),
            Err(e) => warn!("Failed to read final stats: {}", e),
        }
        info!("Shutdown completed");
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn rooms(&self) -> Arc<RoomSynchronizer> {
        self.rooms.clone()
    }

    pub fn matchmaking_stats(&self) -> Result<MatchmakingStats> {
        self.scheduler.stats()
    }

    /// Run one scheduler pass immediately, outside the periodic tick
    pub async fn run_matchmaking_tick(&self) -> Result<usize> {
        self.scheduler.run_tick().await
    }

    fn write_registry(&self) -> Result<std::sync::RwLockWriteGuard<'_, SessionRegistry>> {
        self.registry.write().map_err(|_| {
            SyncError::Internal {
                message: "Failed to acquire session registry lock".to_string(),
            }
            .into()
        })
    }

    fn write_queue(&self) -> Result<std::sync::RwLockWriteGuard<'_, MatchQueue>> {
        self.queue.write().map_err(|_| {
            SyncError::Internal {
                message: "Failed to acquire queue lock".to_string(),
            }
            .into()
        })
    }

    /// Register a transport for an authenticated player, superseding any
    /// previous session. A reconnecting player is sent their room snapshot.
    pub fn connect(&self, player_id: &str, sink: EventSink) -> Result<TransportId> {
        if player_id.is_empty() {
            return Err(SyncError::Validation {
                reason: "Player id cannot be empty".to_string(),
            }
            .into());
        }

        let (transport_id, room_id) = {
            let mut registry = self.write_registry()?;
            let transport_id = registry.register(player_id.to_string(), sink);
            self.metrics.sessions_active.set(registry.len() as i64);
            (transport_id, registry.room_of(player_id))
        };

        if let Some(room_id) = room_id {
            if let Some(snapshot) = self.rooms.snapshot(room_id)? {
                self.send_to(player_id, OutboundEvent::RoomJoined { room: snapshot })?;
            }
        }

        debug!("Player {} connected (transport {})", player_id, transport_id);
        Ok(transport_id)
    }

    /// Record a transport drop. Membership survives until the grace window
    /// lapses; the room is told the player dropped.
    pub async fn disconnect(&self, player_id: &str) -> Result<()> {
        let room_id = self.write_registry()?.mark_disconnected(player_id);

        if let Some(room_id) = room_id {
            if let Err(e) = self.rooms.leave(room_id, player_id, LeaveReason::Disconnect).await {
                debug!("Disconnect announcement skipped for {}: {}", player_id, e);
            }
        }
        debug!("Player {} disconnected", player_id);
        Ok(())
    }

    /// Enter the matchmaking queue. Missing preferences fall back to the
    /// configured defaults; the player's rating is resolved before enqueueing.
    pub async fn join_queue(
        &self,
        player_id: &str,
        preferences: Option<MatchPreferences>,
        connection: ConnectionInfo,
    ) -> Result<QueueStatus> {
        let preferences = preferences.unwrap_or(MatchPreferences {
            skill_range: self.config.matchmaking.default_skill_range,
            max_wait_time: self.config.matchmaking.default_max_wait_seconds,
            preferred_region: None,
            game_mode: None,
        });

        if player_id.is_empty() {
            return Err(SyncError::Validation {
                reason: "Player id cannot be empty".to_string(),
            }
            .into());
        }
        if preferences.skill_range <= 0 {
            return Err(SyncError::Validation {
                reason: "Skill range must be positive".to_string(),
            }
            .into());
        }
        if preferences.max_wait_time == 0 {
            return Err(SyncError::Validation {
                reason: "Max wait time must be positive".to_string(),
            }
            .into());
        }
        if connection.region.is_empty() {
            return Err(SyncError::Validation {
                reason: "Connection region cannot be empty".to_string(),
            }
            .into());
        }

        // Resolve the rating before taking the queue lock
        let elo = self.skill_provider.get_elo(&player_id.to_string()).await?;

        let status = self.write_queue()?.enqueue(QueueEntry {
            request: MatchRequest {
                player_id: player_id.to_string(),
                preferences,
                connection,
                enqueued_at: current_timestamp(),
            },
            elo,
        })?;

        self.metrics.queue_requests_total.inc();
        self.metrics.queue_depth.set(status.players_in_queue as i64);
        info!(
            "Player {} queued (elo {}, position {})",
            player_id, elo, status.position
        );
        Ok(status)
    }

    /// Leave the queue. Idempotent: returns whether a request was removed.
    pub fn leave_queue(&self, player_id: &str) -> Result<bool> {
        let mut queue = self.write_queue()?;
        let removed = queue.dequeue(player_id);
        self.metrics.queue_depth.set(queue.len() as i64);
        if removed {
            info!("Player {} left the queue", player_id);
        }
        Ok(removed)
    }

    /// Current queue status for a waiting player
    pub fn queue_status(&self, player_id: &str) -> Result<Option<QueueStatus>> {
        let queue = self.queue.read().map_err(|_| SyncError::Internal {
            message: "Failed to acquire queue lock".to_string(),
        })?;
        Ok(queue.status_for(player_id))
    }

    /// Dispatch one inbound socket event for a player.
    ///
    /// Every event counts as activity. Failures are reported back to the
    /// player's own transport as an `error` event and also returned.
    pub async fn handle_socket_event(&self, player_id: &str, event: InboundEvent) -> Result<()> {
        self.write_registry()?.touch(player_id);

        let result = self.apply_socket_event(player_id, event).await;
        if let Err(e) = &result {
            // Caller mistakes go back to the caller, not into the incident log
            match e.downcast_ref::<SyncError>() {
                Some(sync_error) if sync_error.is_caller_error() => {
                    debug!("Socket event from {} rejected: {}", player_id, e);
                }
                _ => warn!("Socket event from {} failed: {}", player_id, e),
            }
            let _ = self.send_to(
                player_id,
                OutboundEvent::Error {
                    message: e.to_string(),
                },
            );
        }
        result
    }

    async fn apply_socket_event(&self, player_id: &str, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::JoinRoom { room_id } => {
                self.rooms.join(room_id, player_id).await?;
                self.write_registry()?.set_room(player_id, room_id);
                Ok(())
            }
            InboundEvent::LeaveRoom { room_id } => {
                let room_id = match room_id.or(self.room_of(player_id)?) {
                    Some(room_id) => room_id,
                    None => {
                        return Err(SyncError::Validation {
                            reason: "Player is not in a room".to_string(),
                        }
                        .into())
                    }
                };
                self.rooms.leave(room_id, player_id, LeaveReason::Explicit).await?;
                self.write_registry()?.clear_room(player_id);
                Ok(())
            }
            InboundEvent::RoomSettingsUpdate { settings } => {
                let room_id = self.require_room(player_id)?;
                self.rooms.update_settings(room_id, player_id, settings).await?;
                Ok(())
            }
            InboundEvent::ChatMessage {
                content,
                message_type,
            } => {
                let room_id = self.require_room(player_id)?;
                let message = ChatMessage {
                    room_id,
                    sender: player_id.to_string(),
                    content,
                    message_type,
                    sent_at: current_timestamp(),
                };

                // Persist before fan-out; the sender hears their own message
                self.chat_store.save_message(message.clone()).await?;
                self.rooms.broadcast_to_room(
                    room_id,
                    OutboundEvent::ChatMessage { message },
                    BroadcastOptions::default(),
                )?;
                Ok(())
            }
            InboundEvent::ReadyStateChange { is_ready } => {
                let room_id = self.require_room(player_id)?;
                self.rooms.broadcast_to_room(
                    room_id,
                    OutboundEvent::PlayerReadyStateChanged {
                        room_id,
                        player_id: player_id.to_string(),
                        is_ready,
                    },
                    BroadcastOptions::default(),
                )?;
                Ok(())
            }
            InboundEvent::VoiceStateChange {
                is_speaking,
                is_muted,
            } => {
                let room_id = self.require_room(player_id)?;
                self.rooms.broadcast_to_room(
                    room_id,
                    OutboundEvent::VoiceStateChanged {
                        room_id,
                        player_id: player_id.to_string(),
                        is_speaking,
                        is_muted,
                    },
                    BroadcastOptions::default(),
                )?;
                Ok(())
            }
            InboundEvent::Heartbeat => Ok(()),
        }
    }

    fn room_of(&self, player_id: &str) -> Result<Option<RoomId>> {
        let registry = self.registry.read().map_err(|_| SyncError::Internal {
            message: "Failed to acquire session registry lock".to_string(),
        })?;
        Ok(registry.room_of(player_id))
    }

    fn require_room(&self, player_id: &str) -> Result<RoomId> {
        self.room_of(player_id)?.ok_or_else(|| {
            anyhow!(SyncError::Validation {
                reason: "Player is not in a room".to_string(),
            })
        })
    }

    fn send_to(&self, player_id: &str, event: OutboundEvent) -> Result<()> {
        let registry = self.registry.read().map_err(|_| SyncError::Internal {
            message: "Failed to acquire session registry lock".to_string(),
        })?;
        if let Some(sink) = registry.sink(player_id) {
            let _ = sink.send(event);
        }
        Ok(())
    }

    /// Remove sessions past their idle timeout or reconnection grace window,
    /// issuing a timeout-leave for each swept member still in a room.
    pub async fn sweep_sessions(&self) -> Result<usize> {
        sweep_expired_sessions(
            &self.registry,
            &self.rooms,
            &self.metrics,
            self.config.session.idle_timeout_minutes,
            self.config.session.disconnect_grace_seconds,
        )
        .await
    }

    fn start_sweep_task(&self) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let rooms = self.rooms.clone();
        let metrics = self.metrics.clone();
        let sweep_interval = self.config.sweep_interval();
        let idle_timeout_minutes = self.config.session.idle_timeout_minutes;
        let disconnect_grace_seconds = self.config.session.disconnect_grace_seconds;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            info!(
                "Session sweep task started ({}s interval)",
                sweep_interval.as_secs()
            );

            loop {
                interval.tick().await;
                if let Err(e) = sweep_expired_sessions(
                    &registry,
                    &rooms,
                    &metrics,
                    idle_timeout_minutes,
                    disconnect_grace_seconds,
                )
                .await
                {
                    error!("Session sweep failed: {}", e);
                }
            }
        })
    }
}

/// One sweep pass, shared by the periodic task and the direct entry point
async fn sweep_expired_sessions(
    registry: &Arc<RwLock<SessionRegistry>>,
    rooms: &Arc<RoomSynchronizer>,
    metrics: &Arc<MetricsCollector>,
    idle_timeout_minutes: u64,
    disconnect_grace_seconds: u64,
) -> Result<usize> {
    let swept = {
        let mut registry = registry.write().map_err(|_| SyncError::Internal {
            message: "Failed to acquire session registry lock".to_string(),
        })?;
        let swept = registry.sweep_expired(
            current_timestamp(),
            idle_timeout_minutes,
            disconnect_grace_seconds,
        );
        metrics.sessions_active.set(registry.len() as i64);
        swept
    };

    if swept.is_empty() {
        return Ok(0);
    }

    let count = swept.len();
    metrics.sessions_swept_total.inc_by(count as u64);
    info!("Sweeping {} expired sessions", count);

    for session in swept {
        if let Some(room_id) = session.room_id {
            if let Err(e) = rooms
                .leave(room_id, &session.player_id, LeaveReason::Timeout)
                .await
            {
                warn!(
                    "Timeout-leave failed for {} in room {}: {}",
                    session.player_id, room_id, e
                );
            }
        }
    }
    metrics.rooms_active.set(rooms.active_room_count() as i64);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionQuality;
    use tokio::sync::mpsc::unbounded_channel;

    fn connection() -> ConnectionInfo {
        ConnectionInfo {
            region: "us-east".to_string(),
            latency_ms: Some(40),
            quality: ConnectionQuality::Good,
        }
    }

    fn app() -> AppState {
        AppState::new(AppConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_join_queue_resolves_rating_and_reports_position() {
        let app = app();
        let status = app.join_queue("p1", None, connection()).await.unwrap();
        assert_eq!(status.position, 1);
        assert_eq!(status.players_in_queue, 1);

        let status = app.join_queue("p2", None, connection()).await.unwrap();
        assert_eq!(status.position, 2);
    }

    #[tokio::test]
    async fn test_join_queue_rejects_duplicates_and_bad_input() {
        let app = app();
        app.join_queue("p1", None, connection()).await.unwrap();

        let err = app.join_queue("p1", None, connection()).await.unwrap_err();
        assert!(matches!(
            err.downcast::<SyncError>().unwrap(),
            SyncError::AlreadyQueued { .. }
        ));

        let err = app.join_queue("", None, connection()).await.unwrap_err();
        assert!(matches!(
            err.downcast::<SyncError>().unwrap(),
            SyncError::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn test_leave_queue_is_idempotent() {
        let app = app();
        app.join_queue("p1", None, connection()).await.unwrap();

        assert!(app.leave_queue("p1").unwrap());
        assert!(!app.leave_queue("p1").unwrap());
        assert!(app.queue_status("p1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_full_cycle_queue_to_room() {
        let app = app();
        for i in 1..=4 {
            let player = format!("p{i}");
            let (tx, _rx) = unbounded_channel();
            app.connect(&player, tx).unwrap();
            app.join_queue(&player, None, connection()).await.unwrap();
        }

        let rooms = app.run_matchmaking_tick().await.unwrap();
        assert_eq!(rooms, 1);
        assert_eq!(app.rooms().active_room_count(), 1);
        assert!(app.queue_status("p1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chat_requires_room_and_reports_error() {
        let app = app();
        let (tx, mut rx) = unbounded_channel();
        app.connect("p1", tx).unwrap();

        let result = app
            .handle_socket_event(
                "p1",
                InboundEvent::ChatMessage {
                    content: "hello".to_string(),
                    message_type: "text".to_string(),
                },
            )
            .await;
        assert!(result.is_err());

        // The failure is also surfaced on the player's own transport
        assert!(matches!(
            rx.try_recv().unwrap(),
            OutboundEvent::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_sweep_converts_lapsed_disconnect_to_timeout_leave() {
        let mut config = AppConfig::default();
        config.session.disconnect_grace_seconds = 0;
        let app = AppState::new(config).unwrap();

        let mut receivers = Vec::new();
        for i in 1..=4 {
            let player = format!("p{i}");
            let (tx, rx) = unbounded_channel();
            app.connect(&player, tx).unwrap();
            receivers.push(rx);
            app.join_queue(&player, None, connection()).await.unwrap();
        }
        app.run_matchmaking_tick().await.unwrap();

        // The scheduler bound every matched session to the room
        let room_id = app.registry.read().unwrap().room_of("p2").unwrap();

        app.disconnect("p2").await.unwrap();
        let swept = app.sweep_sessions().await.unwrap();
        assert_eq!(swept, 1);
        assert_eq!(app.rooms.membership(room_id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_heartbeat_is_accepted_without_a_room() {
        let app = app();
        let (tx, _rx) = unbounded_channel();
        app.connect("p1", tx).unwrap();
        app.handle_socket_event("p1", InboundEvent::Heartbeat)
            .await
            .unwrap();
    }
}
