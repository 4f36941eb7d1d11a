//! Service metrics collection

pub mod health;

pub use health::{HealthServer, HealthServerConfig};

use crate::error::Result;
use prometheus::{IntCounter, IntGauge, Registry};

/// Prometheus metrics for the matchmaking and room core
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    registry: Registry,

    pub queue_requests_total: IntCounter,
    pub queue_expired_total: IntCounter,
    pub queue_depth: IntGauge,

    pub matches_formed_total: IntCounter,
    pub players_matched_total: IntCounter,
    pub rooms_created_total: IntCounter,
    pub room_creation_failures_total: IntCounter,
    pub rooms_active: IntGauge,

    pub sessions_active: IntGauge,
    pub sessions_swept_total: IntCounter,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let queue_requests_total = IntCounter::new(
            "queue_requests_total",
            "Total matchmaking requests accepted into the queue",
        )?;
        let queue_expired_total = IntCounter::new(
            "queue_expired_total",
            "Total queue requests removed after exceeding their max wait time",
        )?;
        let queue_depth = IntGauge::new("queue_depth", "Players currently waiting in the queue")?;
        let matches_formed_total =
            IntCounter::new("matches_formed_total", "Total groups produced by the matcher")?;
        let players_matched_total = IntCounter::new(
            "players_matched_total",
            "Total players placed into matched groups",
        )?;
        let rooms_created_total =
            IntCounter::new("rooms_created_total", "Total rooms created from matched groups")?;
        let room_creation_failures_total = IntCounter::new(
            "room_creation_failures_total",
            "Room creations that failed and re-enqueued their group",
        )?;
        let rooms_active = IntGauge::new("rooms_active", "Rooms currently active in memory")?;
        let sessions_active =
            IntGauge::new("sessions_active", "Player sessions currently registered")?;
        let sessions_swept_total = IntCounter::new(
            "sessions_swept_total",
            "Sessions removed by the expiry sweep",
        )?;

        registry.register(Box::new(queue_requests_total.clone()))?;
        registry.register(Box::new(queue_expired_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(matches_formed_total.clone()))?;
        registry.register(Box::new(players_matched_total.clone()))?;
        registry.register(Box::new(rooms_created_total.clone()))?;
        registry.register(Box::new(room_creation_failures_total.clone()))?;
        registry.register(Box::new(rooms_active.clone()))?;
        registry.register(Box::new(sessions_active.clone()))?;
        registry.register(Box::new(sessions_swept_total.clone()))?;

        Ok(Self {
            registry,
            queue_requests_total,
            queue_expired_total,
            queue_depth,
            matches_formed_total,
            players_matched_total,
            rooms_created_total,
            room_creation_failures_total,
            rooms_active,
            sessions_active,
            sessions_swept_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
