//! Room-scoped event fan-out
//!
//! Delivers outbound events to the live transports of a room's membership.
//! Membership is supplied by the room synchronizer; the broadcaster itself
//! only resolves player ids to transports. Delivery to a dead transport is
//! dropped silently, the sweep will reap that session.

use crate::session::registry::SessionRegistry;
use crate::types::{OutboundEvent, PlayerId};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// Delivery options for a broadcast
#[derive(Debug, Clone, Default)]
pub struct BroadcastOptions {
    /// Skip this player (never used for chat, which always echoes the sender)
    pub exclude: Option<PlayerId>,
}

impl BroadcastOptions {
    pub fn excluding(player_id: &str) -> Self {
        Self {
            exclude: Some(player_id.to_string()),
        }
    }
}

/// Trait for delivering room-scoped events to sessions
pub trait Broadcaster: Send + Sync {
    /// Fan an event out to every listed member's transport
    fn broadcast(&self, members: &[PlayerId], event: OutboundEvent, opts: BroadcastOptions);

    /// Deliver an event to a single player
    fn send_to(&self, player_id: &str, event: OutboundEvent);
}

/// Broadcaster backed by the live session registry
pub struct SessionBroadcaster {
    registry: Arc<RwLock<SessionRegistry>>,
}

impl SessionBroadcaster {
    pub fn new(registry: Arc<RwLock<SessionRegistry>>) -> Self {
        Self { registry }
    }
}

impl Broadcaster for SessionBroadcaster {
    fn broadcast(&self, members: &[PlayerId], event: OutboundEvent, opts: BroadcastOptions) {
        let registry = match self.registry.read() {
            Ok(registry) => registry,
            Err(_) => {
                debug!("Session registry lock poisoned, dropping broadcast");
                return;
            }
        };

        for player_id in members {
            if opts.exclude.as_deref() == Some(player_id.as_str()) {
                continue;
            }
            if let Some(sink) = registry.sink(player_id) {
                if sink.send(event.clone()).is_err() {
                    debug!("Dropping event for {}: transport closed", player_id);
                }
            }
        }
    }

    fn send_to(&self, player_id: &str, event: OutboundEvent) {
        if let Ok(registry) = self.registry.read() {
            if let Some(sink) = registry.sink(player_id) {
                let _ = sink.send(event);
            }
        }
    }
}

/// Broadcaster that records every delivery, for tests
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    deliveries: Mutex<Vec<(PlayerId, OutboundEvent)>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// All (recipient, event) pairs delivered so far
    pub fn deliveries(&self) -> Vec<(PlayerId, OutboundEvent)> {
        self.deliveries
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Count deliveries whose serialized form names the given wire event
    pub fn count_event(&self, wire_name: &str) -> usize {
        self.deliveries()
            .iter()
            .filter(|(_, event)| {
                serde_json::to_string(event)
                    .map(|json| json.contains(&format!("\"{}\"", wire_name)))
                    .unwrap_or(false)
            })
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut deliveries) = self.deliveries.lock() {
            deliveries.clear();
        }
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, members: &[PlayerId], event: OutboundEvent, opts: BroadcastOptions) {
        if let Ok(mut deliveries) = self.deliveries.lock() {
            for player_id in members {
                if opts.exclude.as_deref() == Some(player_id.as_str()) {
                    continue;
                }
                deliveries.push((player_id.clone(), event.clone()));
            }
        }
    }

    fn send_to(&self, player_id: &str, event: OutboundEvent) {
        if let Ok(mut deliveries) = self.deliveries.lock() {
            deliveries.push((player_id.to_string(), event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_broadcast_reaches_all_members() {
        let registry = Arc::new(RwLock::new(SessionRegistry::new()));
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        {
            let mut reg = registry.write().unwrap();
            reg.register("p1".to_string(), tx1);
            reg.register("p2".to_string(), tx2);
        }

        let broadcaster = SessionBroadcaster::new(registry);
        broadcaster.broadcast(
            &["p1".to_string(), "p2".to_string()],
            OutboundEvent::Error {
                message: "test".to_string(),
            },
            BroadcastOptions::default(),
        );

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_respects_exclusion() {
        let registry = Arc::new(RwLock::new(SessionRegistry::new()));
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        {
            let mut reg = registry.write().unwrap();
            reg.register("p1".to_string(), tx1);
            reg.register("p2".to_string(), tx2);
        }

        let broadcaster = SessionBroadcaster::new(registry);
        broadcaster.broadcast(
            &["p1".to_string(), "p2".to_string()],
            OutboundEvent::Error {
                message: "test".to_string(),
            },
            BroadcastOptions::excluding("p1"),
        );

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_closed_transport_does_not_fail_broadcast() {
        let registry = Arc::new(RwLock::new(SessionRegistry::new()));
        let (tx1, rx1) = unbounded_channel();
        {
            let mut reg = registry.write().unwrap();
            reg.register("p1".to_string(), tx1);
        }
        drop(rx1);

        let broadcaster = SessionBroadcaster::new(registry);
        broadcaster.broadcast(
            &["p1".to_string()],
            OutboundEvent::Error {
                message: "test".to_string(),
            },
            BroadcastOptions::default(),
        );
    }
}
