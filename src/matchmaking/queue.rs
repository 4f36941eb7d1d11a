//! The pending-request queue for matchmaking
//!
//! The queue exclusively owns `MatchRequest` lifetime until a group is
//! committed and handed to room creation. Entries carry the elo resolved at
//! enqueue time so matching passes see a consistent, skill-annotated view.

use crate::error::{Result, SyncError};
use crate::types::{Elo, MatchRequest, PlayerId, QueueStatus};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use super::matcher::MIN_PLAYERS;

/// A queued request annotated with the player's skill rating
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub request: MatchRequest,
    pub elo: Elo,
}

/// FIFO queue of pending matchmaking requests, one per player
#[derive(Debug, Default)]
pub struct MatchQueue {
    entries: VecDeque<QueueEntry>,
    /// Scheduler tick interval, used for wait estimates
    tick_seconds: u64,
}

impl MatchQueue {
    pub fn new(tick_seconds: u64) -> Self {
        Self {
            entries: VecDeque::new(),
            tick_seconds,
        }
    }

    /// Add a request to the queue. A duplicate player id is rejected, not merged.
    pub fn enqueue(&mut self, entry: QueueEntry) -> Result<QueueStatus> {
        if self.contains(&entry.request.player_id) {
            return Err(SyncError::AlreadyQueued {
                player_id: entry.request.player_id.clone(),
            }
            .into());
        }

        let player_id = entry.request.player_id.clone();
        self.entries.push_back(entry);

        // Position of the entry we just pushed
        Ok(self
            .status_for(&player_id)
            .unwrap_or_else(|| self.queue_wide_status(self.entries.len())))
    }

    /// Remove a player's request. Idempotent: returns false if absent.
    pub fn dequeue(&mut self, player_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.request.player_id != player_id);
        self.entries.len() < before
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.entries.iter().any(|e| e.request.player_id == player_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consistent point-in-time copy of the queue for a matching pass
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Remove and return every request older than its `max_wait_time`
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> Vec<QueueEntry> {
        let mut expired = Vec::new();
        self.entries.retain(|e| {
            if e.request.is_expired(now) {
                expired.push(e.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    /// Atomically remove a matched group from the queue.
    ///
    /// Compare-and-remove: succeeds only if every member is still queued.
    /// If any member left between snapshot and commit, nothing is removed and
    /// the leave wins.
    pub fn commit_group(&mut self, player_ids: &[PlayerId]) -> Option<Vec<QueueEntry>> {
        if !player_ids.iter().all(|id| self.contains(id)) {
            return None;
        }

        let mut removed = Vec::with_capacity(player_ids.len());
        self.entries.retain(|e| {
            if player_ids.contains(&e.request.player_id) {
                removed.push(e.clone());
                false
            } else {
                true
            }
        });
        Some(removed)
    }

    /// Re-enqueue entries after a failed room creation, preserving their
    /// original enqueue timestamps so waiting players keep their priority.
    pub fn restore(&mut self, entries: Vec<QueueEntry>) {
        for entry in entries {
            if !self.contains(&entry.request.player_id) {
                self.entries.push_back(entry);
            }
        }
        // Restored entries must regain their age-based priority
        self.entries
            .make_contiguous()
            .sort_by_key(|e| e.request.enqueued_at);
    }

    /// Current queue status for a specific player, if queued
    pub fn status_for(&self, player_id: &str) -> Option<QueueStatus> {
        let position = self
            .entries
            .iter()
            .position(|e| e.request.player_id == player_id)?
            + 1;
        Some(self.queue_wide_status(position))
    }

    /// Average elo across all queued players
    pub fn average_skill(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.iter().map(|e| e.elo as f64).sum::<f64>() / self.entries.len() as f64
    }

    fn queue_wide_status(&self, position: usize) -> QueueStatus {
        QueueStatus {
            position,
            estimated_wait_time: self.estimated_wait_seconds(),
            players_in_queue: self.entries.len(),
            average_skill: self.average_skill(),
        }
    }

    /// Rough wait estimate: one tick when a group can already be seated,
    /// otherwise 15 seconds per missing player.
    fn estimated_wait_seconds(&self) -> u64 {
        if self.entries.len() >= MIN_PLAYERS {
            self.tick_seconds.max(1)
        } else {
            (MIN_PLAYERS - self.entries.len()) as u64 * 15
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionInfo, ConnectionQuality, MatchPreferences};
    use crate::utils::current_timestamp;

    fn entry(player_id: &str, elo: Elo) -> QueueEntry {
        QueueEntry {
            request: MatchRequest {
                player_id: player_id.to_string(),
                preferences: MatchPreferences::default(),
                connection: ConnectionInfo {
                    region: "us-east".to_string(),
                    latency_ms: Some(40),
                    quality: ConnectionQuality::Good,
                },
                enqueued_at: current_timestamp(),
            },
            elo,
        }
    }

    #[test]
    fn test_enqueue_returns_position_and_average() {
        let mut queue = MatchQueue::new(2);

        let status = queue.enqueue(entry("p1", 1200)).unwrap();
        assert_eq!(status.position, 1);
        assert_eq!(status.players_in_queue, 1);
        assert_eq!(status.average_skill, 1200.0);

        let status = queue.enqueue(entry("p2", 1400)).unwrap();
        assert_eq!(status.position, 2);
        assert_eq!(status.players_in_queue, 2);
        assert_eq!(status.average_skill, 1300.0);
    }

    #[test]
    fn test_duplicate_enqueue_rejected() {
        let mut queue = MatchQueue::new(2);
        queue.enqueue(entry("p1", 1200)).unwrap();

        let err = queue.enqueue(entry("p1", 1200)).unwrap_err();
        let err = err.downcast::<SyncError>().unwrap();
        assert!(matches!(err, SyncError::AlreadyQueued { .. }));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_dequeue_is_idempotent() {
        let mut queue = MatchQueue::new(2);
        queue.enqueue(entry("p1", 1200)).unwrap();

        assert!(queue.dequeue("p1"));
        assert!(!queue.dequeue("p1"));
        assert!(!queue.dequeue("never_queued"));
    }

    #[test]
    fn test_expire_stale_removes_only_overdue() {
        let mut queue = MatchQueue::new(2);

        let mut overdue = entry("p1", 1200);
        overdue.request.preferences.max_wait_time = 5;
        overdue.request.enqueued_at = current_timestamp() - chrono::Duration::seconds(6);
        queue.enqueue(overdue).unwrap();
        queue.enqueue(entry("p2", 1300)).unwrap();

        let expired = queue.expire_stale(current_timestamp());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].request.player_id, "p1");
        assert_eq!(queue.len(), 1);
        assert!(queue.contains("p2"));
    }

    #[test]
    fn test_commit_group_all_or_nothing() {
        let mut queue = MatchQueue::new(2);
        queue.enqueue(entry("p1", 1200)).unwrap();
        queue.enqueue(entry("p2", 1250)).unwrap();
        queue.enqueue(entry("p3", 1300)).unwrap();

        // p2 leaves between snapshot and commit: the leave wins
        queue.dequeue("p2");
        let ids = vec!["p1".to_string(), "p2".to_string(), "p3".to_string()];
        assert!(queue.commit_group(&ids).is_none());
        assert_eq!(queue.len(), 2);

        // Remaining pair commits cleanly
        let ids = vec!["p1".to_string(), "p3".to_string()];
        let removed = queue.commit_group(&ids).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_restore_preserves_original_timestamps() {
        let mut queue = MatchQueue::new(2);

        let mut old = entry("p1", 1200);
        old.request.enqueued_at = current_timestamp() - chrono::Duration::seconds(30);
        let original = old.request.enqueued_at;
        queue.enqueue(old).unwrap();
        queue.enqueue(entry("p2", 1250)).unwrap();

        let removed = queue
            .commit_group(&["p1".to_string(), "p2".to_string()])
            .unwrap();
        assert!(queue.is_empty());

        queue.restore(removed);
        assert_eq!(queue.len(), 2);
        let snapshot = queue.snapshot();
        // Oldest entry regains the front of the queue
        assert_eq!(snapshot[0].request.player_id, "p1");
        assert_eq!(snapshot[0].request.enqueued_at, original);
    }

    #[test]
    fn test_estimated_wait_shrinks_when_group_seatable() {
        let mut queue = MatchQueue::new(2);
        let status = queue.enqueue(entry("p1", 1200)).unwrap();
        assert_eq!(status.estimated_wait_time, 45); // 3 missing players

        queue.enqueue(entry("p2", 1200)).unwrap();
        queue.enqueue(entry("p3", 1200)).unwrap();
        let status = queue.enqueue(entry("p4", 1200)).unwrap();
        assert_eq!(status.estimated_wait_time, 2); // next tick
    }
}
