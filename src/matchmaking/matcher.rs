//! Candidate scoring and group selection
//!
//! Pure matching logic: given a queue snapshot, produce disjoint groups of
//! 4-10 players. The algorithm is deterministic and greedy with a fairness
//! bias: the longest-waiting candidate anchors each pass, and their tolerated
//! skill window widens with wait time so everyone is eventually matchable.
//!
//! Greediness is intentional. An early anchor may consume players who would
//! have formed a better group for a later anchor; the trade is bounded O(n²)
//! latency per pass. Replacing this with a globally optimal assignment would
//! change observable match outcomes.

use crate::matchmaking::queue::QueueEntry;
use crate::utils::elo_difference;
use chrono::{DateTime, Utc};

/// Smallest viable game
pub const MIN_PLAYERS: usize = 4;
/// Largest viable game
pub const MAX_PLAYERS: usize = 10;

/// Elo widening per 10 seconds of wait
const RANGE_GROWTH_PER_STEP: i32 = 50;
/// Wait seconds per widening step
const RANGE_GROWTH_STEP_SECONDS: u64 = 10;

/// A disjoint group of candidates selected for one game session
#[derive(Debug, Clone)]
pub struct MatchedGroup {
    pub members: Vec<QueueEntry>,
}

impl MatchedGroup {
    pub fn player_ids(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|m| m.request.player_id.clone())
            .collect()
    }
}

/// Trait for grouping algorithms over a queue snapshot
pub trait Matcher: Send + Sync {
    /// Produce zero or more disjoint groups from the snapshot
    fn build_groups(&self, snapshot: &[QueueEntry], now: DateTime<Utc>) -> Vec<MatchedGroup>;
}

/// The production greedy, fairness-biased matcher
#[derive(Debug, Default)]
pub struct GreedyMatcher;

impl GreedyMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Tolerated elo difference for an anchor, widened by wait time
    pub fn expanded_range(anchor: &QueueEntry, now: DateTime<Utc>) -> i32 {
        let steps = (anchor.request.wait_seconds(now) / RANGE_GROWTH_STEP_SECONDS) as i32;
        anchor.request.preferences.skill_range + steps * RANGE_GROWTH_PER_STEP
    }

    /// Score a candidate against the anchor. None when the candidate falls
    /// outside the anchor's expanded skill range.
    pub fn score_pair(
        anchor: &QueueEntry,
        candidate: &QueueEntry,
        expanded_range: i32,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let elo_diff = elo_difference(anchor.elo, candidate.elo);
        if elo_diff > expanded_range {
            return None;
        }

        let base = 100.0;
        let elo_score =
            (100.0 - (elo_diff as f64 / expanded_range.max(1) as f64) * 50.0).max(0.0);
        let region_bonus = if anchor.request.connection.region == candidate.request.connection.region
        {
            100.0
        } else {
            0.0
        };
        let connection_bonus = (anchor.request.connection.quality.tier_score()
            + candidate.request.connection.quality.tier_score())
            / 2.0;
        let avg_wait = (anchor.request.wait_seconds(now) + candidate.request.wait_seconds(now))
            as f64
            / 2.0;
        let wait_bonus = (avg_wait * 2.0).min(50.0);

        Some(base + elo_score + region_bonus + connection_bonus + wait_bonus)
    }
}

impl Matcher for GreedyMatcher {
    fn build_groups(&self, snapshot: &[QueueEntry], now: DateTime<Utc>) -> Vec<MatchedGroup> {
        // Oldest request anchors first
        let mut order: Vec<usize> = (0..snapshot.len()).collect();
        order.sort_by_key(|&i| snapshot[i].request.enqueued_at);

        let mut assigned = vec![false; snapshot.len()];
        let mut groups = Vec::new();

        for &anchor_idx in &order {
            if assigned[anchor_idx] {
                continue;
            }
            let anchor = &snapshot[anchor_idx];
            let expanded = Self::expanded_range(anchor, now);

            let mut scored: Vec<(usize, f64)> = order
                .iter()
                .filter(|&&i| i != anchor_idx && !assigned[i])
                .filter_map(|&i| {
                    Self::score_pair(anchor, &snapshot[i], expanded, now).map(|s| (i, s))
                })
                .collect();

            // Highest score first; ties broken by wait time then player id so
            // a pass is fully deterministic.
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        snapshot[a.0]
                            .request
                            .enqueued_at
                            .cmp(&snapshot[b.0].request.enqueued_at)
                    })
                    .then_with(|| {
                        snapshot[a.0]
                            .request
                            .player_id
                            .cmp(&snapshot[b.0].request.player_id)
                    })
            });

            let selected: Vec<usize> = scored
                .iter()
                .take(MAX_PLAYERS - 1)
                .map(|(i, _)| *i)
                .collect();

            // Not enough compatible players: the anchor stays queued and its
            // candidates remain free for later anchors.
            if selected.len() + 1 < MIN_PLAYERS {
                continue;
            }

            assigned[anchor_idx] = true;
            for &i in &selected {
                assigned[i] = true;
            }

            let mut members = vec![anchor.clone()];
            members.extend(selected.iter().map(|&i| snapshot[i].clone()));
            groups.push(MatchedGroup { members });
        }

        groups
    }
}
