//! Matchmaking queue, scoring, and scheduling

pub mod matcher;
pub mod queue;
pub mod roles;
pub mod scheduler;

pub use matcher::{GreedyMatcher, Matcher, MatchedGroup, MAX_PLAYERS, MIN_PLAYERS};
pub use queue::{MatchQueue, QueueEntry};
pub use roles::RoleConfig;
pub use scheduler::{MatchmakingScheduler, MatchmakingStats};
