//! Mafia Lobby - Matchmaking and room synchronization for a social deduction game
//!
//! This crate provides a fairness-biased matchmaking queue, a periodic
//! scheduler that forms balanced groups, and real-time room membership
//! synchronization with session lifecycle management.

pub mod chat;
pub mod config;
pub mod error;
pub mod matchmaking;
pub mod metrics;
pub mod room;
pub mod service;
pub mod session;
pub mod skill;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{Result, SyncError};
pub use types::*;

// Re-export key components
pub use matchmaking::{GreedyMatcher, MatchQueue, Matcher, MatchmakingScheduler};
pub use room::{RoomStore, RoomSynchronizer};
pub use service::AppState;
pub use session::{Broadcaster, SessionRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
