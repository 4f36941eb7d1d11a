//! Configuration management for the matchmaking service

pub mod app;

pub use app::{
    AppConfig, MatchmakingSettings, ServiceSettings, SessionSettings, validate_config,
};
