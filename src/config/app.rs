//! Main application configuration
//!
//! This module defines the primary configuration structures for the mafia-lobby
//! service, including environment variable loading and validation.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matchmaking: MatchmakingSettings,
    pub session: SessionSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check and metrics endpoints
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matchmaking-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingSettings {
    /// Scheduler tick interval in seconds
    pub tick_interval_seconds: u64,
    /// Default base skill range when the player supplies none
    pub default_skill_range: i32,
    /// Default maximum queue wait in seconds
    pub default_max_wait_seconds: u64,
    /// How many times room creation is retried before re-enqueueing a group
    pub room_creation_retries: u32,
}

/// Session and room synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Interval between expired-session sweeps, in seconds
    pub sweep_interval_seconds: u64,
    /// Idle timeout after which a session is removed, in minutes
    pub idle_timeout_minutes: u64,
    /// Grace window after a soft disconnect before a timeout-leave fires, in seconds
    pub disconnect_grace_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "mafia-lobby".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 2,
            default_skill_range: 200,
            default_max_wait_seconds: 300, // 5 minutes
            room_creation_retries: 1,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 300, // 5 minutes
            idle_timeout_minutes: 30,
            disconnect_grace_seconds: 60,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            config.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Matchmaking settings
        if let Ok(tick) = env::var("TICK_INTERVAL_SECONDS") {
            config.matchmaking.tick_interval_seconds = tick
                .parse()
                .map_err(|_| anyhow!("Invalid TICK_INTERVAL_SECONDS value: {}", tick))?;
        }
        if let Ok(range) = env::var("DEFAULT_SKILL_RANGE") {
            config.matchmaking.default_skill_range = range
                .parse()
                .map_err(|_| anyhow!("Invalid DEFAULT_SKILL_RANGE value: {}", range))?;
        }
        if let Ok(wait) = env::var("DEFAULT_MAX_WAIT_SECONDS") {
            config.matchmaking.default_max_wait_seconds = wait
                .parse()
                .map_err(|_| anyhow!("Invalid DEFAULT_MAX_WAIT_SECONDS value: {}", wait))?;
        }
        if let Ok(retries) = env::var("ROOM_CREATION_RETRIES") {
            config.matchmaking.room_creation_retries = retries
                .parse()
                .map_err(|_| anyhow!("Invalid ROOM_CREATION_RETRIES value: {}", retries))?;
        }

        // Session settings
        if let Ok(sweep) = env::var("SWEEP_INTERVAL_SECONDS") {
            config.session.sweep_interval_seconds = sweep
                .parse()
                .map_err(|_| anyhow!("Invalid SWEEP_INTERVAL_SECONDS value: {}", sweep))?;
        }
        if let Ok(idle) = env::var("IDLE_TIMEOUT_MINUTES") {
            config.session.idle_timeout_minutes = idle
                .parse()
                .map_err(|_| anyhow!("Invalid IDLE_TIMEOUT_MINUTES value: {}", idle))?;
        }
        if let Ok(grace) = env::var("DISCONNECT_GRACE_SECONDS") {
            config.session.disconnect_grace_seconds = grace
                .parse()
                .map_err(|_| anyhow!("Invalid DISCONNECT_GRACE_SECONDS value: {}", grace))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            )
        })?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| anyhow!("Failed to parse config file: {}", e))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get scheduler tick interval as Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.tick_interval_seconds)
    }

    /// Get session sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session.sweep_interval_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.matchmaking.tick_interval_seconds == 0 {
        return Err(anyhow!("Tick interval must be greater than 0"));
    }
    if config.matchmaking.default_max_wait_seconds == 0 {
        return Err(anyhow!("Default max wait time must be greater than 0"));
    }
    if config.matchmaking.default_skill_range <= 0 {
        return Err(anyhow!("Default skill range must be positive"));
    }

    // Validate session settings
    if config.session.sweep_interval_seconds == 0 {
        return Err(anyhow!("Sweep interval must be greater than 0"));
    }
    if config.session.idle_timeout_minutes == 0 {
        return Err(anyhow!("Idle timeout must be greater than 0"));
    }

    Ok(())
}
