//! Main application configuration
//!
//! This module defines the primary configuration structures for the vibe-match
//! chat service, including environment variable and TOML file loading and validation.

use crate::chat::matching::{MatchingConfig, MatchingMode};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matchmaking: MatchmakingSettings,
    pub moderation: ModerationSettings,
}

/// Deployment environment; controls cross-origin policy on the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("Unknown environment: {}", other)),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Interface the gateway and metrics servers bind to
    pub host: String,
    /// Port for the WebSocket gateway
    pub port: u16,
    /// Port for health and metrics endpoints
    pub metrics_port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matchmaking and room lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Candidate ranking policy
    pub mode: MatchingMode,
    /// Minimum interest score for free users
    pub min_score_standard: u32,
    /// Minimum interest score for premium users
    pub min_score_premium: u32,
    /// Search the default queue when the constrained queue has no match
    pub fallback_to_default_queue: bool,
    /// User counts broadcast interval in seconds
    pub user_counts_interval_seconds: u64,
    /// Stale room sweep interval in seconds
    pub stale_sweep_interval_seconds: u64,
    /// Rooms older than this are closed by the sweep
    pub max_room_age_seconds: u64,
    /// Grant a daily coin reward to connected users
    pub enable_daily_rewards: bool,
    /// How often the reward pass runs, in seconds
    pub daily_reward_interval_seconds: u64,
    /// Coins granted per day
    pub daily_reward_coins: u64,
}

/// Message moderation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    /// Words masked in relayed messages, matched case-insensitively
    pub banned_words: Vec<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "vibe-match".to_string(),
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3001,
            metrics_port: 9090,
            environment: Environment::Development,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            mode: MatchingMode::ScoreBased,
            min_score_standard: 10,
            min_score_premium: 20,
            fallback_to_default_queue: true,
            user_counts_interval_seconds: 3,
            stale_sweep_interval_seconds: 900, // 15 minutes
            max_room_age_seconds: 7200,        // 2 hours
            enable_daily_rewards: true,
            daily_reward_interval_seconds: 3600,
            daily_reward_coins: 10,
        }
    }
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            banned_words: crate::chat::filter::DEFAULT_BANNED_WORDS
                .iter()
                .map(|word| word.to_string())
                .collect(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate TOML configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HOST") {
            self.service.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            self.service.port = parse_var("PORT", &port)?;
        }
        if let Ok(port) = env::var("METRICS_PORT") {
            self.service.metrics_port = parse_var("METRICS_PORT", &port)?;
        }
        if let Ok(environment) = env::var("ENVIRONMENT").or_else(|_| env::var("NODE_ENV")) {
            self.service.environment = environment
                .parse()
                .map_err(|e: String| anyhow!("Invalid ENVIRONMENT value: {}", e))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds = parse_var("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }

        // Matchmaking settings
        if let Ok(mode) = env::var("MATCHING_MODE") {
            self.matchmaking.mode = mode
                .parse()
                .map_err(|e: String| anyhow!("Invalid MATCHING_MODE value: {}", e))?;
        }
        if let Ok(score) = env::var("MIN_SCORE_STANDARD") {
            self.matchmaking.min_score_standard = parse_var("MIN_SCORE_STANDARD", &score)?;
        }
        if let Ok(score) = env::var("MIN_SCORE_PREMIUM") {
            self.matchmaking.min_score_premium = parse_var("MIN_SCORE_PREMIUM", &score)?;
        }
        if let Ok(fallback) = env::var("FALLBACK_TO_DEFAULT_QUEUE") {
            self.matchmaking.fallback_to_default_queue =
                parse_var("FALLBACK_TO_DEFAULT_QUEUE", &fallback)?;
        }
        if let Ok(interval) = env::var("USER_COUNTS_INTERVAL_SECONDS") {
            self.matchmaking.user_counts_interval_seconds =
                parse_var("USER_COUNTS_INTERVAL_SECONDS", &interval)?;
        }
        if let Ok(interval) = env::var("STALE_SWEEP_INTERVAL_SECONDS") {
            self.matchmaking.stale_sweep_interval_seconds =
                parse_var("STALE_SWEEP_INTERVAL_SECONDS", &interval)?;
        }
        if let Ok(age) = env::var("MAX_ROOM_AGE_SECONDS") {
            self.matchmaking.max_room_age_seconds = parse_var("MAX_ROOM_AGE_SECONDS", &age)?;
        }
        if let Ok(enabled) = env::var("ENABLE_DAILY_REWARDS") {
            self.matchmaking.enable_daily_rewards = parse_var("ENABLE_DAILY_REWARDS", &enabled)?;
        }
        if let Ok(interval) = env::var("DAILY_REWARD_INTERVAL_SECONDS") {
            self.matchmaking.daily_reward_interval_seconds =
                parse_var("DAILY_REWARD_INTERVAL_SECONDS", &interval)?;
        }
        if let Ok(coins) = env::var("DAILY_REWARD_COINS") {
            self.matchmaking.daily_reward_coins = parse_var("DAILY_REWARD_COINS", &coins)?;
        }

        // Moderation settings
        if let Ok(words) = env::var("BANNED_WORDS") {
            self.moderation.banned_words = words
                .split(',')
                .map(|word| word.trim().to_string())
                .filter(|word| !word.is_empty())
                .collect();
        }

        Ok(())
    }

    /// Matching engine configuration derived from the matchmaking settings
    pub fn matching_config(&self) -> MatchingConfig {
        MatchingConfig {
            mode: self.matchmaking.mode,
            min_score_standard: self.matchmaking.min_score_standard,
            min_score_premium: self.matchmaking.min_score_premium,
            fallback_to_default_queue: self.matchmaking.fallback_to_default_queue,
        }
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get user counts broadcast interval as Duration
    pub fn user_counts_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.user_counts_interval_seconds)
    }

    /// Get stale sweep interval as Duration
    pub fn stale_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.stale_sweep_interval_seconds)
    }

    /// Get maximum room age as a chrono Duration
    pub fn max_room_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.matchmaking.max_room_age_seconds as i64)
    }

    /// Get daily reward interval as Duration
    pub fn daily_reward_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.daily_reward_interval_seconds)
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
    if config.service.port == 0 {
        return Err(anyhow!("Gateway port cannot be 0"));
    }
    if config.service.metrics_port == 0 {
        return Err(anyhow!("Metrics port cannot be 0"));
    }
    if config.service.port == config.service.metrics_port {
        return Err(anyhow!(
            "Gateway and metrics ports must differ (both {})",
            config.service.port
        ));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate matchmaking settings
    if config.matchmaking.min_score_standard > 100 {
        return Err(anyhow!("Standard score threshold cannot exceed 100"));
    }
    if config.matchmaking.min_score_premium > 100 {
        return Err(anyhow!("Premium score threshold cannot exceed 100"));
    }
    if config.matchmaking.user_counts_interval_seconds == 0 {
        return Err(anyhow!("User counts interval must be greater than 0"));
    }
    if config.matchmaking.stale_sweep_interval_seconds == 0 {
        return Err(anyhow!("Stale sweep interval must be greater than 0"));
    }
    if config.matchmaking.max_room_age_seconds == 0 {
        return Err(anyhow!("Max room age must be greater than 0"));
    }
    if config.matchmaking.enable_daily_rewards
        && config.matchmaking.daily_reward_interval_seconds == 0
    {
        return Err(anyhow!("Daily reward interval must be greater than 0"));
    }

    // Validate moderation settings
    if config
        .moderation
        .banned_words
        .iter()
        .any(|word| word.trim().is_empty())
    {
        return Err(anyhow!("Banned words cannot be empty"));
    }

    Ok(())
}
