//! Configuration management for the vibe-match service
//!
//! This module handles configuration loading from environment variables or a
//! TOML file, validation, and default values for the chat service.

pub mod app;

// Re-export commonly used types
pub use app::{
    validate_config, AppConfig, Environment, MatchmakingSettings, ModerationSettings,
    ServiceSettings,
};
