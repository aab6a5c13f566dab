//! vibe-match - anonymous random-chat matchmaking
//!
//! Pairs WebSocket clients into one-to-one rooms, optionally ranked by shared
//! interests and premium preferences, and relays chat messages and call-setup
//! signals between the two participants.

pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ChatError, Result};
pub use types::*;

// Re-export key components
pub use chat::{ChatManager, MatchingEngine};
pub use gateway::EventPublisher;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
