//! Error types for the chat matchmaking service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific chat scenarios
///
/// Invalid-state and lookup-miss conditions are not errors; chat operations
/// ignore them.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Invalid client message: {reason}")]
    InvalidClientMessage { reason: String },

    #[error("Delivery to connection {connection_id} failed")]
    DeliveryFailed { connection_id: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
