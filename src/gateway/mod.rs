//! WebSocket gateway
//!
//! JSON event framing, outbound delivery, per-connection session handling and
//! the axum server exposing the chat endpoint.

pub mod handlers;
pub mod messages;
pub mod publisher;
pub mod server;

pub use handlers::EventDispatcher;
pub use messages::{ClientEvent, MessageUtils, ServerEvent};
pub use publisher::{ChannelEventPublisher, EventPublisher, MockEventPublisher};
pub use server::{GatewayServer, GatewayServerConfig};
