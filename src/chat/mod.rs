//! Chat matchmaking core
//!
//! Connection registry, waiting queues, the matching engine, rooms and the
//! manager that ties them together behind a single serialized state.

pub mod filter;
pub mod manager;
pub mod matching;
pub mod queue;
pub mod registry;
pub mod room;

pub use filter::ContentFilter;
pub use manager::{ChatManager, ChatManagerStats};
pub use matching::{MatchingConfig, MatchingEngine, MatchingMode, MatchingResult};
pub use queue::{MatchQueue, MatchQueues, WaitingEntry};
pub use registry::{Connection, ConnectionRegistry, ConnectionState};
pub use room::Room;
