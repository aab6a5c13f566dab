//! Common types used throughout the chat matchmaking service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a live connection, also used as the partner reference
pub type ConnectionId = String;

/// Unique identifier for rooms
pub type RoomId = Uuid;

/// Unique identifier for relayed chat messages
pub type MessageId = Uuid;

/// Wildcard value accepted on every preference dimension
pub const ANY_PREFERENCE: &str = "Any";

/// Waiting list a connection is placed on while searching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Free users without preferences
    Default,
    /// Premium users and users declaring structured preferences
    Constrained,
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueKind::Default => write!(f, "default"),
            QueueKind::Constrained => write!(f, "constrained"),
        }
    }
}

/// Structured partner filter. A missing dimension matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Preferences {
    /// All filter dimensions as (name, value) pairs
    pub fn dimensions(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("gender", self.gender.as_deref()),
            ("nationality", self.nationality.as_deref()),
            ("country", self.country.as_deref()),
        ]
    }
}

/// Payload of a `findPartner` intent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindPartnerRequest {
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default, alias = "premiumPreferences")]
    pub preferences: Option<Preferences>,
    #[serde(default)]
    pub is_premium: bool,
}

impl FindPartnerRequest {
    /// Request with interest tags only
    pub fn with_interests<I, S>(interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            interests: interests.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Interests trimmed, with blanks and duplicates dropped, first occurrence kept
    pub fn normalized_interests(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.interests
            .iter()
            .map(|interest| interest.trim())
            .filter(|interest| !interest.is_empty())
            .filter(|interest| seen.insert(interest.to_string()))
            .map(str::to_string)
            .collect()
    }
}

/// A message stored in a room log and relayed to the partner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: ConnectionId,
}

/// Compatibility information recorded when a room is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    pub score: u32,
    pub shared_interests: Vec<String>,
}

/// Reason a connection stopped being paired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveReason {
    /// Explicit `leaveChat`
    UserQuit,
    /// `skipPartner`
    Skip,
    /// Transport-level disconnect
    Disconnect,
    /// Periodic stale-room sweep
    Stale,
}

impl std::fmt::Display for LeaveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaveReason::UserQuit => write!(f, "user_quit"),
            LeaveReason::Skip => write!(f, "skip"),
            LeaveReason::Disconnect => write!(f, "disconnect"),
            LeaveReason::Stale => write!(f, "stale"),
        }
    }
}

/// Opaque call-setup payload relayed between the two participants of a room
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    CallRequest,
    CallResponse { accepted: bool },
    MediaOffer(serde_json::Value),
    MediaAnswer(serde_json::Value),
    IceCandidate(serde_json::Value),
}

impl Signal {
    /// Short name used for logging and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::CallRequest => "call_request",
            Signal::CallResponse { .. } => "call_response",
            Signal::MediaOffer(_) => "media_offer",
            Signal::MediaAnswer(_) => "media_answer",
            Signal::IceCandidate(_) => "ice_candidate",
        }
    }
}

/// Aggregate counts broadcast to every connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCounts {
    pub matching: usize,
    pub connected: usize,
}
