//! WebSocket event vocabulary and JSON framing
//!
//! Every frame in either direction is a JSON object `{"event": <name>, "data": <payload>}`.
//! Inbound frames are decoded by event name so a missing or empty `data`
//! falls back to the payload defaults.

use crate::error::{ChatError, Result};
use crate::types::{ChatMessage, ConnectionId, FindPartnerRequest, RoomId, Signal, UserCounts};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw inbound frame before dispatch
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SendMessagePayload {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CallResponsePayload {
    #[serde(default)]
    accepted: bool,
}

/// Client intents
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    FindPartner(FindPartnerRequest),
    SendMessage { message: String },
    Typing,
    SkipPartner,
    LeaveChat,
    Signal(Signal),
}

impl ClientEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::FindPartner(_) => "findPartner",
            ClientEvent::SendMessage { .. } => "sendMessage",
            ClientEvent::Typing => "typing",
            ClientEvent::SkipPartner => "skipPartner",
            ClientEvent::LeaveChat => "leaveChat",
            ClientEvent::Signal(Signal::CallRequest) => "videoRequest",
            ClientEvent::Signal(Signal::CallResponse { .. }) => "videoRequestResponse",
            ClientEvent::Signal(Signal::MediaOffer(_)) => "videoOffer",
            ClientEvent::Signal(Signal::MediaAnswer(_)) => "videoAnswer",
            ClientEvent::Signal(Signal::IceCandidate(_)) => "iceCandidate",
        }
    }
}

/// Server notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Searching,
    PartnerFound {
        room_id: RoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        match_score: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shared_interests: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partner_label: Option<String>,
    },
    MessageReceived(ChatMessage),
    PartnerTyping,
    PartnerLeft,
    ChatEnded,
    SkipSuccess,
    UserCounts(UserCounts),
    VideoRequest {
        from: ConnectionId,
    },
    VideoRequestAccepted,
    VideoRequestRejected,
    VideoOffer {
        offer: Value,
        sender_id: ConnectionId,
    },
    VideoAnswer {
        answer: Value,
        sender_id: ConnectionId,
    },
    IceCandidate {
        candidate: Value,
        sender_id: ConnectionId,
    },
    DailyReward {
        coins: u64,
    },
}

impl ServerEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Searching => "searching",
            ServerEvent::PartnerFound { .. } => "partnerFound",
            ServerEvent::MessageReceived(_) => "messageReceived",
            ServerEvent::PartnerTyping => "partnerTyping",
            ServerEvent::PartnerLeft => "partnerLeft",
            ServerEvent::ChatEnded => "chatEnded",
            ServerEvent::SkipSuccess => "skipSuccess",
            ServerEvent::UserCounts(_) => "userCounts",
            ServerEvent::VideoRequest { .. } => "videoRequest",
            ServerEvent::VideoRequestAccepted => "videoRequestAccepted",
            ServerEvent::VideoRequestRejected => "videoRequestRejected",
            ServerEvent::VideoOffer { .. } => "videoOffer",
            ServerEvent::VideoAnswer { .. } => "videoAnswer",
            ServerEvent::IceCandidate { .. } => "iceCandidate",
            ServerEvent::DailyReward { .. } => "dailyReward",
        }
    }

    /// Notification delivered to the partner of `sender_id` for a relayed signal
    pub fn from_signal(signal: Signal, sender_id: &str) -> Self {
        match signal {
            Signal::CallRequest => ServerEvent::VideoRequest {
                from: sender_id.to_string(),
            },
            Signal::CallResponse { accepted: true } => ServerEvent::VideoRequestAccepted,
            Signal::CallResponse { accepted: false } => ServerEvent::VideoRequestRejected,
            Signal::MediaOffer(offer) => ServerEvent::VideoOffer {
                offer,
                sender_id: sender_id.to_string(),
            },
            Signal::MediaAnswer(answer) => ServerEvent::VideoAnswer {
                answer,
                sender_id: sender_id.to_string(),
            },
            Signal::IceCandidate(candidate) => ServerEvent::IceCandidate {
                candidate,
                sender_id: sender_id.to_string(),
            },
        }
    }
}

/// Message utilities for framing and validation
pub struct MessageUtils;

impl MessageUtils {
    /// Decode an inbound text frame into a client intent
    pub fn parse_client_event(text: &str) -> Result<ClientEvent> {
        let frame: Frame =
            serde_json::from_str(text).map_err(|e| ChatError::InvalidClientMessage {
                reason: format!("Malformed frame: {}", e),
            })?;
        Self::decode_frame(frame)
    }

    /// Map a frame to a client intent by event name
    pub fn decode_frame(frame: Frame) -> Result<ClientEvent> {
        let Frame { event, data } = frame;
        let event = match event.as_str() {
            "findPartner" => ClientEvent::FindPartner(Self::payload(&event, data)?),
            "sendMessage" => {
                let payload: SendMessagePayload = Self::payload(&event, data)?;
                ClientEvent::SendMessage {
                    message: payload.message,
                }
            }
            "typing" => ClientEvent::Typing,
            "skipPartner" => ClientEvent::SkipPartner,
            "leaveChat" => ClientEvent::LeaveChat,
            "videoRequest" => ClientEvent::Signal(Signal::CallRequest),
            "videoRequestResponse" => {
                let payload: CallResponsePayload = Self::payload(&event, data)?;
                ClientEvent::Signal(Signal::CallResponse {
                    accepted: payload.accepted,
                })
            }
            "videoOffer" => ClientEvent::Signal(Signal::MediaOffer(Self::field(data, "offer"))),
            "videoAnswer" => {
                ClientEvent::Signal(Signal::MediaAnswer(Self::field(data, "answer")))
            }
            "iceCandidate" => {
                ClientEvent::Signal(Signal::IceCandidate(Self::field(data, "candidate")))
            }
            other => {
                return Err(ChatError::InvalidClientMessage {
                    reason: format!("Unknown event: {}", other),
                }
                .into())
            }
        };
        Ok(event)
    }

    /// Encode an outbound notification as a text frame
    pub fn encode_server_event(event: &ServerEvent) -> Result<String> {
        serde_json::to_string(event).map_err(|e| {
            ChatError::InternalError {
                message: format!("Failed to serialize {} event: {}", event.name(), e),
            }
            .into()
        })
    }

    fn payload<T>(event: &str, data: Value) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if data.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(data).map_err(|e| {
            ChatError::InvalidClientMessage {
                reason: format!("Invalid {} payload: {}", event, e),
            }
            .into()
        })
    }

    /// Opaque payload field; the whole `data` when the field is absent
    fn field(data: Value, name: &str) -> Value {
        match data {
            Value::Object(mut map) => match map.remove(name) {
                Some(value) => value,
                None => Value::Object(map),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_parse_find_partner() {
        let event = MessageUtils::parse_client_event(
            r#"{"event":"findPartner","data":{"interests":["music","gaming"],"isPremium":true}}"#,
        )
        .unwrap();

        match event {
            ClientEvent::FindPartner(request) => {
                assert_eq!(request.interests, vec!["music", "gaming"]);
                assert!(request.is_premium);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_events_without_data() {
        for (text, expected) in [
            (r#"{"event":"findPartner"}"#, "findPartner"),
            (r#"{"event":"typing","data":{}}"#, "typing"),
            (r#"{"event":"leaveChat"}"#, "leaveChat"),
            (r#"{"event":"skipPartner","data":null}"#, "skipPartner"),
            (r#"{"event":"videoRequest"}"#, "videoRequest"),
        ] {
            let event = MessageUtils::parse_client_event(text).unwrap();
            assert_eq!(event.name(), expected);
        }
    }

    #[test]
    fn test_parse_signals_keep_payload_opaque() {
        let event = MessageUtils::parse_client_event(
            r#"{"event":"videoOffer","data":{"offer":{"sdp":"v=0","type":"offer"}}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Signal(Signal::MediaOffer(json!({"sdp":"v=0","type":"offer"})))
        );

        let event = MessageUtils::parse_client_event(
            r#"{"event":"videoRequestResponse","data":{"accepted":false}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Signal(Signal::CallResponse { accepted: false })
        );
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        assert!(MessageUtils::parse_client_event("not json").is_err());
        assert!(MessageUtils::parse_client_event(r#"{"data":{}}"#).is_err());
        assert!(MessageUtils::parse_client_event(r#"{"event":"dance"}"#).is_err());
        assert!(MessageUtils::parse_client_event(
            r#"{"event":"sendMessage","data":{"message":42}}"#
        )
        .is_err());
    }

    #[test]
    fn test_encode_partner_found() {
        let room_id = Uuid::new_v4();
        let text = MessageUtils::encode_server_event(&ServerEvent::PartnerFound {
            room_id,
            match_score: Some(50),
            shared_interests: Some(vec!["music".to_string()]),
            partner_label: Some("Stranger7".to_string()),
        })
        .unwrap();

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "partnerFound");
        assert_eq!(value["data"]["roomId"], room_id.to_string());
        assert_eq!(value["data"]["matchScore"], 50);
        assert_eq!(value["data"]["sharedInterests"], json!(["music"]));
        assert_eq!(value["data"]["partnerLabel"], "Stranger7");
    }

    #[test]
    fn test_encode_unit_and_signal_events() {
        let value: Value =
            serde_json::from_str(&MessageUtils::encode_server_event(&ServerEvent::PartnerLeft).unwrap())
                .unwrap();
        assert_eq!(value["event"], "partnerLeft");

        let event = ServerEvent::from_signal(Signal::IceCandidate(json!({"c":1})), "abc");
        let value: Value =
            serde_json::from_str(&MessageUtils::encode_server_event(&event).unwrap()).unwrap();
        assert_eq!(value["event"], "iceCandidate");
        assert_eq!(value["data"]["candidate"], json!({"c":1}));
        assert_eq!(value["data"]["senderId"], "abc");

        let value: Value = serde_json::from_str(
            &MessageUtils::encode_server_event(&ServerEvent::UserCounts(UserCounts {
                matching: 2,
                connected: 5,
            }))
            .unwrap(),
        )
        .unwrap();
        assert_eq!(value["data"], json!({"matching": 2, "connected": 5}));
    }

    #[test]
    fn test_call_response_mapping() {
        assert_eq!(
            ServerEvent::from_signal(Signal::CallResponse { accepted: true }, "x"),
            ServerEvent::VideoRequestAccepted
        );
        assert_eq!(
            ServerEvent::from_signal(Signal::CallResponse { accepted: false }, "x"),
            ServerEvent::VideoRequestRejected
        );
        assert_eq!(
            ServerEvent::from_signal(Signal::CallRequest, "x"),
            ServerEvent::VideoRequest {
                from: "x".to_string()
            }
        );
    }
}
