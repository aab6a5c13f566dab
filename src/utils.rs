//! Utility functions for the chat matchmaking service

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// Generate a new unique room ID
pub fn generate_room_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique message ID
pub fn generate_message_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate an opaque connection ID for a freshly accepted socket
pub fn generate_connection_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Anonymous display label shown to the other side of a room
pub fn partner_label() -> String {
    format!("Stranger{}", rand::rng().random_range(0..1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_room_id();
        let id2 = generate_room_id();
        assert_ne!(id1, id2);

        let message_id1 = generate_message_id();
        let message_id2 = generate_message_id();
        assert_ne!(message_id1, message_id2);

        let connection1 = generate_connection_id();
        let connection2 = generate_connection_id();
        assert_ne!(connection1, connection2);
        assert_eq!(connection1.len(), 32);
    }

    #[test]
    fn test_partner_label_format() {
        for _ in 0..50 {
            let label = partner_label();
            let number: u32 = label
                .strip_prefix("Stranger")
                .expect("label prefix")
                .parse()
                .expect("numeric suffix");
            assert!(number < 1000);
        }
    }
}
