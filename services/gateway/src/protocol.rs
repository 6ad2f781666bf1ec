//! Client wire protocol
//!
//! Request messages name an action and one or more topics; push messages
//! carry quote data, subscription acks, or a typed protocol error. All
//! frames are JSON text.

use serde::{Deserialize, Serialize};
use types::ids::TopicId;
use types::numeric::{Price, Size};
use types::quote::QuoteSnapshot;

/// Protocol error codes sent to clients.
pub mod error_code {
    /// Request was not valid JSON or missed required fields.
    pub const MALFORMED_REQUEST: u16 = 4000;
    /// A named topic was empty or otherwise unusable.
    pub const INVALID_TOPIC: u16 = 4001;
    /// Request named no topics.
    pub const EMPTY_TOPICS: u16 = 4002;
    /// The connection's subscription cap would be exceeded.
    pub const SUBSCRIPTION_LIMIT: u16 = 4003;
}

/// Action requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestAction {
    Subscribe,
    Unsubscribe,
}

/// A client control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub action: RequestAction,
    pub topics: Vec<String>,
}

/// Quote fields pushed to clients; sequence rides at the top level of
/// the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePayload {
    pub price: Price,
    pub size: Size,
    pub timestamp: i64,
}

/// A server-to-client frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Quote {
        topic: TopicId,
        snapshot: QuotePayload,
        sequence: u64,
    },
    Subscribed {
        topics: Vec<TopicId>,
    },
    Unsubscribed {
        topics: Vec<TopicId>,
    },
    Error {
        error: String,
        code: u16,
    },
}

impl ServerMessage {
    pub fn quote(snapshot: QuoteSnapshot) -> Self {
        ServerMessage::Quote {
            topic: snapshot.topic,
            sequence: snapshot.sequence,
            snapshot: QuotePayload {
                price: snapshot.price,
                size: snapshot.size,
                timestamp: snapshot.timestamp,
            },
        }
    }

    pub fn protocol_error(code: u16, error: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: error.into(),
            code,
        }
    }

    /// Serialize for the wire. Infallible for these shapes; an encoding
    /// failure would be a programming error, surfaced as an error frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(
                "{{\"type\":\"error\",\"error\":\"encoding failure: {err}\",\"code\":5000}}"
            )
        })
    }
}

/// Parse one inbound client frame.
pub fn parse_client_request(text: &str) -> Result<ClientRequest, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::numeric::{Price, Size};

    #[test]
    fn test_parse_subscribe_request() {
        let json = r#"{"action":"subscribe","topics":["BTC-USD","ETH-USD"]}"#;
        let request = parse_client_request(json).unwrap();
        assert_eq!(request.action, RequestAction::Subscribe);
        assert_eq!(request.topics.len(), 2);
    }

    #[test]
    fn test_parse_unsubscribe_request() {
        let json = r#"{"action":"unsubscribe","topics":["BTC-USD"]}"#;
        let request = parse_client_request(json).unwrap();
        assert_eq!(request.action, RequestAction::Unsubscribe);
    }

    #[test]
    fn test_parse_rejects_unknown_action() {
        let json = r#"{"action":"speculate","topics":["BTC-USD"]}"#;
        assert!(parse_client_request(json).is_err());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_client_request("subscribe BTC-USD").is_err());
    }

    #[test]
    fn test_quote_frame_shape() {
        let snapshot = QuoteSnapshot {
            topic: TopicId::new("BTC-USD"),
            price: Price::from_u64(10),
            size: Size::from_u64(2),
            sequence: 7,
            timestamp: 42,
        };
        let json = ServerMessage::quote(snapshot).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "quote");
        assert_eq!(value["topic"], "BTC-USD");
        assert_eq!(value["sequence"], 7);
        assert_eq!(value["snapshot"]["price"], "10");
        assert_eq!(value["snapshot"]["timestamp"], 42);
    }

    #[test]
    fn test_error_frame_shape() {
        let json =
            ServerMessage::protocol_error(error_code::INVALID_TOPIC, "empty topic").to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], 4001);
        assert_eq!(value["error"], "empty topic");
    }

    #[test]
    fn test_ack_roundtrip() {
        let message = ServerMessage::Subscribed {
            topics: vec![TopicId::new("X")],
        };
        let parsed: ServerMessage = serde_json::from_str(&message.to_json()).unwrap();
        assert_eq!(message, parsed);
    }
}
