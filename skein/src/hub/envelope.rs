//! Hub-routed message envelope.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an envelope means to its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Expects a correlated response carrying `reply_to`.
    Request,
    /// Answers the request named by `reply_to`.
    Response,
    /// One-way point-to-point message (also used for topic publishes).
    Notification,
    /// One-way copy delivered to every registered agent but the sender.
    Broadcast,
}

/// Delivery priority hint. Carried, not currently scheduled on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// One hub-routed message.
///
/// The id is UUIDv7 (time-sortable) and uniquely identifies the envelope for
/// the lifetime of the hub; per-recipient broadcast copies share the id of the
/// logical envelope. Clone is a deep copy, headers included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Opaque payload.
    pub data: serde_json::Value,
    /// For responses: the request id being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl Envelope {
    fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: MessageType,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            from: from.into(),
            to: to.into(),
            kind,
            data,
            reply_to: None,
            topic: None,
            timestamp: Utc::now(),
            priority: Priority::Normal,
            headers: HashMap::new(),
        }
    }

    pub fn notification(
        from: impl Into<String>,
        to: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::new(from, to, MessageType::Notification, data)
    }

    pub fn request(
        from: impl Into<String>,
        to: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::new(from, to, MessageType::Request, data)
    }

    pub fn broadcast(
        from: impl Into<String>,
        to: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::new(from, to, MessageType::Broadcast, data)
    }

    /// Builds the response to `request`: addressed back to its sender, with
    /// `reply_to` set to the request id.
    pub fn response_to(request: &Envelope, data: serde_json::Value) -> Self {
        let mut envelope = Self::new(
            request.to.clone(),
            request.from.clone(),
            MessageType::Response,
            data,
        );
        envelope.reply_to = Some(request.id);
        envelope
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: ids are unique and time-sortable (v7); response_to wires
    /// reply_to and swaps the direction.
    #[test]
    fn ids_and_response_correlation() {
        let first = Envelope::request("a", "b", serde_json::json!("task"));
        let second = Envelope::request("a", "b", serde_json::json!("task"));
        assert_ne!(first.id, second.id);
        assert_eq!(first.id.get_version_num(), 7);
        assert!(first.id <= second.id);

        let response = Envelope::response_to(&first, serde_json::json!("done"));
        assert_eq!(response.kind, MessageType::Response);
        assert_eq!(response.reply_to, Some(first.id));
        assert_eq!(response.from, "b");
        assert_eq!(response.to, "a");
    }

    /// **Scenario**: clone is a deep copy; mutating the clone's headers leaves
    /// the original untouched.
    #[test]
    fn clone_is_deep() {
        let original = Envelope::notification("a", "b", serde_json::json!(1))
            .with_header("trace", "t1");
        let mut copy = original.clone();
        copy.headers.insert("trace".to_string(), "t2".to_string());
        assert_eq!(original.headers["trace"], "t1");
    }

    /// **Scenario**: wire form uses `type`, omits absent reply_to/topic, and
    /// round-trips.
    #[test]
    fn wire_round_trip() {
        let envelope = Envelope::notification("a", "b", serde_json::json!({"k": 1}))
            .with_priority(Priority::High)
            .with_topic("alerts");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "notification");
        assert_eq!(json["priority"], "high");
        assert!(json.get("reply_to").is_none());

        let back: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
    }

    /// **Scenario**: priorities order Low < Normal < High < Critical.
    #[test]
    fn priority_ordering() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Critical);
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
