use serde::{Deserialize, Serialize};

/// Represents a message routed by the relay broker.
///
/// # Fields
///
/// - `topic` - The concrete topic the message was published to.
/// - `payload` - The message body, a chat JSON document or a presence beacon.
/// - `qos` - Delivery level requested by the publisher (0, 1 or 2).
/// - `retained` - On publish: store as the topic's last known value. On
///   delivery: set only when the copy comes from the retained store.
/// - `timestamp` - Milliseconds since the Unix epoch, set by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retained: bool,
    pub timestamp: i64,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: 0,
            retained: false,
            timestamp: 0,
        }
    }

    pub fn with_qos(mut self, qos: u8) -> Self {
        self.qos = qos;
        self
    }

    pub fn retained(mut self, retained: bool) -> Self {
        self.retained = retained;
        self
    }
}
