use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::ChatError;

/// A chat message as it travels on the chat topic.
///
/// Serialized as `{"nickname": "...", "msgText": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub nickname: String,
    #[serde(rename = "msgText")]
    pub msg_text: String,
}

impl ChatMessage {
    pub fn new(nickname: impl Into<String>, msg_text: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            msg_text: msg_text.into(),
        }
    }
}

/// Presence beacon payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Online,
    Offline,
}

impl Status {
    pub const ONLINE: &'static str = "online";
    pub const OFFLINE: &'static str = "offline";

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Online => Self::ONLINE,
            Status::Offline => Self::OFFLINE,
        }
    }

    /// Exact match only, no trimming or case folding.
    pub fn from_payload(payload: &str) -> Option<Self> {
        match payload {
            Self::ONLINE => Some(Status::Online),
            Self::OFFLINE => Some(Status::Offline),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an inbound payload turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Presence(Status),
    Chat(ChatMessage),
}

/// Serializes a chat message for publishing.
pub fn format_chat(nickname: &str, msg_text: &str) -> Result<String, ChatError> {
    Ok(serde_json::to_string(&ChatMessage::new(nickname, msg_text))?)
}

pub fn parse_chat(payload: &str) -> Result<ChatMessage, ChatError> {
    Ok(serde_json::from_str(payload)?)
}

/// Classifies by payload alone: the literal beacons are presence, anything
/// else must decode as a chat message.
///
/// A chat body that is exactly `online` or `offline` is therefore read as a
/// presence beacon.
pub fn classify(payload: &str) -> Result<Inbound, ChatError> {
    match Status::from_payload(payload) {
        Some(status) => Ok(Inbound::Presence(status)),
        None => parse_chat(payload).map(Inbound::Chat),
    }
}
