//! The presence-and-messaging protocol spoken on top of the pub/sub transport.
//!
//! - `topics`: how a group and a client id map onto topic names, and how a
//!   sender's nickname is recovered from a presence topic.
//! - `payload`: the chat payload codec, presence beacon statuses and the
//!   classification of inbound payloads.

pub mod payload;
pub mod topics;

pub use payload::{ChatMessage, Inbound, Status, classify, format_chat, parse_chat};
pub use topics::TopicLayout;
