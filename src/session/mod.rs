//! The chat session layered on top of a [`Transport`](crate::transport::Transport).
//!
//! - `chat_session`: one participant's connection to a group: beacons,
//!   last-will, chat subscription, inbound classification.
//! - `presence`: the online list derived from presence beacons.
//! - `controller`: applies configuration changes and maps session events to
//!   what a front-end renders.

pub mod chat_session;
pub mod controller;
pub mod presence;

pub use chat_session::{ClientIdentity, Session, SessionEvent, SessionState};
pub use controller::{ChatController, ViewUpdate};
pub use presence::PresenceTracker;
