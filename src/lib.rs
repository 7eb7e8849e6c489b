//! # buschat
//!
//! `buschat` is a group chat for bus lines, layered on a publish/subscribe
//! broker. Participants pick a bus line (group), exchange text messages and
//! see who else is online through retained presence beacons and last-will
//! messages.
//!
//! ## Core Modules
//!
//! - `protocol`: topic layout, chat payloads and presence beacons.
//! - `session`: one participant's session, the online list and the controller
//!   that re-initialises the session when the configuration changes.
//! - `transport`: the `Transport` seam, the WebSocket client and the relay's
//!   WebSocket server.
//! - `broker`: the relay's topic router, with wildcard filters, retained
//!   messages and last-will.
//! - `client`: a connection as the relay sees it.
//! - `persistence`: retained message storage backed by `sled`.
//! - `config`: settings loading and the per-user `SessionConfig`.
//! - `cli`, `terminal`: the `buschat` binary's command line and terminal front-end.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod cli;
pub mod client;
pub mod config;
pub mod persistence;
pub mod protocol;
pub mod session;
pub mod terminal;
pub mod transport;
pub mod utils;
