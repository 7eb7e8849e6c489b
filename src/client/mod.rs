//! The `client` module defines how the relay broker represents a connected client.
//!
//! It provides the `Client` struct, which encapsulates the state of a single
//! connection: the client id it announced, a per-connection id, the channel
//! used to push messages to it and its registered last-will.

pub mod pubsub_client;
pub use pubsub_client::Client;

#[cfg(test)]
mod tests;
