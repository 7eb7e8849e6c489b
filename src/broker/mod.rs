//! The relay broker: topic filters, retained messages and last-will.
//!
//! `engine` holds the routing state, `topic` the filter subscriptions and
//! wildcard matching, `message` the routed message itself.

pub mod engine;
pub mod message;
pub mod topic;

pub use engine::{Broker, RegisterError};

use std::sync::{Mutex, MutexGuard};

/// Locks a shared broker. A panic while holding the lock leaves routing
/// state usable, so poisoning is ignored.
pub fn lock(broker: &Mutex<Broker>) -> MutexGuard<'_, Broker> {
    broker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
