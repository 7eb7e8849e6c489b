//! The `persistence` module stores the relay's retained messages.
//!
//! Retained presence beacons must outlive a relay restart so that a client
//! subscribing afterwards still learns who went offline. The store is a
//! `sled` tree keyed by topic, holding the last retained message per topic.

pub mod sled_store;

pub use sled_store::RetainedStore;
