//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `buschat` application.
//!
//! It centralizes the error types shared by the session, transport and relay
//! layers, and the tracing setup used by the binary and the tests.

pub mod error;
pub mod logging;

pub use error::{ChatError, PersistenceError, TransportError};
