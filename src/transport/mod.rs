//! The `transport` module is responsible for talking to the pub/sub broker.
//!
//! [`Transport`] is the seam between the chat session and whatever carries
//! its messages: connect with a last-will, subscribe/unsubscribe, publish with
//! QoS and retained flags, and an ordered stream of inbound events.
//!
//! Implementations:
//! - [`WsTransport`] speaks the relay's JSON protocol over WebSocket.
//! - [`LocalTransport`] plugs straight into an in-process [`Broker`].
//!
//! The relay server side of the WebSocket protocol lives in `websocket`.
//!
//! [`Broker`]: crate::broker::Broker

pub mod local;
pub mod message;
pub mod websocket;
pub mod ws_client;

#[cfg(test)]
pub(crate) mod recording;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::broker::message::Message;
use crate::config::ChatSettings;
use crate::utils::TransportError;

pub use local::LocalTransport;
pub use ws_client::WsTransport;

/// A message handed to the transport for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retained: bool,
    pub duplicate: bool,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: 0,
            retained: false,
            duplicate: false,
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

/// A message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retained: bool,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: 0,
            retained: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub client_id: String,
    pub keep_alive: Duration,
    pub reconnect: bool,
    pub clean_session: bool,
    pub will: Option<OutboundMessage>,
    pub use_secure_transport: bool,
}

impl ConnectOptions {
    pub fn from_settings(client_id: impl Into<String>, settings: &ChatSettings) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(settings.keep_alive_secs),
            reconnect: settings.reconnect,
            clean_session: settings.clean_session,
            will: None,
            use_secure_transport: settings.use_secure_transport,
        }
    }

    pub fn with_will(mut self, will: OutboundMessage) -> Self {
        self.will = Some(will);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(InboundMessage),
    /// The connection dropped without a clean disconnect.
    ConnectionLost { reason: String, reconnecting: bool },
    /// The transport reconnected on its own and restored its subscriptions.
    Reconnected,
}

/// Inbound events of one connection, in delivery order.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// A pub/sub client connection.
///
/// Only `connect` and `disconnect` wait on the broker. `subscribe`,
/// `unsubscribe` and `publish` hand the request over and return; they fail
/// only when there is no connection to hand it to.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self, options: ConnectOptions) -> Result<TransportEvents, TransportError>;

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    fn publish(&mut self, message: OutboundMessage) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

impl From<OutboundMessage> for Message {
    fn from(msg: OutboundMessage) -> Self {
        Message {
            topic: msg.topic,
            payload: msg.payload,
            qos: msg.qos,
            retained: msg.retained,
            timestamp: 0,
        }
    }
}

impl From<Message> for InboundMessage {
    fn from(msg: Message) -> Self {
        InboundMessage {
            topic: msg.topic,
            payload: msg.payload,
            qos: msg.qos,
            retained: msg.retained,
        }
    }
}


#[cfg(test)]
mod websocket_tests;
