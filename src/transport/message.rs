//! Relay wire protocol
//!
//! One JSON document per WebSocket text frame, tagged by `type`. The first
//! frame a client sends must be `connect`; the relay answers `conn_ack` or
//! `error`.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::message::Message;
use crate::transport::{ConnectOptions, OutboundMessage};
use crate::utils::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Connect {
        client_id: String,
        keep_alive_secs: u64,
        clean_session: bool,
        #[serde(default)]
        will: Option<WillMessage>,
    },
    Subscribe {
        topic: String,
    },
    Unsubscribe {
        topic: String,
    },
    Publish {
        topic: String,
        payload: String,
        #[serde(default)]
        qos: u8,
        #[serde(default)]
        retained: bool,
        #[serde(default)]
        duplicate: bool,
    },
    Ping,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WillMessage {
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retained: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnAck {
        session_present: bool,
    },
    Message {
        topic: String,
        payload: String,
        qos: u8,
        retained: bool,
        timestamp: i64,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ClientMessage {
    pub fn connect(options: &ConnectOptions) -> Self {
        ClientMessage::Connect {
            client_id: options.client_id.clone(),
            keep_alive_secs: options.keep_alive.as_secs(),
            clean_session: options.clean_session,
            will: options.will.clone().map(WillMessage::from),
        }
    }

    pub fn publish(msg: OutboundMessage) -> Self {
        ClientMessage::Publish {
            topic: msg.topic,
            payload: msg.payload,
            qos: msg.qos,
            retained: msg.retained,
            duplicate: msg.duplicate,
        }
    }
}

impl From<OutboundMessage> for WillMessage {
    fn from(msg: OutboundMessage) -> Self {
        WillMessage {
            topic: msg.topic,
            payload: msg.payload,
            qos: msg.qos,
            retained: msg.retained,
        }
    }
}

impl From<WillMessage> for Message {
    fn from(will: WillMessage) -> Self {
        Message::new(will.topic, will.payload)
            .with_qos(will.qos)
            .retained(will.retained)
    }
}

impl From<Message> for ServerMessage {
    fn from(msg: Message) -> Self {
        ServerMessage::Message {
            topic: msg.topic,
            payload: msg.payload,
            qos: msg.qos,
            retained: msg.retained,
            timestamp: msg.timestamp,
        }
    }
}

/// Next text frame, skipping control and binary frames. `None` once the
/// peer closed the connection.
pub async fn next_text<S>(stream: &mut S) -> Option<Result<String, TransportError>>
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => return Some(Ok(text.as_str().to_owned())),
            Ok(WsMessage::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => return Some(Err(e.into())),
        }
    }
    None
}

pub async fn send_frame<S, T>(sink: &mut S, message: &T) -> Result<(), TransportError>
where
    S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(message)?;
    sink.send(WsMessage::text(json)).await?;
    Ok(())
}
