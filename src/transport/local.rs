//! In-process transport
//!
//! Registers directly with a shared [`Broker`], so a chat session can run
//! against the relay's routing logic without a socket. Dropping a connected
//! `LocalTransport` is an unclean disconnect and fires the last-will.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::broker::{Broker, lock};
use crate::broker::message::Message;
use crate::client::Client;
use crate::transport::{
    ConnectOptions, OutboundMessage, Transport, TransportEvent, TransportEvents,
};
use crate::utils::TransportError;

#[derive(Debug)]
pub struct LocalTransport {
    broker: Arc<Mutex<Broker>>,
    connection: Option<Connection>,
}

#[derive(Debug)]
struct Connection {
    client_id: String,
    connection_id: Uuid,
}

impl LocalTransport {
    pub fn new(broker: Arc<Mutex<Broker>>) -> Self {
        Self {
            broker,
            connection: None,
        }
    }

    fn connection(&self) -> Result<&Connection, TransportError> {
        self.connection.as_ref().ok_or(TransportError::NotConnected)
    }

    /// Ends the connection the way a network failure would: the broker
    /// publishes the last-will.
    pub fn drop_connection(&mut self) {
        if let Some(conn) = self.connection.take() {
            lock(&self.broker).cleanup_client(&conn.client_id, conn.connection_id, false);
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&mut self, options: ConnectOptions) -> Result<TransportEvents, TransportError> {
        if self.connection.is_some() {
            return Err(TransportError::Handshake("already connected".into()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let client = Client::new(options.client_id.clone(), tx)
            .with_will(options.will.map(Message::from));
        let connection_id = client.connection_id;

        lock(&self.broker)
            .register_client(client)
            .map_err(|e| TransportError::Refused(e.to_string()))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let client_id = options.client_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if events_tx.send(TransportEvent::Message(msg.into())).is_err() {
                    return;
                }
            }
            // The broker let go of us: taken over or cleaned up.
            debug!(%client_id, "local connection closed");
            let _ = events_tx.send(TransportEvent::ConnectionLost {
                reason: "connection closed by broker".to_string(),
                reconnecting: false,
            });
        });

        self.connection = Some(Connection {
            client_id: options.client_id,
            connection_id,
        });
        Ok(events_rx)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let client_id = self.connection()?.client_id.clone();
        lock(&self.broker).subscribe(topic, client_id);
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let client_id = self.connection()?.client_id.clone();
        lock(&self.broker).unsubscribe(topic, &client_id);
        Ok(())
    }

    fn publish(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        self.connection()?;
        lock(&self.broker).publish(message.into());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let conn = self.connection.take().ok_or(TransportError::NotConnected)?;
        lock(&self.broker).cleanup_client(&conn.client_id, conn.connection_id, true);
        Ok(())
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.drop_connection();
    }
}
