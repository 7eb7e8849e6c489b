use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::broker::message::Message;

/// Represents a client connected to the relay broker.
#[derive(Debug)]
pub struct Client {
    /// Identifier announced by the client. Unique among connected clients.
    pub id: String,

    /// Identifies this particular connection, so a stale connection cannot
    /// clean up a newer one that reused the client id.
    pub connection_id: Uuid,

    /// Channel to push routed messages to the client's connection.
    pub sender: UnboundedSender<Message>,

    /// Published by the broker if the connection ends without a clean disconnect.
    pub will: Option<Message>,
}

impl Client {
    pub fn new(id: impl Into<String>, sender: UnboundedSender<Message>) -> Self {
        Self {
            id: id.into(),
            connection_id: Uuid::new_v4(),
            sender,
            will: None,
        }
    }

    pub fn with_will(mut self, will: Option<Message>) -> Self {
        self.will = will;
        self
    }

    /// Pushes a message to the connection. `false` once the connection is gone.
    pub fn deliver(&self, msg: Message) -> bool {
        self.sender.send(msg).is_ok()
    }
}
