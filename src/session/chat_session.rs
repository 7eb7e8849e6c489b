use tracing::{debug, error, info, warn};

use crate::config::ChatSettings;
use crate::protocol::topics::nickname_at_offset;
use crate::protocol::{ChatMessage, Inbound, Status, TopicLayout, classify, format_chat};
use crate::transport::{
    ConnectOptions, InboundMessage, OutboundMessage, Transport, TransportEvent, TransportEvents,
};
use crate::utils::ChatError;

/// Who this session speaks for. The client id is fixed when the transport
/// connects; the nickname is what goes into chat payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client_id: String,
    pub nickname: String,
}

impl ClientIdentity {
    pub fn new(client_id: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            nickname: nickname.into(),
        }
    }

    pub fn for_nickname(layout: &TopicLayout, nickname: &str) -> Self {
        Self::new(layout.client_id_for(nickname), nickname)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connecting, or waiting for the transport to reconnect.
    Connecting,
    Connected,
    Disconnected,
}

/// What a session reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Chat(ChatMessage),
    Presence { nickname: String, status: Status },
    ConnectionLost { reason: String },
    Reconnected,
}

/// A chat participant's connection to one group.
///
/// Owns the transport. The session's presence topic holds a retained beacon:
/// `online` while connected, `offline` after a disconnect or when the broker
/// fires the last-will.
pub struct Session<T: Transport> {
    transport: T,
    identity: ClientIdentity,
    group: String,
    layout: TopicLayout,
    events: Option<TransportEvents>,
    state: SessionState,
}

impl<T: Transport> Session<T> {
    /// Connects and joins `group`.
    ///
    /// The retained `offline` beacon is registered as last-will. Once the
    /// broker accepts the connection the session subscribes to the group's
    /// chat topic, announces itself `online` and subscribes to the group's
    /// presence topics, in that order.
    pub async fn connect(
        transport: T,
        identity: ClientIdentity,
        group: impl Into<String>,
        settings: &ChatSettings,
    ) -> Result<Self, ChatError> {
        let mut session = Self {
            transport,
            identity,
            group: group.into(),
            layout: TopicLayout::from_settings(settings),
            events: None,
            state: SessionState::Connecting,
        };

        let will = session.status_message(Status::Offline, true);
        let options =
            ConnectOptions::from_settings(session.identity.client_id.clone(), settings).with_will(will);

        let events = match session.transport.connect(options).await {
            Ok(events) => events,
            Err(e) => {
                error!(client_id = %session.identity.client_id, error = %e, "failed to connect");
                return Err(ChatError::Connection(e));
            }
        };
        session.on_connect(events)?;
        Ok(session)
    }

    fn on_connect(&mut self, events: TransportEvents) -> Result<(), ChatError> {
        info!(client_id = %self.identity.client_id, group = %self.group, "connected");

        let chat_topic = self.layout.chat_topic(&self.group);
        self.transport.subscribe(&chat_topic)?;

        let online = self.status_message(Status::Online, true);
        self.transport.publish(online)?;

        let presence = self.layout.presence_wildcard(&self.group);
        self.transport.subscribe(&presence)?;

        self.events = Some(events);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Moves the chat subscription to `new_group`.
    ///
    /// The presence subscription and the beacon stay on the group the
    /// session connected with.
    pub fn change_group(&mut self, new_group: &str) -> Result<(), ChatError> {
        if self.group == new_group {
            return Ok(());
        }
        if self.state == SessionState::Disconnected {
            return Err(ChatError::NotConnected);
        }

        info!("Unsubscribing previous topic: {}", self.group);
        let old_topic = self.layout.chat_topic(&self.group);
        self.transport.unsubscribe(&old_topic)?;

        self.group = new_group.to_string();
        let new_topic = self.layout.chat_topic(&self.group);
        self.transport.subscribe(&new_topic)?;
        debug!("Subscribed to {new_topic}");
        Ok(())
    }

    /// Publishes a chat message with QoS 1, not retained.
    pub fn send_chat(
        &mut self,
        nickname: &str,
        text: &str,
        destination_group: &str,
    ) -> Result<(), ChatError> {
        self.send_chat_with(nickname, text, destination_group, 1, false)
    }

    pub fn send_chat_with(
        &mut self,
        nickname: &str,
        text: &str,
        destination_group: &str,
        qos: u8,
        retained: bool,
    ) -> Result<(), ChatError> {
        let payload = format_chat(nickname, text)?;
        let message = OutboundMessage::new(self.layout.chat_topic(destination_group), payload)
            .with_qos(qos)
            .retained(retained);
        self.transport.publish(message)?;
        Ok(())
    }

    /// A presence beacon for this client in the current group, QoS 1.
    pub fn status_message(&self, status: Status, retained: bool) -> OutboundMessage {
        let topic = self
            .layout
            .presence_topic(&self.group, &self.identity.client_id);
        OutboundMessage::new(topic, status.as_str())
            .with_qos(1)
            .retained(retained)
    }

    /// Classifies one inbound message. Malformed payloads are logged and
    /// dropped.
    pub fn handle_inbound(&self, message: &InboundMessage) -> Option<SessionEvent> {
        match classify(&message.payload) {
            Ok(Inbound::Presence(status)) => Some(SessionEvent::Presence {
                nickname: self.sender_nickname(&message.topic),
                status,
            }),
            Ok(Inbound::Chat(chat)) => Some(SessionEvent::Chat(chat)),
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "dropping malformed payload");
                None
            }
        }
    }

    // Beacons normally arrive on presence topics. A chat body that reads as
    // a beacon arrives on the chat topic and falls back to positional slicing.
    fn sender_nickname(&self, topic: &str) -> String {
        match self.layout.nickname_from_presence_topic(topic) {
            Some(nickname) => nickname.to_string(),
            None => nickname_at_offset(topic, self.layout.nickname_offset(&self.group)).to_string(),
        }
    }

    /// Waits for the next event worth reporting, in delivery order.
    ///
    /// `None` once the session is disconnected and its events are drained.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let event = match self.events.as_mut()?.recv().await {
                Some(event) => event,
                None => {
                    self.state = SessionState::Disconnected;
                    self.events = None;
                    return None;
                }
            };

            match event {
                TransportEvent::Message(message) => {
                    if let Some(event) = self.handle_inbound(&message) {
                        return Some(event);
                    }
                }
                TransportEvent::ConnectionLost {
                    reason,
                    reconnecting,
                } => {
                    warn!(%reason, reconnecting, "connection lost");
                    self.state = if reconnecting {
                        SessionState::Connecting
                    } else {
                        SessionState::Disconnected
                    };
                    return Some(SessionEvent::ConnectionLost { reason });
                }
                TransportEvent::Reconnected => {
                    info!(client_id = %self.identity.client_id, "reconnected");
                    self.state = SessionState::Connected;
                    let online = self.status_message(Status::Online, true);
                    if let Err(e) = self.transport.publish(online) {
                        warn!(error = %e, "failed to republish online beacon");
                    }
                    return Some(SessionEvent::Reconnected);
                }
            }
        }
    }

    /// Leaves gracefully: publishes the retained `offline` beacon, then
    /// disconnects. The broker does not fire the last-will.
    pub async fn disconnect(&mut self) -> Result<(), ChatError> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }

        let offline = self.status_message(Status::Offline, true);
        if let Err(e) = self.transport.publish(offline) {
            warn!(error = %e, "failed to publish offline beacon");
        }

        let result = self.transport.disconnect().await;
        self.state = SessionState::Disconnected;
        self.events = None;
        info!(client_id = %self.identity.client_id, "disconnected");
        Ok(result?)
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
