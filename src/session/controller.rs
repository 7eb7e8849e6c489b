use tracing::{info, warn};

use crate::config::{ChatSettings, SessionConfig};
use crate::protocol::{ChatMessage, TopicLayout};
use crate::session::presence::PresenceTracker;
use crate::session::chat_session::{ClientIdentity, Session, SessionEvent};
use crate::transport::Transport;
use crate::utils::ChatError;

/// What a front-end has to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    /// A chat message from someone else.
    Message(ChatMessage),
    /// The online list changed; carries the full sorted list.
    OnlineChanged(Vec<String>),
    ConnectionLost(String),
    Reconnected,
}

/// Drives one chat participant: applies configuration changes, sends what
/// the user types and turns session events into [`ViewUpdate`]s.
///
/// A new transport is built with `make_transport` every time the group
/// selection changes.
pub struct ChatController<T, F>
where
    T: Transport,
    F: FnMut(&ClientIdentity) -> T,
{
    settings: ChatSettings,
    layout: TopicLayout,
    make_transport: F,
    nickname: String,
    selection: Option<String>,
    session: Option<Session<T>>,
    presence: PresenceTracker,
}

impl<T, F> ChatController<T, F>
where
    T: Transport,
    F: FnMut(&ClientIdentity) -> T,
{
    pub fn new(settings: ChatSettings, make_transport: F) -> Self {
        let layout = TopicLayout::from_settings(&settings);
        Self {
            settings,
            layout,
            make_transport,
            nickname: String::new(),
            selection: None,
            session: None,
            presence: PresenceTracker::default(),
        }
    }

    /// Applies a configuration.
    ///
    /// A new group re-initialises the chat: the old session leaves, a new
    /// one connects and the online list starts over. The same group only
    /// updates the nickname. Returns whether the chat was re-initialised.
    pub async fn configure(&mut self, config: SessionConfig) -> Result<bool, ChatError> {
        config.validate()?;

        self.nickname = config.nickname;
        self.presence.set_own_nickname(self.nickname.clone());

        if self.selection.as_deref() == Some(config.group.as_str()) {
            return Ok(false);
        }

        info!("Changing to group: {}", config.group);
        self.selection = Some(config.group.clone());
        if let Err(e) = self.init_chat(&config.group).await {
            self.selection = None;
            return Err(e);
        }
        if let Some(session) = self.session.as_mut() {
            session.change_group(&config.group)?;
        }
        Ok(true)
    }

    async fn init_chat(&mut self, group: &str) -> Result<(), ChatError> {
        if let Some(mut old) = self.session.take() {
            if let Err(e) = old.disconnect().await {
                warn!(error = %e, "failed to leave previous group cleanly");
            }
        }

        let identity = ClientIdentity::for_nickname(&self.layout, &self.nickname);
        let transport = (self.make_transport)(&identity);
        let session = Session::connect(transport, identity, group, &self.settings).await?;

        self.session = Some(session);
        self.presence.clear();
        Ok(())
    }

    /// Publishes `text` to the current group. Empty text is ignored.
    ///
    /// Returns the sent message so the front-end can echo it.
    pub fn send_message(&mut self, text: &str) -> Result<Option<ChatMessage>, ChatError> {
        if text.is_empty() {
            return Ok(None);
        }
        let session = self.session.as_mut().ok_or(ChatError::NotConnected)?;
        let group = session.group().to_string();
        session.send_chat(&self.nickname, text, &group)?;
        Ok(Some(ChatMessage::new(self.nickname.clone(), text)))
    }

    /// Waits for the next update to render.
    ///
    /// `None` when there is no session, or when the session ended; in the
    /// latter case the group selection is forgotten so a later
    /// [`configure`](Self::configure) reconnects.
    pub async fn next_update(&mut self) -> Option<ViewUpdate> {
        loop {
            let session = self.session.as_mut()?;
            let Some(event) = session.next_event().await else {
                info!("session ended");
                self.session = None;
                self.selection = None;
                return None;
            };

            match event {
                SessionEvent::Chat(message) => {
                    if message.nickname != self.nickname {
                        return Some(ViewUpdate::Message(message));
                    }
                }
                SessionEvent::Presence { nickname, status } => {
                    if self.presence.on_presence(&nickname, status) {
                        return Some(ViewUpdate::OnlineChanged(self.presence.online()));
                    }
                }
                SessionEvent::ConnectionLost { reason } => {
                    return Some(ViewUpdate::ConnectionLost(reason));
                }
                SessionEvent::Reconnected => {
                    // Beacons are replayed on resubscribe.
                    self.presence.clear();
                    return Some(ViewUpdate::Reconnected);
                }
            }
        }
    }

    pub fn online_users(&self) -> Vec<String> {
        self.presence.online()
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn group(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session<T>> {
        self.session.as_mut()
    }

    /// Leaves the current group, if any.
    pub async fn disconnect(&mut self) -> Result<(), ChatError> {
        self.selection = None;
        self.presence.clear();
        match self.session.take() {
            Some(mut session) => session.disconnect().await,
            None => Ok(()),
        }
    }
}
