//! Topic layout
//!
//! Two topic families exist per group:
//! - chat: `<chat_base><group>`, shared by every participant
//! - presence: `<presence_namespace><group>/<client_id>`, one per participant
//!
//! The layout is reproduced bit-exact so clients of existing deployments can
//! talk to each other.

use crate::config::ChatSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLayout {
    pub chat_base: String,
    pub presence_namespace: String,
    pub client_id_prefix: String,
}

impl Default for TopicLayout {
    fn default() -> Self {
        Self::from_settings(&ChatSettings::default())
    }
}

impl TopicLayout {
    pub fn from_settings(settings: &ChatSettings) -> Self {
        Self {
            chat_base: settings.chat_base.clone(),
            presence_namespace: settings.presence_namespace.clone(),
            client_id_prefix: settings.client_id_prefix.clone(),
        }
    }

    pub fn chat_topic(&self, group: &str) -> String {
        format!("{}{group}", self.chat_base)
    }

    pub fn presence_topic(&self, group: &str, client_id: &str) -> String {
        format!("{}{group}/{client_id}", self.presence_namespace)
    }

    /// Matches the presence topic of every client in `group`.
    pub fn presence_wildcard(&self, group: &str) -> String {
        format!("{}{group}/+", self.presence_namespace)
    }

    /// The client id used for `nickname` on this deployment.
    pub fn client_id_for(&self, nickname: &str) -> String {
        format!("{}{nickname}", self.client_id_prefix)
    }

    /// Recovers the sender's nickname from a presence topic.
    ///
    /// Takes the last `/` segment (the client id) and strips the client id
    /// prefix. Client ids that do not carry the prefix are returned whole.
    /// Returns `None` for topics outside the presence namespace.
    pub fn nickname_from_presence_topic<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let rest = topic.strip_prefix(self.presence_namespace.as_str())?;
        let (_group, client_id) = rest.rsplit_once('/')?;
        if client_id.is_empty() {
            return None;
        }
        Some(
            client_id
                .strip_prefix(self.client_id_prefix.as_str())
                .unwrap_or(client_id),
        )
    }

    /// Character offset at which the nickname starts in a presence topic of
    /// `group`, for clients that still slice the topic positionally.
    pub fn nickname_offset(&self, group: &str) -> usize {
        self.presence_namespace.chars().count()
            + group.chars().count()
            + 1
            + self.client_id_prefix.chars().count()
    }
}

/// Positional extraction: everything from character `offset` on.
pub fn nickname_at_offset(topic: &str, offset: usize) -> &str {
    match topic.char_indices().nth(offset) {
        Some((byte, _)) => &topic[byte..],
        None => "",
    }
}
