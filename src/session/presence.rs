use std::collections::BTreeSet;

use crate::protocol::Status;

/// The nicknames believed online in the active group, own nickname excluded.
#[derive(Debug, Default, Clone)]
pub struct PresenceTracker {
    own_nickname: String,
    online: BTreeSet<String>,
}

impl PresenceTracker {
    pub fn new(own_nickname: impl Into<String>) -> Self {
        Self {
            own_nickname: own_nickname.into(),
            online: BTreeSet::new(),
        }
    }

    pub fn set_own_nickname(&mut self, nickname: impl Into<String>) {
        self.own_nickname = nickname.into();
    }

    /// Applies one beacon. Returns `true` only if the set changed.
    pub fn on_presence(&mut self, nickname: &str, status: Status) -> bool {
        // Empty names come from beacon-looking chat bodies, not from peers.
        if nickname.is_empty() || nickname == self.own_nickname {
            return false;
        }
        match status {
            Status::Online => self.online.insert(nickname.to_string()),
            Status::Offline => self.online.remove(nickname),
        }
    }

    pub fn clear(&mut self) {
        self.online.clear();
    }

    /// Sorted by nickname.
    pub fn online(&self) -> Vec<String> {
        self.online.iter().cloned().collect()
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.online.contains(nickname)
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}
