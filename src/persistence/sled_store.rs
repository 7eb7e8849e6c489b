use sled::{Db, Tree};

use crate::broker::message::Message;
use crate::broker::topic::filter_matches;
use crate::utils::PersistenceError;

const RETAINED_TREE: &str = "retained";

#[derive(Clone)]
pub struct RetainedStore {
    db: Db,
    tree: Tree,
}

impl RetainedStore {
    pub fn open(path: &str) -> Result<Self, PersistenceError> {
        Self::with_db(sled::open(path)?)
    }

    /// A store backed by a temporary directory, removed on drop.
    pub fn temporary() -> Result<Self, PersistenceError> {
        Self::with_db(sled::Config::new().temporary(true).open()?)
    }

    fn with_db(db: Db) -> Result<Self, PersistenceError> {
        let tree = db.open_tree(RETAINED_TREE)?;
        Ok(Self { db, tree })
    }

    /// Replaces the retained message of `msg.topic`.
    pub fn store(&self, msg: &Message) -> Result<(), PersistenceError> {
        let serialized = serde_json::to_vec(msg)?;
        self.tree.insert(msg.topic.as_bytes(), serialized)?;
        Ok(())
    }

    pub fn remove(&self, topic: &str) -> Result<(), PersistenceError> {
        self.tree.remove(topic.as_bytes())?;
        Ok(())
    }

    pub fn get(&self, topic: &str) -> Result<Option<Message>, PersistenceError> {
        match self.tree.get(topic.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Retained messages whose topic matches `filter`, in topic order.
    pub fn matching(&self, filter: &str) -> Result<Vec<Message>, PersistenceError> {
        let mut out = Vec::new();
        for entry in self.tree.iter() {
            let (key, value) = entry?;
            let Ok(topic) = std::str::from_utf8(&key) else {
                continue;
            };
            if filter_matches(filter, topic) {
                out.push(serde_json::from_slice(&value)?);
            }
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for RetainedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetainedStore")
            .field("db", &"sled::Db")
            .field("entries", &self.tree.len())
            .finish()
    }
}
