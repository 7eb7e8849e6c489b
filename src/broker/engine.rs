//! Broker engine
//!
//! The in-memory routing state of the relay:
//! - filter subscriptions per client, with `+`/`#` wildcards
//! - retained messages, kept in a `RetainedStore` and replayed on subscribe
//! - a last-will per client, published when the client goes away uncleanly
//!
//! The API is synchronous and meant to be held behind `Arc<Mutex<Broker>>`
//! by the transport layer. Callers must not hold the lock across network I/O.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::message::Message;
use crate::broker::topic::{SubscriberId, Topic, is_valid_filter, is_valid_topic};
use crate::client::Client;
use crate::config::RelaySettings;
use crate::persistence::RetainedStore;
use crate::utils::PersistenceError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("connection limit of {0} reached")]
    ConnectionLimit(usize),
}

#[derive(Debug)]
pub struct Broker {
    topics: HashMap<String, Topic>,
    clients: HashMap<SubscriberId, Client>,
    retained: RetainedStore,
    max_connections: usize,
}

impl Broker {
    const DEFAULT_MAX_CONNECTIONS: usize = 1000;

    pub fn new(retained: RetainedStore) -> Self {
        Self {
            topics: HashMap::new(),
            clients: HashMap::new(),
            retained,
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// A broker whose retained messages live only as long as the process.
    pub fn in_memory() -> Result<Self, PersistenceError> {
        Ok(Self::new(RetainedStore::temporary()?))
    }

    pub fn from_settings(settings: &RelaySettings) -> Result<Self, PersistenceError> {
        let retained = match &settings.retained_db_path {
            Some(path) => RetainedStore::open(path)?,
            None => RetainedStore::temporary()?,
        };
        Ok(Self::new(retained).with_max_connections(settings.max_connections))
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Registers a client. A client connecting with an id that is already
    /// connected takes the session over; the previous connection is dropped
    /// without publishing its will.
    pub fn register_client(&mut self, client: Client) -> Result<(), RegisterError> {
        if let Some(previous) = self.clients.remove(&client.id) {
            info!(client_id = %client.id, old = %previous.connection_id, "client id taken over");
            self.drop_subscriptions(&client.id);
        } else if self.clients.len() >= self.max_connections {
            return Err(RegisterError::ConnectionLimit(self.max_connections));
        }

        self.clients.insert(client.id.clone(), client);
        Ok(())
    }

    pub fn remove_client(&mut self, client_id: &SubscriberId) -> Option<Client> {
        self.clients.remove(client_id)
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Subscribes a client to a filter, creating it if needed, then replays
    /// the retained messages the filter matches to that client only.
    pub fn subscribe(&mut self, filter: &str, subscriber: SubscriberId) {
        if !is_valid_filter(filter) {
            warn!(%subscriber, filter, "rejected invalid topic filter");
            return;
        }

        self.topics
            .entry(filter.to_string())
            .or_insert_with(|| Topic::new(filter))
            .subscribe(subscriber.clone());

        let Some(client) = self.clients.get(&subscriber) else {
            return;
        };

        match self.retained.matching(filter) {
            Ok(messages) => {
                for msg in messages {
                    client.deliver(msg.retained(true));
                }
            }
            Err(e) => warn!(filter, error = %e, "failed to load retained messages"),
        }
    }

    /// Unsubscribes a client from a filter
    /// If the filter does not exist, it will not perform any action
    pub fn unsubscribe(&mut self, filter: &str, subscriber: &SubscriberId) {
        if let Some(t) = self.topics.get_mut(filter) {
            t.unsubscribe(subscriber);
            if t.subscribers.is_empty() {
                self.topics.remove(filter);
            }
        }
    }

    /// Publishes a message to every client with at least one matching
    /// filter, once per client.
    ///
    /// A retained message replaces the topic's stored value; a retained
    /// message with an empty payload clears it.
    pub fn publish(&mut self, mut msg: Message) {
        if !is_valid_topic(&msg.topic) {
            warn!(topic = %msg.topic, "rejected publish to invalid topic");
            return;
        }
        msg.timestamp = chrono::Utc::now().timestamp_millis();

        if msg.retained {
            let result = if msg.payload.is_empty() {
                self.retained.remove(&msg.topic)
            } else {
                self.retained.store(&msg)
            };
            if let Err(e) = result {
                warn!(topic = %msg.topic, error = %e, "failed to update retained message");
            }
        }

        let recipients: HashSet<&SubscriberId> = self
            .topics
            .values()
            .filter(|t| t.matches(&msg.topic))
            .flat_map(|t| t.subscribers.iter())
            .collect();

        if recipients.is_empty() {
            debug!(topic = %msg.topic, "no subscribers");
            return;
        }

        let delivered = Message {
            retained: false,
            ..msg
        };
        for sub_id in recipients {
            match self.clients.get(sub_id) {
                Some(client) => {
                    if !client.deliver(delivered.clone()) {
                        warn!(%sub_id, "failed to deliver, channel closed");
                    }
                }
                None => debug!(%sub_id, "no client registered"),
            }
        }
    }

    /// Removes a client and its subscriptions. Publishes the client's will
    /// unless it left gracefully.
    ///
    /// Only acts when `connection_id` is the client's current connection, so
    /// a connection that was taken over cannot tear down its successor.
    pub fn cleanup_client(
        &mut self,
        client_id: &SubscriberId,
        connection_id: Uuid,
        graceful: bool,
    ) -> bool {
        match self.clients.get(client_id) {
            Some(client) if client.connection_id == connection_id => {}
            _ => return false,
        }

        let will = self.remove_client(client_id).and_then(|c| c.will);
        self.drop_subscriptions(client_id);
        info!(%client_id, graceful, "cleaned up client");

        if !graceful {
            if let Some(will) = will {
                info!(%client_id, topic = %will.topic, "publishing last will");
                self.publish(will);
            }
        }
        true
    }

    fn drop_subscriptions(&mut self, client_id: &SubscriberId) {
        for topic in self.topics.values_mut() {
            topic.unsubscribe(client_id);
        }
        self.topics.retain(|_, t| !t.subscribers.is_empty());
    }

    /// Filters `client_id` is currently subscribed to, sorted.
    pub fn subscriptions_of(&self, client_id: &str) -> Vec<String> {
        let mut filters: Vec<String> = self
            .topics
            .values()
            .filter(|t| t.subscribers.contains(client_id))
            .map(|t| t.name.clone())
            .collect();
        filters.sort();
        filters
    }

    pub fn retained(&self) -> &RetainedStore {
        &self.retained
    }
}
