//! A transport that records every call, for asserting on the exact sequence
//! of subscribe/unsubscribe/publish a session issues.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::transport::{
    ConnectOptions, InboundMessage, OutboundMessage, Transport, TransportEvent, TransportEvents,
};
use crate::utils::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect(ConnectOptions),
    Subscribe(String),
    Unsubscribe(String),
    Publish(OutboundMessage),
    Disconnect,
}

#[derive(Debug, Default)]
struct Shared {
    calls: Vec<Call>,
    inbound: Option<UnboundedSender<TransportEvent>>,
}

pub struct RecordingTransport {
    shared: Arc<Mutex<Shared>>,
    refuse: bool,
}

/// Test-side handle: inspect calls and inject inbound events.
#[derive(Clone)]
pub struct Recorder {
    shared: Arc<Mutex<Shared>>,
}

impl RecordingTransport {
    pub fn new() -> (Self, Recorder) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: shared.clone(),
                refuse: false,
            },
            Recorder { shared },
        )
    }

    /// A transport whose connect attempt always fails.
    pub fn refusing() -> (Self, Recorder) {
        let (mut transport, recorder) = Self::new();
        transport.refuse = true;
        (transport, recorder)
    }

    fn record(&self, call: Call) {
        self.shared.lock().unwrap().calls.push(call);
    }
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.shared.lock().unwrap().calls.clone()
    }

    /// Calls made after `connect`, which is always first.
    pub fn calls_after_connect(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Connect(_)))
            .collect()
    }

    pub fn clear(&self) {
        self.shared.lock().unwrap().calls.clear();
    }

    pub fn inject(&self, event: TransportEvent) {
        let shared = self.shared.lock().unwrap();
        shared
            .inbound
            .as_ref()
            .expect("transport not connected")
            .send(event)
            .expect("session dropped its events");
    }

    pub fn deliver(&self, topic: &str, payload: &str) {
        self.inject(TransportEvent::Message(InboundMessage::new(topic, payload)));
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&mut self, options: ConnectOptions) -> Result<TransportEvents, TransportError> {
        self.record(Call::Connect(options));
        if self.refuse {
            return Err(TransportError::Refused("refused by test".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.lock().unwrap().inbound = Some(tx);
        Ok(rx)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.record(Call::Subscribe(topic.to_string()));
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.record(Call::Unsubscribe(topic.to_string()));
        Ok(())
    }

    fn publish(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        self.record(Call::Publish(message));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.record(Call::Disconnect);
        Ok(())
    }
}
