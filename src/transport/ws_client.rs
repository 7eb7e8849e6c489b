//! WebSocket client transport
//!
//! `WsTransport` connects to the relay and hands the socket to a background
//! link task. The task:
//! - drains the outbound queue that `subscribe`/`unsubscribe`/`publish` feed
//! - turns `message` frames into `TransportEvent::Message`
//! - pings every keep-alive interval and gives up after two silent intervals
//! - when `reconnect` is set, reconnects after a lost connection and
//!   re-subscribes everything it was subscribed to

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::config::ChatSettings;
use crate::transport::message::{ClientMessage, ServerMessage, next_text, send_frame};
use crate::transport::{
    ConnectOptions, InboundMessage, OutboundMessage, Transport, TransportEvent, TransportEvents,
};
use crate::utils::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Subscriptions = Arc<Mutex<BTreeSet<String>>>;

#[derive(Debug)]
pub struct WsTransport {
    host: String,
    port: u16,
    path: String,
    connect_timeout: Duration,
    reconnect_delay: Duration,
    link: Option<Link>,
}

#[derive(Debug)]
struct Link {
    outbound: UnboundedSender<ClientMessage>,
    subscriptions: Subscriptions,
    task: JoinHandle<()>,
}

enum LinkEnd {
    Closed,
    Lost(String),
}

impl WsTransport {
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            path: path.into(),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            link: None,
        }
    }

    pub fn from_settings(settings: &ChatSettings) -> Self {
        Self::new(settings.host.clone(), settings.port, settings.path.clone()).with_timeouts(
            Duration::from_secs(settings.connect_timeout_secs),
            Duration::from_millis(settings.reconnect_delay_ms),
        )
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, reconnect_delay: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.reconnect_delay = reconnect_delay;
        self
    }

    pub fn url(&self, secure: bool) -> String {
        let scheme = if secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }

    fn send(&self, msg: ClientMessage) -> Result<&Link, TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        link.outbound.send(msg).map_err(|_| TransportError::Closed)?;
        Ok(link)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&mut self, options: ConnectOptions) -> Result<TransportEvents, TransportError> {
        if self.link.is_some() {
            return Err(TransportError::Handshake("already connected".into()));
        }
        if options.use_secure_transport {
            // Fails harmlessly when a provider is already installed.
            let _ = rustls::crypto::ring::default_provider().install_default();
        }

        let url = self.url(options.use_secure_transport);
        let ws = open(&url, &options, self.connect_timeout).await?;
        info!(%url, client_id = %options.client_id, "connected to broker");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let subscriptions = Subscriptions::default();

        let task = tokio::spawn(run_link(
            ws,
            outbound_rx,
            events_tx,
            subscriptions.clone(),
            LinkConfig {
                url,
                options,
                connect_timeout: self.connect_timeout,
                reconnect_delay: self.reconnect_delay,
            },
        ));

        self.link = Some(Link {
            outbound: outbound_tx,
            subscriptions,
            task,
        });
        Ok(events_rx)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let link = self.send(ClientMessage::Subscribe {
            topic: topic.to_string(),
        })?;
        lock(&link.subscriptions).insert(topic.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let link = self.send(ClientMessage::Unsubscribe {
            topic: topic.to_string(),
        })?;
        lock(&link.subscriptions).remove(topic);
        Ok(())
    }

    fn publish(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        self.send(ClientMessage::publish(message)).map(|_| ())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some(mut link) = self.link.take() else {
            return Err(TransportError::NotConnected);
        };
        let _ = link.outbound.send(ClientMessage::Disconnect);

        // The link task is stuck in its reconnect loop if the broker is gone.
        if timeout(self.connect_timeout, &mut link.task).await.is_err() {
            link.task.abort();
        }
        Ok(())
    }
}

struct LinkConfig {
    url: String,
    options: ConnectOptions,
    connect_timeout: Duration,
    reconnect_delay: Duration,
}

fn lock(subscriptions: &Subscriptions) -> MutexGuard<'_, BTreeSet<String>> {
    subscriptions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Opens the socket and performs the connect / conn_ack exchange.
async fn open(
    url: &str,
    options: &ConnectOptions,
    connect_timeout: Duration,
) -> Result<WsStream, TransportError> {
    let (mut ws, _response) = timeout(connect_timeout, connect_async(url))
        .await
        .map_err(|_| TransportError::Timeout(connect_timeout))??;

    send_frame(&mut ws, &ClientMessage::connect(options)).await?;

    let reply = match timeout(connect_timeout, next_text(&mut ws)).await {
        Ok(Some(frame)) => frame?,
        Ok(None) => return Err(TransportError::Closed),
        Err(_) => return Err(TransportError::Timeout(connect_timeout)),
    };

    match serde_json::from_str::<ServerMessage>(&reply) {
        Ok(ServerMessage::ConnAck { .. }) => Ok(ws),
        Ok(ServerMessage::Error { message }) => Err(TransportError::Refused(message)),
        Ok(other) => Err(TransportError::Handshake(format!(
            "expected conn_ack, got {other:?}"
        ))),
        Err(e) => Err(TransportError::Handshake(e.to_string())),
    }
}

async fn run_link(
    mut ws: WsStream,
    mut outbound: UnboundedReceiver<ClientMessage>,
    events: UnboundedSender<TransportEvent>,
    subscriptions: Subscriptions,
    config: LinkConfig,
) {
    loop {
        let reason = match drive(&mut ws, &mut outbound, &events, config.options.keep_alive).await {
            LinkEnd::Closed => return,
            LinkEnd::Lost(reason) => reason,
        };

        let reconnecting = config.options.reconnect;
        warn!(%reason, reconnecting, "connection lost");
        let _ = events.send(TransportEvent::ConnectionLost {
            reason,
            reconnecting,
        });
        if !reconnecting {
            return;
        }

        ws = match reconnect(&config, &events).await {
            Some(ws) => ws,
            None => return,
        };

        let topics: Vec<String> = lock(&subscriptions).iter().cloned().collect();
        for topic in topics {
            if let Err(e) = send_frame(&mut ws, &ClientMessage::Subscribe { topic }).await {
                debug!(error = %e, "re-subscribe failed");
            }
        }
        let _ = events.send(TransportEvent::Reconnected);
    }
}

async fn reconnect(config: &LinkConfig, events: &UnboundedSender<TransportEvent>) -> Option<WsStream> {
    let mut attempt: u32 = 0;
    loop {
        // Nobody is listening any more.
        if events.is_closed() {
            return None;
        }
        tokio::time::sleep(config.reconnect_delay).await;
        attempt += 1;

        match open(&config.url, &config.options, config.connect_timeout).await {
            Ok(ws) => {
                info!(attempt, url = %config.url, "reconnected");
                return Some(ws);
            }
            Err(e) => debug!(attempt, error = %e, "reconnect failed"),
        }
    }
}

async fn drive(
    ws: &mut WsStream,
    outbound: &mut UnboundedReceiver<ClientMessage>,
    events: &UnboundedSender<TransportEvent>,
    keep_alive: Duration,
) -> LinkEnd {
    // A zero keep-alive disables pings; the interval still needs a period.
    let period = if keep_alive.is_zero() {
        Duration::from_secs(3600)
    } else {
        keep_alive
    };
    let mut ping = interval_at(Instant::now() + period, period);
    let mut last_heard = Instant::now();

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                None => {
                    let _ = ws.close(None).await;
                    return LinkEnd::Closed;
                }
                Some(ClientMessage::Disconnect) => {
                    let _ = send_frame(ws, &ClientMessage::Disconnect).await;
                    let _ = ws.close(None).await;
                    return LinkEnd::Closed;
                }
                Some(msg) => {
                    if let Err(e) = send_frame(ws, &msg).await {
                        return LinkEnd::Lost(e.to_string());
                    }
                }
            },
            frame = next_text(ws) => match frame {
                Some(Ok(text)) => {
                    last_heard = Instant::now();
                    handle_server_text(&text, events);
                }
                Some(Err(e)) => return LinkEnd::Lost(e.to_string()),
                None => return LinkEnd::Lost("connection closed by broker".to_string()),
            },
            _ = ping.tick() => {
                if keep_alive.is_zero() {
                    continue;
                }
                if last_heard.elapsed() > keep_alive * 2 {
                    return LinkEnd::Lost("keep-alive timeout".to_string());
                }
                if let Err(e) = send_frame(ws, &ClientMessage::Ping).await {
                    return LinkEnd::Lost(e.to_string());
                }
            }
        }
    }
}

fn handle_server_text(text: &str, events: &UnboundedSender<TransportEvent>) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::Message {
            topic,
            payload,
            qos,
            retained,
            ..
        }) => {
            let _ = events.send(TransportEvent::Message(InboundMessage {
                topic,
                payload,
                qos,
                retained,
            }));
        }
        Ok(ServerMessage::Pong) => trace!("pong"),
        Ok(ServerMessage::Error { message }) => warn!(%message, "broker reported an error"),
        Ok(ServerMessage::ConnAck { .. }) => debug!("unexpected conn_ack"),
        Err(e) => warn!(error = %e, "invalid frame from broker"),
    }
}
