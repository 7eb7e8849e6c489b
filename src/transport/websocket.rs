//! WebSocket relay
//!
//! Serves the broker over WebSocket. Per connection:
//! - the first frame must be `connect`; it registers a `Client` (with its
//!   last-will) with the `Broker` and is answered with `conn_ack`
//! - subscribe/unsubscribe/publish frames are forwarded to the broker
//! - silence longer than 1.5x the announced keep-alive, or a close without a
//!   `disconnect` frame, ends the connection uncleanly and fires the will

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, lock};
use crate::broker::message::Message;
use crate::client::Client;
use crate::transport::message::{ClientMessage, ServerMessage, next_text, send_frame};
use crate::utils::TransportError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What the connection loop does after a client frame was handled.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Reply(ServerMessage),
    Disconnect,
}

pub async fn start_websocket_server(
    addr: &str,
    broker: Arc<Mutex<Broker>>,
) -> Result<(), TransportError> {
    let listener = TcpListener::bind(addr).await?;

    if let Ok(local) = listener.local_addr() {
        info!("WebSocket relay listening on ws://{local}");
    }

    serve(listener, broker).await;
    Ok(())
}

/// Accepts connections on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, broker: Arc<Mutex<Broker>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let broker = broker.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, broker).await {
                        warn!(%peer, error = %e, "connection closed with error");
                    }
                });
            }
            Err(e) => warn!(error = %e, "failed to accept connection"),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    broker: Arc<Mutex<Broker>>,
) -> Result<(), TransportError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let text = match timeout(CONNECT_TIMEOUT, next_text(&mut ws_receiver)).await {
        Ok(Some(frame)) => frame?,
        Ok(None) => return Ok(()),
        Err(_) => return Err(TransportError::Timeout(CONNECT_TIMEOUT)),
    };

    let (client_id, keep_alive_secs, will) = match serde_json::from_str::<ClientMessage>(&text) {
        Ok(ClientMessage::Connect {
            client_id,
            keep_alive_secs,
            will,
            ..
        }) => (client_id, keep_alive_secs, will),
        _ => {
            let reply = ServerMessage::Error {
                message: "expected connect".to_string(),
            };
            send_frame(&mut ws_sender, &reply).await?;
            return Err(TransportError::Handshake("first frame was not connect".into()));
        }
    };

    let client_id = if client_id.is_empty() {
        format!("relay-{}", Uuid::new_v4())
    } else {
        client_id
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let client = Client::new(client_id.clone(), tx).with_will(will.map(Message::from));
    let connection_id = client.connection_id;

    let registered = lock(&broker).register_client(client);
    if let Err(e) = registered {
        let reply = ServerMessage::Error {
            message: e.to_string(),
        };
        send_frame(&mut ws_sender, &reply).await?;
        return Err(TransportError::Refused(e.to_string()));
    }

    send_frame(
        &mut ws_sender,
        &ServerMessage::ConnAck {
            session_present: false,
        },
    )
    .await?;
    info!(%client_id, %connection_id, keep_alive_secs, "client connected");

    // Broker deliveries and control replies share the socket's write half.
    let (ctl_tx, mut ctl_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = {
        let client_id = client_id.clone();
        tokio::spawn(async move {
            loop {
                let outgoing = tokio::select! {
                    delivery = rx.recv() => match delivery {
                        Some(msg) => ServerMessage::from(msg),
                        None => break,
                    },
                    ctl = ctl_rx.recv() => match ctl {
                        Some(reply) => reply,
                        None => break,
                    },
                };
                if let Err(e) = send_frame(&mut ws_sender, &outgoing).await {
                    debug!(%client_id, error = %e, "failed to send frame");
                    break;
                }
            }
            let _ = ws_sender.close().await;
            debug!(%client_id, "send loop closed");
        })
    };

    let idle_limit = keep_alive_limit(keep_alive_secs);
    let mut graceful = false;

    loop {
        let next = match idle_limit {
            Some(limit) => match timeout(limit, next_text(&mut ws_receiver)).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(%client_id, "keep-alive expired");
                    break;
                }
            },
            None => next_text(&mut ws_receiver).await,
        };

        let text = match next {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                debug!(%client_id, error = %e, "read failed");
                break;
            }
            None => break,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(msg) => match handle_client_message(&broker, &client_id, msg) {
                Flow::Continue => {}
                Flow::Reply(reply) => {
                    let _ = ctl_tx.send(reply);
                }
                Flow::Disconnect => {
                    graceful = true;
                    break;
                }
            },
            Err(err) => {
                warn!(
                    "Invalid client message from {client_id}: {err} | {}",
                    text.chars().take(100).collect::<String>()
                );
            }
        }
    }

    lock(&broker).cleanup_client(&client_id, connection_id, graceful);
    info!(%client_id, graceful, "client disconnected");

    drop(ctl_tx);
    let _ = writer.await;
    Ok(())
}

/// Applies one client frame to the broker.
pub(crate) fn handle_client_message(
    broker: &Mutex<Broker>,
    client_id: &str,
    msg: ClientMessage,
) -> Flow {
    match msg {
        ClientMessage::Subscribe { topic } => {
            lock(broker).subscribe(&topic, client_id.to_string());
            debug!("{client_id} subscribed to {topic}");
            Flow::Continue
        }
        ClientMessage::Unsubscribe { topic } => {
            lock(broker).unsubscribe(&topic, &client_id.to_string());
            debug!("{client_id} unsubscribed from {topic}");
            Flow::Continue
        }
        ClientMessage::Publish {
            topic,
            payload,
            qos,
            retained,
            ..
        } => {
            debug!("{client_id} published to {topic}");
            lock(broker).publish(Message::new(topic, payload).with_qos(qos).retained(retained));
            Flow::Continue
        }
        ClientMessage::Ping => Flow::Reply(ServerMessage::Pong),
        ClientMessage::Disconnect => Flow::Disconnect,
        ClientMessage::Connect { .. } => Flow::Reply(ServerMessage::Error {
            message: "already connected".to_string(),
        }),
    }
}

/// Idle time after which a silent client is considered gone. `None` when
/// the client disabled keep-alive.
pub(crate) fn keep_alive_limit(keep_alive_secs: u64) -> Option<Duration> {
    if keep_alive_secs == 0 {
        None
    } else {
        Some(Duration::from_millis(keep_alive_secs * 1500))
    }
}
