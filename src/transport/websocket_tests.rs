use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::broker::Broker;
use crate::config::ChatSettings;
use crate::protocol::Status;
use crate::session::{ClientIdentity, Session, SessionEvent};
use crate::transport::message::{ClientMessage, ServerMessage, WillMessage};
use crate::transport::websocket::serve;
use crate::transport::{
    ConnectOptions, OutboundMessage, Transport, TransportEvent, TransportEvents, WsTransport,
};

async fn start_relay() -> (ChatSettings, Arc<Mutex<Broker>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let broker = Arc::new(Mutex::new(Broker::in_memory().unwrap()));
    tokio::spawn(serve(listener, broker.clone()));

    let settings = ChatSettings {
        host: "127.0.0.1".into(),
        port,
        path: "/".into(),
        use_secure_transport: false,
        reconnect: false,
        ..ChatSettings::default()
    };
    (settings, broker)
}

async fn next_message(events: &mut TransportEvents) -> crate::transport::InboundMessage {
    match timeout(Duration::from_secs(5), events.recv()).await {
        Ok(Some(TransportEvent::Message(msg))) => msg,
        other => panic!("Expected a message, got {:?}", other),
    }
}

// Subscribe and publish are fire-and-forget; give the relay time to apply them.
async fn settle() {
    sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_ws_transport_connects_and_routes() {
    let (settings, broker) = start_relay().await;

    let mut alice = WsTransport::from_settings(&settings);
    let mut alice_events = alice
        .connect(ConnectOptions::from_settings("alice", &settings))
        .await
        .unwrap();
    let mut bob = WsTransport::from_settings(&settings);
    bob.connect(ConnectOptions::from_settings("bob", &settings))
        .await
        .unwrap();

    alice.subscribe("chat/onboard/bus/lineA").unwrap();
    settle().await;
    assert_eq!(
        broker.lock().unwrap().subscriptions_of("alice"),
        vec!["chat/onboard/bus/lineA".to_string()]
    );

    bob.publish(OutboundMessage::new("chat/onboard/bus/lineA", "hello").with_qos(1))
        .unwrap();
    let msg = next_message(&mut alice_events).await;
    assert_eq!(msg.topic, "chat/onboard/bus/lineA");
    assert_eq!(msg.payload, "hello");
    assert_eq!(msg.qos, 1);
    assert!(!msg.retained);
}

#[tokio::test]
async fn test_ws_transport_receives_retained_on_subscribe() {
    let (settings, _broker) = start_relay().await;

    let mut early = WsTransport::from_settings(&settings);
    early
        .connect(ConnectOptions::from_settings("early", &settings))
        .await
        .unwrap();
    early
        .publish(
            OutboundMessage::new("bus-onboard/clients/lineA/early", "online")
                .with_qos(1)
                .retained(true),
        )
        .unwrap();
    settle().await;

    let mut late = WsTransport::from_settings(&settings);
    let mut events = late
        .connect(ConnectOptions::from_settings("late", &settings))
        .await
        .unwrap();
    late.subscribe("bus-onboard/clients/lineA/+").unwrap();

    let msg = next_message(&mut events).await;
    assert_eq!(msg.topic, "bus-onboard/clients/lineA/early");
    assert_eq!(msg.payload, "online");
    assert!(msg.retained);
}

#[tokio::test]
async fn test_relay_publishes_will_on_abrupt_close() {
    let (settings, broker) = start_relay().await;

    let mut watcher = WsTransport::from_settings(&settings);
    let mut events = watcher
        .connect(ConnectOptions::from_settings("watcher", &settings))
        .await
        .unwrap();
    watcher.subscribe("bus-onboard/clients/lineA/+").unwrap();
    settle().await;

    let url = format!("ws://127.0.0.1:{}/", settings.port);
    let (mut raw, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let connect = ClientMessage::Connect {
        client_id: "doomed".into(),
        keep_alive_secs: 10,
        clean_session: true,
        will: Some(WillMessage {
            topic: "bus-onboard/clients/lineA/doomed".into(),
            payload: "offline".into(),
            qos: 1,
            retained: true,
        }),
    };
    raw.send(WsMessage::Text(serde_json::to_string(&connect).unwrap().into()))
        .await
        .unwrap();
    let ack = raw.next().await.unwrap().unwrap();
    let ack: ServerMessage = serde_json::from_slice(&ack.into_data()).unwrap();
    assert_eq!(
        ack,
        ServerMessage::ConnAck {
            session_present: false
        }
    );

    // No disconnect frame: the socket just goes away.
    drop(raw);

    let will = next_message(&mut events).await;
    assert_eq!(will.topic, "bus-onboard/clients/lineA/doomed");
    assert_eq!(will.payload, "offline");
    settle().await;
    assert!(!broker.lock().unwrap().is_connected("doomed"));
}

#[tokio::test]
async fn test_graceful_disconnect_skips_will() {
    let (settings, broker) = start_relay().await;

    let will = OutboundMessage::new("bus-onboard/clients/lineA/polite", "offline")
        .with_qos(1)
        .retained(true);
    let mut polite = WsTransport::from_settings(&settings);
    polite
        .connect(ConnectOptions::from_settings("polite", &settings).with_will(will))
        .await
        .unwrap();
    settle().await;
    assert!(broker.lock().unwrap().is_connected("polite"));

    polite.disconnect().await.unwrap();
    settle().await;

    let broker = broker.lock().unwrap();
    assert!(!broker.is_connected("polite"));
    assert!(
        broker
            .retained()
            .get("bus-onboard/clients/lineA/polite")
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_relay_rejects_frames_before_connect() {
    let (settings, _broker) = start_relay().await;

    let url = format!("ws://127.0.0.1:{}/", settings.port);
    let (mut raw, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let subscribe = ClientMessage::Subscribe { topic: "t".into() };
    raw.send(WsMessage::Text(serde_json::to_string(&subscribe).unwrap().into()))
        .await
        .unwrap();

    let reply = raw.next().await.unwrap().unwrap();
    let reply: ServerMessage = serde_json::from_slice(&reply.into_data()).unwrap();
    match reply {
        ServerMessage::Error { message } => assert!(message.contains("connect")),
        other => panic!("Expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ws_transport_refused_over_connection_limit() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let broker = Arc::new(Mutex::new(
        Broker::in_memory().unwrap().with_max_connections(1),
    ));
    tokio::spawn(serve(listener, broker));

    let settings = ChatSettings {
        host: "127.0.0.1".into(),
        port,
        path: "/".into(),
        use_secure_transport: false,
        ..ChatSettings::default()
    };
    let mut first = WsTransport::from_settings(&settings);
    first
        .connect(ConnectOptions::from_settings("first", &settings))
        .await
        .unwrap();

    let mut second = WsTransport::from_settings(&settings);
    let err = second
        .connect(ConnectOptions::from_settings("second", &settings))
        .await
        .unwrap_err();
    assert!(matches!(err, crate::utils::TransportError::Refused(_)));
}

#[tokio::test]
async fn test_sessions_chat_over_relay() {
    let (settings, _broker) = start_relay().await;

    let alice_id = ClientIdentity::new("client-94068-nick-alice", "alice");
    let mut alice = Session::connect(
        WsTransport::from_settings(&settings),
        alice_id,
        "lineA",
        &settings,
    )
    .await
    .unwrap();
    settle().await;

    let bob_id = ClientIdentity::new("client-94068-nick-bob", "bob");
    let mut bob = Session::connect(
        WsTransport::from_settings(&settings),
        bob_id,
        "lineA",
        &settings,
    )
    .await
    .unwrap();
    settle().await;

    // Bob sees Alice's retained beacon and his own.
    let mut seen = Vec::new();
    for _ in 0..2 {
        match timeout(Duration::from_secs(5), bob.next_event()).await.unwrap() {
            Some(SessionEvent::Presence { nickname, status }) => seen.push((nickname, status)),
            other => panic!("Expected presence, got {:?}", other),
        }
    }
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("alice".to_string(), Status::Online),
            ("bob".to_string(), Status::Online)
        ]
    );

    bob.send_chat("bob", "hi alice", "lineA").unwrap();
    loop {
        match timeout(Duration::from_secs(5), alice.next_event()).await.unwrap() {
            Some(SessionEvent::Chat(msg)) => {
                assert_eq!(msg.nickname, "bob");
                assert_eq!(msg.msg_text, "hi alice");
                break;
            }
            Some(SessionEvent::Presence { .. }) => continue,
            other => panic!("Expected chat, got {:?}", other),
        }
    }

    bob.disconnect().await.unwrap();
    loop {
        match timeout(Duration::from_secs(5), alice.next_event()).await.unwrap() {
            Some(SessionEvent::Presence { nickname, status }) if nickname == "bob" => {
                if status == Status::Offline {
                    break;
                }
            }
            Some(SessionEvent::Presence { .. }) | Some(SessionEvent::Chat(_)) => continue,
            other => panic!("Expected bob offline, got {:?}", other),
        }
    }
}

async fn next_link_event(events: &mut TransportEvents) -> TransportEvent {
    loop {
        match timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(TransportEvent::Message(_))) => continue,
            Ok(Some(event)) => return event,
            other => panic!("Expected a link event, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_ws_transport_reconnects_and_resubscribes() {
    let (settings, broker) = start_relay().await;
    let reconnecting = ChatSettings {
        reconnect: true,
        reconnect_delay_ms: 300,
        ..settings.clone()
    };

    let mut alice = WsTransport::from_settings(&reconnecting);
    let mut events = alice
        .connect(ConnectOptions::from_settings("alice", &reconnecting))
        .await
        .unwrap();
    alice.subscribe("chat/onboard/bus/lineA").unwrap();
    settle().await;

    // Same client id from elsewhere: the relay hands the session over.
    let mut intruder = WsTransport::from_settings(&settings);
    intruder
        .connect(ConnectOptions::from_settings("alice", &settings))
        .await
        .unwrap();

    match next_link_event(&mut events).await {
        TransportEvent::ConnectionLost { reconnecting, .. } => assert!(reconnecting),
        other => panic!("Expected ConnectionLost, got {:?}", other),
    }
    assert_eq!(next_link_event(&mut events).await, TransportEvent::Reconnected);
    settle().await;
    assert_eq!(
        broker.lock().unwrap().subscriptions_of("alice"),
        vec!["chat/onboard/bus/lineA".to_string()]
    );

    let mut bob = WsTransport::from_settings(&settings);
    bob.connect(ConnectOptions::from_settings("bob", &settings))
        .await
        .unwrap();
    bob.publish(OutboundMessage::new("chat/onboard/bus/lineA", "welcome back"))
        .unwrap();
    let msg = next_message(&mut events).await;
    assert_eq!(msg.payload, "welcome back");
}

#[tokio::test]
async fn test_session_republishes_online_after_reconnect() {
    let (settings, broker) = start_relay().await;
    let reconnecting = ChatSettings {
        reconnect: true,
        reconnect_delay_ms: 300,
        ..settings.clone()
    };
    let topic = "bus-onboard/clients/lineA/client-94068-nick-alice";

    let mut alice = Session::connect(
        WsTransport::from_settings(&reconnecting),
        ClientIdentity::new("client-94068-nick-alice", "alice"),
        "lineA",
        &reconnecting,
    )
    .await
    .unwrap();
    settle().await;

    // Taken over by a client that leaves a stale beacon behind.
    let mut intruder = WsTransport::from_settings(&settings);
    intruder
        .connect(ConnectOptions::from_settings("client-94068-nick-alice", &settings))
        .await
        .unwrap();
    intruder
        .publish(OutboundMessage::new(topic, "offline").with_qos(1).retained(true))
        .unwrap();

    loop {
        match timeout(Duration::from_secs(5), alice.next_event()).await.unwrap() {
            Some(SessionEvent::ConnectionLost { .. }) => break,
            Some(SessionEvent::Presence { .. }) => continue,
            other => panic!("Expected ConnectionLost, got {:?}", other),
        }
    }
    settle().await;
    let stored = broker.lock().unwrap().retained().get(topic).unwrap().unwrap();
    assert_eq!(stored.payload, "offline");

    loop {
        match timeout(Duration::from_secs(5), alice.next_event()).await.unwrap() {
            Some(SessionEvent::Reconnected) => break,
            Some(SessionEvent::Presence { .. }) => continue,
            other => panic!("Expected Reconnected, got {:?}", other),
        }
    }
    settle().await;
    let stored = broker.lock().unwrap().retained().get(topic).unwrap().unwrap();
    assert_eq!(stored.payload, "online");
}

#[tokio::test]
async fn test_ws_transport_gives_up_on_silent_broker() {
    // Accepts the connection, then never answers a ping.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.next().await;
        let ack = ServerMessage::ConnAck {
            session_present: false,
        };
        ws.send(WsMessage::Text(serde_json::to_string(&ack).unwrap().into()))
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let settings = ChatSettings {
        host: "127.0.0.1".into(),
        port,
        path: "/".into(),
        use_secure_transport: false,
        reconnect: false,
        keep_alive_secs: 1,
        ..ChatSettings::default()
    };
    let mut transport = WsTransport::from_settings(&settings);
    let mut events = transport
        .connect(ConnectOptions::from_settings("alice", &settings))
        .await
        .unwrap();

    match next_link_event(&mut events).await {
        TransportEvent::ConnectionLost {
            reason,
            reconnecting,
        } => {
            assert_eq!(reason, "keep-alive timeout");
            assert!(!reconnecting);
        }
        other => panic!("Expected ConnectionLost, got {:?}", other),
    }
}

#[tokio::test]
async fn test_relay_expires_silent_client_and_publishes_will() {
    let (settings, broker) = start_relay().await;

    let mut watcher = WsTransport::from_settings(&settings);
    let mut events = watcher
        .connect(ConnectOptions::from_settings("watcher", &settings))
        .await
        .unwrap();
    watcher.subscribe("bus-onboard/clients/lineA/+").unwrap();
    settle().await;

    let url = format!("ws://127.0.0.1:{}/", settings.port);
    let (mut raw, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let connect = ClientMessage::Connect {
        client_id: "sleepy".into(),
        keep_alive_secs: 1,
        clean_session: true,
        will: Some(WillMessage {
            topic: "bus-onboard/clients/lineA/sleepy".into(),
            payload: "offline".into(),
            qos: 1,
            retained: true,
        }),
    };
    raw.send(WsMessage::Text(serde_json::to_string(&connect).unwrap().into()))
        .await
        .unwrap();
    raw.next().await.unwrap().unwrap();
    assert!(broker.lock().unwrap().is_connected("sleepy"));

    // The socket stays open but says nothing for longer than 1.5 s.
    let will = next_message(&mut events).await;
    assert_eq!(will.topic, "bus-onboard/clients/lineA/sleepy");
    assert_eq!(will.payload, "offline");
    assert!(!broker.lock().unwrap().is_connected("sleepy"));
    drop(raw);
}
