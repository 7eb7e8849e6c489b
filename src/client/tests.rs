use super::pubsub_client::Client;
use crate::broker::message::Message;
use tokio::sync::mpsc;

#[test]
fn test_client_new() {
    let (tx, _) = mpsc::unbounded_channel::<Message>();
    let a = Client::new("client-94068-nick-alice", tx.clone());
    let b = Client::new("client-94068-nick-alice", tx);
    assert_eq!(a.id, "client-94068-nick-alice");
    assert!(a.will.is_none());
    assert_ne!(a.connection_id, b.connection_id);
}

#[test]
fn deliver_reports_closed_connection() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let client = Client::new("c1", tx);
    assert!(client.deliver(Message::new("t", "p")));
    assert_eq!(rx.try_recv().unwrap().payload, "p");

    drop(rx);
    assert!(!client.deliver(Message::new("t", "p")));
}
