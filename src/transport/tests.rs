use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::engine::BrokerCoordinator;
use crate::broker::message::WireMessage;
use crate::broker::tag::Tag;
use crate::client::{BrokerClient, Subscription};
use crate::transport::message::{ClientFrame, ServerFrame};
use crate::transport::websocket::serve;
use crate::utils::error::BrokerError;

struct TestBroker {
    coordinator: Arc<BrokerCoordinator>,
    client: BrokerClient,
    server: JoinHandle<()>,
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn start_broker() -> TestBroker {
    start_broker_with_limit(16).await
}

async fn start_broker_with_limit(max_connections: usize) -> TestBroker {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().unwrap();
    let coordinator = Arc::new(BrokerCoordinator::new(Duration::from_secs(3600)));

    let server = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            let _ = serve(listener, coordinator, max_connections).await;
        }
    });

    TestBroker {
        coordinator,
        client: BrokerClient::new(format!("ws://{addr}")),
        server,
    }
}

fn wire(id: u64, tag: &str) -> WireMessage {
    WireMessage {
        id,
        tag: tag.to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        payload: format!("payload-{id}"),
    }
}

async fn wait_for_subscribers(broker: &BrokerCoordinator, tag: Tag, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.router().subscriber_count(tag) != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber count never reached");
}

async fn wait_for_stored(broker: &BrokerCoordinator, tag: Tag, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.store().size(tag) != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stored count never reached");
}

async fn next_id(sub: &mut Subscription) -> u64 {
    tokio::time::timeout(Duration::from_secs(5), sub.next_message())
        .await
        .expect("timed out waiting for message")
        .expect("subscription ended")
        .expect("subscription failed")
        .id
}

async fn raw_call(client: &BrokerClient, frame: serde_json::Value) -> ServerFrame {
    let (mut ws, _) = connect_async(client.url()).await.expect("connect");
    ws.send(WsMessage::text(frame.to_string()))
        .await
        .expect("send frame");

    let reply = ws
        .next()
        .await
        .expect("did not receive response")
        .expect("websocket error");
    serde_json::from_str(reply.to_text().unwrap()).expect("server frame")
}

#[test]
fn test_frames_use_type_tag() {
    let frame = ClientFrame::Message(wire(1, "BUG"));
    let value = serde_json::to_value(&frame).unwrap();
    assert_eq!(value["type"], "message");
    assert_eq!(value["tag"], "BUG");

    let parsed: ClientFrame = serde_json::from_value(json!({ "type": "request_tags" })).unwrap();
    assert_eq!(parsed, ClientFrame::RequestTags);

    let ack = serde_json::to_string(&ServerFrame::Ack { accepted: None }).unwrap();
    assert_eq!(ack, r#"{"type":"ack"}"#);
}

#[tokio::test]
async fn test_request_tags() {
    let broker = start_broker().await;
    let tags = broker.client.request_tags().await.unwrap();
    assert_eq!(tags, vec!["TRIAL", "LICENSE", "SUPPORT", "BUG"]);
}

#[tokio::test]
async fn test_register_known_and_unknown_tag() {
    let broker = start_broker().await;
    broker.client.register(Tag::Support).await.unwrap();

    let reply = raw_call(&broker.client, json!({ "type": "register", "tag": "NOPE" })).await;
    match reply {
        ServerFrame::Error { message } => assert!(message.contains("unknown tag 'NOPE'")),
        other => panic!("Expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_first_frame_is_rejected() {
    let broker = start_broker().await;
    let reply = raw_call(&broker.client, json!({ "type": "done" })).await;
    match reply {
        ServerFrame::Error { message } => assert!(message.contains("cannot start a call")),
        other => panic!("Expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_publish_then_subscribe_replays_history() {
    let broker = start_broker().await;

    let mut publisher = broker.client.publisher().await.unwrap();
    for id in 0..3 {
        publisher.send(wire(id, "TRIAL")).await.unwrap();
    }
    assert_eq!(publisher.finish().await.unwrap(), 3);
    assert_eq!(broker.coordinator.store().size(Tag::Trial), 3);

    let mut sub = broker.client.subscribe("TRIAL").await.unwrap();
    for expected in 0..3 {
        assert_eq!(next_id(&mut sub).await, expected);
    }

    let mut publisher = broker.client.publisher().await.unwrap();
    publisher.send(wire(3, "TRIAL")).await.unwrap();
    publisher.finish().await.unwrap();
    assert_eq!(next_id(&mut sub).await, 3);

    sub.close().await.unwrap();
    wait_for_subscribers(&broker.coordinator, Tag::Trial, 0).await;
}

#[tokio::test]
async fn test_publish_unknown_tag_is_rejected() {
    let broker = start_broker().await;

    let mut publisher = broker.client.publisher().await.unwrap();
    publisher.send(wire(0, "FEATURE")).await.unwrap();
    let _ = publisher.send(wire(1, "TRIAL")).await;

    match publisher.finish().await {
        Err(BrokerError::Rejected(message)) => assert!(message.contains("FEATURE")),
        other => panic!("Expected rejection, got {other:?}"),
    }
    for tag in Tag::ALL {
        assert_eq!(broker.coordinator.store().size(tag), 0);
    }
}

#[tokio::test]
async fn test_subscribe_unknown_tag_is_rejected() {
    let broker = start_broker().await;

    let mut sub = broker.client.subscribe("FEATURE").await.unwrap();
    match sub.next_message().await {
        Some(Err(BrokerError::Rejected(message))) => assert!(message.contains("FEATURE")),
        other => panic!("Expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fan_out_respects_tags() {
    let broker = start_broker().await;

    let mut trial_a = broker.client.subscribe("TRIAL").await.unwrap();
    let mut trial_b = broker.client.subscribe("TRIAL").await.unwrap();
    let mut bug = broker.client.subscribe("BUG").await.unwrap();
    wait_for_subscribers(&broker.coordinator, Tag::Trial, 2).await;
    wait_for_subscribers(&broker.coordinator, Tag::Bug, 1).await;

    let mut publisher = broker.client.publisher().await.unwrap();
    publisher.send(wire(9, "TRIAL")).await.unwrap();
    publisher.finish().await.unwrap();

    assert_eq!(next_id(&mut trial_a).await, 9);
    assert_eq!(next_id(&mut trial_b).await, 9);
    assert!(
        tokio::time::timeout(Duration::from_millis(200), bug.next_message())
            .await
            .is_err(),
        "BUG subscriber must not receive TRIAL messages"
    );

    for sub in [trial_a, trial_b, bug] {
        sub.close().await.unwrap();
    }
    wait_for_subscribers(&broker.coordinator, Tag::Trial, 0).await;
    wait_for_subscribers(&broker.coordinator, Tag::Bug, 0).await;
}

#[tokio::test]
async fn test_dropped_subscriber_is_unregistered() {
    let broker = start_broker().await;

    let sub = broker.client.subscribe("LICENSE").await.unwrap();
    wait_for_subscribers(&broker.coordinator, Tag::License, 1).await;

    drop(sub);
    wait_for_subscribers(&broker.coordinator, Tag::License, 0).await;
}

#[tokio::test]
async fn test_publish_closed_without_done_keeps_accepted_messages() {
    let broker = start_broker().await;

    let mut publisher = broker.client.publisher().await.unwrap();
    publisher.send(wire(0, "SUPPORT")).await.unwrap();
    publisher.send(wire(1, "SUPPORT")).await.unwrap();
    assert_eq!(publisher.sent(), 2);
    drop(publisher);

    wait_for_stored(&broker.coordinator, Tag::Support, 2).await;
    let ids: Vec<u64> = broker
        .coordinator
        .store()
        .read(Tag::Support)
        .into_iter()
        .map(|e| e.message.id)
        .collect();
    assert_eq!(ids, vec![0, 1]);
}

#[tokio::test]
async fn test_connections_over_limit_are_dropped() {
    let broker = start_broker_with_limit(1).await;

    let sub = broker.client.subscribe("BUG").await.unwrap();
    wait_for_subscribers(&broker.coordinator, Tag::Bug, 1).await;

    assert!(broker.client.request_tags().await.is_err());

    sub.close().await.unwrap();
    wait_for_subscribers(&broker.coordinator, Tag::Bug, 0).await;
}
