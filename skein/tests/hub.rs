//! Hub routing end to end: point-to-point, request/response, broadcast,
//! pub/sub, metrics, shutdown.

mod init_logging;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use skein::{handler_fn, Envelope, EnvelopeHandler, Hub, HubConfig, HubError, MessageType};

fn recording_handler(seen: Arc<Mutex<Vec<Envelope>>>) -> Arc<dyn EnvelopeHandler> {
    handler_fn(move |envelope| {
        let seen = Arc::clone(&seen);
        async move {
            seen.lock().unwrap().push(envelope);
            Ok(None)
        }
    })
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if condition() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// **Scenario S5**: a request resolves to exactly the response the remote
/// handler produced, correlated by reply_to.
#[tokio::test]
async fn request_resolves_to_handler_response() {
    let hub = Hub::new(HubConfig::default());
    hub.register_agent("a", handler_fn(|_| async { Ok(None) }))
        .await
        .unwrap();
    hub.register_agent(
        "b",
        handler_fn(|envelope: Envelope| async move {
            let data = envelope.data.as_str().unwrap_or_default();
            let reply = Envelope::response_to(&envelope, serde_json::json!(format!("processed: {data}")));
            Ok(Some(reply))
        }),
    )
    .await
    .unwrap();

    let token = CancellationToken::new();
    let response = hub
        .request(&token, "a", "b", serde_json::json!("task"))
        .await
        .unwrap();
    assert_eq!(response.kind, MessageType::Response);
    assert_eq!(response.data, serde_json::json!("processed: task"));
    assert_eq!(response.from, "b");
    assert_eq!(response.to, "a");
    assert!(response.reply_to.is_some());
}

/// **Ordering property**: envelopes from one sender to one receiver arrive at
/// the handler in send order.
#[tokio::test]
async fn sender_receiver_pair_is_fifo() {
    let hub = Hub::new(HubConfig {
        inbox_capacity: 64,
        ..HubConfig::default()
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    hub.register_agent("b", recording_handler(seen.clone()))
        .await
        .unwrap();

    let token = CancellationToken::new();
    for i in 0..20 {
        hub.send(&token, "a", "b", serde_json::json!(i)).await.unwrap();
    }

    wait_for(|| seen.lock().unwrap().len() == 20).await;
    let order: Vec<i64> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.data.as_i64().unwrap())
        .collect();
    assert_eq!(order, (0..20).collect::<Vec<i64>>());
}

/// **Scenario**: cancelling the caller before any response yields Cancelled
/// promptly; a too-small explicit timeout wins over the default.
#[tokio::test]
async fn request_cancellation_and_timeout() {
    let hub = Hub::new(HubConfig::default());
    // b swallows requests and never responds
    hub.register_agent("b", handler_fn(|_| async { Ok(None) }))
        .await
        .unwrap();

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
    });
    let err = hub
        .request(&token, "a", "b", serde_json::json!("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Cancelled));

    let token = CancellationToken::new();
    let started = std::time::Instant::now();
    let err = hub
        .request_with_timeout(
            &token,
            "a",
            "b",
            serde_json::json!("x"),
            Some(Duration::from_millis(40)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Timeout));
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// **Scenario**: request to an unknown agent fails before registering a
/// response slot.
#[tokio::test]
async fn request_unknown_agent() {
    let hub = Hub::new(HubConfig::default());
    let token = CancellationToken::new();
    let err = hub
        .request(&token, "a", "ghost", serde_json::json!(1))
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::AgentNotFound(_)));
}

/// **Scenario**: broadcast reaches every registered agent except the sender.
#[tokio::test]
async fn broadcast_excludes_sender() {
    let hub = Hub::new(HubConfig::default());
    let seen_a = Arc::new(Mutex::new(Vec::new()));
    let seen_b = Arc::new(Mutex::new(Vec::new()));
    let seen_c = Arc::new(Mutex::new(Vec::new()));
    hub.register_agent("a", recording_handler(seen_a.clone())).await.unwrap();
    hub.register_agent("b", recording_handler(seen_b.clone())).await.unwrap();
    hub.register_agent("c", recording_handler(seen_c.clone())).await.unwrap();

    let token = CancellationToken::new();
    hub.broadcast(&token, "a", serde_json::json!("hello all")).await.unwrap();

    wait_for(|| seen_b.lock().unwrap().len() == 1 && seen_c.lock().unwrap().len() == 1).await;
    assert!(seen_a.lock().unwrap().is_empty());
    let envelope = seen_b.lock().unwrap()[0].clone();
    assert_eq!(envelope.kind, MessageType::Broadcast);
    assert_eq!(envelope.to, "b");
}

/// **Scenario**: publish reaches subscribers only, excluding the publisher;
/// topic tags ride on the envelope.
#[tokio::test]
async fn publish_reaches_subscribers_only() {
    let hub = Hub::new(HubConfig::default());
    let seen_b = Arc::new(Mutex::new(Vec::new()));
    let seen_c = Arc::new(Mutex::new(Vec::new()));
    let seen_d = Arc::new(Mutex::new(Vec::new()));
    hub.register_agent("b", recording_handler(seen_b.clone())).await.unwrap();
    hub.register_agent("c", recording_handler(seen_c.clone())).await.unwrap();
    hub.register_agent("d", recording_handler(seen_d.clone())).await.unwrap();
    hub.subscribe("b", "news").await.unwrap();
    hub.subscribe("c", "news").await.unwrap();

    let token = CancellationToken::new();
    hub.publish(&token, "b", "news", serde_json::json!("extra extra")).await.unwrap();

    wait_for(|| seen_c.lock().unwrap().len() == 1).await;
    assert!(seen_b.lock().unwrap().is_empty(), "publisher must not receive");
    assert!(seen_d.lock().unwrap().is_empty(), "non-subscriber must not receive");
    let envelope = seen_c.lock().unwrap()[0].clone();
    assert_eq!(envelope.topic.as_deref(), Some("news"));
    assert_eq!(envelope.kind, MessageType::Notification);
}

/// **Scenario**: metrics count registrations and traffic.
#[tokio::test]
async fn metrics_snapshot() {
    let hub = Hub::new(HubConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    hub.register_agent("a", recording_handler(seen.clone())).await.unwrap();
    hub.register_agent("b", recording_handler(seen.clone())).await.unwrap();

    let token = CancellationToken::new();
    hub.send(&token, "a", "b", serde_json::json!(1)).await.unwrap();
    hub.send(&token, "b", "a", serde_json::json!(2)).await.unwrap();
    wait_for(|| seen.lock().unwrap().len() == 2).await;

    let metrics = hub.metrics();
    assert_eq!(metrics.local_agents, 2);
    assert_eq!(metrics.messages_sent, 2);
    assert_eq!(metrics.messages_recv, 2);
}

/// **Scenario**: shutdown returns ShutdownTimeout while a handler is still
/// busy past the budget, and completes once given enough time.
#[tokio::test]
async fn shutdown_honors_timeout() {
    let hub = Hub::new(HubConfig::default());
    hub.register_agent(
        "slow",
        handler_fn(|_| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(None)
        }),
    )
    .await
    .unwrap();

    let token = CancellationToken::new();
    hub.send(&token, "x", "slow", serde_json::json!(1)).await.unwrap();
    // give the delivery task a moment to pick the envelope up
    tokio::time::sleep(Duration::from_millis(30)).await;

    let err = hub.shutdown(Duration::from_millis(10)).await.unwrap_err();
    assert!(matches!(err, HubError::ShutdownTimeout));

    hub.shutdown(Duration::from_secs(2)).await.unwrap();
}
