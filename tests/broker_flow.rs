mod common;

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use wallet_bridge::broker::{BrokerError, Envelope, InboundDisposition, InboundMessage, MessageTarget};
use wallet_bridge::discovery::ProviderSource;
use wallet_bridge::origin::OriginPolicy;
use wallet_bridge::WalletBridge;

fn counter() -> (Arc<AtomicUsize>, impl Fn(&Envelope) + Send + Sync + 'static) {
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = hits.clone();
    (hits, move |_: &Envelope| {
        sink.fetch_add(1, Ordering::SeqCst);
    })
}

/// Wait for the n-th posted message and return its requestId.
async fn posted_request_id(window: &RecordingWindow, n: usize) -> String {
    assert!(eventually(|| window.posted().len() > n).await, "request was never posted");
    window.posted()[n].data["requestId"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_unknown_request_id_is_broadcast() {
    let bridge = bridge_with(Arc::new(MockProvider::new("host")));
    let (hits, callback) = counter();
    bridge.broker().on("frameReady", callback);

    let message = InboundMessage::new(HOST_ORIGIN, json!({"type": "frameReady", "requestId": "req-from-host"}));
    let disposition = bridge.broker().handle_inbound(&message);
    assert_eq!(disposition, InboundDisposition::Broadcast { delivered: 1 });
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disallowed_origin_has_no_effect() {
    let bridge = bridge_with(Arc::new(MockProvider::new("host")));
    let (hits, callback) = counter();
    bridge.broker().on("frameReady", callback);

    for origin in ["https://evil.example", "null", "https://farcaster.xyz.evil.example"] {
        let message = InboundMessage::new(origin, json!({"type": "frameReady"}));
        assert_eq!(bridge.broker().handle_inbound(&message), InboundDisposition::DroppedOrigin);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let subdomain = InboundMessage::new("https://miniapps.farcaster.xyz", json!({"type": "frameReady"}));
    assert_eq!(
        bridge.broker().handle_inbound(&subdomain),
        InboundDisposition::Broadcast { delivered: 1 }
    );
}

#[tokio::test]
async fn test_response_settles_exactly_once() {
    let bridge = bridge_with(Arc::new(MockProvider::new("host")));
    let window = Arc::new(RecordingWindow::default());

    let pending = {
        let bridge = bridge.clone();
        let window = window.clone();
        tokio::spawn(async move {
            bridge
                .broker()
                .send(window.as_ref(), "getContext", json!({"fields": ["user"]}), Some(HOST_ORIGIN))
                .await
        })
    };

    let request_id = posted_request_id(&window, 0).await;
    assert_eq!(window.posted()[0].target_origin, HOST_ORIGIN);
    assert_eq!(bridge.broker().pending_count(), 1);

    let (hits, callback) = counter();
    bridge.broker().on("getContext", callback);

    let reply = json!({"type": "getContext", "requestId": request_id, "payload": {"user": {"fid": 3}}});
    let broker = bridge.broker();
    assert_eq!(
        broker.handle_inbound(&InboundMessage::new(HOST_ORIGIN, reply.clone())),
        InboundDisposition::Resolved
    );
    assert_eq!(
        broker.handle_inbound(&InboundMessage::new(HOST_ORIGIN, reply)),
        InboundDisposition::Duplicate
    );

    let result = bounded(pending).await.unwrap();
    assert_eq!(result, Ok(json!({"user": {"fid": 3}})));
    assert_eq!(broker.pending_count(), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_remote_error_is_returned() {
    let bridge = bridge_with(Arc::new(MockProvider::new("host")));
    let window = Arc::new(RecordingWindow::default());

    let pending = {
        let bridge = bridge.clone();
        let window = window.clone();
        tokio::spawn(async move { bridge.broker().send(window.as_ref(), "signIn", Value::Null, None).await })
    };
    let request_id = posted_request_id(&window, 0).await;
    assert_eq!(window.posted()[0].target_origin, "*");

    let reply = json!({"type": "signIn", "requestId": request_id, "error": "user dismissed"});
    bridge.broker().handle_inbound(&InboundMessage::new(HOST_ORIGIN, reply));
    assert_eq!(
        bounded(pending).await.unwrap(),
        Err(BrokerError::Remote("user dismissed".to_string()))
    );
}

#[tokio::test]
async fn test_late_response_after_timeout_is_ignored() {
    let bridge = bridge_with(Arc::new(MockProvider::new("host")));
    let window = RecordingWindow::default();

    let result = bounded(bridge.broker().send(&window, "getContext", Value::Null, None)).await;
    let Err(BrokerError::Timeout { request_id, timeout_ms }) = result else {
        panic!("expected timeout, got {:?}", result);
    };
    assert_eq!(timeout_ms, 200);
    assert_eq!(bridge.broker().pending_count(), 0);

    let stats = bridge.get_error_stats();
    assert_eq!(stats.by_message.get("broker request getContext timed out"), Some(&1));
    assert_eq!(stats.recoveries.get("broker.recover"), Some(&1));

    let late = json!({"type": "getContext", "requestId": request_id, "payload": {}});
    assert_eq!(
        bridge.broker().handle_inbound(&InboundMessage::new(HOST_ORIGIN, late)),
        InboundDisposition::Duplicate
    );
}

#[tokio::test]
async fn test_policy_swap_applies_to_next_message() {
    let bridge = bridge_with(Arc::new(MockProvider::new("host")));
    let message = |origin: &str| InboundMessage::new(origin, json!({"type": "ping"}));

    assert_ne!(bridge.broker().handle_inbound(&message(HOST_ORIGIN)), InboundDisposition::DroppedOrigin);

    bridge
        .origin_policy()
        .store(Arc::new(OriginPolicy::new(["https://staging.example.app"])));

    assert_eq!(bridge.broker().handle_inbound(&message(HOST_ORIGIN)), InboundDisposition::DroppedOrigin);
    assert_eq!(
        bridge.broker().handle_inbound(&message("https://staging.example.app")),
        InboundDisposition::Broadcast { delivered: 0 }
    );
    assert_eq!(bridge.status().allowed_origins, 1);
}

#[tokio::test]
async fn test_session_changes_reach_parent() {
    let window = Arc::new(RecordingWindow::default());
    let provider = Arc::new(MockProvider::new("host").pre_authorized());
    let source: Arc<dyn ProviderSource> = Arc::new(LateSource::new("host", provider, 1));
    let mut config = fast_config();
    config.broker.parent_origin = Some(HOST_ORIGIN.to_string());
    let bridge = WalletBridge::new(config, vec![source], Some(window.clone() as Arc<dyn MessageTarget>));

    bounded(bridge.start()).await;
    bridge.disconnect();

    let kinds: Vec<String> = window
        .posted()
        .iter()
        .map(|m| m.data["type"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(kinds, vec!["walletConnected".to_string(), "walletDisconnected".to_string()]);

    let posted = window.posted();
    let connected = &posted[0];
    assert_eq!(connected.target_origin, HOST_ORIGIN);
    assert_eq!(connected.data["payload"]["address"], ALICE);
    assert!(connected.data.get("requestId").is_none());
}

#[tokio::test]
async fn test_teardown_rejects_in_flight_requests() {
    let bridge = bridge_with(Arc::new(MockProvider::new("host").pre_authorized()));
    bounded(bridge.start()).await;
    let window = Arc::new(RecordingWindow::default());

    let pending = {
        let bridge = bridge.clone();
        let window = window.clone();
        tokio::spawn(async move { bridge.broker().send(window.as_ref(), "getContext", Value::Null, None).await })
    };
    posted_request_id(&window, 0).await;

    bridge.teardown();
    assert_eq!(bounded(pending).await.unwrap(), Err(BrokerError::Closed));
    assert!(bridge.broker().is_closed());
    assert!(bridge.guard().authoritative().is_none());
    assert!(!bridge.get_current_state().is_connected());
    assert!(bridge.status().shutting_down);

    let after = bounded(bridge.broker().send(window.as_ref(), "getContext", Value::Null, None)).await;
    assert_eq!(after, Err(BrokerError::Closed));
}
