mod common;

use serde_json::json;
use std::sync::Arc;

use common::*;
use wallet_bridge::guard::{Redefinition, ScriptNode};
use wallet_bridge::noise::{ErrorCategory, ReportOutcome};
use wallet_bridge::provider::{ProviderError, ProviderHandle};

#[tokio::test]
async fn test_redefinition_never_replaces_the_proxy() {
    let provider = Arc::new(MockProvider::new("host").pre_authorized());
    let bridge = bridge_with(provider.clone());
    bounded(bridge.start()).await;

    let proxy = bridge.guard().slot().unwrap();
    let rogue = Arc::new(MockProvider::new("rogue").pre_authorized());
    for attempt in 1..=20u64 {
        let outcome = bridge.guard().define_slot("inpage.js", rogue.clone());
        assert_eq!(outcome, Redefinition::Blocked { total: attempt });
    }

    assert_eq!(bridge.guard().slot().unwrap().id(), proxy.id());
    let status = bridge.status();
    assert_eq!(status.redefinitions_blocked, 20);
    assert_eq!(status.provider_source.as_deref(), Some("host"));
    assert_eq!(status.proxy_id, Some(proxy.id().to_string()));

    let accounts = proxy.request("eth_accounts", json!([])).await.unwrap();
    assert_eq!(accounts, json!([ALICE]));
    assert!(rogue.calls().is_empty());
    assert!(bridge.get_current_state().is_connected());
}

#[tokio::test]
async fn test_redefinition_storm_triggers_guard_recovery() {
    let provider = Arc::new(MockProvider::new("host").pre_authorized());
    let bridge = bridge_with(provider);
    bounded(bridge.start()).await;
    let proxy_id = bridge.guard().slot().unwrap().id();

    let rogue = Arc::new(MockProvider::new("rogue"));
    for _ in 0..100 {
        bridge.guard().define_slot("rogue", rogue.clone());
    }

    let stats = bridge.get_error_stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.visible, 0);
    assert_eq!(stats.by_message.get("ethereum redefinition blocked repeatedly"), Some(&1));
    assert_eq!(stats.by_category.get(&ErrorCategory::Wallet), Some(&1));
    assert_eq!(stats.recoveries.get("guard.reinstall"), Some(&1));
    assert_eq!(bridge.guard().slot().unwrap().id(), proxy_id);
}

#[tokio::test]
async fn test_proxy_rejects_unknown_methods() {
    let provider = Arc::new(MockProvider::new("host"));
    let bridge = bridge_with(provider.clone());
    bounded(bridge.start()).await;

    let proxy = bridge.guard().slot().unwrap();
    let err = proxy.request("debug_traceTransaction", json!([])).await.unwrap_err();
    assert_eq!(err, ProviderError::UnsupportedMethod("debug_traceTransaction".to_string()));
    assert!(provider.calls_to("debug_traceTransaction").is_empty());

    // Known methods the wallet itself lacks surface the wallet's answer.
    let err = proxy.request("personal_sign", json!(["0x00", ALICE])).await.unwrap_err();
    assert!(matches!(err, ProviderError::UnsupportedMethod(_)));
    assert_eq!(provider.calls_to("personal_sign").len(), 1);
}

#[tokio::test]
async fn test_sign_methods_are_forwarded_unchanged() {
    let provider = Arc::new(MockProvider::new("host").pre_authorized());
    let bridge = bridge_with(provider.clone());
    bounded(bridge.start()).await;
    let proxy = bridge.guard().slot().unwrap();

    let _ = proxy.request("eth_sign", json!([ALICE, "0xdeadbeef"])).await;
    assert_eq!(provider.calls_to("eth_sign"), vec![json!([ALICE, "0xdeadbeef"])]);
    assert!(provider.calls_to("personal_sign").is_empty());

    let _ = proxy.request("personal_sign", json!(["0xdeadbeef", ALICE])).await;
    assert_eq!(provider.calls_to("personal_sign"), vec![json!(["0xdeadbeef", ALICE])]);
    assert_eq!(provider.calls_to("eth_sign").len(), 1);
}

#[tokio::test]
async fn test_proxy_without_provider() {
    let bridge = wallet_bridge::WalletBridge::new(fast_config(), Vec::new(), None);
    let proxy = bridge.guard().slot().unwrap();
    assert!(!proxy.is_ready());
    assert_eq!(
        proxy.request("eth_accounts", json!([])).await,
        Err(ProviderError::Unavailable)
    );
}

#[test]
fn test_competing_scripts_are_filtered() {
    let bridge = wallet_bridge::WalletBridge::new(fast_config(), Vec::new(), None);
    let nodes = vec![
        ScriptNode::external("s1", "chrome-extension://abc/inpage.js"),
        ScriptNode::inline("s2", "console.log('analytics')"),
        ScriptNode::inline("s3", "Object.defineProperty(window, 'ethereum', { value: p })"),
    ];

    let kept = bridge.guard().filter_inserted(nodes);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, "s2");
}

#[test]
fn test_repeated_error_logs_once() {
    let bridge = wallet_bridge::WalletBridge::new(fast_config(), Vec::new(), None);
    let message = "Failed to fetch frame metadata";

    let outcomes: Vec<ReportOutcome> = (0..5).map(|_| bridge.report_error(message)).collect();
    assert_eq!(
        outcomes,
        vec![
            ReportOutcome::Logged,
            ReportOutcome::Demoted,
            ReportOutcome::Demoted,
            ReportOutcome::Suppressed,
            ReportOutcome::Suppressed,
        ]
    );

    let stats = bridge.get_error_stats();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.visible, 1);
    assert_eq!(stats.by_message.get(message), Some(&5));
    assert_eq!(stats.by_category.get(&ErrorCategory::Network), Some(&5));
    assert_eq!(stats.recent.len(), 5);
}

#[test]
fn test_known_noise_is_never_visible() {
    let bridge = wallet_bridge::WalletBridge::new(fast_config(), Vec::new(), None);
    assert_eq!(
        bridge.report_error("TypeError: Cannot redefine property: ethereum"),
        ReportOutcome::Demoted
    );
    assert_eq!(bridge.get_error_stats().visible, 0);
}

#[tokio::test]
async fn test_panicking_subscriber_is_contained() {
    let provider = Arc::new(MockProvider::new("host").pre_authorized());
    let bridge = bridge_with(provider);
    bridge.on("walletConnected", |_| panic!("subscriber bug"));
    let events = record_events(&bridge);

    bounded(bridge.start()).await;

    assert!(bridge.get_current_state().is_connected());
    assert_eq!(count(&events, "walletConnected"), 1);

    let stats = bridge.get_error_stats();
    assert_eq!(stats.by_message.get("event subscriber panicked on walletConnected"), Some(&1));
    assert_eq!(stats.by_category.get(&ErrorCategory::Ui), Some(&1));
}
