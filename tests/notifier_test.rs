//! Tests for cooldown-gated alert dispatch.

mod common;

use std::sync::Arc;
use std::time::Duration;

use btc_relay_watchdog::notifier::{Delivery, Notifier, DEFAULT_ALERT_COOLDOWN};
use btc_relay_watchdog::transport::AlertTransport;
use btc_relay_watchdog::types::{AlertCategory, AlertEvent};

use common::RecordingTransport;

fn notifier(chain: &str, transport: &Arc<RecordingTransport>, cooldown: Duration) -> Notifier {
    Notifier::new(
        chain,
        Arc::clone(transport) as Arc<dyn AlertTransport>,
        cooldown,
    )
}

fn event(chain: &str) -> AlertEvent {
    AlertEvent::divergence(chain, 100, 110)
}

#[tokio::test(start_paused = true)]
async fn only_first_alert_within_cooldown_is_sent() {
    let transport = Arc::new(RecordingTransport::default());
    let n = notifier("SOLANA", &transport, DEFAULT_ALERT_COOLDOWN);

    assert_eq!(n.notify(&event("SOLANA")).await.expect("notify"), Delivery::Sent);

    tokio::time::advance(Duration::from_secs(10 * 60)).await;
    assert_eq!(
        n.notify(&event("SOLANA")).await.expect("notify"),
        Delivery::Suppressed
    );
    assert_eq!(transport.sent_count(), 1);

    // 61 minutes after the first delivery.
    tokio::time::advance(Duration::from_secs(51 * 60)).await;
    assert_eq!(n.notify(&event("SOLANA")).await.expect("notify"), Delivery::Sent);
    assert_eq!(transport.sent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn cooldown_boundary_is_exclusive() {
    let transport = Arc::new(RecordingTransport::default());
    let n = notifier("SOLANA", &transport, Duration::from_secs(3600));

    n.notify(&event("SOLANA")).await.expect("notify");
    tokio::time::advance(Duration::from_secs(3599)).await;
    assert!(n.is_in_cooldown());
    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(!n.is_in_cooldown());
}

#[tokio::test]
async fn failed_send_does_not_start_cooldown() {
    let transport = Arc::new(RecordingTransport::failing());
    let n = notifier("STARKNET", &transport, DEFAULT_ALERT_COOLDOWN);

    let err = n
        .notify(&event("STARKNET"))
        .await
        .expect_err("send should fail");
    assert!(err.to_string().contains("transport unreachable"));
    assert!(n.last_sent_at().is_none());
    assert!(!n.is_in_cooldown());

    transport.set_failing(false);
    assert_eq!(
        n.notify(&event("STARKNET")).await.expect("notify"),
        Delivery::Sent
    );
    assert!(n.last_sent_at().is_some());
}

#[tokio::test]
async fn zero_cooldown_never_suppresses() {
    let transport = Arc::new(RecordingTransport::default());
    let n = notifier("SOLANA", &transport, Duration::ZERO);

    for _ in 0..3 {
        assert_eq!(n.notify(&event("SOLANA")).await.expect("notify"), Delivery::Sent);
    }
    assert_eq!(transport.sent_count(), 3);
}

#[tokio::test]
async fn instances_have_independent_cooldowns() {
    let transport = Arc::new(RecordingTransport::default());
    let solana = notifier("SOLANA", &transport, DEFAULT_ALERT_COOLDOWN);
    let starknet = notifier("STARKNET", &transport, DEFAULT_ALERT_COOLDOWN);

    solana.notify(&event("SOLANA")).await.expect("notify");
    assert!(solana.is_in_cooldown());
    assert!(!starknet.is_in_cooldown());

    assert_eq!(
        starknet.notify(&event("STARKNET")).await.expect("notify"),
        Delivery::Sent
    );
    assert_eq!(transport.sent_count(), 2);
}

#[tokio::test]
async fn message_carries_subject_and_detection_time() {
    let transport = Arc::new(RecordingTransport::default());
    let n = notifier("SOLANA", &transport, DEFAULT_ALERT_COOLDOWN);
    let alert = AlertEvent::new("SOLANA", AlertCategory::GenericError, "watchdog error: x".to_owned());

    n.notify(&alert).await.expect("notify");

    let sent = transport.sent();
    assert_eq!(sent[0].0, "SOLANA watchdog ERROR");
    assert!(sent[0].1.starts_with("watchdog error: x\n\nDetected at "));
    assert!(sent[0].1.contains(&alert.raised_at.to_rfc3339()));
}
