//! End-to-end checks over the public surface: payload normalization
//! feeding the inbox, and the idempotent lifecycle of the push client.

use hr_notify::state::inbox::Inbox;
use hr_notify::state::notification::{Notification, NotificationStatus, WireNotification};
use hr_notify::telemetry::{get_subscriber, init_subscriber};
use hr_notify::transport::{PushChannelConfig, PushClient};
use once_cell::sync::Lazy;
use std::time::Duration;

static TRACING: Lazy<()> = Lazy::new(|| {
    let subscriber = get_subscriber("test".into(), "debug".into(), std::io::sink);
    init_subscriber(subscriber);
});

fn wire(body: &str) -> Notification {
    let wire: WireNotification = serde_json::from_str(body).unwrap();
    Notification::from_wire(wire)
}

#[test]
fn normalized_payloads_flow_into_the_inbox() {
    Lazy::force(&TRACING);

    let mut inbox = Inbox::new(10);
    let merged = inbox.push_live(wire(
        r#"{
            "id": 42,
            "demandeId": 9,
            "type": "DEMANDE_VALIDEE",
            "statut": "non_lu",
            "dateCreation": "2025-08-12T09:30:00.123456"
        }"#,
    ));
    assert!(merged);
    assert_eq!(inbox.unread_count(), 1);

    let entry = inbox.get(42).unwrap();
    assert_eq!(entry.statut, NotificationStatus::NonLu);
    assert_eq!(entry.display_subject(), "Demande validée");

    // The same event arriving again over a reconnect is a no-op.
    assert!(!inbox.push_live(wire(r#"{"id": 42}"#)));
    assert_eq!(inbox.unread_count(), 1);
}

#[tokio::test]
async fn push_client_lifecycle_is_idempotent() {
    Lazy::force(&TRACING);

    let client = PushClient::new(PushChannelConfig {
        url: "ws://127.0.0.1:9".to_string(),
        reconnect_delay: Duration::from_secs(60),
        ..Default::default()
    });

    client.ensure_connected(Some("token"));
    client.ensure_connected(Some("token"));
    assert_eq!(client.connection_attempts(), 1);

    client.disconnect();
    client.disconnect();
    assert!(!client.is_connected());
}
