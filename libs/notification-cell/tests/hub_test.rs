use serde_json::{json, Value};
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use notification_cell::*;

#[tokio::test]
async fn new_hub_has_no_connected_users() {
    let hub = NotificationHub::new();
    assert!(hub.connected_users().await.is_empty());
    assert!(!hub.is_connected("nobody").await);
}

#[tokio::test]
async fn emit_reaches_every_socket_of_the_user() {
    let hub = NotificationHub::new();
    let mut phone = hub.connect("user-1").await;
    let mut tablet = hub.connect("user-1").await;

    let delivered = hub
        .emit("user-1", &SocketEvent::NotificationRead { id: Uuid::nil() })
        .await
        .unwrap();
    assert!(delivered);

    for receiver in [&mut phone, &mut tablet] {
        let frame = timeout(Duration::from_secs(1), receiver.recv())
            .await
            .expect("frame within timeout")
            .expect("channel open");
        let frame: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(frame["event"], "notification:read");
    }
}

#[tokio::test]
async fn emit_to_offline_user_is_not_delivered() {
    let hub = NotificationHub::new();
    let _other = hub.connect("user-2").await;

    let delivered = hub
        .emit("user-1", &SocketEvent::AppointmentUpdated(json!({"status": "CANCELLED"})))
        .await
        .unwrap();

    assert!(!delivered);
}

#[tokio::test]
async fn disconnect_keeps_channel_while_other_sockets_remain() {
    let hub = NotificationHub::new();
    let first = hub.connect("user-1").await;
    let _second = hub.connect("user-1").await;

    drop(first);
    hub.disconnect("user-1").await;
    assert!(hub.is_connected("user-1").await);

    drop(_second);
    hub.disconnect("user-1").await;
    assert!(!hub.is_connected("user-1").await);
    assert!(hub.connected_users().await.is_empty());
}

#[tokio::test]
async fn emit_after_all_sockets_dropped_is_not_delivered() {
    let hub = NotificationHub::new();
    let receiver = hub.connect("user-1").await;
    drop(receiver);

    let delivered = hub
        .emit("user-1", &SocketEvent::NotificationRead { id: Uuid::new_v4() })
        .await
        .unwrap();
    assert!(!delivered);
}
