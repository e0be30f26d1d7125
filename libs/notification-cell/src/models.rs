use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    AppointmentCreated,
    AppointmentConfirmed,
    AppointmentCancelled,
    AppointmentUpdated,
    PaymentSucceeded,
    PaymentFailed,
    System,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationType::AppointmentCreated => write!(f, "APPOINTMENT_CREATED"),
            NotificationType::AppointmentConfirmed => write!(f, "APPOINTMENT_CONFIRMED"),
            NotificationType::AppointmentCancelled => write!(f, "APPOINTMENT_CANCELLED"),
            NotificationType::AppointmentUpdated => write!(f, "APPOINTMENT_UPDATED"),
            NotificationType::PaymentSucceeded => write!(f, "PAYMENT_SUCCEEDED"),
            NotificationType::PaymentFailed => write!(f, "PAYMENT_FAILED"),
            NotificationType::System => write!(f, "SYSTEM"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Value,
    pub is_read: bool,
    pub is_delivered: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification about to be persisted and pushed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub data: Value,
}

impl NewNotification {
    pub fn new(
        user_id: impl Into<String>,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            notification_type,
            title: title.into(),
            message: message.into(),
            data: Value::Object(Default::default()),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// What happened to a dispatched notification beyond being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Pushed to at least one open socket of the recipient.
    Delivered,
    /// Recipient offline; the stored row is all they will get.
    QueuedOnly,
}

/// Frames written to client sockets as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum SocketEvent {
    #[serde(rename = "notification:new")]
    NotificationNew(Notification),

    #[serde(rename = "notification:read")]
    NotificationRead { id: Uuid },

    #[serde(rename = "appointment:updated")]
    AppointmentUpdated(Value),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationListQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl NotificationListQuery {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn socket_events_use_colon_names() {
        let id = Uuid::nil();
        let frame = serde_json::to_value(SocketEvent::NotificationRead { id }).unwrap();
        assert_eq!(frame, json!({"event": "notification:read", "data": {"id": id}}));

        let frame = serde_json::to_value(SocketEvent::AppointmentUpdated(json!({"status": "CONFIRMED"}))).unwrap();
        assert_eq!(frame["event"], "appointment:updated");
        assert_eq!(frame["data"]["status"], "CONFIRMED");
    }

    #[test]
    fn list_query_limits_are_clamped() {
        let query = NotificationListQuery {
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(query.limit(), 100);
        assert_eq!(NotificationListQuery::default().limit(), 20);
        assert_eq!(NotificationListQuery::default().offset(), 0);
    }
}
