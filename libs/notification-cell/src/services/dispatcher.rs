use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::{
    DeliveryOutcome, NewNotification, Notification, NotificationError, NotificationHub,
    NotificationListQuery, SocketEvent,
};

/// Persists notifications and pushes them to connected recipients.
///
/// Writes made on behalf of another user (a doctor notified about a patient's booking)
/// use the service token; owner-facing reads and updates use the caller's token and are
/// additionally filtered by `user_id`.
#[derive(Clone)]
pub struct NotificationDispatcher {
    supabase: Arc<SupabaseClient>,
    hub: NotificationHub,
    service_token: String,
}

impl NotificationDispatcher {
    pub fn new(config: &AppConfig, hub: NotificationHub) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            hub,
            service_token: config.service_token().to_string(),
        }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    /// Stores the notification, then tries the recipient's sockets.
    pub async fn dispatch(
        &self,
        notification: NewNotification,
    ) -> Result<(Notification, DeliveryOutcome), NotificationError> {
        let row = json!({
            "user_id": notification.user_id,
            "type": notification.notification_type,
            "title": notification.title,
            "message": notification.message,
            "data": notification.data,
            "is_read": false,
            "is_delivered": false,
        });

        let mut stored: Notification = self
            .supabase
            .insert("notifications", row, Some(&self.service_token))
            .await?;

        let delivered = self
            .hub
            .emit(&stored.user_id, &SocketEvent::NotificationNew(stored.clone()))
            .await?;

        if !delivered {
            debug!("User {} offline, notification {} queued only", stored.user_id, stored.id);
            return Ok((stored, DeliveryOutcome::QueuedOnly));
        }

        let path = format!("/rest/v1/notifications?id=eq.{}", stored.id);
        if let Err(e) = self
            .supabase
            .update::<Value>(&path, json!({ "is_delivered": true }), Some(&self.service_token))
            .await
        {
            warn!("Failed to flag notification {} as delivered: {}", stored.id, e);
        } else {
            stored.is_delivered = true;
        }

        Ok((stored, DeliveryOutcome::Delivered))
    }

    /// Fire-and-forget variant used by request handlers; failures are only logged.
    pub fn dispatch_in_background(&self, notifications: Vec<NewNotification>) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            for notification in notifications {
                let user_id = notification.user_id.clone();
                let kind = notification.notification_type.clone();
                match dispatcher.dispatch(notification).await {
                    Ok((stored, outcome)) => {
                        debug!("Notification {} ({}) for {}: {:?}", stored.id, kind, user_id, outcome)
                    }
                    Err(e) => warn!("Failed to dispatch {} notification to {}: {}", kind, user_id, e),
                }
            }
        });
    }

    /// Pushes a live-only `appointment:updated` frame; nothing is stored.
    pub async fn emit_appointment_updated(&self, user_ids: &[String], appointment: Value) {
        let event = SocketEvent::AppointmentUpdated(appointment);
        for user_id in user_ids {
            if let Err(e) = self.hub.emit(user_id, &event).await {
                warn!("Failed to emit appointment update to {}: {}", user_id, e);
            }
        }
    }

    pub async fn list(
        &self,
        user_id: &str,
        query: &NotificationListQuery,
        auth_token: &str,
    ) -> Result<Vec<Notification>, NotificationError> {
        let mut path = format!(
            "/rest/v1/notifications?user_id=eq.{}&order=created_at.desc&limit={}&offset={}",
            user_id,
            query.limit(),
            query.offset()
        );
        if query.unread_only.unwrap_or(false) {
            path.push_str("&is_read=eq.false");
        }

        Ok(self.supabase.select(&path, Some(auth_token)).await?)
    }

    pub async fn unread_count(&self, user_id: &str, auth_token: &str) -> Result<usize, NotificationError> {
        let path = format!(
            "/rest/v1/notifications?user_id=eq.{}&is_read=eq.false&select=id",
            user_id
        );
        let rows: Vec<Value> = self.supabase.select(&path, Some(auth_token)).await?;
        Ok(rows.len())
    }

    pub async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Notification, NotificationError> {
        let path = format!(
            "/rest/v1/notifications?id=eq.{}&user_id=eq.{}",
            notification_id, user_id
        );
        let updated: Vec<Notification> = self
            .supabase
            .update(&path, json!({ "is_read": true }), Some(auth_token))
            .await?;

        let notification = updated.into_iter().next().ok_or(NotificationError::NotFound)?;

        self.hub
            .emit(user_id, &SocketEvent::NotificationRead { id: notification.id })
            .await?;

        Ok(notification)
    }

    pub async fn mark_all_read(&self, user_id: &str, auth_token: &str) -> Result<usize, NotificationError> {
        let path = format!(
            "/rest/v1/notifications?user_id=eq.{}&is_read=eq.false",
            user_id
        );
        let updated: Vec<Value> = self
            .supabase
            .update(&path, json!({ "is_read": true }), Some(auth_token))
            .await?;

        info!("Marked {} notifications read for user {}", updated.len(), user_id);
        Ok(updated.len())
    }

    pub async fn delete(
        &self,
        notification_id: Uuid,
        user_id: &str,
        auth_token: &str,
    ) -> Result<(), NotificationError> {
        let path = format!(
            "/rest/v1/notifications?id=eq.{}&user_id=eq.{}",
            notification_id, user_id
        );
        let deleted: Vec<Value> = self.supabase.delete(&path, Some(auth_token)).await?;

        if deleted.is_empty() {
            return Err(NotificationError::NotFound);
        }
        Ok(())
    }
}
