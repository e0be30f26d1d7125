use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, Query, State,
    },
    response::Response,
    Json,
};
use axum_extra::{extract::WithRejection, TypedHeader};
use futures::{SinkExt, StreamExt};
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::router::NotificationState;
use crate::{NotificationHub, NotificationListQuery};

pub async fn list_notifications(
    State(state): State<NotificationState>,
    WithRejection(Query(query), _): WithRejection<Query<NotificationListQuery>, AppError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let notifications = state.dispatcher.list(&user.id, &query, auth.token()).await?;

    Ok(Json(json!({
        "notifications": notifications,
        "count": notifications.len(),
        "limit": query.limit(),
        "offset": query.offset()
    })))
}

pub async fn unread_count(
    State(state): State<NotificationState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let count = state.dispatcher.unread_count(&user.id, auth.token()).await?;
    Ok(Json(json!({ "unread": count })))
}

pub async fn mark_read(
    State(state): State<NotificationState>,
    WithRejection(Path(notification_id), _): WithRejection<Path<Uuid>, AppError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let notification = state
        .dispatcher
        .mark_read(notification_id, &user.id, auth.token())
        .await?;

    Ok(Json(json!({ "success": true, "notification": notification })))
}

pub async fn mark_all_read(
    State(state): State<NotificationState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let updated = state.dispatcher.mark_all_read(&user.id, auth.token()).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<NotificationState>,
    WithRejection(Path(notification_id), _): WithRejection<Path<Uuid>, AppError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    state
        .dispatcher
        .delete(notification_id, &user.id, auth.token())
        .await?;

    Ok(Json(json!({ "success": true })))
}

/// Upgrades to a socket that streams the caller's notification and appointment events.
pub async fn notification_socket(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = state.dispatcher.hub().clone();
    ws.on_upgrade(move |socket| serve_socket(socket, hub, user.id))
}

async fn serve_socket(socket: WebSocket, hub: NotificationHub, user_id: String) {
    let mut events = hub.connect(&user_id).await;
    let (mut sink, mut stream) = socket.split();
    info!("Notification socket opened for user {}", user_id);

    loop {
        tokio::select! {
            outgoing = events.recv() => match outgoing {
                Ok(frame) => {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Socket for user {} lagged, {} events skipped", user_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    drop(events);
    hub.disconnect(&user_id).await;
    info!("Notification socket closed for user {}", user_id);
}
