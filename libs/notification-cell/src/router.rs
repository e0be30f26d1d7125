use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::NotificationDispatcher;

#[derive(Clone)]
pub struct NotificationState {
    pub dispatcher: NotificationDispatcher,
}

pub fn notification_routes(config: Arc<AppConfig>, dispatcher: NotificationDispatcher) -> Router {
    let state = NotificationState { dispatcher };

    // Every notification operation is scoped to the authenticated owner
    let protected_routes = Router::new()
        .route("/", get(handlers::list_notifications))
        .route("/unread-count", get(handlers::unread_count))
        .route("/read-all", patch(handlers::mark_all_read))
        .route("/{notification_id}/read", patch(handlers::mark_read))
        .route("/{notification_id}", delete(handlers::delete_notification))
        .route("/ws", get(handlers::notification_socket))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
