use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::appointment_routes;
use notification_cell::{notification_routes, NotificationDispatcher, NotificationHub};
use payment_cell::payment_routes;
use shared_config::AppConfig;

/// Mounts every cell. All cells share one dispatcher so a booking made over
/// `/appointments` reaches sockets opened on `/notifications/ws`.
pub fn create_router(config: Arc<AppConfig>) -> Router {
    let dispatcher = NotificationDispatcher::new(&config, NotificationHub::new());

    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .nest("/appointments", appointment_routes(config.clone(), dispatcher.clone()))
        .nest("/payments", payment_routes(config.clone(), dispatcher.clone()))
        .nest("/notifications", notification_routes(config, dispatcher))
}
