// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::booking::AppointmentBookingService;
use crate::services::slots::SlotGeneratorService;

#[derive(Clone)]
pub struct AppointmentState {
    pub booking: Arc<AppointmentBookingService>,
    pub slots: Arc<SlotGeneratorService>,
}

pub fn appointment_routes(config: Arc<AppConfig>, notifier: NotificationDispatcher) -> Router {
    let booking = AppointmentBookingService::new(&config, notifier);
    let slots = SlotGeneratorService::new(Arc::new(SupabaseClient::new(&config)));
    let state = AppointmentState {
        booking: Arc::new(booking),
        slots: Arc::new(slots),
    };

    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::create_appointment).get(handlers::search_appointments))
        .route("/available-slots", get(handlers::get_available_slots))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).put(handlers::update_appointment),
        )
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/confirm", post(handlers::confirm_appointment))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
