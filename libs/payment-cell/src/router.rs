use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use appointment_cell::AppointmentBookingService;
use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::payment::PaymentService;

#[derive(Clone)]
pub struct PaymentState {
    pub payments: Arc<PaymentService>,
}

pub fn payment_routes(config: Arc<AppConfig>, notifier: NotificationDispatcher) -> Router {
    let booking = Arc::new(AppointmentBookingService::new(&config, notifier.clone()));
    let state = PaymentState {
        payments: Arc::new(PaymentService::new(&config, booking, notifier)),
    };

    // Gateway callbacks carry a signature instead of a bearer token
    let gateway_routes = Router::new()
        .route("/vnpay/callback", get(handlers::vnpay_callback))
        .route("/vnpay/ipn", get(handlers::vnpay_ipn).post(handlers::vnpay_ipn));

    let protected_routes = Router::new()
        .route("/vnpay/create", post(handlers::create_vnpay_payment))
        .route("/{payment_id}/status", get(handlers::get_payment_status))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(gateway_routes)
        .merge(protected_routes)
        .with_state(state)
}
