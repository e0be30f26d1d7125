use std::collections::BTreeMap;

use axum::{
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use axum_extra::{extract::WithRejection, TypedHeader};
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::validation::ValidatedJson;

use crate::models::{CallbackOutcome, CreateVnpayPaymentRequest, IpnResponse, PaymentStatus};
use crate::router::PaymentState;

const FALLBACK_CLIENT_IP: &str = "127.0.0.1";

/// First hop of `X-Forwarded-For`, or loopback when the header is absent.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(FALLBACK_CLIENT_IP)
        .to_string()
}

pub async fn create_vnpay_payment(
    State(state): State<PaymentState>,
    headers: HeaderMap,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    ValidatedJson(request): ValidatedJson<CreateVnpayPaymentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let checkout = state
        .payments
        .initiate_vnpay_payment(request, &user, &client_ip(&headers), auth.token())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "payment_id": checkout.payment_id,
            "payment_url": checkout.payment_url,
            "txn_ref": checkout.txn_ref,
            "amount": checkout.amount,
            "expires_at": checkout.expires_at
        })),
    ))
}

/// Browser redirect target after checkout.
pub async fn vnpay_callback(
    State(state): State<PaymentState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.payments.process_callback(&params).await?;
    let payment = outcome.payment();

    Ok(Json(json!({
        "success": payment.status == PaymentStatus::Paid,
        "already_processed": matches!(outcome, CallbackOutcome::AlreadyProcessed(_)),
        "payment": payment,
        "response_code": params.get("vnp_ResponseCode")
    })))
}

/// Server-to-server notification; always answers 200 with a gateway acknowledgement code.
pub async fn vnpay_ipn(
    State(state): State<PaymentState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Json<IpnResponse> {
    Json(state.payments.handle_ipn(&params).await)
}

pub async fn get_payment_status(
    State(state): State<PaymentState>,
    WithRejection(Path(payment_id), _): WithRejection<Path<Uuid>, AppError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let payment = state
        .payments
        .get_payment_status(payment_id, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "payment_id": payment.id,
        "appointment_id": payment.appointment_id,
        "status": payment.status,
        "amount": payment.amount,
        "paid_at": payment.paid_at,
        "payment": payment
    })))
}
