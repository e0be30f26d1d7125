use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use appointment_cell::{AppointmentBookingService, AppointmentStatus};
use notification_cell::{NewNotification, NotificationDispatcher, NotificationType};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::User;

use crate::models::{
    CallbackOutcome, CreateVnpayPaymentRequest, IpnResponse, Payment, PaymentError, PaymentMethod, PaymentOrder,
    PaymentStatus, VnpayCallback, VnpayPaymentUrl,
};
use crate::services::vnpay::VnpayGateway;

/// PAID is final. A FAILED row is only left alone when the gateway resends the same
/// declined transaction; a new checkout attempt carries a new transaction number.
fn is_repeat_delivery(payment: &Payment, callback: &VnpayCallback, succeeded: bool) -> bool {
    match payment.status {
        PaymentStatus::Paid => true,
        PaymentStatus::Failed => {
            !succeeded
                && callback.transaction_no.is_some()
                && payment.gateway_transaction_id == callback.transaction_no
        }
        _ => false,
    }
}

/// Payment rows plus the VNPay round trip for an appointment.
///
/// Callbacks arrive without a user, so everything on that path runs with the service token.
pub struct PaymentService {
    supabase: Arc<SupabaseClient>,
    gateway: VnpayGateway,
    booking: Arc<AppointmentBookingService>,
    notifier: NotificationDispatcher,
    service_token: String,
    gateway_configured: bool,
}

impl PaymentService {
    pub fn new(config: &AppConfig, booking: Arc<AppointmentBookingService>, notifier: NotificationDispatcher) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            gateway: VnpayGateway::new(config),
            booking,
            notifier,
            service_token: config.service_token().to_string(),
            gateway_configured: config.is_payment_configured(),
        }
    }

    pub async fn initiate_vnpay_payment(
        &self,
        request: CreateVnpayPaymentRequest,
        user: &User,
        client_ip: &str,
        auth_token: &str,
    ) -> Result<VnpayPaymentUrl, PaymentError> {
        if !self.gateway_configured {
            return Err(PaymentError::NotConfigured);
        }

        let appointment = self.booking.get_appointment(request.appointment_id, auth_token).await?;

        if user.is_patient() {
            let patient = self.booking.patient(appointment.patient_id, auth_token).await?;
            if patient.user_id != user.id {
                return Err(PaymentError::Forbidden(
                    "You can only pay for your own appointments".to_string(),
                ));
            }
        }

        if !matches!(
            appointment.status,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed
        ) {
            return Err(PaymentError::InvalidAppointmentStatus(appointment.status));
        }

        let txn_ref = appointment.id.to_string();
        let existing = self.find_by_appointment(appointment.id, auth_token).await?;

        let payment = match existing {
            Some(payment) if payment.status == PaymentStatus::Paid => {
                warn!("Appointment {} already paid by payment {}", appointment.id, payment.id);
                return Err(PaymentError::AlreadyPaid);
            }
            Some(payment) => {
                debug!("Reusing {} payment {} for appointment {}", payment.status, payment.id, appointment.id);
                let path = format!("/rest/v1/payments?id=eq.{}", payment.id);
                let changes = json!({
                    "amount": request.amount,
                    "status": PaymentStatus::Pending,
                    "transaction_id": txn_ref,
                    "gateway_transaction_id": null,
                    "bank_code": null,
                    "paid_at": null,
                    "updated_at": Utc::now(),
                });
                let rows: Vec<Payment> = self.supabase.update(&path, changes, Some(auth_token)).await?;
                rows.into_iter().next().ok_or(PaymentError::NotFound)?
            }
            None => {
                let row = json!({
                    "appointment_id": appointment.id,
                    "patient_id": appointment.patient_id,
                    "amount": request.amount,
                    "method": PaymentMethod::Vnpay,
                    "status": PaymentStatus::Pending,
                    "transaction_id": txn_ref,
                });
                self.supabase.insert("payments", row, Some(auth_token)).await?
            }
        };

        let created_at = Utc::now();
        let order = PaymentOrder {
            txn_ref: txn_ref.clone(),
            amount: request.amount,
            order_info: request
                .order_info
                .unwrap_or_else(|| format!("Thanh toan lich hen {}", appointment.id)),
            ip_addr: client_ip.to_string(),
            bank_code: request.bank_code,
            locale: request.locale.unwrap_or_default(),
            created_at,
        };
        let payment_url = self.gateway.create_payment_url(&order)?;

        info!(
            "VNPay payment {} initiated for appointment {} ({} VND)",
            payment.id, appointment.id, request.amount
        );

        Ok(VnpayPaymentUrl {
            payment_id: payment.id,
            payment_url,
            txn_ref,
            amount: request.amount,
            expires_at: self.gateway.expires_at(created_at),
        })
    }

    async fn find_by_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Option<Payment>, PaymentError> {
        let path = format!("/rest/v1/payments?appointment_id=eq.{}", appointment_id);
        Ok(self.supabase.select_one(&path, Some(auth_token)).await?)
    }

    /// Shared by the browser return URL and the server-to-server IPN.
    pub async fn process_callback(&self, params: &BTreeMap<String, String>) -> Result<CallbackOutcome, PaymentError> {
        if !self.gateway.verify_callback(params) {
            warn!("Rejected gateway callback with invalid signature");
            return Err(PaymentError::InvalidSignature);
        }

        let callback = VnpayCallback::from_params(params)?;
        let appointment_id = Uuid::parse_str(&callback.txn_ref).map_err(|_| PaymentError::NotFound)?;
        let payment = self
            .find_by_appointment(appointment_id, &self.service_token)
            .await?
            .ok_or(PaymentError::NotFound)?;

        let expected = payment.amount * 100;
        if callback.amount != expected {
            warn!(
                "Amount mismatch for payment {}: expected {}, gateway sent {}",
                payment.id, expected, callback.amount
            );
            return Err(PaymentError::AmountMismatch {
                expected,
                actual: callback.amount,
            });
        }

        let succeeded = callback.is_success();
        if is_repeat_delivery(&payment, &callback, succeeded) {
            debug!("Payment {} already {}, ignoring repeated callback", payment.id, payment.status);
            return Ok(CallbackOutcome::AlreadyProcessed(payment));
        }

        let now = Utc::now();
        let (status, paid_at) = if succeeded {
            (PaymentStatus::Paid, Some(now))
        } else {
            (PaymentStatus::Failed, None)
        };
        let changes = json!({
            "status": status,
            "gateway_transaction_id": callback.transaction_no,
            "bank_code": callback.bank_code,
            "paid_at": paid_at,
            "updated_at": now,
        });
        let path = format!("/rest/v1/payments?id=eq.{}", payment.id);
        let rows: Vec<Payment> = self
            .supabase
            .update(&path, changes, Some(&self.service_token))
            .await?;
        let updated = rows.into_iter().next().ok_or(PaymentError::NotFound)?;

        info!(
            "Payment {} for appointment {} is now {} (gateway code {})",
            updated.id, appointment_id, updated.status, callback.response_code
        );

        if succeeded {
            if let Err(e) = self.booking.confirm_after_payment(appointment_id).await {
                error!("Payment {} recorded but appointment {} not confirmed: {}", updated.id, appointment_id, e);
            }
        }

        self.notify_patient(&updated, succeeded).await;

        Ok(CallbackOutcome::Recorded(updated))
    }

    /// Gateway acknowledgement codes for the IPN endpoint.
    pub async fn handle_ipn(&self, params: &BTreeMap<String, String>) -> IpnResponse {
        match self.process_callback(params).await {
            Ok(CallbackOutcome::Recorded(_)) => IpnResponse::confirmed(),
            Ok(CallbackOutcome::AlreadyProcessed(_)) => IpnResponse::already_confirmed(),
            Err(PaymentError::InvalidSignature) => IpnResponse::invalid_signature(),
            Err(PaymentError::NotFound) => IpnResponse::order_not_found(),
            Err(PaymentError::AmountMismatch { .. }) => IpnResponse::invalid_amount(),
            Err(e) => {
                error!("IPN processing failed: {}", e);
                IpnResponse::unknown_error()
            }
        }
    }

    async fn notify_patient(&self, payment: &Payment, succeeded: bool) {
        let patient = match self.booking.patient(payment.patient_id, &self.service_token).await {
            Ok(patient) => patient,
            Err(e) => {
                warn!("No notification for payment {}: patient lookup failed: {}", payment.id, e);
                return;
            }
        };

        let notification = if succeeded {
            NewNotification::new(
                patient.user_id,
                NotificationType::PaymentSucceeded,
                "Payment successful",
                format!("We received {} VND for your appointment", payment.amount),
            )
        } else {
            NewNotification::new(
                patient.user_id,
                NotificationType::PaymentFailed,
                "Payment failed",
                "Your payment could not be completed. You can try again from the appointment page.",
            )
        };

        self.notifier.dispatch_in_background(vec![notification.with_data(json!({
            "payment_id": payment.id,
            "appointment_id": payment.appointment_id,
            "status": payment.status,
        }))]);
    }

    pub async fn get_payment_status(&self, payment_id: Uuid, user: &User, auth_token: &str) -> Result<Payment, PaymentError> {
        let path = format!("/rest/v1/payments?id=eq.{}", payment_id);
        let payment: Payment = self
            .supabase
            .select_one(&path, Some(auth_token))
            .await?
            .ok_or(PaymentError::NotFound)?;

        if !user.is_admin() {
            let patient = self.booking.patient(payment.patient_id, auth_token).await?;
            if patient.user_id != user.id {
                return Err(PaymentError::Forbidden(
                    "You can only view your own payments".to_string(),
                ));
            }
        }

        Ok(payment)
    }
}
