use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use appointment_cell::{AppointmentError, AppointmentStatus};
use shared_database::DbError;
use shared_models::error::AppError;

// ==============================================================================
// PAYMENT RECORDS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    /// Whole VND.
    pub amount: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub bank_code: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "PENDING"),
            PaymentStatus::Paid => write!(f, "PAID"),
            PaymentStatus::Failed => write!(f, "FAILED"),
            PaymentStatus::Refunded => write!(f, "REFUNDED"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Vnpay,
}

// ==============================================================================
// VNPAY
// ==============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VnpayLocale {
    #[default]
    Vn,
    En,
}

impl VnpayLocale {
    pub fn as_str(&self) -> &'static str {
        match self {
            VnpayLocale::Vn => "vn",
            VnpayLocale::En => "en",
        }
    }
}

/// What the gateway is asked to collect.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOrder {
    /// Echoed back as `vnp_TxnRef`; the appointment id.
    pub txn_ref: String,
    /// Whole VND; scaled ×100 on the wire.
    pub amount: i64,
    pub order_info: String,
    pub ip_addr: String,
    pub bank_code: Option<String>,
    pub locale: VnpayLocale,
    pub created_at: DateTime<Utc>,
}

/// The fields of a return/IPN callback that drive payment processing.
#[derive(Debug, Clone, PartialEq)]
pub struct VnpayCallback {
    pub txn_ref: String,
    /// Gateway units (VND ×100).
    pub amount: i64,
    pub response_code: String,
    pub transaction_status: Option<String>,
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
}

impl VnpayCallback {
    pub const SUCCESS: &'static str = "00";

    pub fn from_params(params: &BTreeMap<String, String>) -> Result<Self, PaymentError> {
        let required = |key: &'static str| {
            params
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or(PaymentError::MissingParameter(key))
        };
        let optional = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();

        let raw_amount = required("vnp_Amount")?;
        let amount = raw_amount
            .parse::<i64>()
            .map_err(|_| PaymentError::InvalidParameter(format!("vnp_Amount {:?} is not a number", raw_amount)))?;

        Ok(Self {
            txn_ref: required("vnp_TxnRef")?,
            amount,
            response_code: required("vnp_ResponseCode")?,
            transaction_status: optional("vnp_TransactionStatus"),
            transaction_no: optional("vnp_TransactionNo"),
            bank_code: optional("vnp_BankCode"),
        })
    }

    /// `vnp_ResponseCode` is "00", and so is `vnp_TransactionStatus` when the gateway sent one.
    pub fn is_success(&self) -> bool {
        self.response_code == Self::SUCCESS
            && self
                .transaction_status
                .as_deref()
                .map_or(true, |status| status == Self::SUCCESS)
    }
}

/// Acknowledgement body the gateway expects from the IPN endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpnResponse {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl IpnResponse {
    fn new(code: &str, message: &str) -> Self {
        Self {
            rsp_code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn confirmed() -> Self {
        Self::new("00", "Confirm Success")
    }

    pub fn order_not_found() -> Self {
        Self::new("01", "Order not found")
    }

    pub fn already_confirmed() -> Self {
        Self::new("02", "Order already confirmed")
    }

    pub fn invalid_amount() -> Self {
        Self::new("04", "Invalid amount")
    }

    pub fn invalid_signature() -> Self {
        Self::new("97", "Invalid signature")
    }

    pub fn unknown_error() -> Self {
        Self::new("99", "Unknown error")
    }
}

/// Result of a verified callback.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// The payment moved to PAID or FAILED.
    Recorded(Payment),
    /// The payment already reflects this callback (PAID, or the same declined
    /// transaction delivered again); nothing changed.
    AlreadyProcessed(Payment),
}

impl CallbackOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            CallbackOutcome::Recorded(payment) | CallbackOutcome::AlreadyProcessed(payment) => payment,
        }
    }
}

// ==============================================================================
// REQUESTS / RESPONSES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateVnpayPaymentRequest {
    pub appointment_id: Uuid,
    #[validate(range(min = 5000, max = 999999999, message = "amount must be between 5,000 and 999,999,999 VND"))]
    pub amount: i64,
    #[validate(length(min = 1, max = 255, message = "order_info must be 1-255 characters"))]
    pub order_info: Option<String>,
    #[validate(length(min = 2, max = 20, message = "bank_code must be 2-20 characters"))]
    pub bank_code: Option<String>,
    pub locale: Option<VnpayLocale>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VnpayPaymentUrl {
    pub payment_id: Uuid,
    pub payment_url: String,
    pub txn_ref: String,
    pub amount: i64,
    pub expires_at: DateTime<Utc>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("Appointment in status {0} cannot be paid")]
    InvalidAppointmentStatus(AppointmentStatus),

    #[error("Appointment has already been paid")]
    AlreadyPaid,

    #[error("Invalid payment gateway signature")]
    InvalidSignature,

    #[error("Amount mismatch: expected {expected}, gateway reported {actual}")]
    AmountMismatch { expected: i64, actual: i64 },

    #[error("Missing gateway parameter {0}")]
    MissingParameter(&'static str),

    #[error("Invalid gateway parameter: {0}")]
    InvalidParameter(String),

    #[error("Payment gateway is not configured")]
    NotConfigured,

    #[error("Failed to sign gateway request: {0}")]
    Signing(String),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotFound => AppError::NotFound(err.to_string()),
            PaymentError::Forbidden(message) => AppError::Forbidden(message),
            PaymentError::InvalidAppointmentStatus(_) => AppError::InvalidAppointmentStatus(err.to_string()),
            PaymentError::AlreadyPaid => AppError::AlreadyPaid(err.to_string()),
            PaymentError::InvalidSignature => AppError::GatewaySignatureInvalid,
            PaymentError::AmountMismatch { .. } => AppError::field("vnp_Amount", err.to_string()),
            PaymentError::MissingParameter(_) | PaymentError::InvalidParameter(_) => {
                AppError::validation(err.to_string())
            }
            PaymentError::NotConfigured | PaymentError::Signing(_) => AppError::Internal(err.to_string()),
            PaymentError::Appointment(e) => e.into(),
            PaymentError::Database(e) => AppError::Database(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn callback_success_needs_both_codes() {
        let base = [
            ("vnp_TxnRef", "abc"),
            ("vnp_Amount", "35000000"),
            ("vnp_ResponseCode", "00"),
        ];
        let callback = VnpayCallback::from_params(&params(&base)).unwrap();
        assert!(callback.is_success());
        assert_eq!(callback.amount, 35_000_000);

        let mut with_status = base.to_vec();
        with_status.push(("vnp_TransactionStatus", "02"));
        assert!(!VnpayCallback::from_params(&params(&with_status)).unwrap().is_success());

        let declined = [("vnp_TxnRef", "abc"), ("vnp_Amount", "100"), ("vnp_ResponseCode", "24")];
        assert!(!VnpayCallback::from_params(&params(&declined)).unwrap().is_success());
    }

    #[test]
    fn callback_requires_reference_and_numeric_amount() {
        let missing = params(&[("vnp_Amount", "100"), ("vnp_ResponseCode", "00")]);
        assert_matches!(
            VnpayCallback::from_params(&missing),
            Err(PaymentError::MissingParameter("vnp_TxnRef"))
        );

        let garbled = params(&[("vnp_TxnRef", "x"), ("vnp_Amount", "12a"), ("vnp_ResponseCode", "00")]);
        assert_matches!(
            VnpayCallback::from_params(&garbled),
            Err(PaymentError::InvalidParameter(_))
        );
    }

    #[test]
    fn ipn_acknowledgements_use_gateway_field_names() {
        let body = serde_json::to_value(IpnResponse::confirmed()).unwrap();
        assert_eq!(body, serde_json::json!({"RspCode": "00", "Message": "Confirm Success"}));
        assert_eq!(IpnResponse::invalid_signature().rsp_code, "97");
    }

    #[test]
    fn errors_map_onto_the_shared_taxonomy() {
        assert_eq!(AppError::from(PaymentError::AlreadyPaid).code(), "ALREADY_PAID");
        assert_eq!(AppError::from(PaymentError::InvalidSignature).code(), "GATEWAY_SIGNATURE_INVALID");
        assert_eq!(
            AppError::from(PaymentError::InvalidAppointmentStatus(AppointmentStatus::Cancelled)).code(),
            "INVALID_APPOINTMENT_STATUS"
        );
        assert_eq!(
            AppError::from(PaymentError::Appointment(AppointmentError::NotFound)).code(),
            "NOT_FOUND"
        );
    }
}
