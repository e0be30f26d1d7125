use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub vnpay_hash_secret: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            vnpay_hash_secret: "TESTVNPAYHASHSECRET0123456789ABC".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            vnpay_tmn_code: "TESTTMN1".to_string(),
            vnpay_hash_secret: self.vnpay_hash_secret.clone(),
            vnpay_payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            vnpay_return_url: "https://app.example.com/payments/vnpay/return".to_string(),
            vnpay_ipn_url: "https://api.example.com/payments/vnpay/ipn".to_string(),
            vnpay_expire_minutes: 15,
            port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let claims = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        Self::sign(&claims, secret)
    }

    /// Token shaped like the auth provider's: database role at the top level,
    /// application role inside `app_metadata`.
    pub fn create_supabase_style_token(user: &TestUser, secret: &str) -> String {
        let now = Utc::now();
        let claims = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "aud": "authenticated",
            "app_metadata": { "role": user.role },
            "iat": now.timestamp(),
            "exp": (now + Duration::hours(1)).timestamp()
        });

        Self::sign(&claims, secret)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }

    fn sign(claims: &Value, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("HS256 signing with an in-memory key cannot fail")
    }
}

/// Row fixtures in the shape PostgREST returns them.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_response(doctor_id: &str, user_id: &str, is_available: bool) -> Value {
        json!({
            "id": doctor_id,
            "user_id": user_id,
            "full_name": "Dr. Test",
            "specialty": "General Practice",
            "is_available": is_available
        })
    }

    pub fn patient_response(patient_id: &str, user_id: &str) -> Value {
        json!({
            "id": patient_id,
            "user_id": user_id,
            "full_name": "Test Patient"
        })
    }

    pub fn clinic_response(clinic_id: &str, name: &str, opening: &str, closing: &str) -> Value {
        json!({
            "id": clinic_id,
            "name": name,
            "address": "1 Test Street",
            "opening_time": opening,
            "closing_time": closing,
            "is_active": true
        })
    }

    pub fn clinic_doctor_response(clinic_id: &str, doctor_id: &str) -> Value {
        json!({
            "clinic_id": clinic_id,
            "doctor_id": doctor_id
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn appointment_response(
        appointment_id: &str,
        patient_id: &str,
        doctor_id: &str,
        date: &str,
        start: &str,
        end: &str,
        status: &str,
        schedule_id: Option<&str>,
    ) -> Value {
        json!({
            "id": appointment_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "clinic_id": null,
            "schedule_id": schedule_id,
            "appointment_date": date,
            "start_time": start,
            "end_time": end,
            "type": "OFFLINE",
            "status": status,
            "symptoms": null,
            "notes": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn schedule_response(
        schedule_id: &str,
        doctor_id: &str,
        date: &str,
        start: &str,
        end: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": schedule_id,
            "doctor_id": doctor_id,
            "date": date,
            "start_time": start,
            "end_time": end,
            "status": status
        })
    }

    pub fn payment_response(
        payment_id: &str,
        appointment_id: &str,
        patient_id: &str,
        amount: i64,
        status: &str,
    ) -> Value {
        json!({
            "id": payment_id,
            "appointment_id": appointment_id,
            "patient_id": patient_id,
            "amount": amount,
            "method": "VNPAY",
            "status": status,
            "transaction_id": appointment_id,
            "gateway_transaction_id": null,
            "bank_code": null,
            "paid_at": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn notification_response(notification_id: &str, user_id: &str, is_read: bool) -> Value {
        json!({
            "id": notification_id,
            "user_id": user_id,
            "type": "APPOINTMENT_CREATED",
            "title": "Appointment booked",
            "message": "Your appointment is pending confirmation",
            "data": {},
            "is_read": is_read,
            "is_delivered": false,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn unique_violation() -> Value {
        json!({
            "code": "23505",
            "details": "Key already exists.",
            "hint": null,
            "message": "duplicate key value violates unique constraint \"schedules_slot_key\""
        })
    }
}
