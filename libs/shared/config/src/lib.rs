use std::env;
use tracing::warn;

const DEFAULT_VNPAY_PAYMENT_URL: &str = "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html";
const DEFAULT_VNPAY_EXPIRE_MINUTES: i64 = 15;
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub vnpay_tmn_code: String,
    pub vnpay_hash_secret: String,
    pub vnpay_payment_url: String,
    pub vnpay_return_url: String,
    pub vnpay_ipn_url: String,
    pub vnpay_expire_minutes: i64,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: required("SUPABASE_URL"),
            supabase_anon_key: required("SUPABASE_ANON_PUBLIC_KEY"),
            supabase_service_role_key: required("SUPABASE_SERVICE_ROLE_KEY"),
            supabase_jwt_secret: required("SUPABASE_JWT_SECRET"),
            vnpay_tmn_code: required("VNPAY_TMN_CODE"),
            vnpay_hash_secret: required("VNPAY_HASH_SECRET"),
            vnpay_payment_url: env::var("VNPAY_PAYMENT_URL").unwrap_or_else(|_| {
                warn!("VNPAY_PAYMENT_URL not set, using sandbox gateway");
                DEFAULT_VNPAY_PAYMENT_URL.to_string()
            }),
            vnpay_return_url: required("VNPAY_RETURN_URL"),
            vnpay_ipn_url: required("VNPAY_IPN_URL"),
            vnpay_expire_minutes: parsed("VNPAY_EXPIRE_MINUTES", DEFAULT_VNPAY_EXPIRE_MINUTES),
            port: parsed("PORT", DEFAULT_PORT),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing database environment variables");
        }
        if !config.is_payment_configured() {
            warn!("VNPay not configured - payment initiation will be rejected by the gateway");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_payment_configured(&self) -> bool {
        !self.vnpay_tmn_code.is_empty()
            && !self.vnpay_hash_secret.is_empty()
            && !self.vnpay_return_url.is_empty()
    }

    /// Token used for server-initiated queries (gateway callbacks) that carry no user session.
    /// Falls back to the anon key when no service role key is configured.
    pub fn service_token(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }
}

fn required(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        warn!("{} not set, using empty value", key);
        String::new()
    })
}

fn parsed<T: std::str::FromStr + std::fmt::Display + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
