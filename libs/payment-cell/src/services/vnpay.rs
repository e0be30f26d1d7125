use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::{PaymentError, PaymentOrder};

type HmacSha512 = Hmac<Sha512>;

pub const VNPAY_VERSION: &str = "2.1.0";
pub const SECURE_HASH: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";

const GATEWAY_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Gateway timestamps are Vietnam local time (GMT+7).
pub fn gateway_timestamp(at: DateTime<Utc>) -> String {
    (at.naive_utc() + Duration::hours(7))
        .format(GATEWAY_TIME_FORMAT)
        .to_string()
}

/// Query-string value encoding the gateway signs over: percent-encoding with `+` for spaces.
fn encode(raw: &str) -> String {
    urlencoding::encode(raw).replace("%20", "+")
}

/// `key=value&...` over the sorted parameters; the exact bytes that get signed.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// VNPay payment URL signer and callback verifier.
#[derive(Debug, Clone)]
pub struct VnpayGateway {
    tmn_code: String,
    hash_secret: String,
    payment_url: String,
    return_url: String,
    ipn_url: String,
    expire_minutes: i64,
}

impl VnpayGateway {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            tmn_code: config.vnpay_tmn_code.clone(),
            hash_secret: config.vnpay_hash_secret.clone(),
            payment_url: config.vnpay_payment_url.clone(),
            return_url: config.vnpay_return_url.clone(),
            ipn_url: config.vnpay_ipn_url.clone(),
            expire_minutes: config.vnpay_expire_minutes,
        }
    }

    pub fn expires_at(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + Duration::minutes(self.expire_minutes)
    }

    pub fn build_params(&self, order: &PaymentOrder) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), VNPAY_VERSION.to_string());
        params.insert("vnp_Command".to_string(), "pay".to_string());
        params.insert("vnp_TmnCode".to_string(), self.tmn_code.clone());
        params.insert("vnp_Amount".to_string(), (order.amount * 100).to_string());
        params.insert("vnp_CurrCode".to_string(), "VND".to_string());
        params.insert("vnp_TxnRef".to_string(), order.txn_ref.clone());
        params.insert("vnp_OrderInfo".to_string(), order.order_info.clone());
        params.insert("vnp_OrderType".to_string(), "other".to_string());
        params.insert("vnp_Locale".to_string(), order.locale.as_str().to_string());
        params.insert("vnp_ReturnUrl".to_string(), self.return_url.clone());
        params.insert("vnp_IpnUrl".to_string(), self.ipn_url.clone());
        params.insert("vnp_IpAddr".to_string(), order.ip_addr.clone());
        params.insert("vnp_CreateDate".to_string(), gateway_timestamp(order.created_at));
        params.insert(
            "vnp_ExpireDate".to_string(),
            gateway_timestamp(self.expires_at(order.created_at)),
        );
        if let Some(bank_code) = order.bank_code.as_ref().filter(|code| !code.is_empty()) {
            params.insert("vnp_BankCode".to_string(), bank_code.clone());
        }
        params
    }

    fn mac(&self) -> Result<HmacSha512, PaymentError> {
        HmacSha512::new_from_slice(self.hash_secret.as_bytes()).map_err(|e| PaymentError::Signing(e.to_string()))
    }

    /// Lowercase hex HMAC-SHA512 of the canonical query.
    pub fn sign(&self, params: &BTreeMap<String, String>) -> Result<String, PaymentError> {
        let mut mac = self.mac()?;
        mac.update(canonical_query(params).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn create_payment_url(&self, order: &PaymentOrder) -> Result<String, PaymentError> {
        let params = self.build_params(order);
        let query = canonical_query(&params);
        let signature = self.sign(&params)?;

        debug!("Built VNPay URL for txn {} ({} VND)", order.txn_ref, order.amount);
        Ok(format!("{}?{}&{}={}", self.payment_url, query, SECURE_HASH, signature))
    }

    /// Recomputes the signature over every `vnp_*` field except the hash fields
    /// themselves and compares it with `vnp_SecureHash` (hex case ignored).
    pub fn verify_callback(&self, params: &BTreeMap<String, String>) -> bool {
        let Some(provided) = params.get(SECURE_HASH) else {
            warn!("Gateway callback without {}", SECURE_HASH);
            return false;
        };
        let Ok(provided) = hex::decode(provided) else {
            warn!("Gateway callback with non-hex signature");
            return false;
        };

        let signed: BTreeMap<String, String> = params
            .iter()
            .filter(|(key, _)| key.starts_with("vnp_") && *key != SECURE_HASH && *key != SECURE_HASH_TYPE)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(canonical_query(&signed).as_bytes());
        mac.verify_slice(&provided).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VnpayLocale;
    use chrono::TimeZone;

    fn gateway() -> VnpayGateway {
        VnpayGateway {
            tmn_code: "TESTTMN1".to_string(),
            hash_secret: "TESTVNPAYHASHSECRET0123456789ABC".to_string(),
            payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            return_url: "https://app.example.com/payments/vnpay/return".to_string(),
            ipn_url: "https://api.example.com/payments/vnpay/ipn".to_string(),
            expire_minutes: 15,
        }
    }

    fn order() -> PaymentOrder {
        PaymentOrder {
            txn_ref: "5f0c7f0e-3c1a-4d7e-9d51-0e5b1c0a1b2c".to_string(),
            amount: 350_000,
            order_info: "Thanh toan lich kham".to_string(),
            ip_addr: "127.0.0.1".to_string(),
            bank_code: None,
            locale: VnpayLocale::Vn,
            created_at: Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap(),
        }
    }

    #[test]
    fn amount_is_scaled_by_one_hundred() {
        let params = gateway().build_params(&order());
        assert_eq!(params["vnp_Amount"], "35000000");
        assert_eq!(params["vnp_CurrCode"], "VND");
        assert_eq!(params["vnp_Version"], "2.1.0");
        assert!(!params.contains_key("vnp_BankCode"));
    }

    #[test]
    fn timestamps_are_gmt_plus_seven() {
        let params = gateway().build_params(&order());
        assert_eq!(params["vnp_CreateDate"], "20250310090000");
        assert_eq!(params["vnp_ExpireDate"], "20250310091500");
        assert_eq!(gateway_timestamp(Utc.with_ymd_and_hms(2025, 12, 31, 20, 30, 0).unwrap()), "20260101033000");
    }

    #[test]
    fn canonical_query_sorts_keys_and_uses_plus_for_spaces() {
        let mut params = BTreeMap::new();
        params.insert("vnp_b".to_string(), "two words".to_string());
        params.insert("vnp_a".to_string(), "https://x.y/z?q=1".to_string());
        assert_eq!(
            canonical_query(&params),
            "vnp_a=https%3A%2F%2Fx.y%2Fz%3Fq%3D1&vnp_b=two+words"
        );
    }

    #[test]
    fn signature_is_lowercase_hex_sha512() {
        let signature = gateway().sign(&gateway().build_params(&order())).unwrap();
        assert_eq!(signature.len(), 128);
        assert!(signature.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn url_carries_signed_query() {
        let url = gateway().create_payment_url(&order()).unwrap();
        assert!(url.starts_with("https://sandbox.vnpayment.vn/paymentv2/vpcpay.html?vnp_Amount=35000000&"));
        assert!(url.contains("vnp_OrderInfo=Thanh+toan+lich+kham"));
        assert!(url.contains("&vnp_SecureHash="));
    }

    fn signed_callback() -> BTreeMap<String, String> {
        let mut params: BTreeMap<String, String> = [
            ("vnp_Amount", "35000000"),
            ("vnp_BankCode", "NCB"),
            ("vnp_OrderInfo", "Thanh toan lich kham"),
            ("vnp_ResponseCode", "00"),
            ("vnp_TmnCode", "TESTTMN1"),
            ("vnp_TransactionNo", "14226112"),
            ("vnp_TransactionStatus", "00"),
            ("vnp_TxnRef", "5f0c7f0e-3c1a-4d7e-9d51-0e5b1c0a1b2c"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let signature = gateway().sign(&params).unwrap();
        params.insert(SECURE_HASH_TYPE.to_string(), "HmacSHA512".to_string());
        params.insert(SECURE_HASH.to_string(), signature);
        params
    }

    #[test]
    fn signed_callback_verifies() {
        assert!(gateway().verify_callback(&signed_callback()));
    }

    #[test]
    fn uppercase_signature_still_verifies() {
        let mut params = signed_callback();
        let upper = params[SECURE_HASH].to_uppercase();
        params.insert(SECURE_HASH.to_string(), upper);
        assert!(gateway().verify_callback(&params));
    }

    #[test]
    fn mutating_any_signed_field_breaks_verification() {
        let original = signed_callback();
        for key in original.keys().filter(|k| *k != SECURE_HASH && *k != SECURE_HASH_TYPE) {
            let mut tampered = original.clone();
            tampered.insert(key.clone(), format!("{}1", original[key]));
            assert!(!gateway().verify_callback(&tampered), "tampering {} went unnoticed", key);
        }
    }

    #[test]
    fn missing_or_garbled_signature_fails() {
        let mut params = signed_callback();
        params.insert(SECURE_HASH.to_string(), "zz".to_string());
        assert!(!gateway().verify_callback(&params));

        params.remove(SECURE_HASH);
        assert!(!gateway().verify_callback(&params));
    }

    #[test]
    fn wrong_secret_fails() {
        let mut other = gateway();
        other.hash_secret = "ANOTHERSECRET".to_string();
        assert!(!other.verify_callback(&signed_callback()));
    }
}
