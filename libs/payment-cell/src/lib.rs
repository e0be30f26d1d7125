//! # Payment Cell
//!
//! VNPay checkout for appointments: signed redirect URLs on the way out, signature
//! verified return/IPN callbacks on the way back, and one payment row per appointment.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::payment_routes;
pub use services::payment::PaymentService;
pub use services::vnpay::VnpayGateway;
