//! # Notification Cell
//!
//! Persisted user notifications plus live fan-out over per-user WebSocket channels.
//!
//! - `services/hub.rs`: in-process registry of connected users (broadcast channels)
//! - `services/dispatcher.rs`: persist-then-push pipeline and owner-scoped REST operations
//!
//! Delivery is best effort. A user without an open socket still finds the notification
//! through `GET /notifications`; the dispatcher reports this as [`DeliveryOutcome::QueuedOnly`].

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::NotificationError;
pub use models::*;
pub use router::notification_routes;
pub use services::*;
