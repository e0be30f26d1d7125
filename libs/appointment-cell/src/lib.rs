//! # Appointment Cell
//!
//! Booking with conflict detection, schedule slot reservation, the appointment status
//! state machine, and free-slot generation from clinic working hours.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::appointment_routes;
pub use services::booking::{AppointmentBookingService, Participants};
pub use services::slots::SlotGeneratorService;
