pub mod booking;
pub mod conflict;
pub mod directory;
pub mod lifecycle;
pub mod schedule;
pub mod slots;
