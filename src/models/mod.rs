//! Data models for the EventDesk backend.
//!
//! Field names follow the documents the dashboard clients already read, including
//! the legacy shapes older bookings were written with.

mod attendee;
mod checkin;
mod dashboard;
mod event;
mod revision;
mod ticket;

pub use attendee::*;
pub use checkin::*;
pub use dashboard::*;
pub use event::*;
pub use revision::*;
pub use ticket::*;
