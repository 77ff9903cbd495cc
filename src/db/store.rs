//! Document store seam used by the projection and check-in flow.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::AppError;
use crate::models::{
    Attendee, AttendeeCheckInPatch, Event, Ticket, TicketStatus, TicketStatusPatch,
};

/// Collection touched by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Events,
    Attendees,
    Tickets,
}

/// Announcement of a committed write.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub collection: Collection,
    pub event_id: String,
    pub revision_id: i64,
}

/// Reads and partial updates the dashboard flow needs from the backing store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Subscribe to committed writes.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;

    async fn get_event(&self, id: &str) -> Result<Option<Event>, AppError>;

    async fn get_attendee(&self, id: &str) -> Result<Option<Attendee>, AppError>;

    /// Attendees of an event, newest first. With `session_id` the session index is used.
    async fn query_attendees(
        &self,
        event_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<Attendee>, AppError>;

    /// Tickets of an event, optionally restricted to one session.
    async fn query_tickets(
        &self,
        event_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<Ticket>, AppError>;

    async fn get_ticket(&self, id: &str) -> Result<Option<Ticket>, AppError>;

    /// Tickets of an event held by `email` in the given status.
    async fn find_tickets_by_email(
        &self,
        event_id: &str,
        email: &str,
        status: TicketStatus,
    ) -> Result<Vec<Ticket>, AppError>;

    /// Write the check-in fields of one attendee and return the updated record.
    async fn update_attendee_check_in(
        &self,
        id: &str,
        patch: &AttendeeCheckInPatch,
    ) -> Result<Attendee, AppError>;

    async fn update_ticket_status(
        &self,
        id: &str,
        patch: &TicketStatusPatch,
    ) -> Result<(), AppError>;
}
