//! Database repository for events, attendees and tickets.
//!
//! Uses prepared statements; composite document fields are stored as JSON text.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;

use super::{Collection, DocumentStore, StoreChange};
use crate::errors::AppError;
use crate::models::{
    Architecture, Attendee, AttendeeCheckInPatch, CreateEventRequest, CreateTicketTypeRequest,
    Event, RegisterAttendeeRequest, RevisionInfo, Session, Ticket, TicketCounts, TicketStatus,
    TicketStatusPatch, TicketType,
};
use crate::reconcile;

const CHANGE_FEED_CAPACITY: usize = 256;

const ATTENDEE_COLUMNS: &str = "id, event_id, name, email, phone, tickets, ticket_type, session_id, \
     selected_session, selected_date, selected_time_slot, individual_amount, original_booking, \
     payment_status, checked_in, check_in_time, checked_in_by, ticket_ids, created_at";

/// Rows that may belong to a session under any reconciliation tier.
///
/// A record indexed under another session can still match this one by date and
/// start time, so the slot pairs are compared against the session as stored on
/// the event. Callers narrow the result with `reconcile::filter_for_session`.
const SESSION_MATCH: &str = "(resolved_session_id = ?
     OR session_id = ?
     OR json_extract(selected_session, '$.id') = ?
     OR EXISTS (
         SELECT 1 FROM events e, json_each(e.sessions) s
         WHERE e.id = event_attendees.event_id
           AND json_extract(s.value, '$.id') = ?
           AND ((selected_date = json_extract(s.value, '$.date')
                 AND json_extract(selected_time_slot, '$.start_time') = json_extract(s.value, '$.start_time'))
             OR (json_extract(selected_session, '$.date') = json_extract(s.value, '$.date')
                 AND json_extract(selected_session, '$.start_time') = json_extract(s.value, '$.start_time')))))";

const TICKET_COLUMNS: &str =
    "id, event_id, session_id, user_email, user_name, ticket_type, status, used_at, checked_in_by, created_at";

const EVENT_COLUMNS: &str =
    "id, title, organization_id, architecture, sessions, tickets, time_slots, created_at, updated_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    changes: broadcast::Sender<StoreChange>,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Increment the revision ID and return the new value.
    async fn increment_revision(&self) -> Result<i64, AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        self.get_revision_id().await
    }

    /// Bump the revision and tell subscribers about the write.
    async fn publish(&self, collection: Collection, event_id: &str) -> Result<i64, AppError> {
        let revision_id = self.increment_revision().await?;
        let change = StoreChange {
            collection,
            event_id: event_id.to_string(),
            revision_id,
        };
        if self.changes.send(change).is_err() {
            tracing::trace!("No live subscribers for revision {}", revision_id);
        }
        Ok(revision_id)
    }

    // ==================== EVENT OPERATIONS ====================

    /// List events, optionally for one organization.
    pub async fn list_events(&self, organization_id: Option<&str>) -> Result<Vec<Event>, AppError> {
        let rows = match organization_id {
            Some(org) => {
                sqlx::query(&format!(
                    "SELECT {} FROM events WHERE organization_id = ? ORDER BY created_at DESC",
                    EVENT_COLUMNS
                ))
                .bind(org)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM events ORDER BY created_at DESC",
                    EVENT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(event_from_row).collect())
    }

    /// Create a new event, validating its ticket layout.
    pub async fn create_event(&self, request: &CreateEventRequest) -> Result<Event, AppError> {
        if request.title.trim().is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }
        if request.organization_id.trim().is_empty() {
            return Err(AppError::Validation(
                "Organization (organizationId) is required".to_string(),
            ));
        }

        let mut sessions = Vec::new();
        let mut tickets = Vec::new();
        match request.architecture {
            Architecture::SessionCentric => {
                if request.sessions.is_empty() {
                    return Err(AppError::Validation(
                        "Session-centric events need at least one session".to_string(),
                    ));
                }
                for session in &request.sessions {
                    let ticket_types = build_ticket_types(&session.ticket_types)?;
                    let total: i64 = ticket_types.iter().map(|t| t.capacity).sum();
                    if let Some(max) = session.max_capacity {
                        if max != total {
                            return Err(AppError::Validation(format!(
                                "Session {} {}: ticket capacities add up to {} but maxCapacity is {}",
                                session.date, session.start_time, total, max
                            )));
                        }
                    }
                    sessions.push(Session {
                        id: uuid::Uuid::new_v4().to_string(),
                        name: session.name.clone(),
                        date: session.date.clone(),
                        start_time: session.start_time.clone(),
                        end_time: session.end_time.clone(),
                        venue: session.venue.clone(),
                        ticket_types,
                        max_capacity: total,
                    });
                }
            }
            Architecture::Legacy => {
                tickets = build_ticket_types(&request.tickets)?;
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = timestamp(Utc::now());
        let event = Event {
            id,
            title: request.title.trim().to_string(),
            organization_id: request.organization_id.clone(),
            architecture: request.architecture,
            sessions,
            tickets,
            time_slots: request.time_slots.clone(),
            created_at: now.clone(),
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO events (id, title, organization_id, architecture, sessions, tickets, time_slots, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&event.id)
        .bind(&event.title)
        .bind(&event.organization_id)
        .bind(event.architecture.as_str())
        .bind(to_json(&event.sessions))
        .bind(to_json(&event.tickets))
        .bind(to_json(&event.time_slots))
        .bind(&event.created_at)
        .bind(&event.updated_at)
        .execute(&self.pool)
        .await?;

        self.publish(Collection::Events, &event.id).await?;

        Ok(event)
    }

    /// Rewrite the ticket layout of an event after a sale.
    async fn save_event_inventory(&self, event: &Event) -> Result<(), AppError> {
        let now = timestamp(Utc::now());
        sqlx::query("UPDATE events SET sessions = ?, tickets = ?, updated_at = ? WHERE id = ?")
            .bind(to_json(&event.sessions))
            .bind(to_json(&event.tickets))
            .bind(&now)
            .bind(&event.id)
            .execute(&self.pool)
            .await?;
        self.publish(Collection::Events, &event.id).await?;
        Ok(())
    }

    // ==================== BOOKING OPERATIONS ====================

    /// Record a booking: one attendee, one ticket per seat, and a hand-maintained
    /// decrement of the ticket types' available capacity.
    pub async fn register_attendee(
        &self,
        event_id: &str,
        request: &RegisterAttendeeRequest,
    ) -> Result<(Attendee, Vec<Ticket>), AppError> {
        let mut event = self
            .get_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;

        if request.name.trim().is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        if request.email.trim().is_empty() {
            return Err(AppError::Validation("Email is required".to_string()));
        }
        if request.tickets.is_empty() || request.tickets.values().any(|count| *count == 0) {
            return Err(AppError::Validation(
                "At least one ticket with a positive quantity is required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut attendee = Attendee {
            id: uuid::Uuid::new_v4().to_string(),
            event_id: event.id.clone(),
            name: request.name.trim().to_string(),
            email: request.email.trim().to_string(),
            phone: request.phone.clone(),
            tickets: Some(TicketCounts::ByType(request.tickets.clone())),
            ticket_type: None,
            session_id: request.session_id.clone(),
            selected_session: None,
            selected_date: request.selected_date.clone(),
            selected_time_slot: request.selected_time_slot.clone(),
            individual_amount: None,
            original_booking: None,
            payment_status: request.payment_status.clone(),
            checked_in: false,
            check_in_time: None,
            checked_in_by: None,
            ticket_ids: None,
            created_at: now,
        };

        let session_id = if event.is_session_centric() {
            let resolved = reconcile::resolve_session_id(&attendee, &event).ok_or_else(|| {
                AppError::Validation("A session is required for this event".to_string())
            })?;
            if event.session(&resolved).is_none() {
                return Err(AppError::NotFound(format!("Session {} not found", resolved)));
            }
            attendee.session_id = Some(resolved.clone());
            Some(resolved)
        } else {
            None
        };

        let ticket_types: &mut Vec<TicketType> = match &session_id {
            Some(sid) => {
                &mut event
                    .sessions
                    .iter_mut()
                    .find(|s| &s.id == sid)
                    .ok_or_else(|| AppError::NotFound(format!("Session {} not found", sid)))?
                    .ticket_types
            }
            None => &mut event.tickets,
        };

        let mut amount = 0.0;
        for (name, count) in &request.tickets {
            let ticket_type = ticket_types
                .iter()
                .find(|t| &t.name == name)
                .ok_or_else(|| AppError::Validation(format!("Unknown ticket type '{}'", name)))?;
            if ticket_type.available_capacity < i64::from(*count) {
                return Err(AppError::Validation(format!(
                    "Only {} '{}' tickets left",
                    ticket_type.available_capacity.max(0),
                    name
                )));
            }
            amount += ticket_type.price * f64::from(*count);
        }
        for (name, count) in &request.tickets {
            if let Some(ticket_type) = ticket_types.iter_mut().find(|t| &t.name == name) {
                ticket_type.available_capacity =
                    (ticket_type.available_capacity - i64::from(*count)).max(0);
            }
        }

        if request.tickets.len() == 1 {
            attendee.ticket_type = request.tickets.keys().next().cloned();
        }
        attendee.individual_amount = Some(amount);

        let tickets: Vec<Ticket> = request
            .tickets
            .iter()
            .flat_map(|(name, count)| (0..*count).map(move |_| name.clone()))
            .map(|ticket_type| Ticket {
                id: uuid::Uuid::new_v4().to_string(),
                event_id: event.id.clone(),
                session_id: session_id.clone(),
                user_email: attendee.email.clone(),
                user_name: Some(attendee.name.clone()),
                ticket_type: Some(ticket_type),
                status: TicketStatus::Active,
                used_at: None,
                checked_in_by: None,
                created_at: now,
            })
            .collect();
        attendee.ticket_ids = Some(tickets.iter().map(|t| t.id.clone()).collect());

        let mut tx = self.pool.begin().await?;
        insert_attendee_row(&mut tx, &attendee, session_id.as_deref()).await?;
        for ticket in &tickets {
            insert_ticket_row(&mut tx, ticket).await?;
        }
        tx.commit().await?;
        self.publish(Collection::Attendees, &event.id).await?;
        self.publish(Collection::Tickets, &event.id).await?;

        // Inventory is adjusted after the booking is stored, as a separate write.
        self.save_event_inventory(&event).await?;

        Ok((attendee, tickets))
    }

    /// Store an attendee document as-is, resolving its session link for the index.
    #[cfg(test)]
    pub async fn insert_attendee(&self, attendee: &Attendee) -> Result<(), AppError> {
        let event = self.get_event(&attendee.event_id).await?;
        let resolved = event
            .as_ref()
            .and_then(|e| reconcile::resolve_session_id(attendee, e));

        let mut tx = self.pool.begin().await?;
        insert_attendee_row(&mut tx, attendee, resolved.as_deref()).await?;
        tx.commit().await?;

        self.publish(Collection::Attendees, &attendee.event_id).await?;
        Ok(())
    }

    /// Store a ticket document as-is.
    #[cfg(test)]
    pub async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        insert_ticket_row(&mut tx, ticket).await?;
        tx.commit().await?;

        self.publish(Collection::Tickets, &ticket.event_id).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for Repository {
    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    async fn get_event(&self, id: &str) -> Result<Option<Event>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(event_from_row))
    }

    async fn get_attendee(&self, id: &str) -> Result<Option<Attendee>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM event_attendees WHERE id = ?",
            ATTENDEE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(attendee_from_row))
    }

    async fn query_attendees(
        &self,
        event_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<Attendee>, AppError> {
        let rows = match session_id {
            Some(sid) => {
                sqlx::query(&format!(
                    "SELECT {} FROM event_attendees WHERE event_id = ? AND {} ORDER BY created_at DESC",
                    ATTENDEE_COLUMNS, SESSION_MATCH
                ))
                .bind(event_id)
                .bind(sid)
                .bind(sid)
                .bind(sid)
                .bind(sid)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM event_attendees WHERE event_id = ? ORDER BY created_at DESC",
                    ATTENDEE_COLUMNS
                ))
                .bind(event_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(attendee_from_row).collect())
    }

    async fn query_tickets(
        &self,
        event_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<Ticket>, AppError> {
        let rows = match session_id {
            Some(sid) => {
                sqlx::query(&format!(
                    "SELECT {} FROM tickets WHERE event_id = ? AND session_id = ? ORDER BY created_at DESC",
                    TICKET_COLUMNS
                ))
                .bind(event_id)
                .bind(sid)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM tickets WHERE event_id = ? ORDER BY created_at DESC",
                    TICKET_COLUMNS
                ))
                .bind(event_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(ticket_from_row).collect())
    }

    async fn get_ticket(&self, id: &str) -> Result<Option<Ticket>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(ticket_from_row))
    }

    async fn find_tickets_by_email(
        &self,
        event_id: &str,
        email: &str,
        status: TicketStatus,
    ) -> Result<Vec<Ticket>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tickets WHERE event_id = ? AND user_email = ? AND status = ? ORDER BY created_at",
            TICKET_COLUMNS
        ))
        .bind(event_id)
        .bind(email)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(ticket_from_row).collect())
    }

    async fn update_attendee_check_in(
        &self,
        id: &str,
        patch: &AttendeeCheckInPatch,
    ) -> Result<Attendee, AppError> {
        let result = sqlx::query(
            "UPDATE event_attendees SET checked_in = ?, check_in_time = ?, checked_in_by = ? WHERE id = ?",
        )
        .bind(patch.checked_in as i32)
        .bind(patch.check_in_time.map(timestamp))
        .bind(&patch.checked_in_by)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Attendee {} not found", id)));
        }

        let attendee = self
            .get_attendee(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attendee {} not found", id)))?;
        self.publish(Collection::Attendees, &attendee.event_id).await?;
        Ok(attendee)
    }

    async fn update_ticket_status(
        &self,
        id: &str,
        patch: &TicketStatusPatch,
    ) -> Result<(), AppError> {
        let row = sqlx::query(
            "UPDATE tickets SET status = ?, used_at = ?, checked_in_by = ? WHERE id = ? RETURNING event_id",
        )
        .bind(patch.status.as_str())
        .bind(patch.used_at.map(timestamp))
        .bind(&patch.checked_in_by)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(AppError::NotFound(format!("Ticket {} not found", id)));
        };
        let event_id: String = row.get("event_id");
        self.publish(Collection::Tickets, &event_id).await?;
        Ok(())
    }
}

fn build_ticket_types(requested: &[CreateTicketTypeRequest]) -> Result<Vec<TicketType>, AppError> {
    if requested.is_empty() {
        return Err(AppError::Validation(
            "At least one ticket type is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    requested
        .iter()
        .map(|t| {
            let name = t.name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("Ticket type name is required".to_string()));
            }
            if !seen.insert(name.to_string()) {
                return Err(AppError::Validation(format!(
                    "Duplicate ticket type '{}'",
                    name
                )));
            }
            if t.capacity < 1 {
                return Err(AppError::Validation(format!(
                    "Ticket type '{}' needs a capacity of at least 1",
                    name
                )));
            }
            if t.price.is_nan() || t.price < 0.0 {
                return Err(AppError::Validation(format!(
                    "Ticket type '{}' cannot have a negative price",
                    name
                )));
            }
            Ok(TicketType {
                name: name.to_string(),
                capacity: t.capacity,
                price: t.price,
                available_capacity: t.capacity,
            })
        })
        .collect()
}

async fn insert_attendee_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    attendee: &Attendee,
    resolved_session_id: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"INSERT INTO event_attendees (
            id, event_id, resolved_session_id, name, email, phone, tickets, ticket_type,
            session_id, selected_session, selected_date, selected_time_slot,
            individual_amount, original_booking, payment_status, checked_in,
            check_in_time, checked_in_by, ticket_ids, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&attendee.id)
    .bind(&attendee.event_id)
    .bind(resolved_session_id)
    .bind(&attendee.name)
    .bind(&attendee.email)
    .bind(&attendee.phone)
    .bind(attendee.tickets.as_ref().map(to_json))
    .bind(&attendee.ticket_type)
    .bind(&attendee.session_id)
    .bind(attendee.selected_session.as_ref().map(to_json))
    .bind(&attendee.selected_date)
    .bind(attendee.selected_time_slot.as_ref().map(to_json))
    .bind(attendee.individual_amount)
    .bind(attendee.original_booking.as_ref().map(to_json))
    .bind(&attendee.payment_status)
    .bind(attendee.checked_in as i32)
    .bind(attendee.check_in_time.map(timestamp))
    .bind(&attendee.checked_in_by)
    .bind(attendee.ticket_ids.as_ref().map(to_json))
    .bind(timestamp(attendee.created_at))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_ticket_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    ticket: &Ticket,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO tickets (id, event_id, session_id, user_email, user_name, ticket_type, status, used_at, checked_in_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&ticket.id)
    .bind(&ticket.event_id)
    .bind(&ticket.session_id)
    .bind(&ticket.user_email)
    .bind(&ticket.user_name)
    .bind(&ticket.ticket_type)
    .bind(ticket.status.as_str())
    .bind(ticket.used_at.map(timestamp))
    .bind(&ticket.checked_in_by)
    .bind(timestamp(ticket.created_at))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// Helper functions for row conversion

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn parse_json<T: DeserializeOwned>(s: Option<String>) -> Option<T> {
    s.and_then(|s| serde_json::from_str(&s).ok())
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Event {
    let architecture: String = row.get("architecture");
    Event {
        id: row.get("id"),
        title: row.get("title"),
        organization_id: row.get("organization_id"),
        architecture: Architecture::from_str(&architecture).unwrap_or_default(),
        sessions: parse_json(row.get("sessions")).unwrap_or_default(),
        tickets: parse_json(row.get("tickets")).unwrap_or_default(),
        time_slots: parse_json(row.get("time_slots")).unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn attendee_from_row(row: &sqlx::sqlite::SqliteRow) -> Attendee {
    let checked_in: i32 = row.get("checked_in");
    let check_in_time: Option<String> = row.get("check_in_time");
    let created_at: String = row.get("created_at");
    Attendee {
        id: row.get("id"),
        event_id: row.get("event_id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        tickets: parse_json(row.get("tickets")),
        ticket_type: row.get("ticket_type"),
        session_id: row.get("session_id"),
        selected_session: parse_json(row.get("selected_session")),
        selected_date: row.get("selected_date"),
        selected_time_slot: parse_json(row.get("selected_time_slot")),
        individual_amount: row.get("individual_amount"),
        original_booking: parse_json(row.get("original_booking")),
        payment_status: row.get("payment_status"),
        checked_in: checked_in != 0,
        check_in_time: check_in_time.as_deref().and_then(parse_timestamp),
        checked_in_by: row.get("checked_in_by"),
        ticket_ids: parse_json(row.get("ticket_ids")),
        created_at: parse_timestamp(&created_at).unwrap_or_default(),
    }
}

fn ticket_from_row(row: &sqlx::sqlite::SqliteRow) -> Ticket {
    let status: String = row.get("status");
    let used_at: Option<String> = row.get("used_at");
    let created_at: String = row.get("created_at");
    Ticket {
        id: row.get("id"),
        event_id: row.get("event_id"),
        session_id: row.get("session_id"),
        user_email: row.get("user_email"),
        user_name: row.get("user_name"),
        ticket_type: row.get("ticket_type"),
        status: TicketStatus::from_str(&status).unwrap_or(TicketStatus::Active),
        used_at: used_at.as_deref().and_then(parse_timestamp),
        checked_in_by: row.get("checked_in_by"),
        created_at: parse_timestamp(&created_at).unwrap_or_default(),
    }
}
