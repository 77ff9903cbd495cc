//! Attendee check-in state machine.
//!
//! An attendee moves `Eligible -> CheckingIn -> CheckedIn`, and back to
//! `Eligible` through an undo that stays available for a short window after
//! the check-in (or until the same operator checks someone else in).
//!
//! Each transition writes the attendee record and then, separately, every
//! associated ticket. The writes are not atomic: a failed attendee write aborts
//! the transition, while failed ticket writes are reported alongside the
//! successful result.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use crate::auth::{Operator, MANAGE_ATTENDEES};
use crate::db::DocumentStore;
use crate::errors::{AppError, IneligibleReason};
use crate::models::{
    Attendee, AttendeeCheckInPatch, CheckInOutcome, CheckInRequest, Event, Session, Ticket,
    TicketStatus, TicketStatusPatch, UndoOutcome, VerifiedTicket, VerifyEntryRequest,
    VerifyEntryResponse,
};
use crate::projection::{self, ViewKey};
use crate::reconcile;

/// Booking states that allow entry. Records written before payment tracking have none.
const QUALIFYING_STATUSES: &[&str] = &["completed", "paid", "confirmed", "free", "success", "active"];

/// Where an attendee stands in the check-in flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInState {
    Eligible,
    /// A check-in for this attendee is being written
    CheckingIn,
    CheckedIn,
    /// Checked in and still undoable by the operator who did it
    UndoPending { operator_id: String, expires_at: DateTime<Utc> },
}

/// Whether the attendee's booking or payment status allows check-in.
pub fn has_qualifying_status(attendee: &Attendee) -> bool {
    match attendee.payment_status.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(status) => QUALIFYING_STATUSES
            .iter()
            .any(|q| q.eq_ignore_ascii_case(status)),
    }
}

/// Guard evaluated before entering `CheckingIn`.
///
/// Order matters: permission, session selection, current state, booking
/// status, then the late-session warning which the operator can override.
pub fn check_eligibility(
    operator: &Operator,
    event: &Event,
    session: Option<&Session>,
    attendee: &Attendee,
    now: DateTime<Utc>,
    late_threshold: Duration,
    confirm_late: bool,
) -> Result<(), AppError> {
    operator.require(MANAGE_ATTENDEES)?;

    if event.is_session_centric() && session.is_none() {
        return Err(AppError::Ineligible(IneligibleReason::NoSession));
    }
    if attendee.checked_in {
        return Err(AppError::Ineligible(IneligibleReason::AlreadyCheckedIn));
    }
    if !has_qualifying_status(attendee) {
        return Err(AppError::Ineligible(IneligibleReason::Payment(
            attendee.payment_status.clone().unwrap_or_default(),
        )));
    }

    if let Some(starts_at) = session.and_then(Session::starts_at) {
        let elapsed = now.naive_utc() - starts_at;
        if elapsed > late_threshold && !confirm_late {
            return Err(AppError::Ineligible(IneligibleReason::LateSession {
                hours_late: elapsed.num_hours(),
            }));
        }
    }

    Ok(())
}

#[derive(Debug, Clone)]
struct PendingUndo {
    event_id: String,
    attendee_id: String,
    session_id: Option<String>,
    checked_in_at: DateTime<Utc>,
}

/// Undoable check-ins, one per operator, indexed both ways.
#[derive(Debug, Default)]
struct UndoSlots {
    by_operator: HashMap<String, PendingUndo>,
    /// attendee id -> operator holding the slot
    by_attendee: HashMap<String, String>,
}

impl UndoSlots {
    /// Give `operator_id` a new slot, replacing its previous one and any stale
    /// slot another operator still holds for the same attendee.
    fn record(&mut self, operator_id: &str, pending: PendingUndo) {
        self.remove(operator_id);
        if let Some(previous) = self.by_attendee.get(&pending.attendee_id).cloned() {
            self.remove(&previous);
        }
        self.by_attendee
            .insert(pending.attendee_id.clone(), operator_id.to_string());
        self.by_operator.insert(operator_id.to_string(), pending);
    }

    fn for_attendee(&self, attendee_id: &str) -> Option<(&String, &PendingUndo)> {
        let operator_id = self.by_attendee.get(attendee_id)?;
        self.by_operator.get(operator_id).map(|p| (operator_id, p))
    }

    fn get(&self, operator_id: &str) -> Option<&PendingUndo> {
        self.by_operator.get(operator_id)
    }

    fn remove(&mut self, operator_id: &str) -> Option<PendingUndo> {
        let pending = self.by_operator.remove(operator_id)?;
        if self.by_attendee.get(&pending.attendee_id).map(String::as_str) == Some(operator_id) {
            self.by_attendee.remove(&pending.attendee_id);
        }
        Some(pending)
    }
}

/// Marks an attendee as `CheckingIn` for as long as it lives.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    attendee_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.attendee_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs check-in, undo and entry verification against a document store.
pub struct CheckInService {
    store: Arc<dyn DocumentStore>,
    undo_window: Duration,
    late_threshold: Duration,
    /// Latest undoable check-in per operator
    undo: Mutex<UndoSlots>,
    in_flight: Mutex<HashSet<String>>,
}

impl CheckInService {
    pub fn new(store: Arc<dyn DocumentStore>, undo_window: Duration, late_threshold: Duration) -> Self {
        Self {
            store,
            undo_window,
            late_threshold,
            undo: Mutex::new(UndoSlots::default()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn late_threshold(&self) -> Duration {
        self.late_threshold
    }

    /// Current state of an attendee as seen by this service.
    pub fn state_of(&self, attendee: &Attendee, now: DateTime<Utc>) -> CheckInState {
        if lock(&self.in_flight).contains(&attendee.id) {
            return CheckInState::CheckingIn;
        }
        if !attendee.checked_in {
            return CheckInState::Eligible;
        }

        let undo = lock(&self.undo);
        match undo.for_attendee(&attendee.id) {
            Some((operator_id, p)) if now - p.checked_in_at <= self.undo_window => {
                CheckInState::UndoPending {
                    operator_id: operator_id.clone(),
                    expires_at: p.checked_in_at + self.undo_window,
                }
            }
            _ => CheckInState::CheckedIn,
        }
    }

    /// Manual check-in from the attendee list.
    pub async fn check_in(
        &self,
        operator: &Operator,
        event_id: &str,
        attendee_id: &str,
        request: &CheckInRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckInOutcome, AppError> {
        operator.require(MANAGE_ATTENDEES)?;

        let key = ViewKey::new(event_id, request.session_id.clone());
        let (event, session) = projection::resolve_selection(self.store.as_ref(), &key).await?;
        let attendee = self.load_attendee(event_id, attendee_id).await?;

        if let Some(session) = &session {
            if !reconcile::matches_session(&attendee, session) {
                return Err(AppError::Validation(format!(
                    "{} is not booked for {}",
                    attendee.name,
                    session.display_name()
                )));
            }
        }

        check_eligibility(
            operator,
            &event,
            session.as_ref(),
            &attendee,
            now,
            self.late_threshold,
            request.confirm_late,
        )?;

        self.perform_check_in(operator, &event, session.as_ref(), attendee, now)
            .await
    }

    /// `Eligible -> CheckedIn` for an attendee that already passed the guard.
    pub async fn perform_check_in(
        &self,
        operator: &Operator,
        event: &Event,
        session: Option<&Session>,
        attendee: Attendee,
        now: DateTime<Utc>,
    ) -> Result<CheckInOutcome, AppError> {
        let _in_flight = self.begin(&attendee.id)?;

        // Another desk may have admitted the attendee since the guard ran.
        if let Some(current) = self.store.get_attendee(&attendee.id).await? {
            if current.checked_in {
                return Err(AppError::Ineligible(IneligibleReason::AlreadyCheckedIn));
            }
        }

        let updated = self
            .store
            .update_attendee_check_in(
                &attendee.id,
                &AttendeeCheckInPatch {
                    checked_in: true,
                    check_in_time: Some(now),
                    checked_in_by: Some(operator.id.clone()),
                },
            )
            .await?;

        let targets = self
            .associated_tickets(&attendee, event, session, TicketStatus::Active)
            .await;
        let patch = TicketStatusPatch {
            status: TicketStatus::Used,
            used_at: Some(now),
            checked_in_by: Some(operator.id.clone()),
        };
        let failed = self.apply_ticket_patch(&targets, &patch).await;
        let tickets_updated = targets.len() - failed.len();

        let warning = if targets.is_empty() {
            Some("no tickets were found to mark as used".to_string())
        } else if !failed.is_empty() {
            Some(format!(
                "{} of {} tickets could not be marked as used",
                failed.len(),
                targets.len()
            ))
        } else {
            None
        };

        let mut message = format!("{} checked in", updated.name);
        if let Some(warning) = &warning {
            message.push_str(&format!(" (warning: {})", warning));
        }

        // A new check-in supersedes the operator's previous undo.
        lock(&self.undo).record(
            &operator.id,
            PendingUndo {
                event_id: event.id.clone(),
                attendee_id: updated.id.clone(),
                session_id: session.map(|s| s.id.clone()),
                checked_in_at: now,
            },
        );

        tracing::info!(
            attendee = %updated.id,
            operator = %operator.id,
            tickets_updated,
            tickets_failed = failed.len(),
            "Attendee checked in"
        );

        Ok(CheckInOutcome {
            attendee: updated,
            tickets_updated,
            failed_ticket_ids: failed,
            message,
            warning,
            undo_expires_at: now + self.undo_window,
        })
    }

    /// `CheckedIn -> Eligible` within the undo window.
    pub async fn undo(
        &self,
        operator: &Operator,
        event_id: &str,
        attendee_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UndoOutcome, AppError> {
        operator.require(MANAGE_ATTENDEES)?;

        let attendee = self.load_attendee(event_id, attendee_id).await?;
        let pending = match self.state_of(&attendee, now) {
            CheckInState::UndoPending { operator_id, .. } if operator_id == operator.id => {
                lock(&self.undo).get(&operator.id).cloned()
            }
            _ => None,
        };
        let Some(pending) = pending.filter(|p| p.event_id == event_id) else {
            self.forget_expired(&operator.id, attendee_id, now);
            return Err(AppError::UndoExpired(format!(
                "Check-in of {} can no longer be undone",
                attendee.name
            )));
        };

        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
        let session = pending
            .session_id
            .as_deref()
            .and_then(|sid| event.session(sid));

        let updated = self
            .store
            .update_attendee_check_in(
                &attendee.id,
                &AttendeeCheckInPatch {
                    checked_in: false,
                    check_in_time: None,
                    checked_in_by: None,
                },
            )
            .await?;

        let targets = self
            .associated_tickets(&attendee, &event, session, TicketStatus::Used)
            .await;
        let patch = TicketStatusPatch {
            status: TicketStatus::Active,
            used_at: None,
            checked_in_by: None,
        };
        let failed = self.apply_ticket_patch(&targets, &patch).await;

        lock(&self.undo).remove(&operator.id);

        tracing::info!(
            attendee = %updated.id,
            operator = %operator.id,
            tickets_failed = failed.len(),
            "Check-in undone"
        );

        Ok(UndoOutcome {
            message: format!("Check-in undone for {}", updated.name),
            attendee: updated,
            tickets_restored: targets.len() - failed.len(),
            failed_ticket_ids: failed,
        })
    }

    /// Authoritative entry check for a single ticket id.
    ///
    /// Refusals are answers, not errors; only store failures are returned as `Err`.
    pub async fn verify_entry(
        &self,
        operator: &Operator,
        request: &VerifyEntryRequest,
        now: DateTime<Utc>,
    ) -> Result<VerifyEntryResponse, AppError> {
        operator.require(MANAGE_ATTENDEES)?;

        let Some(ticket) = self.store.get_ticket(request.ticket_id.trim()).await? else {
            return Ok(VerifyEntryResponse::refused("Ticket not found"));
        };
        if ticket.event_id != request.event_id {
            return Ok(VerifyEntryResponse::refused(
                "Ticket is not valid for this event",
            ));
        }
        if let (Some(wanted), Some(actual)) = (&request.session_id, &ticket.session_id) {
            if wanted != actual {
                return Ok(VerifyEntryResponse::refused(
                    "Ticket is for a different session",
                ));
            }
        }
        match ticket.status {
            TicketStatus::Active => {}
            TicketStatus::Used => {
                return Ok(VerifyEntryResponse::refused("Ticket has already been used"))
            }
            TicketStatus::Cancelled => {
                return Ok(VerifyEntryResponse::refused("Ticket has been cancelled"))
            }
            TicketStatus::Expired => return Ok(VerifyEntryResponse::refused("Ticket has expired")),
        }

        self.store
            .update_ticket_status(
                &ticket.id,
                &TicketStatusPatch {
                    status: TicketStatus::Used,
                    used_at: Some(now),
                    checked_in_by: Some(operator.id.clone()),
                },
            )
            .await?;

        let owner = self.ticket_owner(&ticket).await;
        if let Some(owner) = owner.as_ref().filter(|a| !a.checked_in) {
            let patch = AttendeeCheckInPatch {
                checked_in: true,
                check_in_time: Some(now),
                checked_in_by: Some(operator.id.clone()),
            };
            if let Err(err) = self.store.update_attendee_check_in(&owner.id, &patch).await {
                tracing::warn!(
                    "Ticket {} admitted but attendee {} was not updated: {}",
                    ticket.id,
                    owner.id,
                    err
                );
            }
        }

        let user_name = ticket
            .user_name
            .clone()
            .or_else(|| owner.as_ref().map(|a| a.name.clone()))
            .unwrap_or_else(|| ticket.user_email.clone());

        tracing::info!(ticket = %ticket.id, operator = %operator.id, "Entry verified");

        Ok(VerifyEntryResponse::accepted(VerifiedTicket {
            id: ticket.id,
            user_name,
            user_email: ticket.user_email,
            ticket_type: ticket.ticket_type,
            session_id: ticket.session_id,
        }))
    }

    async fn load_attendee(&self, event_id: &str, attendee_id: &str) -> Result<Attendee, AppError> {
        self.store
            .get_attendee(attendee_id)
            .await?
            .filter(|a| a.event_id == event_id)
            .ok_or_else(|| AppError::NotFound(format!("Attendee {} not found", attendee_id)))
    }

    fn begin(&self, attendee_id: &str) -> Result<InFlight<'_>, AppError> {
        if !lock(&self.in_flight).insert(attendee_id.to_string()) {
            return Err(AppError::Validation(
                "A check-in for this attendee is already in progress".to_string(),
            ));
        }
        Ok(InFlight {
            set: &self.in_flight,
            attendee_id: attendee_id.to_string(),
        })
    }

    fn forget_expired(&self, operator_id: &str, attendee_id: &str, now: DateTime<Utc>) {
        let mut undo = lock(&self.undo);
        let expired = undo
            .get(operator_id)
            .is_some_and(|p| p.attendee_id == attendee_id && now - p.checked_in_at > self.undo_window);
        if expired {
            undo.remove(operator_id);
        }
    }

    /// Ticket ids a transition should touch.
    ///
    /// Records with back-references use them; older records are matched by
    /// email within the event, restricted to the session when one is known.
    async fn associated_tickets(
        &self,
        attendee: &Attendee,
        event: &Event,
        session: Option<&Session>,
        current_status: TicketStatus,
    ) -> Vec<String> {
        if let Some(ids) = attendee.linked_ticket_ids() {
            return ids.to_vec();
        }

        match self
            .store
            .find_tickets_by_email(&event.id, &attendee.email, current_status)
            .await
        {
            Ok(tickets) => tickets
                .into_iter()
                .filter(|t| ticket_in_session(t, session))
                .map(|t| t.id)
                .collect(),
            Err(err) => {
                tracing::warn!(
                    "Ticket lookup by email failed for attendee {}: {}",
                    attendee.id,
                    err
                );
                Vec::new()
            }
        }
    }

    /// Write `patch` to every ticket, returning the ids that failed.
    async fn apply_ticket_patch(&self, ticket_ids: &[String], patch: &TicketStatusPatch) -> Vec<String> {
        let mut failed = Vec::new();
        for id in ticket_ids {
            if let Err(err) = self.store.update_ticket_status(id, patch).await {
                tracing::warn!(
                    "Failed to set ticket {} to {}: {}",
                    id,
                    patch.status.as_str(),
                    err
                );
                failed.push(id.clone());
            }
        }
        failed
    }

    async fn ticket_owner(&self, ticket: &Ticket) -> Option<Attendee> {
        let attendees = match self.store.query_attendees(&ticket.event_id, None).await {
            Ok(attendees) => attendees,
            Err(err) => {
                tracing::warn!("Could not look up owner of ticket {}: {}", ticket.id, err);
                return None;
            }
        };

        let by_link = attendees
            .iter()
            .find(|a| a.linked_ticket_ids().is_some_and(|ids| ids.contains(&ticket.id)));
        by_link
            .or_else(|| {
                attendees
                    .iter()
                    .find(|a| a.linked_ticket_ids().is_none() && a.email == ticket.user_email)
            })
            .cloned()
    }
}

fn ticket_in_session(ticket: &Ticket, session: Option<&Session>) -> bool {
    match (session, ticket.session_id.as_deref()) {
        (Some(session), Some(ticket_session)) => ticket_session == session.id,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Repository, StoreChange};
    use crate::models::{
        Architecture, CreateEventRequest, CreateSessionRequest, CreateTicketTypeRequest,
        RegisterAttendeeRequest, SelectedSession,
    };
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    /// Delegates to a real repository but refuses chosen writes.
    struct FlakyStore {
        inner: Arc<Repository>,
        /// Tickets whose writes fail
        failing: HashSet<String>,
        /// Only fail ticket writes moving to this status; `None` fails them all
        failing_status: Option<TicketStatus>,
        fail_attendee_writes: bool,
    }

    impl FlakyStore {
        fn new(inner: Arc<Repository>) -> Self {
            Self {
                inner,
                failing: HashSet::new(),
                failing_status: None,
                fail_attendee_writes: false,
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
            self.inner.subscribe()
        }

        async fn get_event(&self, id: &str) -> Result<Option<Event>, AppError> {
            self.inner.get_event(id).await
        }

        async fn get_attendee(&self, id: &str) -> Result<Option<Attendee>, AppError> {
            self.inner.get_attendee(id).await
        }

        async fn query_attendees(
            &self,
            event_id: &str,
            session_id: Option<&str>,
        ) -> Result<Vec<Attendee>, AppError> {
            self.inner.query_attendees(event_id, session_id).await
        }

        async fn query_tickets(
            &self,
            event_id: &str,
            session_id: Option<&str>,
        ) -> Result<Vec<Ticket>, AppError> {
            self.inner.query_tickets(event_id, session_id).await
        }

        async fn get_ticket(&self, id: &str) -> Result<Option<Ticket>, AppError> {
            self.inner.get_ticket(id).await
        }

        async fn find_tickets_by_email(
            &self,
            event_id: &str,
            email: &str,
            status: TicketStatus,
        ) -> Result<Vec<Ticket>, AppError> {
            self.inner.find_tickets_by_email(event_id, email, status).await
        }

        async fn update_attendee_check_in(
            &self,
            id: &str,
            patch: &AttendeeCheckInPatch,
        ) -> Result<Attendee, AppError> {
            if self.fail_attendee_writes {
                return Err(AppError::Database("attendee write rejected".to_string()));
            }
            self.inner.update_attendee_check_in(id, patch).await
        }

        async fn update_ticket_status(
            &self,
            id: &str,
            patch: &TicketStatusPatch,
        ) -> Result<(), AppError> {
            let status_matches = self.failing_status.map_or(true, |s| s == patch.status);
            if self.failing.contains(id) && status_matches {
                return Err(AppError::Database("write rejected".to_string()));
            }
            self.inner.update_ticket_status(id, patch).await
        }
    }

    struct Desk {
        repo: Arc<Repository>,
        event: Event,
        _dir: TempDir,
    }

    impl Desk {
        async fn open() -> Self {
            let dir = TempDir::new().unwrap();
            let pool = crate::db::init_database(&dir.path().join("desk.sqlite"))
                .await
                .unwrap();
            let repo = Arc::new(Repository::new(pool));
            let event = repo
                .create_event(&CreateEventRequest {
                    title: "Harbour Festival".to_string(),
                    organization_id: "org-1".to_string(),
                    architecture: Architecture::SessionCentric,
                    sessions: vec![CreateSessionRequest {
                        name: Some("Opening night".to_string()),
                        date: "2026-06-01".to_string(),
                        start_time: "19:00".to_string(),
                        end_time: None,
                        venue: None,
                        ticket_types: vec![CreateTicketTypeRequest {
                            name: "General".to_string(),
                            capacity: 50,
                            price: 20.0,
                        }],
                        max_capacity: None,
                    }],
                    tickets: vec![],
                    time_slots: vec![],
                })
                .await
                .unwrap();
            Self {
                repo,
                event,
                _dir: dir,
            }
        }

        fn service(&self) -> CheckInService {
            CheckInService::new(self.repo.clone(), Duration::seconds(30), Duration::hours(3))
        }

        fn session_id(&self) -> String {
            self.event.sessions[0].id.clone()
        }

        fn request(&self) -> CheckInRequest {
            CheckInRequest {
                session_id: Some(self.session_id()),
                confirm_late: false,
            }
        }

        async fn book(&self, name: &str, seats: u32, payment: Option<&str>) -> (Attendee, Vec<Ticket>) {
            self.repo
                .register_attendee(
                    &self.event.id,
                    &RegisterAttendeeRequest {
                        name: name.to_string(),
                        email: format!("{}@example.com", name.to_lowercase()),
                        phone: None,
                        session_id: Some(self.session_id()),
                        selected_date: None,
                        selected_time_slot: None,
                        tickets: BTreeMap::from([("General".to_string(), seats)]),
                        payment_status: payment.map(str::to_string),
                    },
                )
                .await
                .unwrap()
        }

        async fn status_of(&self, ticket_id: &str) -> TicketStatus {
            self.repo.get_ticket(ticket_id).await.unwrap().unwrap().status
        }
    }

    fn staff() -> Operator {
        Operator::new("door-1", &[MANAGE_ATTENDEES])
    }

    fn doors_open() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 19, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn test_check_in_marks_attendee_and_tickets() {
        let desk = Desk::open().await;
        let service = desk.service();
        let (ada, tickets) = desk.book("Ada", 2, Some("completed")).await;

        let outcome = service
            .check_in(&staff(), &desk.event.id, &ada.id, &desk.request(), doors_open())
            .await
            .unwrap();
        assert!(outcome.attendee.checked_in);
        assert_eq!(outcome.attendee.checked_in_by.as_deref(), Some("door-1"));
        assert_eq!(outcome.tickets_updated, 2);
        assert!(outcome.warning.is_none());
        assert_eq!(outcome.undo_expires_at, doors_open() + Duration::seconds(30));
        for ticket in &tickets {
            assert_eq!(desk.status_of(&ticket.id).await, TicketStatus::Used);
        }

        let again = service
            .check_in(&staff(), &desk.event.id, &ada.id, &desk.request(), doors_open())
            .await
            .unwrap_err();
        assert!(matches!(
            again,
            AppError::Ineligible(IneligibleReason::AlreadyCheckedIn)
        ));
        assert_eq!(again.details().unwrap()["reason"], "status");
    }

    #[tokio::test]
    async fn test_undo_within_window_restores_tickets() {
        let desk = Desk::open().await;
        let service = desk.service();
        let (ada, tickets) = desk.book("Ada", 2, None).await;

        service
            .check_in(&staff(), &desk.event.id, &ada.id, &desk.request(), doors_open())
            .await
            .unwrap();
        let stored = desk.repo.get_attendee(&ada.id).await.unwrap().unwrap();
        assert!(matches!(
            service.state_of(&stored, doors_open() + Duration::seconds(10)),
            CheckInState::UndoPending { .. }
        ));

        let undone = service
            .undo(&staff(), &desk.event.id, &ada.id, doors_open() + Duration::seconds(10))
            .await
            .unwrap();
        assert!(!undone.attendee.checked_in);
        assert!(undone.attendee.check_in_time.is_none());
        assert_eq!(undone.tickets_restored, 2);
        for ticket in &tickets {
            assert_eq!(desk.status_of(&ticket.id).await, TicketStatus::Active);
        }
        assert_eq!(service.state_of(&undone.attendee, doors_open()), CheckInState::Eligible);
    }

    #[tokio::test]
    async fn test_undo_after_window_is_refused() {
        let desk = Desk::open().await;
        let service = desk.service();
        let (ada, tickets) = desk.book("Ada", 1, None).await;

        service
            .check_in(&staff(), &desk.event.id, &ada.id, &desk.request(), doors_open())
            .await
            .unwrap();
        let err = service
            .undo(&staff(), &desk.event.id, &ada.id, doors_open() + Duration::seconds(31))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UndoExpired(_)));

        let stored = desk.repo.get_attendee(&ada.id).await.unwrap().unwrap();
        assert!(stored.checked_in);
        assert_eq!(desk.status_of(&tickets[0].id).await, TicketStatus::Used);
        assert_eq!(
            service.state_of(&stored, doors_open() + Duration::seconds(31)),
            CheckInState::CheckedIn
        );
    }

    #[tokio::test]
    async fn test_next_check_in_supersedes_undo() {
        let desk = Desk::open().await;
        let service = desk.service();
        let (ada, _) = desk.book("Ada", 1, None).await;
        let (bo, _) = desk.book("Bo", 1, None).await;

        for id in [&ada.id, &bo.id] {
            service
                .check_in(&staff(), &desk.event.id, id, &desk.request(), doors_open())
                .await
                .unwrap();
        }

        let err = service
            .undo(&staff(), &desk.event.id, &ada.id, doors_open())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UndoExpired(_)));
        assert!(service
            .undo(&staff(), &desk.event.id, &bo.id, doors_open())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_guard_rejections_write_nothing() {
        let desk = Desk::open().await;
        let service = desk.service();
        let (unpaid, tickets) = desk.book("Cy", 1, Some("pending")).await;

        let viewer = Operator::new("viewer", &["view_reports"]);
        let err = service
            .check_in(&viewer, &desk.event.id, &unpaid.id, &desk.request(), doors_open())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let no_session = CheckInRequest::default();
        let err = service
            .check_in(&staff(), &desk.event.id, &unpaid.id, &no_session, doors_open())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Ineligible(IneligibleReason::NoSession)));

        let err = service
            .check_in(&staff(), &desk.event.id, &unpaid.id, &desk.request(), doors_open())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Ineligible(IneligibleReason::Payment(_))));

        let stored = desk.repo.get_attendee(&unpaid.id).await.unwrap().unwrap();
        assert!(!stored.checked_in);
        assert_eq!(desk.status_of(&tickets[0].id).await, TicketStatus::Active);
    }

    #[tokio::test]
    async fn test_late_session_needs_confirmation() {
        let desk = Desk::open().await;
        let service = desk.service();
        let (ada, _) = desk.book("Ada", 1, Some("paid")).await;
        let late = Utc.with_ymd_and_hms(2026, 6, 1, 23, 30, 0).unwrap();

        let err = service
            .check_in(&staff(), &desk.event.id, &ada.id, &desk.request(), late)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Ineligible(IneligibleReason::LateSession { hours_late: 4 })
        ));
        assert_eq!(err.error_code(), crate::errors::codes::CONFIRMATION_REQUIRED);

        let confirmed = CheckInRequest {
            confirm_late: true,
            ..desk.request()
        };
        let outcome = service
            .check_in(&staff(), &desk.event.id, &ada.id, &confirmed, late)
            .await
            .unwrap();
        assert!(outcome.attendee.checked_in);
    }

    #[tokio::test]
    async fn test_failed_ticket_write_is_reported() {
        let desk = Desk::open().await;
        let (ada, tickets) = desk.book("Ada", 2, None).await;
        let store = FlakyStore {
            failing: HashSet::from([tickets[1].id.clone()]),
            ..FlakyStore::new(desk.repo.clone())
        };
        let service = CheckInService::new(Arc::new(store), Duration::seconds(30), Duration::hours(3));

        let outcome = service
            .check_in(&staff(), &desk.event.id, &ada.id, &desk.request(), doors_open())
            .await
            .unwrap();
        assert!(outcome.attendee.checked_in);
        assert_eq!(outcome.tickets_updated, 1);
        assert_eq!(outcome.failed_ticket_ids, vec![tickets[1].id.clone()]);
        assert!(outcome.message.contains("warning"));
        assert_eq!(desk.status_of(&tickets[0].id).await, TicketStatus::Used);
        assert_eq!(desk.status_of(&tickets[1].id).await, TicketStatus::Active);
    }

    #[tokio::test]
    async fn test_failed_attendee_write_aborts_check_in() {
        let desk = Desk::open().await;
        let (ada, tickets) = desk.book("Ada", 2, None).await;
        let store = FlakyStore {
            fail_attendee_writes: true,
            ..FlakyStore::new(desk.repo.clone())
        };
        let service = CheckInService::new(Arc::new(store), Duration::seconds(30), Duration::hours(3));

        let err = service
            .check_in(&staff(), &desk.event.id, &ada.id, &desk.request(), doors_open())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        let stored = desk.repo.get_attendee(&ada.id).await.unwrap().unwrap();
        assert!(!stored.checked_in);
        for ticket in &tickets {
            assert_eq!(desk.status_of(&ticket.id).await, TicketStatus::Active);
        }
        assert!(lock(&service.undo).get("door-1").is_none());
        assert_eq!(service.state_of(&stored, doors_open()), CheckInState::Eligible);

        let undo = service
            .undo(&staff(), &desk.event.id, &ada.id, doors_open())
            .await
            .unwrap_err();
        assert!(matches!(undo, AppError::UndoExpired(_)));
    }

    #[tokio::test]
    async fn test_undo_clears_slot_when_ticket_reversal_fails() {
        let desk = Desk::open().await;
        let (ada, tickets) = desk.book("Ada", 2, None).await;
        let store = FlakyStore {
            failing: HashSet::from([tickets[0].id.clone()]),
            failing_status: Some(TicketStatus::Active),
            ..FlakyStore::new(desk.repo.clone())
        };
        let service = CheckInService::new(Arc::new(store), Duration::seconds(30), Duration::hours(3));

        let checked_in = service
            .check_in(&staff(), &desk.event.id, &ada.id, &desk.request(), doors_open())
            .await
            .unwrap();
        assert!(checked_in.failed_ticket_ids.is_empty());

        let later = doors_open() + Duration::seconds(5);
        let undone = service
            .undo(&staff(), &desk.event.id, &ada.id, later)
            .await
            .unwrap();
        assert!(!undone.attendee.checked_in);
        assert_eq!(undone.tickets_restored, 1);
        assert_eq!(undone.failed_ticket_ids, vec![tickets[0].id.clone()]);
        assert_eq!(desk.status_of(&tickets[0].id).await, TicketStatus::Used);
        assert_eq!(desk.status_of(&tickets[1].id).await, TicketStatus::Active);
        assert!(lock(&service.undo).get("door-1").is_none());

        let again = service
            .undo(&staff(), &desk.event.id, &ada.id, later)
            .await
            .unwrap_err();
        assert!(matches!(again, AppError::UndoExpired(_)));
    }

    #[tokio::test]
    async fn test_undo_pending_follows_latest_check_in() {
        let desk = Desk::open().await;
        let service = desk.service();
        let (ada, _) = desk.book("Ada", 1, None).await;
        let second_desk = Operator::new("door-2", &[MANAGE_ATTENDEES]);

        service
            .check_in(&staff(), &desk.event.id, &ada.id, &desk.request(), doors_open())
            .await
            .unwrap();
        // The record is reset outside the desk, leaving door-1's slot behind.
        desk.repo
            .update_attendee_check_in(
                &ada.id,
                &AttendeeCheckInPatch {
                    checked_in: false,
                    check_in_time: None,
                    checked_in_by: None,
                },
            )
            .await
            .unwrap();

        let later = doors_open() + Duration::seconds(5);
        let outcome = service
            .check_in(&second_desk, &desk.event.id, &ada.id, &desk.request(), later)
            .await
            .unwrap();

        assert_eq!(
            service.state_of(&outcome.attendee, later),
            CheckInState::UndoPending {
                operator_id: "door-2".to_string(),
                expires_at: later + Duration::seconds(30),
            }
        );
        assert!(lock(&service.undo).get("door-1").is_none());

        let err = service
            .undo(&staff(), &desk.event.id, &ada.id, later)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UndoExpired(_)));
        assert!(service
            .undo(&second_desk, &desk.event.id, &ada.id, later)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unlinked_tickets_found_by_email_within_session() {
        let desk = Desk::open().await;
        let service = desk.service();
        let session_id = desk.session_id();

        let legacy = Attendee {
            id: "legacy-1".to_string(),
            event_id: desk.event.id.clone(),
            name: "Dee".to_string(),
            email: "dee@example.com".to_string(),
            phone: None,
            tickets: None,
            ticket_type: Some("General".to_string()),
            session_id: None,
            selected_session: Some(SelectedSession {
                id: Some(session_id.clone()),
                ..Default::default()
            }),
            selected_date: None,
            selected_time_slot: None,
            individual_amount: None,
            original_booking: None,
            payment_status: None,
            checked_in: false,
            check_in_time: None,
            checked_in_by: None,
            ticket_ids: None,
            created_at: doors_open(),
        };
        desk.repo.insert_attendee(&legacy).await.unwrap();

        let ticket = |id: &str, session: &str| Ticket {
            id: id.to_string(),
            event_id: desk.event.id.clone(),
            session_id: Some(session.to_string()),
            user_email: "dee@example.com".to_string(),
            user_name: None,
            ticket_type: Some("General".to_string()),
            status: TicketStatus::Active,
            used_at: None,
            checked_in_by: None,
            created_at: doors_open(),
        };
        desk.repo.insert_ticket(&ticket("t-here", &session_id)).await.unwrap();
        desk.repo.insert_ticket(&ticket("t-elsewhere", "other-session")).await.unwrap();

        let outcome = service
            .check_in(&staff(), &desk.event.id, &legacy.id, &desk.request(), doors_open())
            .await
            .unwrap();
        assert_eq!(outcome.tickets_updated, 1);
        assert_eq!(desk.status_of("t-here").await, TicketStatus::Used);
        assert_eq!(desk.status_of("t-elsewhere").await, TicketStatus::Active);
    }

    #[tokio::test]
    async fn test_verify_entry_admits_once() {
        let desk = Desk::open().await;
        let service = desk.service();
        let (ada, tickets) = desk.book("Ada", 1, None).await;

        let request = VerifyEntryRequest {
            ticket_id: tickets[0].id.clone(),
            event_id: desk.event.id.clone(),
            session_id: Some(desk.session_id()),
        };
        let first = service.verify_entry(&staff(), &request, doors_open()).await.unwrap();
        assert!(first.success);
        assert_eq!(first.ticket.as_ref().unwrap().user_name, "Ada");
        assert!(desk.repo.get_attendee(&ada.id).await.unwrap().unwrap().checked_in);

        let second = service.verify_entry(&staff(), &request, doors_open()).await.unwrap();
        assert!(!second.success);
        assert_eq!(second.message.as_deref(), Some("Ticket has already been used"));

        let wrong_event = VerifyEntryRequest {
            event_id: "another-event".to_string(),
            ..request
        };
        let refused = service
            .verify_entry(&staff(), &wrong_event, doors_open())
            .await
            .unwrap();
        assert!(!refused.success);
    }

    #[test]
    fn test_payment_status_predicate() {
        let mut attendee = Attendee {
            id: "a".to_string(),
            event_id: "e".to_string(),
            name: "A".to_string(),
            email: "a@example.com".to_string(),
            phone: None,
            tickets: None,
            ticket_type: None,
            session_id: None,
            selected_session: None,
            selected_date: None,
            selected_time_slot: None,
            individual_amount: None,
            original_booking: None,
            payment_status: None,
            checked_in: false,
            check_in_time: None,
            checked_in_by: None,
            ticket_ids: None,
            created_at: Utc::now(),
        };
        assert!(has_qualifying_status(&attendee));
        attendee.payment_status = Some("Completed".to_string());
        assert!(has_qualifying_status(&attendee));
        attendee.payment_status = Some("refunded".to_string());
        assert!(!has_qualifying_status(&attendee));
    }
}
