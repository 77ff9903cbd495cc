//! Live attendee projection for the event dashboard.
//!
//! A projection mirrors the attendees and tickets of one event (optionally one
//! session) and refreshes whenever the store announces a write for that event.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::db::DocumentStore;
use crate::errors::AppError;
use crate::models::{Attendee, DashboardSnapshot, Event, Session, Ticket};
use crate::reconcile;
use crate::stats;

/// The (event, session) pair a projection follows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub event_id: String,
    pub session_id: Option<String>,
}

impl ViewKey {
    pub fn new(event_id: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            event_id: event_id.into(),
            session_id: session_id.filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Look up the event and the selected session, if any.
pub async fn resolve_selection(
    store: &dyn DocumentStore,
    key: &ViewKey,
) -> Result<(Event, Option<Session>), AppError> {
    let event = store
        .get_event(&key.event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", key.event_id)))?;

    let session = match &key.session_id {
        Some(sid) => Some(
            event
                .session(sid)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Session {} not found", sid)))?,
        ),
        None => None,
    };

    Ok((event, session))
}

/// Attendees of the selected session.
///
/// Uses the session index first. If that query fails the whole event is read
/// instead; either way the result goes through the same session match.
pub async fn session_attendees(
    store: &dyn DocumentStore,
    event_id: &str,
    session: &Session,
) -> Result<Vec<Attendee>, AppError> {
    match store.query_attendees(event_id, Some(&session.id)).await {
        Ok(attendees) => Ok(reconcile::filter_for_session(attendees, session)),
        Err(err) => {
            tracing::warn!(
                "Session-scoped attendee query failed for {}/{}, reading whole event: {}",
                event_id,
                session.id,
                err
            );
            let attendees = store.query_attendees(event_id, None).await?;
            Ok(reconcile::filter_for_session(attendees, session))
        }
    }
}

async fn session_tickets(
    store: &dyn DocumentStore,
    event_id: &str,
    session: &Session,
    attendees: &[Attendee],
) -> Result<Vec<Ticket>, AppError> {
    match store.query_tickets(event_id, Some(&session.id)).await {
        Ok(tickets) => Ok(tickets),
        Err(err) => {
            tracing::warn!(
                "Session-scoped ticket query failed for {}/{}, reading whole event: {}",
                event_id,
                session.id,
                err
            );
            let tickets = store.query_tickets(event_id, None).await?;
            Ok(tickets
                .into_iter()
                .filter(|t| {
                    t.session_id.as_deref() == Some(session.id.as_str())
                        || attendees.iter().any(|a| {
                            a.linked_ticket_ids()
                                .is_some_and(|ids| ids.contains(&t.id))
                        })
                })
                .collect())
        }
    }
}

/// Build one snapshot of the dashboard.
///
/// An unknown event or session is an error. Query failures that survive the
/// fallback are reported in `error` so the rest of the dashboard stays usable.
pub async fn load_snapshot(
    store: &dyn DocumentStore,
    key: &ViewKey,
) -> Result<DashboardSnapshot, AppError> {
    let (event, session) = resolve_selection(store, key).await?;
    let mut errors = Vec::new();

    let attendees = match store.query_attendees(&event.id, None).await {
        Ok(attendees) => attendees,
        Err(err) => {
            errors.push(format!("Attendees unavailable: {}", err.message()));
            Vec::new()
        }
    };

    let (session_attendees, tickets) = match &session {
        Some(session) => {
            let scoped = match session_attendees(store, &event.id, session).await {
                Ok(scoped) => scoped,
                Err(err) => {
                    errors.push(format!("Session attendees unavailable: {}", err.message()));
                    Vec::new()
                }
            };
            let tickets = match session_tickets(store, &event.id, session, &scoped).await {
                Ok(tickets) => tickets,
                Err(err) => {
                    errors.push(format!("Tickets unavailable: {}", err.message()));
                    Vec::new()
                }
            };
            (scoped, tickets)
        }
        None => {
            let tickets = match store.query_tickets(&event.id, None).await {
                Ok(tickets) => tickets,
                Err(err) => {
                    errors.push(format!("Tickets unavailable: {}", err.message()));
                    Vec::new()
                }
            };
            (attendees.clone(), tickets)
        }
    };

    let ticket_types = event.ticket_types_for(session.as_ref());
    let stats = stats::session_stats(&session_attendees, ticket_types);

    let error = if errors.is_empty() {
        None
    } else {
        let joined = errors.join("; ");
        tracing::error!("Dashboard panel for {} degraded: {}", event.id, joined);
        Some(joined)
    };

    Ok(DashboardSnapshot {
        event_id: event.id,
        session_id: session.map(|s| s.id),
        attendees,
        session_attendees,
        tickets,
        stats,
        last_refreshed: Utc::now(),
        error,
    })
}

/// A running subscription that keeps a snapshot current.
///
/// Dropping it stops the refresh task.
pub struct LiveProjection {
    key: ViewKey,
    snapshots: watch::Receiver<DashboardSnapshot>,
    task: JoinHandle<()>,
}

impl LiveProjection {
    /// Load the first snapshot and start following store changes.
    pub async fn start(store: Arc<dyn DocumentStore>, key: ViewKey) -> Result<Self, AppError> {
        // Subscribe before the first read so no write falls between the two.
        let mut changes = store.subscribe();
        let initial = load_snapshot(store.as_ref(), &key).await?;
        let (tx, snapshots) = watch::channel(initial);

        let task_key = key.clone();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.event_id != task_key.event_id => continue,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Projection lagged by {} changes, refreshing", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                // Coalesce a burst of writes into one refresh.
                while changes.try_recv().is_ok() {}

                match load_snapshot(store.as_ref(), &task_key).await {
                    Ok(snapshot) => {
                        if tx.send(snapshot).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::error!(
                            "Projection refresh failed for {:?}: {}",
                            task_key,
                            err
                        );
                        tx.send_modify(|snapshot| {
                            snapshot.error = Some(err.message());
                            snapshot.last_refreshed = Utc::now();
                        });
                    }
                }
            }
            tracing::debug!("Projection for {:?} stopped", task_key);
        });

        tracing::debug!("Projection for {:?} started", key);
        Ok(Self {
            key,
            snapshots,
            task,
        })
    }

    pub fn key(&self) -> &ViewKey {
        &self.key
    }

    /// A receiver that observes every refresh.
    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for LiveProjection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Owner of at most one live projection at a time.
///
/// Selecting a different event or session tears the previous subscription
/// down before the new one starts.
pub struct DashboardView {
    store: Arc<dyn DocumentStore>,
    current: Option<LiveProjection>,
}

impl DashboardView {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            current: None,
        }
    }

    /// Follow `key`, replacing any other selection.
    pub async fn select(
        &mut self,
        key: ViewKey,
    ) -> Result<watch::Receiver<DashboardSnapshot>, AppError> {
        if let Some(current) = &self.current {
            if current.key() == &key && current.is_running() {
                return Ok(current.subscribe());
            }
        }

        // Stop the old subscription first.
        self.current = None;

        let projection = LiveProjection::start(self.store.clone(), key).await?;
        let receiver = projection.subscribe();
        self.current = Some(projection);
        Ok(receiver)
    }

    pub fn selection(&self) -> Option<&ViewKey> {
        self.current.as_ref().map(LiveProjection::key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Architecture, AttendeeCheckInPatch, SelectedSession, TicketStatus, TicketStatusPatch,
        TicketType, TimeSlot,
    };
    use crate::db::StoreChange;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory store whose session-scoped queries can be made to fail.
    struct FakeStore {
        event: Event,
        attendees: Mutex<Vec<Attendee>>,
        fail_scoped: bool,
        fail_all: bool,
        scoped_calls: AtomicUsize,
        changes: broadcast::Sender<StoreChange>,
    }

    impl FakeStore {
        fn new(event: Event, attendees: Vec<Attendee>) -> Self {
            Self {
                event,
                attendees: Mutex::new(attendees),
                fail_scoped: false,
                fail_all: false,
                scoped_calls: AtomicUsize::new(0),
                changes: broadcast::channel(16).0,
            }
        }

        fn push(&self, attendee: Attendee) {
            let event_id = attendee.event_id.clone();
            self.attendees.lock().unwrap().insert(0, attendee);
            let _ = self.changes.send(StoreChange {
                collection: crate::db::Collection::Attendees,
                event_id,
                revision_id: 1,
            });
        }
    }

    #[async_trait]
    impl DocumentStore for FakeStore {
        fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
            self.changes.subscribe()
        }

        async fn get_event(&self, id: &str) -> Result<Option<Event>, AppError> {
            Ok((self.event.id == id).then(|| self.event.clone()))
        }

        async fn get_attendee(&self, id: &str) -> Result<Option<Attendee>, AppError> {
            Ok(self
                .attendees
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.id == id)
                .cloned())
        }

        async fn query_attendees(
            &self,
            event_id: &str,
            session_id: Option<&str>,
        ) -> Result<Vec<Attendee>, AppError> {
            match session_id {
                Some(sid) => {
                    self.scoped_calls.fetch_add(1, Ordering::SeqCst);
                    if self.fail_scoped {
                        return Err(AppError::Database("missing composite index".to_string()));
                    }
                    Ok(self
                        .attendees
                        .lock()
                        .unwrap()
                        .iter()
                        .filter(|a| a.event_id == event_id && a.session_id.as_deref() == Some(sid))
                        .cloned()
                        .collect())
                }
                None => {
                    if self.fail_all {
                        return Err(AppError::Database("backend unavailable".to_string()));
                    }
                    Ok(self
                        .attendees
                        .lock()
                        .unwrap()
                        .iter()
                        .filter(|a| a.event_id == event_id)
                        .cloned()
                        .collect())
                }
            }
        }

        async fn query_tickets(
            &self,
            _event_id: &str,
            _session_id: Option<&str>,
        ) -> Result<Vec<Ticket>, AppError> {
            Ok(Vec::new())
        }

        async fn get_ticket(&self, _id: &str) -> Result<Option<Ticket>, AppError> {
            Ok(None)
        }

        async fn find_tickets_by_email(
            &self,
            _event_id: &str,
            _email: &str,
            _status: TicketStatus,
        ) -> Result<Vec<Ticket>, AppError> {
            Ok(Vec::new())
        }

        async fn update_attendee_check_in(
            &self,
            id: &str,
            _patch: &AttendeeCheckInPatch,
        ) -> Result<Attendee, AppError> {
            Err(AppError::NotFound(id.to_string()))
        }

        async fn update_ticket_status(
            &self,
            id: &str,
            _patch: &TicketStatusPatch,
        ) -> Result<(), AppError> {
            Err(AppError::NotFound(id.to_string()))
        }
    }

    fn event() -> Event {
        Event {
            id: "e1".to_string(),
            title: "Jazz Nights".to_string(),
            organization_id: "org".to_string(),
            architecture: Architecture::SessionCentric,
            sessions: vec![Session {
                id: "s1".to_string(),
                name: Some("Friday".to_string()),
                date: "2026-07-03".to_string(),
                start_time: "20:00".to_string(),
                end_time: None,
                venue: None,
                ticket_types: vec![TicketType {
                    name: "General".to_string(),
                    capacity: 10,
                    price: 25.0,
                    available_capacity: 10,
                }],
                max_capacity: 10,
            }],
            tickets: vec![],
            time_slots: vec![],
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn attendee(id: &str) -> Attendee {
        Attendee {
            id: id.to_string(),
            event_id: "e1".to_string(),
            name: format!("Guest {}", id),
            email: format!("{}@example.com", id),
            phone: None,
            tickets: None,
            ticket_type: Some("General".to_string()),
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
        }
    }

    fn mixed_attendees() -> Vec<Attendee> {
        let mut direct = attendee("direct");
        direct.session_id = Some("s1".to_string());

        let mut legacy = attendee("legacy");
        legacy.selected_session = Some(SelectedSession {
            id: Some("s1".to_string()),
            ..Default::default()
        });

        let mut slot = attendee("slot");
        slot.session_id = Some("stale".to_string());
        slot.selected_date = Some("2026-07-03".to_string());
        slot.selected_time_slot = Some(TimeSlot {
            start_time: "20:00".to_string(),
            end_time: None,
        });

        let mut other = attendee("other");
        other.session_id = Some("s9".to_string());

        vec![direct, legacy, slot, other]
    }

    fn key() -> ViewKey {
        ViewKey::new("e1", Some("s1".to_string()))
    }

    #[tokio::test]
    async fn test_scoped_query_failure_falls_back_to_event_scan() {
        let mut store = FakeStore::new(event(), mixed_attendees());
        store.fail_scoped = true;

        let snapshot = load_snapshot(&store, &key()).await.unwrap();
        let ids: Vec<&str> = snapshot
            .session_attendees
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ids, vec!["direct", "legacy", "slot"]);
        assert_eq!(snapshot.attendees.len(), 4);
        assert!(snapshot.error.is_none());
        assert_eq!(store.scoped_calls.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot.stats.total_attendees, 3);
        assert_eq!(snapshot.stats.total_revenue, 0.0);
    }

    #[tokio::test]
    async fn test_failed_fallback_is_reported_on_the_panel() {
        let mut store = FakeStore::new(event(), mixed_attendees());
        store.fail_scoped = true;
        store.fail_all = true;

        let snapshot = load_snapshot(&store, &key()).await.unwrap();
        assert!(snapshot.session_attendees.is_empty());
        assert!(snapshot.error.unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let store = FakeStore::new(event(), vec![]);
        let result = load_snapshot(&store, &ViewKey::new("e1", Some("nope".to_string()))).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_live_projection_refreshes_on_change() {
        let store = Arc::new(FakeStore::new(event(), vec![]));
        let projection = LiveProjection::start(store.clone(), key()).await.unwrap();
        let mut snapshots = projection.subscribe();
        assert!(snapshots.borrow().session_attendees.is_empty());

        let mut newcomer = attendee("new");
        newcomer.session_id = Some("s1".to_string());
        store.push(newcomer);

        tokio::time::timeout(Duration::from_secs(2), snapshots.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshots.borrow().session_attendees.len(), 1);
    }

    #[tokio::test]
    async fn test_view_replaces_previous_subscription() {
        let store: Arc<dyn DocumentStore> = Arc::new(FakeStore::new(event(), vec![]));
        let mut view = DashboardView::new(store);

        let mut first = view.select(key()).await.unwrap();
        view.select(ViewKey::new("e1", None)).await.unwrap();
        assert_eq!(view.selection(), Some(&ViewKey::new("e1", None)));

        // The old refresh task is gone, so its sender is dropped.
        let closed = tokio::time::timeout(Duration::from_secs(2), first.changed())
            .await
            .unwrap();
        assert!(closed.is_err());
    }
}
