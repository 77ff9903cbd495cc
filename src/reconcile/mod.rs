//! Attendee-to-session reconciliation.
//!
//! Attendee records point at their session in one of three ways depending on
//! when they were written. All matching goes through this module so query
//! sites never repeat the fallback chain.

use crate::models::{Attendee, Event, Session};

/// How an attendee record refers to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLink {
    /// Authoritative `sessionId`
    Direct(String),
    /// `selectedSession.id` written by the older booking flow
    Legacy(String),
    /// Only a date and start time are known
    Slot { date: String, start_time: String },
    Unlinked,
}

impl SessionLink {
    /// The strongest reference present on the record.
    pub fn of(attendee: &Attendee) -> Self {
        if let Some(id) = non_empty(attendee.session_id.as_deref()) {
            return SessionLink::Direct(id.to_string());
        }
        if let Some(id) = attendee
            .selected_session
            .as_ref()
            .and_then(|s| non_empty(s.id.as_deref()))
        {
            return SessionLink::Legacy(id.to_string());
        }
        match slot_of(attendee) {
            Some((date, start_time)) => SessionLink::Slot {
                date: date.to_string(),
                start_time: start_time.to_string(),
            },
            None => SessionLink::Unlinked,
        }
    }
}

/// Whether an attendee belongs to `session`.
///
/// Tries each tier in turn: exact `sessionId`, then `selectedSession.id`, then
/// the `(date, start_time)` pair. A stale `sessionId` does not stop a later
/// tier from matching.
pub fn matches_session(attendee: &Attendee, session: &Session) -> bool {
    if non_empty(attendee.session_id.as_deref()) == Some(session.id.as_str()) {
        return true;
    }

    let legacy_id = attendee
        .selected_session
        .as_ref()
        .and_then(|s| non_empty(s.id.as_deref()));
    if legacy_id == Some(session.id.as_str()) {
        return true;
    }

    match slot_of(attendee) {
        Some((date, start_time)) => date == session.date && start_time == session.start_time,
        None => false,
    }
}

/// Resolve the session id an attendee should be stored under.
///
/// Used at ingestion so the indexed session column is filled even for
/// records that only carry a legacy reference. Ids naming a real session win
/// in tier order; a dangling id is kept only when nothing on the event matches.
pub fn resolve_session_id(attendee: &Attendee, event: &Event) -> Option<String> {
    let direct = non_empty(attendee.session_id.as_deref());
    let legacy = attendee
        .selected_session
        .as_ref()
        .and_then(|s| non_empty(s.id.as_deref()));

    for id in [direct, legacy].into_iter().flatten() {
        if event.session(id).is_some() {
            return Some(id.to_string());
        }
    }

    if let Some(session) = event.sessions.iter().find(|s| matches_session(attendee, s)) {
        return Some(session.id.clone());
    }

    match SessionLink::of(attendee) {
        SessionLink::Direct(id) | SessionLink::Legacy(id) => Some(id),
        SessionLink::Slot { .. } | SessionLink::Unlinked => None,
    }
}

/// Keep the attendees that belong to `session`, preserving order.
pub fn filter_for_session(attendees: Vec<Attendee>, session: &Session) -> Vec<Attendee> {
    attendees
        .into_iter()
        .filter(|a| matches_session(a, session))
        .collect()
}

fn slot_of(attendee: &Attendee) -> Option<(&str, &str)> {
    let from_fields = non_empty(attendee.selected_date.as_deref()).zip(
        attendee
            .selected_time_slot
            .as_ref()
            .and_then(|slot| non_empty(Some(slot.start_time.as_str()))),
    );
    if from_fields.is_some() {
        return from_fields;
    }

    attendee.selected_session.as_ref().and_then(|s| {
        non_empty(s.date.as_deref()).zip(non_empty(s.start_time.as_deref()))
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
