//! Event, session and ticket-type models.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// How an event stores its schedule and ticket types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
    /// Top-level `tickets` and `time_slots` on the event itself
    #[default]
    Legacy,
    /// Each session carries its own ticket types
    SessionCentric,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Legacy => "legacy",
            Architecture::SessionCentric => "session-centric",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "legacy" => Some(Architecture::Legacy),
            "session-centric" => Some(Architecture::SessionCentric),
            _ => None,
        }
    }
}

/// A purchasable ticket category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketType {
    pub name: String,
    pub capacity: i64,
    pub price: f64,
    #[serde(default)]
    pub available_capacity: i64,
}

/// A start/end pair on legacy events and legacy attendee records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TimeSlot {
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

/// One scheduled occurrence of a session-centric event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub date: String,
    #[serde(rename = "start_time")]
    pub start_time: String,
    #[serde(rename = "end_time", default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default)]
    pub ticket_types: Vec<TicketType>,
    #[serde(default)]
    pub max_capacity: i64,
}

impl Session {
    /// Label used in exports and messages.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("{} {}", self.date, self.start_time),
        }
    }

    /// Local start of the session; dates are stored without a zone and read as UTC.
    pub fn starts_at(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()?;
        let time = NaiveTime::parse_from_str(&self.start_time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&self.start_time, "%H:%M:%S"))
            .ok()?;
        Some(date.and_time(time))
    }
}

/// Top-level event document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub organization_id: String,
    pub architecture: Architecture,
    #[serde(default)]
    pub sessions: Vec<Session>,
    /// Legacy top-level ticket types
    #[serde(default)]
    pub tickets: Vec<TicketType>,
    /// Legacy top-level time slots
    #[serde(rename = "time_slots", default)]
    pub time_slots: Vec<TimeSlot>,
    pub created_at: String,
    pub updated_at: String,
}

impl Event {
    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    /// Ticket types priced against for the given selection.
    pub fn ticket_types_for<'a>(&'a self, session: Option<&'a Session>) -> &'a [TicketType] {
        match (self.architecture, session) {
            (Architecture::SessionCentric, Some(session)) => &session.ticket_types,
            _ => &self.tickets,
        }
    }

    pub fn is_session_centric(&self) -> bool {
        self.architecture == Architecture::SessionCentric
    }
}

/// Ticket type as supplied when creating an event.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketTypeRequest {
    pub name: String,
    pub capacity: i64,
    #[serde(default)]
    pub price: f64,
}

/// Session as supplied when creating an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub date: String,
    #[serde(rename = "start_time")]
    pub start_time: String,
    #[serde(rename = "end_time", default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub ticket_types: Vec<CreateTicketTypeRequest>,
    #[serde(default)]
    pub max_capacity: Option<i64>,
}

/// Request body for creating a new event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: String,
    pub organization_id: String,
    #[serde(default)]
    pub architecture: Architecture,
    #[serde(default)]
    pub sessions: Vec<CreateSessionRequest>,
    #[serde(default)]
    pub tickets: Vec<CreateTicketTypeRequest>,
    #[serde(rename = "time_slots", default)]
    pub time_slots: Vec<TimeSlot>,
}

/// Query string for listing events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    #[serde(default)]
    pub organization_id: Option<String>,
}
