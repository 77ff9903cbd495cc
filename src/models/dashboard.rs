//! Dashboard projection and statistics models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Attendee, Ticket};

/// Sales figures for one ticket type.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketTypeStats {
    pub name: String,
    pub capacity: i64,
    pub price: f64,
    pub sold: i64,
    pub available: i64,
    pub revenue: f64,
    pub percentage: f64,
}

/// Aggregate figures for the selected event or session.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_revenue: f64,
    pub total_attendees: usize,
    pub checked_in: usize,
    pub pending: usize,
    pub capacity: i64,
    pub check_in_rate: f64,
    pub ticket_types: Vec<TicketTypeStats>,
}

/// One refresh of the dashboard projection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Every attendee of the event
    pub attendees: Vec<Attendee>,
    /// Attendees matched to the selected session
    pub session_attendees: Vec<Attendee>,
    pub tickets: Vec<Ticket>,
    pub stats: SessionStats,
    pub last_refreshed: DateTime<Utc>,
    /// Set when both the scoped query and its fallback failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Dashboard selection passed as a query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Export filters matching the dashboard list controls.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}
