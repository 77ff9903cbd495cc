//! Issued ticket model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an issued ticket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Active,
    Used,
    Cancelled,
    Expired,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Active => "active",
            TicketStatus::Used => "used",
            TicketStatus::Cancelled => "cancelled",
            TicketStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TicketStatus::Active),
            "used" => Some(TicketStatus::Used),
            "cancelled" => Some(TicketStatus::Cancelled),
            "expired" => Some(TicketStatus::Expired),
            _ => None,
        }
    }
}

/// One issued ticket in `tickets`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<String>,
    pub status: TicketStatus,
    #[serde(default)]
    pub used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checked_in_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial update written to a ticket on check-in and undo.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketStatusPatch {
    pub status: TicketStatus,
    pub used_at: Option<DateTime<Utc>>,
    pub checked_in_by: Option<String>,
}
