//! Attendee model, including the older record shapes still found in the store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TimeSlot;

/// Ticket quantity on an attendee: a plain count on old records, a per-type map on new ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TicketCounts {
    Count(u32),
    ByType(BTreeMap<String, u32>),
}

impl TicketCounts {
    pub fn total(&self) -> u32 {
        match self {
            TicketCounts::Count(n) => *n,
            TicketCounts::ByType(map) => map.values().sum(),
        }
    }

    /// Quantity held of one ticket type; plain counts carry no type.
    pub fn count_of(&self, ticket_type: &str) -> u32 {
        match self {
            TicketCounts::Count(_) => 0,
            TicketCounts::ByType(map) => map.get(ticket_type).copied().unwrap_or(0),
        }
    }
}

/// Session reference embedded by the older booking flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SelectedSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

/// Totals recorded by the booking that produced this attendee.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OriginalBooking {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
}

/// One attendee record in `eventAttendees`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tickets: Option<TicketCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_session: Option<SelectedSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_time_slot: Option<TimeSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_booking: Option<OriginalBooking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub checked_in: bool,
    #[serde(default)]
    pub check_in_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checked_in_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_ids: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

impl Attendee {
    /// Ticket back-references, if the record has any.
    pub fn linked_ticket_ids(&self) -> Option<&[String]> {
        self.ticket_ids
            .as_deref()
            .filter(|ids| !ids.is_empty())
    }

    pub fn ticket_total(&self) -> u32 {
        self.tickets.as_ref().map(TicketCounts::total).unwrap_or(1)
    }
}

/// Partial update written on check-in and undo.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendeeCheckInPatch {
    pub checked_in: bool,
    pub check_in_time: Option<DateTime<Utc>>,
    pub checked_in_by: Option<String>,
}

/// Request body for registering a booking.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAttendeeRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub selected_date: Option<String>,
    #[serde(default)]
    pub selected_time_slot: Option<TimeSlot>,
    /// Ticket type name to quantity
    pub tickets: BTreeMap<String, u32>,
    #[serde(default)]
    pub payment_status: Option<String>,
}
