//! Request and result types for check-in, undo, scanning and entry verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Attendee;

/// Request body for a manual check-in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    /// Operator acknowledged the late-session warning
    #[serde(default)]
    pub confirm_late: bool,
}

/// Result of a successful check-in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInOutcome {
    pub attendee: Attendee,
    pub tickets_updated: usize,
    pub failed_ticket_ids: Vec<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub undo_expires_at: DateTime<Utc>,
}

/// Result of a successful undo.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoOutcome {
    pub attendee: Attendee,
    pub tickets_restored: usize,
    pub failed_ticket_ids: Vec<String>,
    pub message: String,
}

/// Request body for a scanned QR code.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub payload: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub confirm_late: bool,
}

/// What happened to a scanned code.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum ScanOutcome {
    /// Verify-entry accepted the ticket
    Verified {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        ticket: Option<VerifiedTicket>,
    },
    /// Verify-entry answered and refused the ticket
    Rejected { message: String },
    /// Verify-entry was unreachable; matched and checked in locally
    CheckedIn { outcome: CheckInOutcome },
}

/// Request body of `POST /api/tickets/verify-entry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEntryRequest {
    pub ticket_id: String,
    pub event_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Ticket summary returned by verify-entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedTicket {
    pub id: String,
    pub user_name: String,
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Response body of `POST /api/tickets/verify-entry`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifyEntryResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<VerifiedTicket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VerifyEntryResponse {
    pub fn accepted(ticket: VerifiedTicket) -> Self {
        Self {
            success: true,
            ticket: Some(ticket),
            message: None,
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ticket: None,
            message: Some(message.into()),
        }
    }
}
