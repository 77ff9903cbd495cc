//! QR scan handling.
//!
//! A scanned code is first sent to the verify-entry endpoint. Only when that
//! endpoint cannot be reached is the code matched against the attendee list
//! locally and checked in through the regular check-in flow.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;

use crate::auth::{Operator, API_KEY_HEADER, CAPABILITIES_HEADER, MANAGE_ATTENDEES, OPERATOR_HEADER};
use crate::checkin::{self, CheckInService};
use crate::errors::AppError;
use crate::models::{Attendee, ScanOutcome, ScanRequest, VerifyEntryRequest, VerifyEntryResponse};
use crate::projection::{self, ViewKey};

/// JSON keys that may carry the reference, in priority order.
const REFERENCE_KEYS: &[&str] = &["ticketId", "id", "attendeeId"];

const VERIFY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Reference extracted from a QR payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedCode {
    pub value: String,
    /// JSON key the value came from, `None` for a bare string
    pub field: Option<&'static str>,
}

/// Decode a QR payload: a JSON object with a reference key, or the raw text.
pub fn decode_payload(raw: &str) -> Result<ScannedCode, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::Validation("Scanned code is empty".to_string()));
    }

    if !raw.starts_with('{') {
        return Ok(ScannedCode {
            value: raw.to_string(),
            field: None,
        });
    }

    let json: Value = serde_json::from_str(raw)
        .map_err(|e| AppError::Validation(format!("Malformed QR payload: {}", e)))?;

    for key in REFERENCE_KEYS {
        let value = match json.get(*key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if !value.is_empty() {
            return Ok(ScannedCode {
                value,
                field: Some(*key),
            });
        }
    }

    Err(AppError::Validation(
        "QR payload does not contain a ticket reference".to_string(),
    ))
}

fn looks_like_email(value: &str) -> bool {
    value.contains('@') && !value.contains(char::is_whitespace)
}

/// Find the attendee a scanned reference points at.
///
/// Tries the attendee id, then linked ticket ids, then the email address when
/// the reference looks like one.
pub fn find_scanned_attendee<'a>(attendees: &'a [Attendee], reference: &str) -> Option<&'a Attendee> {
    attendees
        .iter()
        .find(|a| a.id == reference)
        .or_else(|| {
            attendees.iter().find(|a| {
                a.linked_ticket_ids()
                    .is_some_and(|ids| ids.iter().any(|id| id == reference))
            })
        })
        .or_else(|| {
            looks_like_email(reference)
                .then(|| attendees.iter().find(|a| a.email == reference))
                .flatten()
        })
}

/// Authoritative ticket verification.
///
/// `Ok` means the verifier answered, whatever the verdict. `Err` means it could
/// not be reached and the caller should fall back to local matching.
#[async_trait]
pub trait EntryVerifier: Send + Sync {
    async fn verify(
        &self,
        operator: &Operator,
        request: &VerifyEntryRequest,
    ) -> Result<VerifyEntryResponse, AppError>;
}

/// Calls a remote `POST /api/tickets/verify-entry`.
pub struct HttpEntryVerifier {
    url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpEntryVerifier {
    pub fn new(url: String, api_key: Option<String>) -> Result<Self, AppError> {
        let client = Client::builder().timeout(VERIFY_TIMEOUT).build()?;
        Ok(Self {
            url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl EntryVerifier for HttpEntryVerifier {
    async fn verify(
        &self,
        operator: &Operator,
        request: &VerifyEntryRequest,
    ) -> Result<VerifyEntryResponse, AppError> {
        let mut call = self
            .client
            .post(&self.url)
            .header(OPERATOR_HEADER, &operator.id)
            .header(CAPABILITIES_HEADER, operator.capabilities.join(","))
            .json(request);
        if let Some(key) = &self.api_key {
            call = call.header(API_KEY_HEADER, key);
        }

        let response = call.send().await?;
        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "verify-entry returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

/// Stand-in when no verify-entry endpoint is configured.
pub struct UnavailableVerifier;

#[async_trait]
impl EntryVerifier for UnavailableVerifier {
    async fn verify(
        &self,
        _operator: &Operator,
        _request: &VerifyEntryRequest,
    ) -> Result<VerifyEntryResponse, AppError> {
        Err(AppError::Upstream(
            "No verify-entry endpoint configured".to_string(),
        ))
    }
}

/// Handle one scanned code for the selected event and session.
pub async fn scan(
    desk: &CheckInService,
    verifier: &dyn EntryVerifier,
    operator: &Operator,
    event_id: &str,
    request: &ScanRequest,
    now: DateTime<Utc>,
) -> Result<ScanOutcome, AppError> {
    operator.require(MANAGE_ATTENDEES)?;
    let code = decode_payload(&request.payload)?;
    tracing::debug!(field = ?code.field, "Scanned reference {}", code.value);

    let verify = VerifyEntryRequest {
        ticket_id: code.value.clone(),
        event_id: event_id.to_string(),
        session_id: request.session_id.clone(),
    };
    match verifier.verify(operator, &verify).await {
        Ok(answer) if answer.success => {
            let message = match &answer.ticket {
                Some(ticket) => format!("Welcome, {}", ticket.user_name),
                None => "Ticket verified".to_string(),
            };
            return Ok(ScanOutcome::Verified {
                message,
                ticket: answer.ticket,
            });
        }
        Ok(answer) => {
            return Ok(ScanOutcome::Rejected {
                message: answer
                    .message
                    .unwrap_or_else(|| "Ticket was not accepted".to_string()),
            });
        }
        Err(err) => {
            tracing::warn!("verify-entry unavailable, matching scan locally: {}", err);
        }
    }

    let key = ViewKey::new(event_id, request.session_id.clone());
    let (event, session) = projection::resolve_selection(desk.store().as_ref(), &key).await?;
    let attendees = match &session {
        Some(session) => projection::session_attendees(desk.store().as_ref(), &event.id, session).await?,
        None => desk.store().query_attendees(&event.id, None).await?,
    };

    let attendee = find_scanned_attendee(&attendees, &code.value)
        .cloned()
        .ok_or_else(|| AppError::NotFound("No attendee found for scanned code".to_string()))?;

    checkin::check_eligibility(
        operator,
        &event,
        session.as_ref(),
        &attendee,
        now,
        desk.late_threshold(),
        request.confirm_late,
    )?;

    let outcome = desk
        .perform_check_in(operator, &event, session.as_ref(), attendee, now)
        .await?;
    Ok(ScanOutcome::CheckedIn { outcome })
}
