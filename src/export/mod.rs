//! CSV export of the attendee list.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{Attendee, Event, Session, TicketType};
use crate::stats;

/// Status filter applied to the attendee list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    CheckedIn,
    Pending,
}

impl StatusFilter {
    pub fn parse(value: Option<&str>) -> Result<Self, AppError> {
        match value.map(str::trim).unwrap_or("all") {
            "" | "all" => Ok(StatusFilter::All),
            "checked-in" => Ok(StatusFilter::CheckedIn),
            "pending" => Ok(StatusFilter::Pending),
            other => Err(AppError::BadRequest(format!(
                "Unknown status filter '{}'",
                other
            ))),
        }
    }

    fn admits(self, attendee: &Attendee) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::CheckedIn => attendee.checked_in,
            StatusFilter::Pending => !attendee.checked_in,
        }
    }
}

/// One line of the export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Phone")]
    pub phone: Option<String>,
    #[serde(rename = "Tickets")]
    pub tickets: u32,
    #[serde(rename = "Amount")]
    pub amount: f64,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Check-in Time")]
    pub check_in_time: Option<String>,
}

impl ExportRow {
    pub fn from_attendee(attendee: &Attendee, ticket_types: &[TicketType]) -> Self {
        Self {
            name: attendee.name.clone(),
            email: attendee.email.clone(),
            phone: attendee.phone.clone().filter(|p| !p.is_empty()),
            tickets: attendee.ticket_total(),
            amount: stats::attendee_revenue(attendee, ticket_types),
            status: if attendee.checked_in {
                "Checked In".to_string()
            } else {
                "Pending".to_string()
            },
            check_in_time: attendee.check_in_time.map(|t| t.to_rfc3339()),
        }
    }
}

/// Case-insensitive search over name, email and phone plus the status filter.
pub fn filter_attendees<'a>(
    attendees: &'a [Attendee],
    search: Option<&str>,
    status: StatusFilter,
) -> Vec<&'a Attendee> {
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    attendees
        .iter()
        .filter(|a| status.admits(a))
        .filter(|a| match &needle {
            None => true,
            Some(needle) => {
                a.name.to_lowercase().contains(needle)
                    || a.email.to_lowercase().contains(needle)
                    || a.phone
                        .as_deref()
                        .is_some_and(|p| p.to_lowercase().contains(needle))
            }
        })
        .collect()
}

pub fn write_attendee_csv(rows: &[ExportRow]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(vec![]);
    for row in rows {
        writer.serialize(row)?;
    }
    if rows.is_empty() {
        writer.write_record([
            "Name",
            "Email",
            "Phone",
            "Tickets",
            "Amount",
            "Status",
            "Check-in Time",
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV buffer error: {}", e)))
}

pub fn read_attendee_csv(data: &[u8]) -> Result<Vec<ExportRow>, AppError> {
    let mut reader = csv::Reader::from_reader(data);
    reader
        .deserialize()
        .collect::<Result<Vec<ExportRow>, csv::Error>>()
        .map_err(AppError::from)
}

/// Download name built from the event title and session name.
pub fn export_filename(event: &Event, session: Option<&Session>) -> String {
    let mut base = slug(&event.title);
    if let Some(session) = session {
        let part = slug(&session.display_name());
        if !part.is_empty() {
            base = format!("{}-{}", base, part);
        }
    }
    if base.is_empty() {
        base = "event".to_string();
    }
    format!("{}-attendees.csv", base)
}

fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
