//! Attendee API endpoints: bookings, lookups and CSV export.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::{error, reject, success, ApiResult};
use crate::db::DocumentStore;
use crate::errors::{AppError, AppErrorWithRevision};
use crate::export::{self, ExportRow, StatusFilter};
use crate::models::{Attendee, ExportQuery, RegisterAttendeeRequest, Ticket};
use crate::projection::{self, ViewKey};
use crate::AppState;

/// A stored booking.
#[derive(Debug, Serialize)]
pub struct Booking {
    pub attendee: Attendee,
    pub tickets: Vec<Ticket>,
}

/// POST /api/events/:id/attendees - Record a booking.
pub async fn register_attendee(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(request): Json<RegisterAttendeeRequest>,
) -> ApiResult<Booking> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.register_attendee(&event_id, &request).await {
        Ok((attendee, tickets)) => {
            tracing::info!(
                event = %event_id,
                attendee = %attendee.id,
                tickets = tickets.len(),
                "Booking recorded"
            );
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(Booking { attendee, tickets }, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/attendees/:id - Get a single attendee.
pub async fn get_attendee(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Attendee> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_attendee(&id).await {
        Ok(Some(attendee)) => success(attendee, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Attendee {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/events/:id/attendees/export - Filtered attendee list as CSV.
pub async fn export_attendees(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppErrorWithRevision> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let status = StatusFilter::parse(query.status.as_deref()).map_err(|e| reject(e, revision_id))?;
    let key = ViewKey::new(event_id, query.session_id);
    let (event, session) = projection::resolve_selection(state.store.as_ref(), &key)
        .await
        .map_err(|e| reject(e, revision_id))?;

    let attendees = match &session {
        Some(session) => projection::session_attendees(state.store.as_ref(), &event.id, session).await,
        None => state.store.query_attendees(&event.id, None).await,
    }
    .map_err(|e| reject(e, revision_id))?;

    let ticket_types = event.ticket_types_for(session.as_ref());
    let rows: Vec<ExportRow> = export::filter_attendees(&attendees, query.search.as_deref(), status)
        .into_iter()
        .map(|a| ExportRow::from_attendee(a, ticket_types))
        .collect();
    let body = export::write_attendee_csv(&rows).map_err(|e| reject(e, revision_id))?;

    let filename = export::export_filename(&event, session.as_ref());
    tracing::info!(event = %event.id, rows = rows.len(), "Attendee export generated");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}
