//! Check-in desk endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use super::{error, reject, success, ApiResult};
use crate::auth::Operator;
use crate::errors::AppErrorWithRevision;
use crate::models::{
    CheckInOutcome, CheckInRequest, ScanOutcome, ScanRequest, UndoOutcome, VerifyEntryRequest,
    VerifyEntryResponse,
};
use crate::scan;
use crate::AppState;

/// POST /api/events/:id/attendees/:attendee_id/check-in
pub async fn check_in_attendee(
    State(state): State<AppState>,
    Path((event_id, attendee_id)): Path<(String, String)>,
    operator: Operator,
    Json(request): Json<CheckInRequest>,
) -> ApiResult<CheckInOutcome> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .checkin
        .check_in(&operator, &event_id, &attendee_id, &request, Utc::now())
        .await
    {
        Ok(outcome) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(outcome, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/events/:id/attendees/:attendee_id/undo
pub async fn undo_check_in(
    State(state): State<AppState>,
    Path((event_id, attendee_id)): Path<(String, String)>,
    operator: Operator,
) -> ApiResult<UndoOutcome> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .checkin
        .undo(&operator, &event_id, &attendee_id, Utc::now())
        .await
    {
        Ok(outcome) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(outcome, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/events/:id/scan - Handle a decoded QR payload.
pub async fn scan_code(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    operator: Operator,
    Json(request): Json<ScanRequest>,
) -> ApiResult<ScanOutcome> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = scan::scan(
        &state.checkin,
        state.verifier.as_ref(),
        &operator,
        &event_id,
        &request,
        Utc::now(),
    )
    .await;

    match result {
        Ok(outcome) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(outcome, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/tickets/verify-entry - Authoritative single-ticket admission.
///
/// Refusals are returned with `success: false` and status 200.
pub async fn verify_entry(
    State(state): State<AppState>,
    operator: Operator,
    Json(request): Json<VerifyEntryRequest>,
) -> Result<Json<VerifyEntryResponse>, AppErrorWithRevision> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    state
        .checkin
        .verify_entry(&operator, &request, Utc::now())
        .await
        .map(Json)
        .map_err(|e| reject(e, revision_id))
}
