//! Event API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::db::DocumentStore;
use crate::errors::AppError;
use crate::models::{CreateEventRequest, Event, ListEventsQuery};
use crate::AppState;

/// GET /api/events - List events, optionally for one organization.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<Vec<Event>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_events(query.organization_id.as_deref()).await {
        Ok(events) => success(events, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/events/:id - Get a single event.
pub async fn get_event(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Event> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_event(&id).await {
        Ok(Some(event)) => success(event, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Event {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/events - Create an event with its sessions and ticket types.
pub async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> ApiResult<Event> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.create_event(&request).await {
        Ok(event) => {
            tracing::info!(event = %event.id, sessions = event.sessions.len(), "Event created");
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(event, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
