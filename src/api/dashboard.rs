//! Dashboard API endpoints.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt};

use super::{error, reject, success, ApiResult};
use crate::errors::AppErrorWithRevision;
use crate::models::{DashboardQuery, DashboardSnapshot, SessionStats};
use crate::projection::{self, DashboardView, ViewKey};
use crate::AppState;

/// GET /api/events/:id/dashboard - One snapshot of the dashboard.
pub async fn get_dashboard(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<DashboardSnapshot> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let key = ViewKey::new(event_id, query.session_id);

    match projection::load_snapshot(state.store.as_ref(), &key).await {
        Ok(snapshot) => success(snapshot, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/events/:id/stats - Derived statistics for the selection.
pub async fn get_stats(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<SessionStats> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let key = ViewKey::new(event_id, query.session_id);

    match projection::load_snapshot(state.store.as_ref(), &key).await {
        Ok(snapshot) => success(snapshot.stats, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/events/:id/dashboard/stream - Server-sent snapshots.
///
/// The live projection belongs to the stream and stops when the client goes away.
pub async fn stream_dashboard(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, AppErrorWithRevision> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let mut view = DashboardView::new(state.store.clone());
    let snapshots = view
        .select(ViewKey::new(event_id, query.session_id))
        .await
        .map_err(|e| reject(e, revision_id))?;
    tracing::debug!("Dashboard stream opened for {:?}", view.selection());

    let stream = WatchStream::new(snapshots).map(move |snapshot| {
        let _owner = &view;
        let event = SseEvent::default()
            .event("snapshot")
            .json_data(&snapshot)
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to encode dashboard snapshot: {}", e);
                SseEvent::default().event("error").data(e.to_string())
            });
        Ok(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
