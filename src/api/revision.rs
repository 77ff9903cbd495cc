//! Revision endpoint.

use axum::extract::State;

use super::{reject, success, ApiResult};
use crate::models::RevisionInfo;
use crate::AppState;

/// GET /api/revision - Current store revision, for cheap change detection.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    let revision_info = state
        .repo
        .get_revision_info()
        .await
        .map_err(|e| reject(e, 0))?;

    success(revision_info.clone(), revision_info.revision_id)
}
