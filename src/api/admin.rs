//! Moderation endpoints behind the admin password gate.

use axum::extract::{Path, State};

use super::{success, ApiResult};
use crate::AppState;

/// DELETE /api/admin/requests/:id - Remove any team request.
pub async fn admin_delete_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.repo.force_delete_request(&id).await?;
    tracing::warn!(%id, "Team request removed by admin");
    success(())
}
