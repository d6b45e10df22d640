//! Team request API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{DeleteRequestBody, TeamRequest};
use crate::AppState;

/// GET /api/requests - List all team requests with their members.
pub async fn list_requests(State(state): State<AppState>) -> ApiResult<Vec<TeamRequest>> {
    success(state.repo.list_requests().await?)
}

/// GET /api/requests/:id - Get a single team request.
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TeamRequest> {
    match state.repo.get_request(&id).await? {
        Some(request) => success(request),
        None => Err(AppError::NotFound(format!(
            "Team request {} not found",
            id
        ))),
    }
}

/// POST /api/requests - Create a team request.
pub async fn create_request(
    State(state): State<AppState>,
    Json(request): Json<TeamRequest>,
) -> ApiResult<TeamRequest> {
    require_owner(&request.owner_fingerprint)?;

    let created = state.repo.create_request(request).await?;
    tracing::info!(id = ?created.id, "Team request created");
    success(created)
}

/// PUT /api/requests/:id - Replace a team request owned by the caller.
pub async fn update_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TeamRequest>,
) -> ApiResult<TeamRequest> {
    require_owner(&request.owner_fingerprint)?;

    let updated = state.repo.update_request(&id, request).await?;
    tracing::info!(%id, "Team request updated");
    success(updated)
}

/// DELETE /api/requests/:id - Delete a team request owned by the caller.
pub async fn delete_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DeleteRequestBody>,
) -> ApiResult<()> {
    require_owner(&body.owner_fingerprint)?;

    state.repo.delete_request(&id, &body.owner_fingerprint).await?;
    tracing::info!(%id, "Team request deleted");
    success(())
}

fn require_owner(owner_fingerprint: &str) -> Result<(), AppError> {
    if owner_fingerprint.trim().is_empty() {
        return Err(AppError::Validation(
            "ownerFingerprint is required".to_string(),
        ));
    }
    Ok(())
}
