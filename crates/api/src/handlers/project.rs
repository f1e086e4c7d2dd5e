//! Handlers for the `/projects` resource.
//!
//! Reads go straight to the repository; writes run through
//! [`run_to_completion`] so a dropped request never abandons a write midway.

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use taskmaster_core::project::{NewProject, Project, ProjectPatch};
use taskmaster_core::query::ProjectQuery;

use crate::error::AppResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::auth::AuthUser;
use crate::query::ListProjectsParams;
use crate::response::DeletedResponse;
use crate::state::AppState;
use crate::task::run_to_completion;

/// POST /api/projects
pub async fn create(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewProject>,
) -> AppResult<(StatusCode, Json<Project>)> {
    let repo = state.projects.clone();
    let project = run_to_completion(async move { repo.create(input).await }).await?;
    tracing::info!(project_id = %project.id, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListProjectsParams>,
) -> AppResult<Json<Vec<Project>>> {
    let query = ProjectQuery::try_from(params)?;
    let listing = state.projects.list(&query).await?;
    Ok(Json(listing.into_vec()))
}

/// GET /api/projects/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Project>> {
    let project = state.projects.find_by_id(&id).await?;
    Ok(Json(project))
}

/// PUT /api/projects/{id}
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<ProjectPatch>,
) -> AppResult<Json<Project>> {
    let repo = state.projects.clone();
    let project = run_to_completion(async move { repo.update(&id, patch).await }).await?;
    tracing::info!(project_id = %project.id, "Project updated");
    Ok(Json(project))
}

/// DELETE /api/projects/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DeletedResponse>> {
    let repo = state.projects.clone();
    let removed = run_to_completion(async move { repo.delete(&id).await }).await?;
    tracing::info!(project_id = %removed.id, "Project deleted");
    Ok(Json(DeletedResponse {
        message: "Project deleted successfully".to_string(),
        id: removed.id,
    }))
}

/// GET /api/projects/csv
///
/// Full dataset as a CSV download. Requires authentication.
pub async fn export_csv(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let csv = state.projects.export_csv().await?;
    tracing::info!(user_id = %user.user_id, bytes = csv.len(), "Projects exported");
    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=\"projects.csv\""),
        ],
        csv,
    ))
}
