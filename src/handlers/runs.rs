//! # Run Handlers
//!
//! Run history for the dashboard and the external cancellation entry point.

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::workflow_run;
use crate::server::AppState;

/// Path parameter for workflow-scoped routes
#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkflowPath {
    pub workflow_id: Uuid,
}

/// Run information for API responses
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub workflow_id: Uuid,
    pub external_run_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<workflow_run::Model> for RunInfo {
    fn from(model: workflow_run::Model) -> Self {
        Self {
            id: model.id,
            workflow_id: model.workflow_id,
            external_run_id: model.external_run_id,
            status: model.status,
            error: model.error,
            started_at: model.started_at.with_timezone(&Utc),
            completed_at: model.completed_at.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Response wrapper for run listings
#[derive(Debug, Serialize, ToSchema)]
pub struct RunsResponse {
    pub runs: Vec<RunInfo>,
}

/// Response for cancellation requests
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    /// Number of running rows transitioned to CANCELLED
    pub cancelled: u64,
}

/// Run history for a workflow, newest first
#[utoipa::path(
    get,
    path = "/workflows/{workflow_id}/runs",
    security(("bearer_auth" = [])),
    params(("workflow_id" = Uuid, Path, description = "Workflow to list runs for")),
    responses(
        (status = 200, description = "Run history", body = RunsResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "runs"
)]
pub async fn list_runs(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(path): Path<WorkflowPath>,
) -> Result<Json<RunsResponse>, ApiError> {
    let runs = state
        .runs
        .list_for_workflow(&path.workflow_id, &user_id)
        .await?;
    Ok(Json(RunsResponse {
        runs: runs.into_iter().map(Into::into).collect(),
    }))
}

/// Cancel whatever is currently running for this workflow and user.
/// Matching ignores the idempotency key by design; the request targets the
/// workflow's current run, not a specific attempt.
#[utoipa::path(
    post,
    path = "/workflows/{workflow_id}/cancel",
    security(("bearer_auth" = [])),
    params(("workflow_id" = Uuid, Path, description = "Workflow to cancel")),
    responses(
        (status = 200, description = "Cancellation recorded", body = CancelResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "runs"
)]
pub async fn cancel_workflow(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(path): Path<WorkflowPath>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = state.runs.cancel(&path.workflow_id, &user_id).await?;
    Ok(Json(CancelResponse { cancelled }))
}
