//! # Credential Handlers
//!
//! REST surface for the credential lifecycle, consumed by the dashboard UI.
//! Listings always strip secrets; the manual create path only accepts
//! API-key credentials.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::credential_store::{CredentialCreateRequest, SafeCredential};
use crate::error::ApiError;
use crate::providers::{Provider, firecrawl};
use crate::server::AppState;

/// Response wrapper for credential listings
#[derive(Debug, Serialize, ToSchema)]
pub struct CredentialsResponse {
    pub credentials: Vec<SafeCredential>,
}

/// Path parameter for credential-scoped routes
#[derive(Debug, Deserialize, ToSchema)]
pub struct CredentialPath {
    pub credential_id: Uuid,
}

/// Path parameter for workflow-scoped routes
#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkflowPath {
    pub workflow_id: Uuid,
}

/// List the authenticated user's credentials, secrets stripped
#[utoipa::path(
    get,
    path = "/credentials",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Credentials for the user", body = CredentialsResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "credentials"
)]
pub async fn list_credentials(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<CredentialsResponse>, ApiError> {
    let credentials = state.credentials.list_for_user(&user_id).await?;
    Ok(Json(CredentialsResponse { credentials }))
}

/// Manually create an API-key credential. OAuth credentials are rejected:
/// they can only be created through the callback flow.
#[utoipa::path(
    post,
    path = "/credentials",
    security(("bearer_auth" = [])),
    request_body = CredentialCreateRequest,
    responses(
        (status = 201, description = "Credential stored", body = SafeCredential),
        (status = 400, description = "Invalid secret shape or OAuth via manual path", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "credentials"
)]
pub async fn create_credential(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(request): Json<CredentialCreateRequest>,
) -> Result<(StatusCode, Json<SafeCredential>), ApiError> {
    let firecrawl_key = (request.provider == Provider::Firecrawl)
        .then(|| {
            request
                .secret
                .get("apiKey")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .flatten();

    let credential = state.credentials.store(&user_id, request).await?;

    // Best-effort key check; an unreachable validation endpoint never
    // blocks the create
    if let Some(api_key) = firecrawl_key {
        let credential_id = credential.id;
        tokio::spawn(async move {
            if !firecrawl::validate_api_key(firecrawl::FIRECRAWL_API_BASE, &api_key).await {
                tracing::warn!(
                    credential_id = %credential_id,
                    "Firecrawl API key failed the validation check"
                );
            }
        });
    }

    Ok((StatusCode::CREATED, Json(credential)))
}

/// Create an API-key credential and link it to a workflow atomically
#[utoipa::path(
    post,
    path = "/workflows/{workflow_id}/credentials",
    security(("bearer_auth" = [])),
    params(("workflow_id" = Uuid, Path, description = "Workflow to link the credential to")),
    request_body = CredentialCreateRequest,
    responses(
        (status = 201, description = "Credential stored and linked", body = SafeCredential),
        (status = 400, description = "Invalid secret shape or OAuth via manual path", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "credentials"
)]
pub async fn create_credential_for_workflow(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(path): Path<WorkflowPath>,
    Json(request): Json<CredentialCreateRequest>,
) -> Result<(StatusCode, Json<SafeCredential>), ApiError> {
    let credential = state
        .credentials
        .store_for_workflow(&user_id, &path.workflow_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(credential)))
}

/// Path parameters for linking an existing credential
#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkflowCredentialPath {
    pub workflow_id: Uuid,
    pub credential_id: Uuid,
}

/// Link an existing credential to a workflow
#[utoipa::path(
    put,
    path = "/workflows/{workflow_id}/credentials/{credential_id}",
    security(("bearer_auth" = [])),
    params(
        ("workflow_id" = Uuid, Path, description = "Workflow to link to"),
        ("credential_id" = Uuid, Path, description = "Credential to link")
    ),
    responses(
        (status = 204, description = "Link created"),
        (status = 404, description = "Credential not found or not owned", body = ApiError)
    ),
    tag = "credentials"
)]
pub async fn link_credential(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(path): Path<WorkflowCredentialPath>,
) -> Result<StatusCode, ApiError> {
    let linked = state
        .credentials
        .link_to_workflow(&user_id, &path.workflow_id, &path.credential_id)
        .await?;
    if !linked {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Credential not found",
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Disconnect a credential. Workflow links are removed with it.
#[utoipa::path(
    delete,
    path = "/credentials/{credential_id}",
    security(("bearer_auth" = [])),
    params(("credential_id" = Uuid, Path, description = "Credential to delete")),
    responses(
        (status = 204, description = "Credential deleted"),
        (status = 404, description = "Credential not found or not owned", body = ApiError)
    ),
    tag = "credentials"
)]
pub async fn delete_credential(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(path): Path<CredentialPath>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .credentials
        .delete(&path.credential_id, &user_id)
        .await?;
    if !deleted {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Credential not found",
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}
