//! # Realtime Handlers
//!
//! Issues scoped subscription tokens the browser hands to the realtime
//! transport collaborator.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::realtime::{Channel, Topic};
use crate::server::AppState;

/// Request body for subscription token issuing
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTokenRequest {
    #[schema(value_type = String)]
    pub workflow_id: Uuid,
}

/// Issued subscription token, opaque to the caller
#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionTokenResponse {
    pub token: String,
}

/// Issue a short-lived token scoped to the caller's channel for one
/// workflow, granting both the `updates` and `ai-stream` topics
#[utoipa::path(
    post,
    path = "/realtime/subscription-token",
    security(("bearer_auth" = [])),
    request_body = SubscriptionTokenRequest,
    responses(
        (status = 200, description = "Token issued", body = SubscriptionTokenResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "realtime"
)]
pub async fn subscription_token(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(request): Json<SubscriptionTokenRequest>,
) -> Result<Json<SubscriptionTokenResponse>, ApiError> {
    let channel = Channel::new(user_id, request.workflow_id);
    let token = state
        .tokens
        .issue(&channel, &[Topic::Updates, Topic::AiStream], user_id)?;
    Ok(Json(SubscriptionTokenResponse { token }))
}
