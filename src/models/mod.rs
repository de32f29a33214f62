//! Database entity models
//!
//! SeaORM entities for the credential, workflow-link, and workflow-run
//! tables, plus small response types shared by the handlers.

pub mod credential;
pub mod workflow_credential;
pub mod workflow_run;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Service metadata returned by the root endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
    /// Active configuration profile
    pub profile: String,
}
