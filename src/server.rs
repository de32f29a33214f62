//! # Server Configuration
//!
//! Application state wiring and the Axum router.

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use sea_orm::DatabaseConnection;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use axum::{extract::Request, middleware::Next, response::Response};

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::context::ExecutionContextBuilder;
use crate::credential_store::CredentialStore;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::providers::Registry;
use crate::realtime::{BroadcastBus, SubscriptionTokenIssuer};
use crate::repositories::{CredentialRepository, WorkflowRunRepository};
use crate::runs::RunTracker;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub registry: Registry,
    pub credentials: Arc<CredentialStore>,
    pub runs: Arc<RunTracker>,
    pub bus: Arc<BroadcastBus>,
    pub tokens: Arc<SubscriptionTokenIssuer>,
}

impl AppState {
    /// Wire up services from a validated configuration and a live pool
    pub fn build(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let db_arc = Arc::new(db.clone());

        let crypto_key = CryptoKey::new(
            config
                .crypto_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("crypto key missing from configuration"))?,
        )?;

        let registry = Registry::from_config(&config);
        Registry::init_global(registry.clone());

        let bus: Arc<BroadcastBus> = Arc::new(BroadcastBus::default());
        let credential_repo = CredentialRepository::new(Arc::clone(&db_arc), crypto_key);
        let credentials = Arc::new(CredentialStore::new(
            credential_repo,
            registry.clone(),
            config.token_refresh.lead_time_seconds,
        ));
        let runs = Arc::new(RunTracker::new(
            WorkflowRunRepository::new(db_arc),
            bus.clone(),
        ));

        let token_secret = config
            .realtime
            .token_secret
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("realtime token secret missing from configuration"))?;
        let tokens = Arc::new(SubscriptionTokenIssuer::new(
            token_secret.as_bytes(),
            config.realtime.token_ttl_seconds,
        ));

        Ok(Self {
            config,
            db,
            registry,
            credentials,
            runs,
            bus,
            tokens,
        })
    }

    /// Context builder for the durable-execution engine integration
    pub fn context_builder(&self) -> ExecutionContextBuilder {
        ExecutionContextBuilder::new(
            Arc::clone(&self.credentials),
            Arc::clone(&self.runs),
            self.bus.clone(),
        )
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/credentials",
            get(handlers::credentials::list_credentials)
                .post(handlers::credentials::create_credential),
        )
        .route(
            "/credentials/{credential_id}",
            delete(handlers::credentials::delete_credential),
        )
        .route("/credentials/oauth/auth-url", get(handlers::oauth::auth_url))
        .route("/credentials/oauth/callback", get(handlers::oauth::callback))
        .route(
            "/credentials/oauth/microsoft/callback",
            get(handlers::oauth::microsoft_callback),
        )
        .route(
            "/workflows/{workflow_id}/credentials",
            post(handlers::credentials::create_credential_for_workflow),
        )
        .route(
            "/workflows/{workflow_id}/credentials/{credential_id}",
            put(handlers::credentials::link_credential),
        )
        .route("/workflows/{workflow_id}/runs", get(handlers::runs::list_runs))
        .route(
            "/workflows/{workflow_id}/cancel",
            post(handlers::runs::cancel_workflow),
        )
        .route(
            "/realtime/subscription-token",
            post(handlers::realtime::subscription_token),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .merge(protected)
        .layer(axum::middleware::from_fn(trace_context_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Give every request a correlation ID that error responses echo back
async fn trace_context_middleware(request: Request, next: Next) -> Response {
    let trace_id = format!("req-{}", &uuid::Uuid::new_v4().to_string()[..8]);
    crate::telemetry::with_trace_context(
        crate::telemetry::TraceContext { trace_id },
        next.run(request),
    )
    .await
}

/// Starts the server with the given state
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("invalid server address: {}", e))?;
    let profile = state.config.profile.clone();

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::credentials::list_credentials,
        crate::handlers::credentials::create_credential,
        crate::handlers::credentials::create_credential_for_workflow,
        crate::handlers::credentials::link_credential,
        crate::handlers::credentials::delete_credential,
        crate::handlers::oauth::auth_url,
        crate::handlers::oauth::callback,
        crate::handlers::oauth::microsoft_callback,
        crate::handlers::runs::list_runs,
        crate::handlers::runs::cancel_workflow,
        crate::handlers::realtime::subscription_token,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::credential_store::CredentialCreateRequest,
            crate::credential_store::SafeCredential,
            crate::handlers::credentials::CredentialsResponse,
            crate::handlers::oauth::AuthUrlResponse,
            crate::handlers::runs::RunInfo,
            crate::handlers::runs::RunsResponse,
            crate::handlers::runs::CancelResponse,
            crate::handlers::realtime::SubscriptionTokenRequest,
            crate::handlers::realtime::SubscriptionTokenResponse,
        )
    ),
    info(
        title = "Duramation Core API",
        description = "Credential lifecycle and workflow run tracking",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
