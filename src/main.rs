//! # Duramation Core Service Entry Point

use duramation::{
    config::ConfigLoader,
    db::init_pool,
    server::{AppState, run_server},
    telemetry,
};
use migration::{Migrator, MigratorTrait};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load()?;
    config.validate()?;

    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = init_pool(&config).await?;
    Migrator::up(&db, None).await?;

    let state = AppState::build(config, db)?;
    run_server(state).await
}
