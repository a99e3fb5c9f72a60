mod applications;
mod conversations;
mod hub;
mod jobs;
mod maintenance;
mod notifications;
mod problem;
mod router;
mod session;
mod telemetry;

use std::net::SocketAddr;

use tracing::info;
use url::Url;

use joblane_clients::{BlobClient, IdentityClient};
use joblane_storage::Database;
use joblane_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let storage = Database::connect(&config.database_url).await?;
    storage.run_migrations().await?;

    let http = reqwest::Client::new();
    let identity = IdentityClient::new(
        Url::parse(&config.identity_base_url)?,
        std::env::var("IDENTITY_SERVICE_TOKEN").unwrap_or_default(),
        http.clone(),
    );
    let blob = BlobClient::new(Url::parse(&config.blob_base_url)?, http);

    maintenance::MaintenanceWorker::new(storage.clone()).spawn();

    let state = router::AppState::new(
        metrics,
        storage,
        identity,
        blob,
        &config.session_token_secret,
        config.sse_heartbeat_secs,
    );

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
