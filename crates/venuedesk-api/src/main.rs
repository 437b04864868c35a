mod auth;
mod config;
mod error;
mod routes;

use std::sync::Arc;

use config::ApiConfig;
use routes::{app_router, AppState};
use tracing_subscriber::EnvFilter;
use venuedesk_core::config::{RemoteConfig, SyncSettings};
use venuedesk_core::mapper::MapperContext;
use venuedesk_core::reconcile::ReconciliationJob;
use venuedesk_core::remote::CrmClient;
use venuedesk_core::services::StoreService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    for directive in ["venuedesk_api=info", "venuedesk_core=info"] {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Arc::new(ApiConfig::from_env()?);
    let remote_config = RemoteConfig::from_env()?;
    let settings = SyncSettings::from_env()?;
    tracing::info!(?config, ?remote_config, "Starting venuedesk-api");

    let store = StoreService::open_path(config.db_path.clone()).await?;
    let client = CrmClient::new(&remote_config)?.with_page_limit(settings.remote_page_limit);
    let job = ReconciliationJob::new(
        Arc::new(client),
        store.clone(),
        MapperContext::from_config(&remote_config),
        settings,
    );

    let state = AppState::new(config, job, store);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("venuedesk-api listening on {}", bind_addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {error}");
    }
    tracing::info!("Shutting down");
}
