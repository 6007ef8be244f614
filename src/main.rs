use anyhow::Result;
use oidc_portal::{auth::ProviderHandle, config::Config, web, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting OIDC portal");

    // Load configuration from environment
    let config = Config::load()?;
    tracing::info!(
        environment = ?config.environment,
        issuer = %config.issuer_url,
        public_base_url = %config.public_base_url,
        "Configuration loaded"
    );

    let provider = Arc::new(ProviderHandle::lazy(config.oidc_settings()));

    // Discover the provider up front so the first login does not pay for it.
    // Failure is not fatal: requests retry discovery lazily and /readyz reports 503.
    match provider.warm_up(config.discovery_max_attempts).await {
        Ok(()) => tracing::info!("OIDC provider ready - readiness check will pass"),
        Err(e) => tracing::error!(
            error = %e,
            "OIDC discovery failed at startup, will retry on demand"
        ),
    }

    // Create shared application state
    let bind_address = config.bind_address();
    let state = Arc::new(AppState {
        config: Arc::new(config),
        provider,
    });

    let app = web::create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Portal listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
