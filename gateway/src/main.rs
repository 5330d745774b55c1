use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelrelay_gateway::billing::NullLedger;
use modelrelay_gateway::catalog::StaticCatalog;
use modelrelay_gateway::{routes, AppState, Config, Gateway};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ModelRelay inference gateway");

    // Build the gateway core
    let catalog = Arc::new(StaticCatalog::from_config(&config.catalog));
    let gateway = Gateway::new(
        config.health.to_health_config(),
        config.queue.to_queue_config(),
        config.execution.to_execution_config(),
        catalog,
    );

    // Register the configured fleet
    for descriptor in &config.instances {
        gateway.register(descriptor.clone()).await?;
    }
    tracing::info!("Registered {} instance(s) from configuration", config.instances.len());

    // Start background tasks (health checker, queue drain)
    gateway.start();

    let state = Arc::new(AppState {
        config: config.clone(),
        gateway,
        ledger: Arc::new(NullLedger),
    });

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, routes::app(state)).await?;

    Ok(())
}
