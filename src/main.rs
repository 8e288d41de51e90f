use std::sync::Arc;

use tokio::signal;

use storefront_bff::auth::AuthHeaderStrategy;
use storefront_bff::core::server::ProxyServer;
use storefront_bff::proxy::{self, ProxyServices};
use storefront_bff::routes::storefront_routes;
use storefront_bff::validate::PassAllValidator;
use storefront_bff::{ConfigError, ProxyConfig, ReqwestTransport, RequestDispatcher};

#[tokio::main]
async fn main() -> Result<(), ConfigError> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load and validate configuration; misconfiguration fails the boot,
    // not the first request.
    let config = ProxyConfig::from_env();
    config.validate()?;

    // Construct the service graph explicitly; nothing here is a global.
    let transport = Arc::new(ReqwestTransport::new(&config.upstream)?);
    let strategy = AuthHeaderStrategy::new(config.upstream.basic_auth_secret.clone());
    let dispatcher = RequestDispatcher::new(transport, strategy, config.upstream.clone());

    let services = Arc::new(ProxyServices {
        dispatcher,
        validator: Arc::new(PassAllValidator),
    });

    let mut router = axum::Router::new();
    for route_set in storefront_routes(&config)? {
        tracing::info!("binding proxy route {}", route_set.path());
        router = proxy::bind(router, route_set, services.clone())?;
    }

    let server = ProxyServer::new(config.server.clone(), router);
    server.start().await?;
    tracing::info!(
        "storefront BFF started on {}:{}",
        config.server.host,
        config.server.port
    );

    // Wait for Ctrl+C
    signal::ctrl_c()
        .await
        .map_err(|e| ConfigError::ValidationError(format!("failed to listen for ctrl-c: {}", e)))?;
    tracing::info!("shutdown signal received, stopping proxy");

    server.stop().await?;
    tracing::info!("proxy stopped");

    Ok(())
}
