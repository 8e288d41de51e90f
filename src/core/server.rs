use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::ConfigError;

/// HTTP server hosting the proxy routes
///
/// Owns the listener lifecycle: `start` spawns the server task, `stop`
/// signals graceful shutdown and waits for it.
pub struct ProxyServer {
    config: ServerConfig,
    router: Router,
    state: Arc<tokio::sync::Mutex<ServerState>>,
}

/// Server state that can be mutated
struct ServerState {
    /// Server handle for graceful shutdown
    server_handle: Option<tokio::task::JoinHandle<()>>,

    /// Shutdown signal sender
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl ProxyServer {
    /// Create a server for the given routes
    pub fn new(config: ServerConfig, router: Router) -> Self {
        Self {
            config,
            router,
            state: Arc::new(tokio::sync::Mutex::new(ServerState {
                server_handle: None,
                shutdown_tx: None,
            })),
        }
    }

    /// Start serving in a background task
    pub async fn start(&self) -> Result<(), ConfigError> {
        let mut state = self.state.lock().await;
        if state.server_handle.is_some() {
            return Err(ConfigError::ValidationError(
                "server is already running".to_string(),
            ));
        }

        let app = self
            .router
            .clone()
            .route("/health", axum::routing::get(|| async { "OK" }))
            .layer(TraceLayer::new_for_http());

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("invalid address: {}", e)))?;

        tracing::info!("starting proxy server on {}", addr);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let server_handle = tokio::spawn(async move {
            let server = axum::Server::bind(&addr).serve(app.into_make_service());

            let graceful = server.with_graceful_shutdown(async {
                shutdown_rx.await.ok();
                tracing::info!("shutdown signal received, starting graceful shutdown");
            });

            if let Err(e) = graceful.await {
                tracing::error!("server error: {}", e);
            }
        });

        state.server_handle = Some(server_handle);
        state.shutdown_tx = Some(shutdown_tx);

        Ok(())
    }

    /// Signal shutdown and wait for the server task to finish
    pub async fn stop(&self) -> Result<(), ConfigError> {
        let mut state = self.state.lock().await;

        if state.server_handle.is_none() {
            return Err(ConfigError::ValidationError(
                "server is not running".to_string(),
            ));
        }

        if let Some(tx) = state.shutdown_tx.take() {
            // The receiver may already be gone; that is fine.
            let _ = tx.send(());
        }

        if let Some(handle) = state.server_handle.take() {
            handle.await.map_err(|e| {
                ConfigError::ValidationError(format!("error while shutting down server: {}", e))
            })?;
            tracing::info!("server has been shut down gracefully");
        }

        Ok(())
    }
}
