//! API Server
//!
//! Binds the router to a TCP listener and shuts down on Ctrl+C or SIGTERM.

use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, metrics_middleware, request_id_middleware},
    routes::create_router,
};
use crate::casino::Casino;
use crate::config::{ApiConfig, MonitoringConfig};

/// HTTP adapter over one [`Casino`]
pub struct ApiServer {
    config: ApiConfig,
    monitoring: MonitoringConfig,
    casino: Arc<Casino>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, monitoring: MonitoringConfig, casino: Arc<Casino>) -> Self {
        Self { config, monitoring, casino }
    }

    /// Start the API server
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = build_app(self.casino.clone(), &self.config, &self.monitoring);
        let addr = self.socket_addr()?;

        self.log_server_info(addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);

        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((self.config.host.parse::<std::net::IpAddr>()?, self.config.port)))
    }

    fn log_server_info(&self, addr: SocketAddr) {
        info!(
            %addr,
            cors = ?self.config.allowed_origins,
            timeout_secs = self.config.request_timeout_secs,
            metrics = self.monitoring.enable_metrics,
            "starting stakehouse API"
        );
    }
}

/// Router with the full middleware stack
pub fn build_app(casino: Arc<Casino>, config: &ApiConfig, monitoring: &MonitoringConfig) -> axum::Router {
    let state = Arc::new(AppState::new(casino, monitoring.enable_metrics));

    create_router(state.clone())
        .layer(axum::middleware::from_fn_with_state(state, metrics_middleware))
        // Request ID middleware (outside the handlers so every response carries one)
        .layer(axum::middleware::from_fn(request_id_middleware))
        // CORS layer (before timeout to handle preflight)
        .layer(create_cors_layer(config.allowed_origins.clone()))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
