//! cellmap HTTP server
//!
//! Serves Mapbox vector tiles of H3 cell counts over a DuckDB fact table,
//! filtered by attribute predicates supplied in the request.
//!
//! # Endpoints
//!
//! - `GET /{version}/mvt/{z}/{x}/{y}?format=pbf|geojson&filter=...&fraction=...`
//! - `GET /count?filter=...`
//! - `POST /stats`
//! - `GET /metadata`, `GET /attributes`
//! - `GET /health`
//!
//! # Example
//!
//! ```ignore
//! use cellmap_server::{CellmapServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let server = CellmapServer::new(config).await.unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod config;
pub mod config_file;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use state::AppState;
pub use telemetry::{init_logging, TelemetryConfig};

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// cellmap HTTP Server
pub struct CellmapServer {
    /// Application state
    state: Arc<AppState>,
    /// Configured router
    router: Router,
}

impl CellmapServer {
    /// Create a new server with the given configuration
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let state = Arc::new(AppState::new(config).await?);
        Ok(Self::from_state(state))
    }

    /// Create a server around prepared state
    pub fn from_state(state: Arc<AppState>) -> Self {
        let router = routes::build_router(state.clone());
        Self { state, router }
    }

    /// Get a reference to the application state
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get the router for testing
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until Ctrl-C
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let addr = self.state.config.effective_listen_addr();
        let listener = TcpListener::bind(addr).await?;

        info!(
            addr = %addr,
            db = %self.state.config.db_path.display(),
            max_zoom = self.state.stops.max_zoom(),
            "cellmap server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
