use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};
use super::db::{DashboardDb, DbHandle};
use crate::config::DashboardConfig;

/// Configuration for the dashboard server.
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    /// Open the dashboard in a browser once the listener is bound.
    pub open_browser: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3200,
            db_path: PathBuf::from(".dealdesk/dealdesk.db"),
            dev_mode: false,
            open_browser: false,
        }
    }
}

impl ServerConfig {
    pub fn from_dashboard(config: &DashboardConfig) -> Self {
        Self {
            port: config.server.port,
            db_path: config.server.db_path.clone(),
            dev_mode: config.server.dev_mode,
            open_browser: false,
        }
    }
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open (creating directories as needed) the SQLite store at `path`.
pub fn open_database(path: &std::path::Path) -> Result<DashboardDb> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    DashboardDb::new(path).context("Failed to initialize dashboard database")
}

/// Start the dashboard server and run until Ctrl+C.
pub async fn start_server(server: ServerConfig, config: DashboardConfig) -> Result<()> {
    let db = open_database(&server.db_path)?;
    let state = Arc::new(AppState::new(DbHandle::new(db), config)?);

    let mut app = build_router(state);
    if server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if server.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, db = %server.db_path.display(), "dealdesk API listening");

    if server.open_browser {
        let url = format!("http://{}", local_addr);
        if let Err(e) = open::that(&url) {
            tracing::warn!(error = %e, url, "Could not open browser");
        }
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
