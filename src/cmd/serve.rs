//! Dashboard server commands: `dealdesk serve` and `dealdesk init-db`.

use std::path::Path;

use anyhow::Result;

use dealdesk::config::DashboardConfig;
use dealdesk::dashboard::server::{ServerConfig, open_database, start_server};

pub async fn cmd_serve(config: DashboardConfig, open: bool) -> Result<()> {
    if !config.salesforce_configured() {
        tracing::warn!("Salesforce is not configured; CRM sync routes will return 400");
    }
    if !config.docusign_configured() {
        tracing::warn!("DocuSign is not configured; envelope routes will return 400");
    }

    let mut server = ServerConfig::from_dashboard(&config);
    // No browser inside dev containers
    server.open_browser = open && !server.dev_mode;
    start_server(server, config).await
}

pub fn cmd_init_db(db_path: &Path) -> Result<()> {
    open_database(db_path)?;
    println!("Dashboard database initialized at {}", db_path.display());
    Ok(())
}
