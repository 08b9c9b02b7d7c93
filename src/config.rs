//! Layered configuration for dealdesk.
//!
//! Values come from `dealdesk.toml` (all fields optional), then environment
//! variables (a `.env` file is loaded first), then CLI flags.
//!
//! ```toml
//! [server]
//! port = 3200
//! db_path = ".dealdesk/dealdesk.db"
//!
//! [salesforce]
//! client_id = "3MVG9..."
//! login_url = "https://login.salesforce.com"
//! redirect_uri = "http://localhost:3200/api/salesforce/callback"
//!
//! [docusign]
//! integration_key = "..."
//! user_id = "..."
//! private_key_path = "docusign.pem"
//! auth_server = "account-d.docusign.com"
//!
//! [notion]
//! status_property = "Status"
//!
//! [access]
//! enforce_roles = false
//!
//! [logging]
//! filter = "info"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "dealdesk.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_port() -> u16 {
    3200
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".dealdesk/dealdesk.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesforceSection {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_salesforce_login_url")]
    pub login_url: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_salesforce_api_version")]
    pub api_version: String,
    /// Salesforce does not report token lifetimes; access tokens are assumed
    /// valid for this long after issue.
    #[serde(default = "default_token_lifetime_secs")]
    pub token_lifetime_secs: i64,
}

fn default_salesforce_login_url() -> String {
    "https://login.salesforce.com".to_string()
}

fn default_salesforce_api_version() -> String {
    "v59.0".to_string()
}

fn default_token_lifetime_secs() -> i64 {
    7200
}

impl Default for SalesforceSection {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            login_url: default_salesforce_login_url(),
            redirect_uri: None,
            api_version: default_salesforce_api_version(),
            token_lifetime_secs: default_token_lifetime_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocuSignSection {
    #[serde(default)]
    pub integration_key: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    /// Auth server host. A full `http(s)://` base is also accepted.
    #[serde(default = "default_docusign_auth_server")]
    pub auth_server: String,
    /// Redirect used in the consent URL returned with `consent_required`.
    #[serde(default)]
    pub consent_redirect_uri: Option<String>,
}

fn default_docusign_auth_server() -> String {
    "account-d.docusign.com".to_string()
}

impl Default for DocuSignSection {
    fn default() -> Self {
        Self {
            integration_key: None,
            user_id: None,
            private_key_path: None,
            auth_server: default_docusign_auth_server(),
            consent_redirect_uri: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionSection {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_status_property")]
    pub status_property: String,
    #[serde(default = "default_notion_api_url")]
    pub api_url: String,
}

fn default_status_property() -> String {
    "Status".to_string()
}

fn default_notion_api_url() -> String {
    "https://api.notion.com/v1".to_string()
}

impl Default for NotionSection {
    fn default() -> Self {
        Self {
            token: None,
            status_property: default_status_property(),
            api_url: default_notion_api_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessSection {
    /// Require an editor or admin caller (`x-user-email`) on write routes.
    #[serde(default)]
    pub enforce_roles: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub salesforce: SalesforceSection,
    #[serde(default)]
    pub docusign: DocuSignSection,
    #[serde(default)]
    pub notion: NotionSection,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl DashboardConfig {
    /// Parse a config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid dealdesk configuration")
    }

    /// Load the file, then apply `.env` and process environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        ignore_missing_env_file(dotenvy::dotenv())?;
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup function.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("DEALDESK_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("DEALDESK_PORT is not a port number: {}", port))?;
        }
        if let Some(path) = get("DEALDESK_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }

        if let Some(v) = get("SALESFORCE_CLIENT_ID") {
            self.salesforce.client_id = Some(v);
        }
        if let Some(v) = get("SALESFORCE_CLIENT_SECRET") {
            self.salesforce.client_secret = Some(v);
        }
        if let Some(v) = get("SALESFORCE_LOGIN_URL") {
            self.salesforce.login_url = v;
        }
        if let Some(v) = get("SALESFORCE_REDIRECT_URI") {
            self.salesforce.redirect_uri = Some(v);
        }

        if let Some(v) = get("DOCUSIGN_INTEGRATION_KEY") {
            self.docusign.integration_key = Some(v);
        }
        if let Some(v) = get("DOCUSIGN_USER_ID") {
            self.docusign.user_id = Some(v);
        }
        if let Some(v) = get("DOCUSIGN_PRIVATE_KEY_PATH") {
            self.docusign.private_key_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DOCUSIGN_AUTH_SERVER") {
            self.docusign.auth_server = v;
        }

        if let Some(v) = get("NOTION_TOKEN") {
            self.notion.token = Some(v);
        }

        Ok(())
    }

    pub fn salesforce_configured(&self) -> bool {
        self.salesforce.client_id.is_some() && self.salesforce.redirect_uri.is_some()
    }

    pub fn docusign_configured(&self) -> bool {
        self.docusign.integration_key.is_some()
            && self.docusign.user_id.is_some()
            && self.docusign.private_key_path.is_some()
    }
}

/// A missing `.env` is normal; a malformed one is an error.
fn ignore_missing_env_file<T>(result: dotenvy::Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e).context("Failed to load .env file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = DashboardConfig::from_file(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.server.port, 3200);
        assert_eq!(config.server.db_path, PathBuf::from(".dealdesk/dealdesk.db"));
        assert_eq!(config.salesforce.login_url, "https://login.salesforce.com");
        assert_eq!(config.notion.status_property, "Status");
        assert!(!config.access.enforce_roles);
        assert!(!config.salesforce_configured());
        assert!(!config.docusign_configured());
    }

    #[test]
    fn parses_partial_toml() {
        let config = DashboardConfig::from_toml(
            r#"
            [server]
            port = 8080

            [salesforce]
            client_id = "abc"
            redirect_uri = "http://localhost:8080/api/salesforce/callback"

            [access]
            enforce_roles = true
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.salesforce.api_version, "v59.0");
        assert!(config.salesforce_configured());
        assert!(config.access.enforce_roles);
    }

    #[test]
    fn rejects_invalid_toml() {
        assert!(DashboardConfig::from_toml("[server]\nport = \"not a number\"").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = DashboardConfig::from_toml("[server]\nport = 8080").unwrap();
        let env: HashMap<&str, &str> = [
            ("DEALDESK_PORT", "9090"),
            ("NOTION_TOKEN", "secret_abc"),
            ("SALESFORCE_CLIENT_ID", "   "),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.notion.token.as_deref(), Some("secret_abc"));
        // Blank values are ignored
        assert!(config.salesforce.client_id.is_none());
    }

    #[test]
    fn env_port_must_be_numeric() {
        let mut config = DashboardConfig::default();
        let result = config.apply_env(|k| (k == "DEALDESK_PORT").then(|| "abc".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn missing_env_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let result = ignore_missing_env_file(dotenvy::from_path(dir.path().join(".env")));
        assert!(result.is_ok());
    }

    #[test]
    fn malformed_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "this is not an assignment\n").unwrap();
        let err = ignore_missing_env_file(dotenvy::from_path(&path)).unwrap_err();
        assert!(err.to_string().contains(".env"));
    }
}
