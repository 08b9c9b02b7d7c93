//! Typed error hierarchy for the dashboard back-end.
//!
//! `DashboardError` is what domain operations and vendor adapters return;
//! the HTTP layer turns it into a status code and a `{"error": ...}` body.

use thiserror::Error;

use crate::dashboard::models::Provider;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Contract {id} not found")]
    ContractNotFound { id: String },

    #[error("Contract {id} already exists")]
    ContractExists { id: String },

    #[error("Task {id} not found")]
    TaskNotFound { id: i64 },

    #[error("Invalid status '{value}'")]
    InvalidStatus { value: String },

    /// The stored credentials for a provider cannot be refreshed; the user has
    /// to go through the authorization flow again.
    #[error("{provider} authorization expired, reauthorization required")]
    ReauthRequired {
        provider: Provider,
        authorize_url: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{service} request failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DashboardError {
    pub fn upstream(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            service,
            message: err.to_string(),
        }
    }

    pub fn is_reauth(&self) -> bool {
        matches!(self, Self::ReauthRequired { .. })
    }
}
