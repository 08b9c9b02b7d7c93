//! Notion status store. The contract's Notion page carries the editable
//! pipeline status as a select property.

use std::str::FromStr;

use serde_json::json;

use super::models::PipelineStage;
use crate::config::NotionSection;
use crate::errors::DashboardError;

const NOTION_VERSION: &str = "2022-06-28";
const SERVICE: &str = "Notion";

pub struct NotionClient {
    http: reqwest::Client,
    token: String,
    status_property: String,
    base_url: String,
}

/// Request body that sets `property` to the select option `stage`.
pub fn status_payload(property: &str, stage: PipelineStage) -> serde_json::Value {
    json!({
        "properties": {
            property: { "select": { "name": stage.as_str() } }
        }
    })
}

impl NotionClient {
    pub fn from_config(config: &NotionSection) -> Option<Self> {
        Some(Self {
            http: reqwest::Client::new(),
            token: config.token.clone()?,
            status_property: config.status_property.clone(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Write `status` to the page. Only canonical stage labels are sent.
    pub async fn update_status(&self, page_id: &str, status: &str) -> Result<(), DashboardError> {
        let stage = PipelineStage::from_str(status).map_err(|_| DashboardError::InvalidStatus {
            value: status.to_string(),
        })?;

        let resp = self
            .http
            .patch(format!("{}/pages/{}", self.base_url, page_id))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&status_payload(&self.status_property, stage))
            .send()
            .await
            .map_err(|e| DashboardError::upstream(SERVICE, e))?;

        if !resp.status().is_success() {
            let status_code = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(page_id, status = %status_code, "Notion status update failed");
            return Err(DashboardError::upstream(
                SERVICE,
                format!("HTTP {}: {}", status_code, body),
            ));
        }

        tracing::debug!(page_id, status = stage.as_str(), "Notion status updated");
        Ok(())
    }
}
