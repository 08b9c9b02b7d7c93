//! Staged status edits and the sequential batch save.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DashboardError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    pub contract_id: String,
    pub status: String,
}

/// Ordered set of unsaved status edits, at most one per contract.
#[derive(Debug, Clone, Default)]
pub struct PendingChanges {
    changes: Vec<PendingChange>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an edit. Re-staging a contract replaces its earlier edit in
    /// place, keeping its original position.
    pub fn stage(&mut self, contract_id: impl Into<String>, status: impl Into<String>) {
        let contract_id = contract_id.into();
        let status = status.into();
        match self.changes.iter_mut().find(|c| c.contract_id == contract_id) {
            Some(existing) => existing.status = status,
            None => self.changes.push(PendingChange {
                contract_id,
                status,
            }),
        }
    }

    /// Discard the staged edit for a contract. Returns whether one existed.
    pub fn discard(&mut self, contract_id: &str) -> bool {
        let before = self.changes.len();
        self.changes.retain(|c| c.contract_id != contract_id);
        self.changes.len() != before
    }

    pub fn get(&self, contract_id: &str) -> Option<&PendingChange> {
        self.changes.iter().find(|c| c.contract_id == contract_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl FromIterator<PendingChange> for PendingChanges {
    fn from_iter<I: IntoIterator<Item = PendingChange>>(iter: I) -> Self {
        let mut pending = Self::new();
        for change in iter {
            pending.stage(change.contract_id, change.status);
        }
        pending
    }
}

/// Destination of a single status write.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    async fn write_status(&self, contract_id: &str, status: &str) -> Result<(), DashboardError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub contract_id: String,
    pub status: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write every staged edit in order, one at a time. Succeeded edits are
/// removed; failed ones stay staged for a retry.
pub async fn save_all(pending: &mut PendingChanges, writer: &dyn StatusWriter) -> BatchReport {
    let mut report = BatchReport::default();
    for change in &pending.changes {
        match writer.write_status(&change.contract_id, &change.status).await {
            Ok(()) => report.succeeded.push(change.contract_id.clone()),
            Err(e) => {
                tracing::warn!(contract_id = %change.contract_id, error = %e, "Status write failed");
                report.failed.push(BatchFailure {
                    contract_id: change.contract_id.clone(),
                    status: change.status.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    pending
        .changes
        .retain(|c| !report.succeeded.contains(&c.contract_id));

    tracing::info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "Batch status save finished"
    );
    report
}
