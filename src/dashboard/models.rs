use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The six canonical pipeline stage labels, in pipeline order.
///
/// Writes of a contract status are only accepted when the value is one of
/// these exact strings.
pub const VALID_STATUSES: [&str; 6] = [
    "Discussions Not Started",
    "Initial Agreement Development",
    "Review & Redlines",
    "Agreement Submission",
    "Approval & Signature",
    "Implementation",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    #[default]
    #[serde(rename = "Discussions Not Started")]
    DiscussionsNotStarted,
    #[serde(rename = "Initial Agreement Development")]
    InitialAgreementDevelopment,
    #[serde(rename = "Review & Redlines")]
    ReviewAndRedlines,
    #[serde(rename = "Agreement Submission")]
    AgreementSubmission,
    #[serde(rename = "Approval & Signature")]
    ApprovalAndSignature,
    #[serde(rename = "Implementation")]
    Implementation,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 6] = [
        Self::DiscussionsNotStarted,
        Self::InitialAgreementDevelopment,
        Self::ReviewAndRedlines,
        Self::AgreementSubmission,
        Self::ApprovalAndSignature,
        Self::Implementation,
    ];

    pub fn as_str(&self) -> &'static str {
        VALID_STATUSES[self.ordinal()]
    }

    /// Zero-based position in the pipeline.
    pub fn ordinal(&self) -> usize {
        match self {
            Self::DiscussionsNotStarted => 0,
            Self::InitialAgreementDevelopment => 1,
            Self::ReviewAndRedlines => 2,
            Self::AgreementSubmission => 3,
            Self::ApprovalAndSignature => 4,
            Self::Implementation => 5,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Implementation)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|stage| stage.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid status: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractSource {
    Salesforce,
    Manual,
}

impl ContractSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Salesforce => "salesforce",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for ContractSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "salesforce" => Ok(Self::Salesforce),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Invalid contract source: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub name: String,
    pub value: f64,
    pub status: PipelineStage,
    pub sales_stage: Option<String>,
    pub close_date: Option<NaiveDate>,
    pub award_date: Option<NaiveDate>,
    pub contract_date: Option<NaiveDate>,
    pub notion_page_id: Option<String>,
    pub source: ContractSource,
    pub stage_entered_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for creating a manual contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewContract {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub status: PipelineStage,
    #[serde(default)]
    pub close_date: Option<NaiveDate>,
    #[serde(default)]
    pub award_date: Option<NaiveDate>,
    #[serde(default)]
    pub contract_date: Option<NaiveDate>,
    #[serde(default)]
    pub notion_page_id: Option<String>,
}

/// Contract fields as they arrive from the CRM, before they are merged into
/// the store. `status` is the mapped stage label and may be a passthrough
/// value that is not one of [`VALID_STATUSES`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmContract {
    pub id: String,
    pub name: String,
    pub value: f64,
    pub status: String,
    pub sales_stage: String,
    pub close_date: Option<NaiveDate>,
    pub award_date: Option<NaiveDate>,
    pub contract_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub contract_id: Option<String>,
    pub stage: Option<PipelineStage>,
    pub template_id: Option<String>,
    pub is_auto_generated: bool,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// A task that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub contract_id: Option<String>,
    pub stage: Option<PipelineStage>,
    pub template_id: Option<String>,
    pub is_auto_generated: bool,
}

/// Partial update of a task. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
}

/// Task list filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub contract_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    OriginalContract,
    Redline,
    FinalAgreement,
    SignedContract,
    Amendment,
    StatementOfWork,
    Nda,
    InsuranceCertificate,
    Correspondence,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OriginalContract => "original_contract",
            Self::Redline => "redline",
            Self::FinalAgreement => "final_agreement",
            Self::SignedContract => "signed_contract",
            Self::Amendment => "amendment",
            Self::StatementOfWork => "statement_of_work",
            Self::Nda => "nda",
            Self::InsuranceCertificate => "insurance_certificate",
            Self::Correspondence => "correspondence",
            Self::Other => "other",
        }
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original_contract" => Ok(Self::OriginalContract),
            "redline" => Ok(Self::Redline),
            "final_agreement" => Ok(Self::FinalAgreement),
            "signed_contract" => Ok(Self::SignedContract),
            "amendment" => Ok(Self::Amendment),
            "statement_of_work" => Ok(Self::StatementOfWork),
            "nda" => Ok(Self::Nda),
            "insurance_certificate" => Ok(Self::InsuranceCertificate),
            "correspondence" => Ok(Self::Correspondence),
            "other" => Ok(Self::Other),
            _ => Err(format!("Invalid document type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    UnderReview,
    Final,
    Executed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::UnderReview => "under_review",
            Self::Final => "final",
            Self::Executed => "executed",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "under_review" => Ok(Self::UnderReview),
            "final" => Ok(Self::Final),
            "executed" => Ok(Self::Executed),
            _ => Err(format!("Invalid document status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub contract_id: String,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub version: i32,
    pub is_current_version: bool,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub storage_path: Option<String>,
    pub uploaded_by: Option<String>,
    pub created_at: String,
}

/// Metadata for a document being attached to a contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub doc_type: DocumentType,
    #[serde(default = "default_document_status")]
    pub status: DocumentStatus,
    pub file_name: String,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
}

fn default_document_status() -> DocumentStatus {
    DocumentStatus::Draft
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Salesforce,
    DocuSign,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Salesforce => "salesforce",
            Self::DocuSign => "docusign",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "salesforce" => Ok(Self::Salesforce),
            "docusign" => Ok(Self::DocuSign),
            _ => Err(format!("Invalid provider: {}", s)),
        }
    }
}

/// Stored credentials for one provider. There is at most one row per provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthToken {
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Salesforce instance URL, or the DocuSign account base URI.
    pub instance_url: Option<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl OAuthToken {
    /// True when the token is still usable `skew_secs` from `now`.
    /// Tokens without an expiry are treated as expired.
    pub fn is_fresh(&self, now: chrono::DateTime<chrono::Utc>, skew_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - chrono::Duration::seconds(skew_secs) > now,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }

    pub fn can_edit(&self) -> bool {
        matches!(self, Self::Admin | Self::Editor)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRole {
    pub email: String,
    pub role: Role,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_stage_round_trips_through_labels() {
        for stage in PipelineStage::ALL {
            assert_eq!(PipelineStage::from_str(stage.as_str()), Ok(stage));
        }
        assert_eq!(PipelineStage::ALL.len(), VALID_STATUSES.len());
    }

    #[test]
    fn pipeline_stage_rejects_non_canonical_values() {
        assert!(PipelineStage::from_str("approval & signature").is_err());
        assert!(PipelineStage::from_str("S5 - Approval").is_err());
        assert!(PipelineStage::from_str("").is_err());
    }

    #[test]
    fn pipeline_stage_serializes_as_label() {
        let json = serde_json::to_string(&PipelineStage::ApprovalAndSignature).unwrap();
        assert_eq!(json, "\"Approval & Signature\"");
        let parsed: PipelineStage = serde_json::from_str("\"Review & Redlines\"").unwrap();
        assert_eq!(parsed, PipelineStage::ReviewAndRedlines);
    }

    #[test]
    fn ordinals_follow_pipeline_order() {
        let ordinals: Vec<usize> = PipelineStage::ALL.iter().map(|s| s.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4, 5]);
        assert!(PipelineStage::Implementation.is_final());
        assert!(!PipelineStage::AgreementSubmission.is_final());
    }

    #[test]
    fn task_status_parses_snake_case() {
        assert_eq!(TaskStatus::from_str("in_progress"), Ok(TaskStatus::InProgress));
        assert!(TaskStatus::from_str("done").is_err());
    }

    #[test]
    fn document_type_round_trip() {
        let t = DocumentType::from_str("statement_of_work").unwrap();
        assert_eq!(t, DocumentType::StatementOfWork);
        assert_eq!(t.as_str(), "statement_of_work");
        assert!(DocumentType::from_str("invoice").is_err());
    }

    #[test]
    fn token_freshness_respects_skew() {
        let now = chrono::Utc::now();
        let token = OAuthToken {
            provider: Provider::Salesforce,
            access_token: "abc".into(),
            refresh_token: None,
            instance_url: None,
            expires_at: Some(now + chrono::Duration::seconds(30)),
        };
        assert!(token.is_fresh(now, 0));
        assert!(!token.is_fresh(now, 60));

        let no_expiry = OAuthToken { expires_at: None, ..token };
        assert!(!no_expiry.is_fresh(now, 0));
    }

    #[test]
    fn only_editors_and_admins_can_edit() {
        assert!(Role::Admin.can_edit());
        assert!(Role::Editor.can_edit());
        assert!(!Role::Viewer.can_edit());
    }
}
