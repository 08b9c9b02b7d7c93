//! Salesforce `StageName` → pipeline stage label.

use super::models::PipelineStage;

/// Ordered substring table. The first entry whose key occurs anywhere in the
/// CRM stage name wins, so a longer code such as `S10` is caught by `S1`.
const STAGE_CODES: [(&str, PipelineStage); 6] = [
    ("S1", PipelineStage::DiscussionsNotStarted),
    ("S2", PipelineStage::InitialAgreementDevelopment),
    ("S3", PipelineStage::ReviewAndRedlines),
    ("S4", PipelineStage::AgreementSubmission),
    ("S5", PipelineStage::ApprovalAndSignature),
    ("S6", PipelineStage::Implementation),
];

/// Map a raw Salesforce stage name to a dashboard status label.
///
/// Unmapped names pass through unchanged, so the mapping is total and
/// mapping an already-mapped value returns it as is.
pub fn map_salesforce_stage(sales_stage: &str) -> String {
    STAGE_CODES
        .iter()
        .find(|(code, _)| sales_stage.contains(code))
        .map(|(_, stage)| stage.as_str().to_string())
        .unwrap_or_else(|| sales_stage.to_string())
}

/// The mapped stage, when the CRM name maps to one of the six stages.
pub fn pipeline_stage_for(sales_stage: &str) -> Option<PipelineStage> {
    map_salesforce_stage(sales_stage).parse().ok()
}

/// The code table, for display in the CLI.
pub fn stage_codes() -> impl Iterator<Item = (&'static str, PipelineStage)> {
    STAGE_CODES.iter().copied()
}
