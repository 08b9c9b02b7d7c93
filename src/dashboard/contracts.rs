//! Computed contract fields and pipeline KPIs.

use chrono::NaiveDate;
use serde::Serialize;

use super::models::{Contract, PipelineStage};

/// Days ahead of today that count as "closing soon" on the KPI cards.
pub const CLOSING_SOON_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct ContractView {
    #[serde(flatten)]
    pub contract: Contract,
    pub days_until_deadline: Option<i64>,
    pub is_overdue: bool,
    pub progress: u8,
}

impl ContractView {
    pub fn new(contract: Contract, today: NaiveDate) -> Self {
        let days_until_deadline = contract.close_date.map(|d| (d - today).num_days());
        let is_overdue =
            matches!(days_until_deadline, Some(days) if days < 0) && !contract.status.is_final();
        let progress = stage_progress(contract.status);
        Self {
            contract,
            days_until_deadline,
            is_overdue,
            progress,
        }
    }
}

/// Percentage of the pipeline covered once a contract is in `stage`.
pub fn stage_progress(stage: PipelineStage) -> u8 {
    let total = PipelineStage::ALL.len() as f64;
    (((stage.ordinal() + 1) as f64 / total) * 100.0).round() as u8
}

/// List filters accepted by `GET /api/contracts`.
#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct ContractFilter {
    pub search: Option<String>,
    pub status: Option<String>,
}

impl ContractFilter {
    pub fn matches(&self, contract: &Contract) -> bool {
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            if contract.status.as_str() != status {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(needle) => {
                let needle = needle.to_lowercase();
                contract.name.to_lowercase().contains(&needle)
                    || contract.id.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage: PipelineStage,
    pub count: usize,
    pub total_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub stages: Vec<StageSummary>,
    pub total_count: usize,
    pub total_value: f64,
    pub overdue_count: usize,
    pub closing_soon_count: usize,
}

pub fn summarize(views: &[ContractView]) -> PipelineSummary {
    let stages = PipelineStage::ALL
        .iter()
        .map(|stage| {
            let in_stage = views.iter().filter(|v| v.contract.status == *stage);
            let (count, total_value) =
                in_stage.fold((0, 0.0), |(n, sum), v| (n + 1, sum + v.contract.value));
            StageSummary {
                stage: *stage,
                count,
                total_value,
            }
        })
        .collect();

    PipelineSummary {
        stages,
        total_count: views.len(),
        total_value: views.iter().map(|v| v.contract.value).sum(),
        overdue_count: views.iter().filter(|v| v.is_overdue).count(),
        closing_soon_count: views
            .iter()
            .filter(|v| {
                !v.contract.status.is_final()
                    && matches!(v.days_until_deadline, Some(d) if (0..=CLOSING_SOON_DAYS).contains(&d))
            })
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::models::ContractSource;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn contract(id: &str, status: PipelineStage, value: f64, close: Option<&str>) -> Contract {
        Contract {
            id: id.to_string(),
            name: format!("Contract {}", id),
            value,
            status,
            sales_stage: None,
            close_date: close.map(date),
            award_date: None,
            contract_date: None,
            notion_page_id: None,
            source: ContractSource::Manual,
            stage_entered_at: "2025-01-01T00:00:00Z".into(),
            created_at: "2025-01-01 00:00:00".into(),
            updated_at: "2025-01-01 00:00:00".into(),
        }
    }

    #[test]
    fn computes_deadline_and_overdue() {
        let today = date("2025-03-10");
        let late = ContractView::new(
            contract("a", PipelineStage::ReviewAndRedlines, 1.0, Some("2025-03-01")),
            today,
        );
        assert_eq!(late.days_until_deadline, Some(-9));
        assert!(late.is_overdue);

        let ahead = ContractView::new(
            contract("b", PipelineStage::ReviewAndRedlines, 1.0, Some("2025-03-20")),
            today,
        );
        assert_eq!(ahead.days_until_deadline, Some(10));
        assert!(!ahead.is_overdue);
    }

    #[test]
    fn implemented_contracts_are_never_overdue() {
        let view = ContractView::new(
            contract("c", PipelineStage::Implementation, 1.0, Some("2024-01-01")),
            date("2025-03-10"),
        );
        assert!(!view.is_overdue);
        assert_eq!(view.progress, 100);
    }

    #[test]
    fn missing_close_date_has_no_deadline() {
        let view = ContractView::new(
            contract("d", PipelineStage::DiscussionsNotStarted, 1.0, None),
            date("2025-03-10"),
        );
        assert_eq!(view.days_until_deadline, None);
        assert!(!view.is_overdue);
        assert_eq!(view.progress, 17);
    }

    #[test]
    fn progress_increases_through_the_pipeline() {
        let values: Vec<u8> = PipelineStage::ALL.iter().map(|s| stage_progress(*s)).collect();
        assert_eq!(values, vec![17, 33, 50, 67, 83, 100]);
    }

    #[test]
    fn filter_by_search_and_status() {
        let c = contract("006XYZ", PipelineStage::AgreementSubmission, 1.0, None);
        let by_name = ContractFilter {
            search: Some("contract 006".into()),
            status: None,
        };
        assert!(by_name.matches(&c));
        let by_status = ContractFilter {
            search: None,
            status: Some("Review & Redlines".into()),
        };
        assert!(!by_status.matches(&c));
        assert!(ContractFilter::default().matches(&c));
    }

    #[test]
    fn summary_counts_per_stage() {
        let today = date("2025-03-10");
        let views: Vec<ContractView> = vec![
            contract("a", PipelineStage::ReviewAndRedlines, 100.0, Some("2025-03-01")),
            contract("b", PipelineStage::ReviewAndRedlines, 50.0, Some("2025-03-15")),
            contract("c", PipelineStage::Implementation, 25.0, Some("2025-03-12")),
        ]
        .into_iter()
        .map(|c| ContractView::new(c, today))
        .collect();

        let summary = summarize(&views);
        assert_eq!(summary.total_count, 3);
        assert_eq!(summary.total_value, 175.0);
        assert_eq!(summary.overdue_count, 1);
        assert_eq!(summary.closing_soon_count, 1);
        let review = &summary.stages[PipelineStage::ReviewAndRedlines.ordinal()];
        assert_eq!(review.count, 2);
        assert_eq!(review.total_value, 150.0);
        assert_eq!(summary.stages.len(), 6);
    }
}
