//! Task templates spawned when a contract enters a pipeline stage.
//!
//! Templates are static. `generate_tasks_for_stage` turns the templates of a
//! stage into concrete [`NewTask`] records whose due dates are computed from
//! either the stage-entry date or the contract's close date.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use super::models::{NewTask, PipelineStage, Priority, TaskStatus};

/// How a template's due date is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "offset_days", rename_all = "snake_case")]
pub enum DueDateRule {
    /// Offset in days from the date the contract entered the stage.
    FromStageEntry(i64),
    /// Offset in days from the contract close date (negative = before).
    FromCloseDate(i64),
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskTemplate {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub priority: Priority,
    pub due_date_rule: DueDateRule,
}

const DISCUSSIONS_NOT_STARTED: &[TaskTemplate] = &[
    TaskTemplate {
        id: "dns-identify-contacts",
        title: "Identify customer contracting contacts",
        description: "Confirm the legal and procurement contacts on the customer side.",
        priority: Priority::Medium,
        due_date_rule: DueDateRule::FromStageEntry(7),
    },
    TaskTemplate {
        id: "dns-schedule-kickoff",
        title: "Schedule contracting kickoff",
        description: "Set up the first discussion on terms, scope and timeline.",
        priority: Priority::Medium,
        due_date_rule: DueDateRule::FromStageEntry(14),
    },
];

const INITIAL_AGREEMENT_DEVELOPMENT: &[TaskTemplate] = &[
    TaskTemplate {
        id: "iad-draft-agreement",
        title: "Draft initial agreement",
        description: "Prepare the first draft from the standard agreement template.",
        priority: Priority::High,
        due_date_rule: DueDateRule::FromStageEntry(5),
    },
    TaskTemplate {
        id: "iad-pricing-review",
        title: "Review pricing and payment terms",
        description: "Validate pricing, payment schedule and discount approvals.",
        priority: Priority::High,
        due_date_rule: DueDateRule::FromStageEntry(7),
    },
    TaskTemplate {
        id: "iad-send-draft",
        title: "Send draft to customer",
        description: "Share the initial agreement draft with the customer contacts.",
        priority: Priority::Medium,
        due_date_rule: DueDateRule::FromStageEntry(10),
    },
];

const REVIEW_AND_REDLINES: &[TaskTemplate] = &[
    TaskTemplate {
        id: "rr-review-redlines",
        title: "Review customer redlines",
        description: "Go through the customer's tracked changes and flag open points.",
        priority: Priority::High,
        due_date_rule: DueDateRule::FromStageEntry(3),
    },
    TaskTemplate {
        id: "rr-legal-review",
        title: "Legal review of changes",
        description: "Get legal sign-off on non-standard clauses.",
        priority: Priority::High,
        due_date_rule: DueDateRule::FromStageEntry(7),
    },
    TaskTemplate {
        id: "rr-return-redlines",
        title: "Return counter-redlines",
        description: "Send the consolidated response to the customer.",
        priority: Priority::Medium,
        due_date_rule: DueDateRule::FromStageEntry(10),
    },
];

const AGREEMENT_SUBMISSION: &[TaskTemplate] = &[
    TaskTemplate {
        id: "sub-final-check",
        title: "Final agreement check",
        description: "Verify that all agreed changes are reflected in the final version.",
        priority: Priority::High,
        due_date_rule: DueDateRule::FromStageEntry(2),
    },
    TaskTemplate {
        id: "sub-submit-agreement",
        title: "Submit agreement for approval",
        description: "Submit the final agreement to the customer's approval process.",
        priority: Priority::High,
        due_date_rule: DueDateRule::FromCloseDate(-21),
    },
];

const APPROVAL_AND_SIGNATURE: &[TaskTemplate] = &[
    TaskTemplate {
        id: "as-internal-approval",
        title: "Obtain internal approval",
        description: "Collect internal signatory approval before sending for signature.",
        priority: Priority::High,
        due_date_rule: DueDateRule::FromStageEntry(3),
    },
    TaskTemplate {
        id: "as-send-docusign",
        title: "Send agreement via DocuSign",
        description: "Create and send the DocuSign envelope to all signatories.",
        priority: Priority::Critical,
        due_date_rule: DueDateRule::FromCloseDate(-10),
    },
    TaskTemplate {
        id: "as-confirm-signatures",
        title: "Confirm all signatures received",
        description: "Check the envelope status and chase outstanding signers.",
        priority: Priority::High,
        due_date_rule: DueDateRule::FromCloseDate(-3),
    },
];

const IMPLEMENTATION: &[TaskTemplate] = &[
    TaskTemplate {
        id: "impl-archive-signed",
        title: "Archive signed contract",
        description: "Upload the executed agreement to the document checklist.",
        priority: Priority::Medium,
        due_date_rule: DueDateRule::FromStageEntry(2),
    },
    TaskTemplate {
        id: "impl-handoff",
        title: "Hand off to delivery team",
        description: "Share obligations, milestones and contacts with the delivery team.",
        priority: Priority::Medium,
        due_date_rule: DueDateRule::FromStageEntry(5),
    },
    TaskTemplate {
        id: "impl-kickoff",
        title: "Hold implementation kickoff",
        description: "Run the kickoff meeting with the customer.",
        priority: Priority::Low,
        due_date_rule: DueDateRule::FromStageEntry(14),
    },
];

/// Templates for a stage, in the order tasks are created.
pub fn templates_for_stage(stage: PipelineStage) -> &'static [TaskTemplate] {
    match stage {
        PipelineStage::DiscussionsNotStarted => DISCUSSIONS_NOT_STARTED,
        PipelineStage::InitialAgreementDevelopment => INITIAL_AGREEMENT_DEVELOPMENT,
        PipelineStage::ReviewAndRedlines => REVIEW_AND_REDLINES,
        PipelineStage::AgreementSubmission => AGREEMENT_SUBMISSION,
        PipelineStage::ApprovalAndSignature => APPROVAL_AND_SIGNATURE,
        PipelineStage::Implementation => IMPLEMENTATION,
    }
}

impl TaskTemplate {
    /// Due date for this template. A close-date rule without a close date
    /// falls back to the stage-entry date.
    pub fn due_date(&self, stage_entered: NaiveDate, close_date: Option<NaiveDate>) -> NaiveDate {
        let (base, offset) = match self.due_date_rule {
            DueDateRule::FromStageEntry(days) => (stage_entered, days),
            DueDateRule::FromCloseDate(days) => (close_date.unwrap_or(stage_entered), days),
        };
        base + Duration::days(offset)
    }

    pub fn instantiate(
        &self,
        stage: PipelineStage,
        contract_id: Option<&str>,
        stage_entered: NaiveDate,
        close_date: Option<NaiveDate>,
    ) -> NewTask {
        NewTask {
            title: self.title.to_string(),
            description: self.description.to_string(),
            status: TaskStatus::Pending,
            priority: self.priority,
            due_date: Some(self.due_date(stage_entered, close_date)),
            contract_id: contract_id.map(str::to_string),
            stage: Some(stage),
            template_id: Some(self.id.to_string()),
            is_auto_generated: true,
        }
    }
}

/// Build the auto-generated tasks for a contract that just entered `stage`.
///
/// `stage` is the raw stage label; a label that is not a pipeline stage
/// yields no tasks.
pub fn generate_tasks_for_stage(
    contract_id: Option<&str>,
    stage: &str,
    close_date: Option<NaiveDate>,
    stage_entered: NaiveDate,
) -> Vec<NewTask> {
    let Ok(stage) = stage.parse::<PipelineStage>() else {
        return Vec::new();
    };
    templates_for_stage(stage)
        .iter()
        .map(|t| t.instantiate(stage, contract_id, stage_entered, close_date))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn send_docusign_is_due_ten_days_before_close() {
        let tasks = generate_tasks_for_stage(
            Some("006A"),
            "Approval & Signature",
            Some(date("2025-03-01")),
            date("2025-02-01"),
        );
        let send = tasks
            .iter()
            .find(|t| t.template_id.as_deref() == Some("as-send-docusign"))
            .expect("as-send-docusign should be generated");
        assert_eq!(send.due_date, Some(date("2025-02-19")));
        assert_eq!(send.priority, Priority::Critical);
    }

    #[test]
    fn every_stage_generates_its_template_count() {
        let entered = date("2025-01-10");
        for stage in PipelineStage::ALL {
            let tasks = generate_tasks_for_stage(None, stage.as_str(), None, entered);
            assert_eq!(tasks.len(), templates_for_stage(stage).len(), "stage {}", stage);
            assert!(!tasks.is_empty(), "stage {} has no templates", stage);
        }
    }

    #[test]
    fn stage_entry_rule_offsets_from_entry_date() {
        let tasks = generate_tasks_for_stage(
            Some("c1"),
            "Review & Redlines",
            Some(date("2025-12-31")),
            date("2025-01-30"),
        );
        let due: Vec<_> = tasks.iter().map(|t| t.due_date.unwrap()).collect();
        assert_eq!(due, vec![date("2025-02-02"), date("2025-02-06"), date("2025-02-09")]);
    }

    #[test]
    fn close_date_rule_falls_back_to_stage_entry() {
        let tasks =
            generate_tasks_for_stage(None, "Approval & Signature", None, date("2025-02-01"));
        let send = tasks
            .iter()
            .find(|t| t.template_id.as_deref() == Some("as-send-docusign"))
            .unwrap();
        assert_eq!(send.due_date, Some(date("2025-01-22")));
    }

    #[test]
    fn generated_tasks_are_flagged_and_pending() {
        let tasks =
            generate_tasks_for_stage(Some("c9"), "Implementation", None, date("2025-05-01"));
        for task in &tasks {
            assert!(task.is_auto_generated);
            assert_eq!(task.status, TaskStatus::Pending);
            assert_eq!(task.contract_id.as_deref(), Some("c9"));
            assert_eq!(task.stage, Some(PipelineStage::Implementation));
        }
    }

    #[test]
    fn unknown_stage_yields_no_tasks() {
        assert!(generate_tasks_for_stage(None, "Closed Won", None, date("2025-01-01")).is_empty());
        assert!(generate_tasks_for_stage(None, "", None, date("2025-01-01")).is_empty());
    }

    #[test]
    fn template_ids_are_unique() {
        let mut ids: Vec<&str> = PipelineStage::ALL
            .iter()
            .flat_map(|s| templates_for_stage(*s).iter().map(|t| t.id))
            .collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
