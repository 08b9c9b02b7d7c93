//! Task template preview commands: `dealdesk tasks` and `dealdesk stages`.

use anyhow::{Result, bail};
use chrono::NaiveDate;

use dealdesk::dashboard::models::{PipelineStage, VALID_STATUSES};
use dealdesk::dashboard::stage_map::{pipeline_stage_for, stage_codes};
use dealdesk::dashboard::templates::generate_tasks_for_stage;

/// Accept either a pipeline label ("Review & Redlines") or anything the CRM
/// stage mapping understands ("S3", "S3 - Negotiation").
fn resolve_stage(input: &str) -> Option<PipelineStage> {
    input
        .parse::<PipelineStage>()
        .ok()
        .or_else(|| pipeline_stage_for(input))
}

pub fn cmd_tasks(
    stage: &str,
    close_date: Option<NaiveDate>,
    entered: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    let Some(stage) = resolve_stage(stage) else {
        bail!(
            "Unknown stage '{}'. Valid stages: {}",
            stage,
            VALID_STATUSES.join(", ")
        );
    };
    let entered = entered.unwrap_or_else(|| chrono::Local::now().date_naive());
    let tasks = generate_tasks_for_stage(None, stage.as_str(), close_date, entered);

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    println!();
    println!("{} (entered {})", stage.as_str(), entered);
    if let Some(close) = close_date {
        println!("Close date: {}", close);
    }
    println!();
    for task in &tasks {
        let due = task
            .due_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<28} {:<8} due {}  {}",
            task.template_id.as_deref().unwrap_or("-"),
            task.priority.as_str(),
            due,
            task.title
        );
    }
    println!();
    println!("{} task(s)", tasks.len());
    Ok(())
}

pub fn cmd_stages() {
    println!();
    println!("Pipeline stages");
    println!("===============");
    for (code, stage) in stage_codes() {
        println!("  {}  {}", code, stage.as_str());
    }
    println!();
}
