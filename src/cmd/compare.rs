//! Contract revision comparison: `dealdesk compare`.

use std::path::Path;

use anyhow::{Context, Result};

use dealdesk::dashboard::compare::compare;
use dealdesk::dashboard::export::export_docx;

pub fn cmd_compare(original: &Path, revised: &Path, docx: Option<&Path>, json: bool) -> Result<()> {
    let original_text = std::fs::read_to_string(original)
        .with_context(|| format!("Failed to read {}", original.display()))?;
    let revised_text = std::fs::read_to_string(revised)
        .with_context(|| format!("Failed to read {}", revised.display()))?;

    let comparison = compare(&original_text, &revised_text);

    if let Some(out) = docx {
        let title = format!(
            "Redline: {} vs {}",
            file_label(original),
            file_label(revised)
        );
        let bytes = export_docx(&title, &comparison.segments, &comparison.stats)?;
        std::fs::write(out, bytes).with_context(|| format!("Failed to write {}", out.display()))?;
        tracing::info!(path = %out.display(), "Redline written");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
        return Ok(());
    }

    let stats = &comparison.stats;
    println!();
    println!("{} -> {}", original.display(), revised.display());
    println!(
        "  {} insertion(s), {} chars inserted",
        stats.insertions, stats.chars_inserted
    );
    println!(
        "  {} deletion(s), {} chars deleted",
        stats.deletions, stats.chars_deleted
    );
    println!("  {:.2}% changed", stats.change_percentage);

    let changed: Vec<_> = comparison.sections.iter().filter(|s| s.has_changes).collect();
    if !changed.is_empty() {
        println!();
        println!("Changed sections:");
        for section in changed {
            println!(
                "  {:<40} +{} / -{}",
                section.title, section.chars_inserted, section.chars_deleted
            );
        }
    }
    if let Some(out) = docx {
        println!();
        println!("Redline written to {}", out.display());
    }
    println!();
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
