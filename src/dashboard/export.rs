//! Redline export: renders a comparison as a Word document.

use std::io::Cursor;

use anyhow::Context;
use docx_rs::{Docx, Paragraph, Run};

use super::compare::{DiffStats, Segment, SegmentKind};

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const DELETE_COLOR: &str = "C00000";
const INSERT_COLOR: &str = "1F4E9F";
const TITLE_SIZE: usize = 32;

fn summary_line(stats: &DiffStats) -> String {
    format!(
        "{} insertions ({} characters), {} deletions ({} characters), {:.2}% changed",
        stats.insertions,
        stats.chars_inserted,
        stats.deletions,
        stats.chars_deleted,
        stats.change_percentage
    )
}

fn styled_run(kind: SegmentKind, text: &str) -> Run {
    let run = Run::new().add_text(text);
    match kind {
        SegmentKind::Equal => run,
        SegmentKind::Delete => run.strike().color(DELETE_COLOR),
        SegmentKind::Insert => run.underline("single").color(INSERT_COLOR),
    }
}

/// One paragraph per line of the merged text, with each segment's part of
/// the line as a separately styled run.
fn body_paragraphs(segments: &[Segment]) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    let mut current = Paragraph::new();
    for segment in segments {
        let mut lines = segment.text.split('\n').peekable();
        while let Some(line) = lines.next() {
            if !line.is_empty() {
                current = current.add_run(styled_run(segment.kind, line));
            }
            if lines.peek().is_some() {
                paragraphs.push(std::mem::replace(&mut current, Paragraph::new()));
            }
        }
    }
    paragraphs.push(current);
    paragraphs
}

fn redline_document(title: &str, segments: &[Segment], stats: &DiffStats) -> Docx {
    let mut docx = Docx::new()
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text(title).bold().size(TITLE_SIZE)))
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text(summary_line(stats)).italic()))
        .add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text("Legend: "))
                .add_run(styled_run(SegmentKind::Delete, "deleted text"))
                .add_run(Run::new().add_text(" / "))
                .add_run(styled_run(SegmentKind::Insert, "inserted text")),
        )
        .add_paragraph(Paragraph::new());

    for paragraph in body_paragraphs(segments) {
        docx = docx.add_paragraph(paragraph);
    }
    docx
}

/// Build the redline document and return the packed `.docx` bytes.
pub fn export_docx(title: &str, segments: &[Segment], stats: &DiffStats) -> anyhow::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    redline_document(title, segments, stats)
        .build()
        .pack(&mut buf)
        .context("Failed to write DOCX archive")?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::compare::compare;

    #[test]
    fn export_produces_zip_container() {
        let result = compare(
            "1. Payment Terms\nFees are due in 30 days.\n",
            "1. Payment Terms\nFees are due in 45 days.\n",
        );
        let bytes = export_docx("Acme MSA redline", &result.segments, &result.stats).unwrap();
        assert!(bytes.len() > 100);
        assert_eq!(&bytes[..2], b"PK");
    }

    /// The `word/document.xml` run that holds `text`.
    fn run_containing<'a>(document: &'a str, text: &str) -> &'a str {
        document
            .split("</w:r>")
            .find(|run| run.contains(&format!(">{}<", text)))
            .unwrap_or_else(|| panic!("no run contains {:?}", text))
    }

    #[test]
    fn deletions_are_struck_and_insertions_underlined() {
        let segments = vec![
            Segment {
                kind: SegmentKind::Equal,
                text: "Fees are due in ".into(),
            },
            Segment {
                kind: SegmentKind::Delete,
                text: "thirty".into(),
            },
            Segment {
                kind: SegmentKind::Insert,
                text: "forty-five".into(),
            },
            Segment {
                kind: SegmentKind::Equal,
                text: " days.".into(),
            },
        ];
        let xml = redline_document("Acme MSA redline", &segments, &DiffStats::default())
            .build()
            .document;
        let document = String::from_utf8(xml).unwrap();

        let deleted = run_containing(&document, "thirty");
        assert!(deleted.contains("<w:strike"), "{}", deleted);
        assert!(deleted.contains(DELETE_COLOR));
        assert!(!deleted.contains("<w:u "));

        let inserted = run_containing(&document, "forty-five");
        assert!(inserted.contains(r#"<w:u w:val="single""#), "{}", inserted);
        assert!(inserted.contains(INSERT_COLOR));
        assert!(!inserted.contains("<w:strike"));

        let unchanged = run_containing(&document, " days.");
        assert!(!unchanged.contains("<w:strike"));
        assert!(!unchanged.contains("<w:u "));
    }

    #[test]
    fn export_handles_empty_comparison() {
        let bytes = export_docx("Empty", &[], &DiffStats::default()).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn lines_become_paragraphs() {
        let segments = vec![
            Segment {
                kind: SegmentKind::Equal,
                text: "first line\nsecond ".into(),
            },
            Segment {
                kind: SegmentKind::Insert,
                text: "added\nthird".into(),
            },
        ];
        assert_eq!(body_paragraphs(&segments).len(), 3);
    }

    #[test]
    fn summary_mentions_counts() {
        let stats = DiffStats {
            insertions: 2,
            deletions: 1,
            chars_inserted: 10,
            chars_deleted: 4,
            chars_unchanged: 86,
            change_percentage: 14.0,
        };
        let line = summary_line(&stats);
        assert!(line.starts_with("2 insertions (10 characters), 1 deletions"));
        assert!(line.ends_with("14.00% changed"));
    }
}
