//! Character-level comparison of two contract texts.
//!
//! The diff itself comes from `dissimilar` (a port of diff-match-patch with
//! semantic cleanup). On top of it this module merges adjacent segments,
//! computes change statistics, and groups changes by contract section.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Longest heading title kept in a section summary.
const MAX_TITLE_CHARS: usize = 80;

pub const PREAMBLE_TITLE: &str = "Preamble";

// "ARTICLE 4", "Article IV", "Section 2.1", "3. Payment Terms"
static NUMBERED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?i:article|section)\s+(?:\d+(?:\.\d+)*|[IVXLC]+)\b|\d{1,3}(?:\.\d{1,3})*\.?\s+[A-Z])")
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffStats {
    pub insertions: usize,
    pub deletions: usize,
    pub chars_inserted: usize,
    pub chars_deleted: usize,
    pub chars_unchanged: usize,
    pub change_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionChanges {
    pub title: String,
    pub insertions: usize,
    pub deletions: usize,
    pub chars_inserted: usize,
    pub chars_deleted: usize,
    pub has_changes: bool,
}

impl SectionChanges {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            insertions: 0,
            deletions: 0,
            chars_inserted: 0,
            chars_deleted: 0,
            has_changes: false,
        }
    }

    fn record(&mut self, kind: SegmentKind, text: &str) {
        match kind {
            SegmentKind::Insert => {
                self.insertions += 1;
                self.chars_inserted += text.chars().count();
            }
            SegmentKind::Delete => {
                self.deletions += 1;
                self.chars_deleted += text.chars().count();
            }
            SegmentKind::Equal => return,
        }
        self.has_changes = true;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub segments: Vec<Segment>,
    pub stats: DiffStats,
    pub sections: Vec<SectionChanges>,
}

pub fn compare(original: &str, revised: &str) -> Comparison {
    let segments = diff_segments(original, revised);
    let stats = diff_stats(&segments);
    let sections = group_by_section(&segments);
    Comparison {
        segments,
        stats,
        sections,
    }
}

/// Diff two texts into segments, merging adjacent segments of one kind.
pub fn diff_segments(original: &str, revised: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for chunk in dissimilar::diff(original, revised) {
        let (kind, text) = match chunk {
            dissimilar::Chunk::Equal(t) => (SegmentKind::Equal, t),
            dissimilar::Chunk::Delete(t) => (SegmentKind::Delete, t),
            dissimilar::Chunk::Insert(t) => (SegmentKind::Insert, t),
        };
        if text.is_empty() {
            continue;
        }
        match segments.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(text),
            _ => segments.push(Segment {
                kind,
                text: text.to_string(),
            }),
        }
    }
    segments
}

pub fn diff_stats(segments: &[Segment]) -> DiffStats {
    let mut stats = DiffStats::default();
    for segment in segments {
        let chars = segment.text.chars().count();
        match segment.kind {
            SegmentKind::Equal => stats.chars_unchanged += chars,
            SegmentKind::Insert => {
                stats.insertions += 1;
                stats.chars_inserted += chars;
            }
            SegmentKind::Delete => {
                stats.deletions += 1;
                stats.chars_deleted += chars;
            }
        }
    }
    let changed = stats.chars_inserted + stats.chars_deleted;
    let total = changed + stats.chars_unchanged;
    stats.change_percentage = if total == 0 {
        0.0
    } else {
        (changed as f64 / total as f64 * 10_000.0).round() / 100.0
    };
    stats
}

/// Whether a line of contract text looks like a section heading.
pub fn is_heading(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    if NUMBERED_HEADING.is_match(line) {
        return true;
    }
    // All-caps lines such as "TERM AND TERMINATION".
    let letters = line.chars().filter(|c| c.is_alphabetic()).count();
    letters >= 3
        && line.chars().count() <= MAX_TITLE_CHARS
        && !line.chars().any(|c| c.is_lowercase())
}

fn heading_title(line: &str) -> String {
    line.trim().chars().take(MAX_TITLE_CHARS).collect()
}

/// Byte offsets in the revised text where heading lines start.
fn heading_starts(segments: &[Segment]) -> Vec<(usize, String)> {
    let revised: String = segments
        .iter()
        .filter(|s| s.kind != SegmentKind::Delete)
        .map(|s| s.text.as_str())
        .collect();

    let mut starts = Vec::new();
    let mut offset = 0;
    for line in revised.split_inclusive('\n') {
        if is_heading(line) {
            starts.push((offset, heading_title(line)));
        }
        offset += line.len();
    }
    starts
}

/// Group changes by the section of the revised text they fall into.
///
/// Text before the first heading belongs to a "Preamble" section. Deleted
/// text sitting exactly at a heading boundary is attributed to the section
/// that precedes the heading.
pub fn group_by_section(segments: &[Segment]) -> Vec<SectionChanges> {
    let headings = heading_starts(segments);
    let mut sections = vec![SectionChanges::new(PREAMBLE_TITLE)];
    sections.extend(headings.iter().map(|(_, title)| SectionChanges::new(title)));

    // Index into `sections` for a position in the revised text.
    let section_at = |pos: usize, inclusive: bool| -> usize {
        headings
            .iter()
            .take_while(|(start, _)| if inclusive { *start <= pos } else { *start < pos })
            .count()
    };

    let mut pos = 0;
    for segment in segments {
        if segment.kind == SegmentKind::Delete {
            let idx = section_at(pos, false);
            sections[idx].record(SegmentKind::Delete, &segment.text);
            continue;
        }

        // Split the segment at every heading that starts inside it.
        let end = pos + segment.text.len();
        let mut piece_start = pos;
        for (start, _) in headings.iter().filter(|(s, _)| *s > pos && *s < end) {
            let piece = &segment.text[piece_start - pos..*start - pos];
            sections[section_at(piece_start, true)].record(segment.kind, piece);
            piece_start = *start;
        }
        let piece = &segment.text[piece_start - pos..];
        sections[section_at(piece_start, true)].record(segment.kind, piece);
        pos = end;
    }

    let preamble_is_empty = matches!(headings.first(), Some((0, _))) && !sections[0].has_changes;
    if preamble_is_empty {
        sections.remove(0);
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(kind: SegmentKind, text: &str) -> Segment {
        Segment {
            kind,
            text: text.to_string(),
        }
    }

    #[test]
    fn identical_texts_have_no_changes() {
        let result = compare("Same text.\n", "Same text.\n");
        assert_eq!(result.segments, vec![seg(SegmentKind::Equal, "Same text.\n")]);
        assert_eq!(result.stats.change_percentage, 0.0);
        assert_eq!(result.stats.insertions, 0);
        assert!(result.sections.iter().all(|s| !s.has_changes));
    }

    #[test]
    fn empty_inputs_produce_empty_diff() {
        let result = compare("", "");
        assert!(result.segments.is_empty());
        assert_eq!(result.stats, DiffStats::default());
    }

    #[test]
    fn segments_reconstruct_both_texts() {
        let original = "The fee is $100 per month, payable in advance.";
        let revised = "The fee is $150 per month, payable quarterly in advance.";
        let segments = diff_segments(original, revised);

        let old: String = segments
            .iter()
            .filter(|s| s.kind != SegmentKind::Insert)
            .map(|s| s.text.as_str())
            .collect();
        let new: String = segments
            .iter()
            .filter(|s| s.kind != SegmentKind::Delete)
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(old, original);
        assert_eq!(new, revised);

        for pair in segments.windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind, "adjacent segments must differ");
        }
    }

    #[test]
    fn stats_count_segments_and_characters() {
        let segments = vec![
            seg(SegmentKind::Equal, "abcdef"),
            seg(SegmentKind::Delete, "gh"),
            seg(SegmentKind::Insert, "x"),
            seg(SegmentKind::Equal, "i"),
        ];
        let stats = diff_stats(&segments);
        assert_eq!(stats.insertions, 1);
        assert_eq!(stats.deletions, 1);
        assert_eq!(stats.chars_inserted, 1);
        assert_eq!(stats.chars_deleted, 2);
        assert_eq!(stats.chars_unchanged, 7);
        assert_eq!(stats.change_percentage, 30.0);
    }

    #[test]
    fn detects_common_heading_styles() {
        assert!(is_heading("ARTICLE 4"));
        assert!(is_heading("Article IV - Term"));
        assert!(is_heading("Section 2.1 Definitions"));
        assert!(is_heading("3. Payment Terms"));
        assert!(is_heading("TERM AND TERMINATION\n"));
        assert!(!is_heading("The parties agree as follows."));
        assert!(!is_heading("2025 was a good year"));
        assert!(!is_heading("NO"));
        assert!(!is_heading(""));
    }

    #[test]
    fn groups_changes_by_section() {
        let original = "This Agreement is made between Acme and Globex.\n\
                        1. Services\nAcme provides support.\n\
                        2. Payment Terms\nFees are due in 30 days.\n";
        let revised = "This Agreement is made between Acme and Globex.\n\
                       1. Services\nAcme provides support.\n\
                       2. Payment Terms\nFees are due in 45 days.\n";
        let sections = compare(original, revised).sections;

        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Preamble", "1. Services", "2. Payment Terms"]);
        assert!(!sections[0].has_changes);
        assert!(!sections[1].has_changes);
        assert!(sections[2].has_changes);
        assert_eq!(sections[2].insertions, 1);
        assert_eq!(sections[2].deletions, 1);
    }

    #[test]
    fn leading_heading_drops_empty_preamble() {
        let segments = vec![
            seg(SegmentKind::Equal, "ARTICLE 1\nTerm is one year.\n"),
            seg(SegmentKind::Insert, "ARTICLE 2\nRenewal is automatic.\n"),
        ];
        let sections = group_by_section(&segments);
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["ARTICLE 1", "ARTICLE 2"]);
        assert!(!sections[0].has_changes);
        assert_eq!(sections[1].insertions, 1);
    }

    #[test]
    fn deletion_before_heading_belongs_to_previous_section() {
        let segments = vec![
            seg(SegmentKind::Equal, "Intro line.\n"),
            seg(SegmentKind::Delete, "Removed clause.\n"),
            seg(SegmentKind::Equal, "SECTION 5 Notices\nBy email.\n"),
        ];
        let sections = group_by_section(&segments);
        assert_eq!(sections[0].title, "Preamble");
        assert_eq!(sections[0].deletions, 1);
        assert!(!sections[1].has_changes);
    }

    #[test]
    fn deleted_headings_do_not_start_sections() {
        let segments = vec![
            seg(SegmentKind::Equal, "Intro.\n"),
            seg(SegmentKind::Delete, "ARTICLE 9\nObsolete.\n"),
        ];
        let sections = group_by_section(&segments);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].deletions, 1);
    }
}
