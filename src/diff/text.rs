//! Line-oriented plain-text diff
//!
//! Produces the classic "normal" diff format (`2c2`, `< old`, `---`, `> new`),
//! which the HTML backend parses back into chunks.

use std::fmt::Write as _;
use std::ops::Range;

use similar::{Algorithm, DiffTag, capture_diff_slices};

use crate::diff::{DiffBackend, DiffError, DiffResult, charset};
use crate::store::types::ContentBlob;

/// Diff backend for `text/*` content
pub struct PlainTextDiff;

impl DiffBackend for PlainTextDiff {
    fn diff(&self, old: &ContentBlob, new: &ContentBlob) -> Result<DiffResult, DiffError> {
        let old_text = charset::decode(old)?;
        let new_text = charset::decode(new)?;
        Ok(DiffResult::TextDelta(normal_diff(&old_text, &new_text)))
    }
}

/// Append a line terminator unless the text already ends with one
fn with_trailing_newline(text: &str) -> String {
    let mut text = text.to_string();
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// `start` or `start,end` in 1-based line numbers
fn format_range(range: &Range<usize>) -> String {
    if range.len() <= 1 {
        format!("{}", range.start + 1)
    } else {
        format!("{},{}", range.start + 1, range.end)
    }
}

/// One hunk of consecutive changed lines on both sides
struct Hunk {
    old: Range<usize>,
    new: Range<usize>,
}

/// Merge adjacent non-equal operations into hunks
fn collect_hunks(old_lines: &[&str], new_lines: &[&str]) -> Vec<Hunk> {
    let mut hunks: Vec<Hunk> = Vec::new();

    for op in capture_diff_slices(Algorithm::Myers, old_lines, new_lines) {
        let (tag, old, new) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }
        match hunks.last_mut() {
            Some(last) if last.old.end == old.start && last.new.end == new.start => {
                last.old.end = old.end;
                last.new.end = new.end;
            }
            _ => hunks.push(Hunk { old, new }),
        }
    }

    hunks
}

/// Compute a normal-format diff of two texts
///
/// Both inputs are given a trailing line terminator first, so a missing
/// final newline never shows up as a change. Identical texts yield an
/// empty string.
pub fn normal_diff(old: &str, new: &str) -> String {
    let old = with_trailing_newline(old);
    let new = with_trailing_newline(new);
    let old_lines: Vec<&str> = old.split_terminator('\n').collect();
    let new_lines: Vec<&str> = new.split_terminator('\n').collect();

    let mut output = String::new();
    for hunk in collect_hunks(&old_lines, &new_lines) {
        let header = match (hunk.old.is_empty(), hunk.new.is_empty()) {
            // Lines are added after old line `old.start`
            (true, _) => format!("{}a{}", hunk.old.start, format_range(&hunk.new)),
            (_, true) => format!("{}d{}", format_range(&hunk.old), hunk.new.start),
            _ => format!("{}c{}", format_range(&hunk.old), format_range(&hunk.new)),
        };
        let _ = writeln!(output, "{}", header);

        for line in &old_lines[hunk.old.clone()] {
            let _ = writeln!(output, "< {}", line);
        }
        if !hunk.old.is_empty() && !hunk.new.is_empty() {
            output.push_str("---\n");
        }
        for line in &new_lines[hunk.new.clone()] {
            let _ = writeln!(output, "> {}", line);
        }
    }

    output
}
