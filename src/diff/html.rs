//! HTML diff: canonicalize markup to one token per line, then diff lines

use crate::diff::text::normal_diff;
use crate::diff::{Chunk, DiffBackend, DiffError, DiffResult, charset};
use crate::store::types::ContentBlob;

/// Diff backend for `text/html` content
pub struct HtmlDiff;

impl DiffBackend for HtmlDiff {
    fn diff(&self, old: &ContentBlob, new: &ContentBlob) -> Result<DiffResult, DiffError> {
        let old_markup = canonicalize(&charset::decode(old)?);
        let new_markup = canonicalize(&charset::decode(new)?);
        let raw = normal_diff(&old_markup, &new_markup);
        Ok(DiffResult::StructuredDelta(parse_chunks(&raw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Text,
    Tag,
    ClosingTag,
}

/// Collapse whitespace runs to single spaces
fn squash_whitespace(token: &str) -> String {
    token.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn emit(output: &mut String, line: &str) {
    if !line.is_empty() {
        output.push_str(line);
        output.push('\n');
    }
}

/// Reformat markup so every opening tag, closing tag and text run sits on its own line
///
/// Whitespace-only text between tags is dropped, whitespace inside tags and
/// text is collapsed, and closing tags lose all inner whitespace.
pub fn canonicalize(markup: &str) -> String {
    let mut output = String::with_capacity(markup.len());
    let mut token = String::new();
    let mut state = ScanState::Text;
    let mut chars = markup.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            ScanState::Text if c == '<' => {
                emit(&mut output, &squash_whitespace(&token));
                token.clear();
                token.push(c);
                state = if chars.peek() == Some(&'/') {
                    ScanState::ClosingTag
                } else {
                    ScanState::Tag
                };
            }
            ScanState::Text => token.push(c),
            ScanState::Tag => {
                token.push(c);
                if c == '>' {
                    emit(&mut output, &squash_whitespace(&token));
                    token.clear();
                    state = ScanState::Text;
                }
            }
            ScanState::ClosingTag => {
                if !c.is_whitespace() {
                    token.push(c);
                }
                if c == '>' {
                    emit(&mut output, &token);
                    token.clear();
                    state = ScanState::Text;
                }
            }
        }
    }

    // Unterminated tag or trailing text
    emit(&mut output, &squash_whitespace(&token));
    output
}

fn append_line(span: &mut String, line: &str) {
    if !span.is_empty() {
        span.push('\n');
    }
    span.push_str(line);
}

/// Parse normal-format diff output into chunks
///
/// A line starting with a digit opens a chunk and is its position locator;
/// `<` lines are removed text, `>` lines added text, `---` is dropped.
pub fn parse_chunks(raw: &str) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();

    for line in raw.lines() {
        if line.starts_with(|c: char| c.is_ascii_digit()) {
            chunks.push(Chunk {
                position: line.to_string(),
                removed: String::new(),
                added: String::new(),
            });
            continue;
        }

        let Some(chunk) = chunks.last_mut() else {
            continue;
        };
        if let Some(rest) = line.strip_prefix('<') {
            append_line(&mut chunk.removed, rest.strip_prefix(' ').unwrap_or(rest));
        } else if let Some(rest) = line.strip_prefix('>') {
            append_line(&mut chunk.added, rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    chunks
}
