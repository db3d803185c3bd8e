//! Diff dispatch over stored content blobs
//!
//! # Modules
//!
//! - [`text`]: Line-oriented diff for `text/*` content
//! - [`html`]: Canonicalizing diff for `text/html` content
//! - [`binary`]: Placeholder backend for everything else
//! - [`charset`]: Character set detection for raw bodies

pub mod binary;
pub mod charset;
pub mod html;
pub mod text;

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::store::types::ContentBlob;

use binary::BinaryDiff;
use html::HtmlDiff;
use text::PlainTextDiff;

/// One localized change in a structured diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Line locator such as `3c3` or `7a8,9`
    pub position: String,
    pub removed: String,
    pub added: String,
}

/// Shape of a binary delta; no backend produces it yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryDeltaMeta {
    pub algorithm: String,
    pub source_length: usize,
    pub target_length: usize,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffResult {
    /// Bodies are identical
    Equal,
    /// Raw line-oriented diff text
    TextDelta(String),
    StructuredDelta(Vec<Chunk>),
    BinaryDeltaMeta(BinaryDeltaMeta),
}

impl DiffResult {
    /// True when the delta carries no change
    pub fn is_unchanged(&self) -> bool {
        match self {
            DiffResult::Equal => true,
            DiffResult::TextDelta(text) => text.is_empty(),
            DiffResult::StructuredDelta(chunks) => chunks.is_empty(),
            DiffResult::BinaryDeltaMeta(_) => false,
        }
    }
}

impl fmt::Display for DiffResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffResult::Equal => Ok(()),
            DiffResult::TextDelta(text) => f.write_str(text),
            DiffResult::StructuredDelta(chunks) => {
                for chunk in chunks {
                    writeln!(f, "@ {}", chunk.position)?;
                    for line in chunk.removed.lines() {
                        writeln!(f, "- {}", line)?;
                    }
                    for line in chunk.added.lines() {
                        writeln!(f, "+ {}", line)?;
                    }
                }
                Ok(())
            }
            DiffResult::BinaryDeltaMeta(meta) => writeln!(
                f,
                "binary delta ({}): {} -> {} bytes",
                meta.algorithm, meta.source_length, meta.target_length
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("Unsupported diff for content type {0}")]
    UnsupportedDiff(String),

    /// No candidate charset decodes the body; see `charset::decode`
    #[error("Failed to decode content: {0}")]
    Decode(String),
}

/// A diff algorithm for one family of content types
pub trait DiffBackend: Send + Sync {
    fn diff(&self, old: &ContentBlob, new: &ContentBlob) -> Result<DiffResult, DiffError>;
}

/// Backend responsible for a media type (without parameters)
pub fn backend_for(mime_type: &str) -> &'static dyn DiffBackend {
    if mime_type == "text/html" {
        &HtmlDiff
    } else if mime_type.starts_with("text/") {
        &PlainTextDiff
    } else {
        &BinaryDiff
    }
}

/// Diff two blobs, dispatching on the content type of `old`
///
/// Blobs with identical digests are `Equal` without running a backend.
pub fn diff(old: &ContentBlob, new: &ContentBlob) -> Result<DiffResult, DiffError> {
    if old.same_content(new) {
        return Ok(DiffResult::Equal);
    }

    let mime_type = old.mime_type();
    debug!("Diffing {} bytes against {} bytes as {}", old.length, new.length, mime_type);
    backend_for(&mime_type).diff(old, new)
}
