//! Outcome of one resolution

use std::fmt;

use crate::store::types::{ContentBlob, ContentId, Validators};

/// HTTP facts recorded with a successful check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: u16,
    pub validators: Validators,
    /// URL that answered after redirects
    pub final_url: String,
    /// Content-Type header, if the server sent one
    pub content_type: Option<String>,
}

/// What the resolver decided to store for a check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreDecision {
    /// New content: store the blob and a record referencing it
    Full {
        content: ContentBlob,
        response: ResponseMeta,
    },
    /// Unchanged content: store a record referencing the last blob
    HeaderOnly {
        content_ref: ContentId,
        response: ResponseMeta,
        aliases: Vec<String>,
    },
    /// Network failure: store a record without content
    Unreachable { reason: String },
    /// Nothing to store
    NoOp,
}

impl StoreDecision {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreDecision::Full { .. } => "full",
            StoreDecision::HeaderOnly { .. } => "header-only",
            StoreDecision::Unreachable { .. } => "unreachable",
            StoreDecision::NoOp => "no-op",
        }
    }

    /// True when the check produced a new version
    pub fn is_new_version(&self) -> bool {
        matches!(self, StoreDecision::Full { .. })
    }
}

impl fmt::Display for StoreDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreDecision::Full { content, response } => write!(
                f,
                "{} ({}, {} bytes of {})",
                self.kind(),
                response.status,
                content.length,
                content.content_type
            ),
            StoreDecision::HeaderOnly {
                content_ref,
                response,
                ..
            } => write!(f, "{} ({}, {})", self.kind(), response.status, content_ref.md5),
            StoreDecision::Unreachable { reason } => write!(f, "{} ({})", self.kind(), reason),
            StoreDecision::NoOp => f.write_str(self.kind()),
        }
    }
}
