//! Record and blob types shared by the store, the resolver and the differ

use std::collections::BTreeSet;
use std::fmt;
use std::io::Cursor;

use chrono::{DateTime, Utc};
use md5::Md5;
use sha1::{Digest, Sha1};

use crate::diff::{DiffError, charset};

/// Content address of a blob: lowercase hex digests of its bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId {
    pub md5: String,
    pub sha1: String,
}

impl ContentId {
    /// Compute the content address of `bytes`
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            md5: hex::encode(Md5::digest(bytes)),
            sha1: hex::encode(Sha1::digest(bytes)),
        }
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.md5, self.sha1)
    }
}

/// Cheap proofs of (un)change returned by the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Outcome of a check at the HTTP level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Status(u16),
    /// The server could not be reached at all
    Unreachable,
}

impl ResponseCode {
    pub fn is_success(&self) -> bool {
        matches!(self, ResponseCode::Status(code) if *code < 400)
    }

    /// Database representation; unreachable is stored as NULL
    pub fn to_sql(self) -> Option<i64> {
        match self {
            ResponseCode::Status(code) => Some(i64::from(code)),
            ResponseCode::Unreachable => None,
        }
    }

    pub fn from_sql(value: Option<i64>) -> Self {
        value
            .and_then(|code| u16::try_from(code).ok())
            .map_or(ResponseCode::Unreachable, ResponseCode::Status)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseCode::Status(code) => write!(f, "{}", code),
            ResponseCode::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// One observation of a URL at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRecord {
    /// Insertion id; breaks ties between equal timestamps
    pub id: i64,
    /// Monitored URL the history is keyed by
    pub url: String,
    /// URL that answered after redirects, absent for unreachable checks
    pub final_url: Option<String>,
    /// History partition; `None` is the global view
    pub scope: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub response_code: ResponseCode,
    pub validators: Option<Validators>,
    /// Content type the server declared for this observation
    pub content_type: Option<String>,
    pub content_ref: Option<ContentId>,
}

impl CheckRecord {
    /// Successful response with stored content
    pub fn has_content(&self) -> bool {
        self.response_code.is_success() && self.content_ref.is_some()
    }
}

/// A check about to be appended; the store assigns id and final timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheck {
    pub url: String,
    pub final_url: Option<String>,
    pub scope: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub response_code: ResponseCode,
    pub validators: Option<Validators>,
    pub content_type: Option<String>,
}

/// Content written together with a check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentWrite {
    /// No content reference (failed check)
    Nothing,
    /// Reference an already stored blob, adding the given aliases to it
    Existing {
        content_ref: ContentId,
        aliases: Vec<String>,
    },
    /// Store a blob, or reuse the one with the same content address
    New(ContentBlob),
}

/// One stored body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlob {
    pub content_type: String,
    pub length: usize,
    pub md5: String,
    pub sha1: String,
    pub data: Vec<u8>,
    /// URLs, redirect sources included, that have pointed to this body
    pub alias_urls: BTreeSet<String>,
}

impl ContentBlob {
    pub fn new(
        content_type: impl Into<String>,
        data: Vec<u8>,
        alias_urls: impl IntoIterator<Item = String>,
    ) -> Self {
        let ContentId { md5, sha1 } = ContentId::of(&data);
        Self {
            content_type: content_type.into(),
            length: data.len(),
            md5,
            sha1,
            data,
            alias_urls: alias_urls.into_iter().collect(),
        }
    }

    pub fn content_id(&self) -> ContentId {
        ContentId {
            md5: self.md5.clone(),
            sha1: self.sha1.clone(),
        }
    }

    /// Identical bodies have identical digests
    pub fn same_content(&self, other: &ContentBlob) -> bool {
        self.md5 == other.md5 && self.sha1 == other.sha1
    }

    /// Media type without parameters, lowercased (e.g. `text/html`)
    pub fn mime_type(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    /// `charset` parameter of the content type, if declared
    pub fn charset(&self) -> Option<String> {
        self.content_type.split(';').skip(1).find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"').to_string())
        })
    }

    /// Same body under another content type
    ///
    /// Identical bytes served by different URLs share one stored blob, but
    /// each observation keeps the type its server declared.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Seekable read cursor over the stored bytes
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(self.data.as_slice())
    }

    /// Bytes decoded to text, detecting the charset when it is not declared
    pub fn text(&self) -> Result<String, DiffError> {
        charset::decode(self)
    }
}
