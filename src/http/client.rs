//! Validator client trait for fetching validators and content from a URL

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
#[cfg(test)]
use mockall::automock;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderMap, LAST_MODIFIED};

use crate::http::error::FetchError;
use crate::store::types::Validators;

/// Content type assumed when the server does not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// HTTP methods the resolver needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Head,
    Get,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Head => "HEAD",
            Method::Get => "GET",
        }
    }
}

/// Limits applied to one validator request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_redirects: usize,
    /// Deadline of the whole call, redirects included
    pub timeout: Duration,
    /// Bodies above this size are refused; `None` accepts everything
    pub max_body_size: Option<usize>,
}

/// Response of a validator request after all redirects were followed
#[derive(Debug, Clone, Default)]
pub struct ValidatorResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Empty for HEAD requests
    pub body: Vec<u8>,
    /// URL that produced this response
    pub final_url: String,
    /// URLs that answered with a redirect, in the order they were visited
    pub redirects: Vec<String>,
}

impl ValidatorResponse {
    /// Get a header value as a string, ignoring non-ASCII values
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn etag(&self) -> Option<&str> {
        self.header(ETAG.as_str())
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.header(LAST_MODIFIED.as_str())
    }

    /// Declared content type, or the generic binary type when there is none
    pub fn content_type(&self) -> &str {
        self.declared_content_type().unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    pub fn declared_content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Declared body length; HEAD answers carry it without a body
    pub fn content_length(&self) -> Option<usize> {
        self.header(CONTENT_LENGTH.as_str())?.trim().parse().ok()
    }

    pub fn validators(&self) -> Validators {
        Validators {
            etag: self.etag().map(str::to_string),
            last_modified: self.last_modified().map(str::to_string),
        }
    }

    /// Declared MD5 of the body as lowercase hex, if the header is usable
    ///
    /// Accepts the RFC 1864 base64 form and the bare hex form some servers
    /// send. Anything else is treated as absent.
    pub fn content_md5(&self) -> Option<String> {
        let raw = self.header("content-md5")?.trim();

        if raw.len() == 32 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(raw.to_ascii_lowercase());
        }

        general_purpose::STANDARD
            .decode(raw)
            .ok()
            .filter(|digest| digest.len() == 16)
            .map(hex::encode)
    }

    /// Every URL that led to this body: redirect sources plus the final URL
    pub fn alias_urls(&self) -> Vec<String> {
        let mut aliases = self.redirects.clone();
        if !aliases.contains(&self.final_url) {
            aliases.push(self.final_url.clone());
        }
        aliases
    }
}

/// Capability to send a validator request to a URL
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ValidatorClient: Send + Sync {
    /// Sends `method` to `url`, following up to `limits.max_redirects` redirects
    ///
    /// # Returns
    /// * `Ok(ValidatorResponse)` - Response of the last hop
    /// * `Err(FetchError)` - Unreachable, too large, or refused because of a redirect rule
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        limits: &RequestLimits,
    ) -> Result<ValidatorResponse, FetchError>;
}
