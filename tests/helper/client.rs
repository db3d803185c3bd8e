//! Scripted validator client for tests that do not need a real server

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ETAG, HeaderMap, HeaderValue};

use change_monitor::http::{FetchError, Method, RequestLimits, ValidatorClient, ValidatorResponse};

#[derive(Clone)]
struct Page {
    content_type: &'static str,
    etag: Option<String>,
    body: Vec<u8>,
}

/// Serves in-memory pages; URLs without a page are unreachable
#[derive(Default)]
pub struct ScriptedClient {
    pages: Mutex<HashMap<String, Page>>,
    downloads: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, content_type: &'static str, body: &str) {
        self.serve_with_etag(url, content_type, None, body);
    }

    pub fn serve_with_etag(
        &self,
        url: &str,
        content_type: &'static str,
        etag: Option<&str>,
        body: &str,
    ) {
        self.pages.lock().unwrap().insert(
            url.to_string(),
            Page {
                content_type,
                etag: etag.map(str::to_string),
                body: body.as_bytes().to_vec(),
            },
        );
    }

    pub fn take_down(&self, url: &str) {
        self.pages.lock().unwrap().remove(url);
    }

    /// Number of GET requests answered so far
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValidatorClient for ScriptedClient {
    async fn send(
        &self,
        method: Method,
        url: &str,
        _headers: &HeaderMap,
        _limits: &RequestLimits,
    ) -> Result<ValidatorResponse, FetchError> {
        let page = self
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Unreachable(format!("{} is down", url)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(page.content_type));
        if let Some(etag) = &page.etag {
            headers.insert(ETAG, HeaderValue::from_str(etag).unwrap());
        }

        let body = match method {
            Method::Head => Vec::new(),
            Method::Get => {
                self.downloads.fetch_add(1, Ordering::SeqCst);
                page.body
            }
        };

        Ok(ValidatorResponse {
            status: 200,
            headers,
            body,
            final_url: url.to_string(),
            redirects: vec![],
        })
    }
}
