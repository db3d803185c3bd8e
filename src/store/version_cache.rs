//! Per-session cache of loaded versions of one monitored URL

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::MonitorError;
use crate::store::selector::Selector;
use crate::store::storer::ContentStorer;
use crate::store::types::{CheckRecord, ContentBlob, ContentId};

/// Key of a cache slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum VersionKey {
    /// Relative index; stale as soon as a record is appended
    Index(i64),
    /// Content identity under the type declared for it; never stale
    Content(ContentId, Option<String>),
}

/// Read-through cache of content blobs for one `(url, scope)` history
///
/// Index entries and content entries may share the same blob. Time lookups
/// always go to the store, but the blob they land on is cached by identity.
/// Call [`VersionCache::refresh`] after every resolution.
pub struct VersionCache<S: ContentStorer> {
    store: Arc<S>,
    url: String,
    scope: Option<String>,
    entries: HashMap<VersionKey, Arc<ContentBlob>>,
}

impl<S: ContentStorer> VersionCache<S> {
    pub fn new(store: Arc<S>, url: impl Into<String>, scope: Option<String>) -> Self {
        Self {
            store,
            url: url.into(),
            scope,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, selector: &Selector) -> Result<Arc<ContentBlob>, MonitorError> {
        match selector {
            Selector::ByIndex(index) => self.by_index(*index),
            Selector::ByTime(at) => self.by_time(*at),
        }
    }

    pub fn by_index(&mut self, index: i64) -> Result<Arc<ContentBlob>, MonitorError> {
        if let Some(blob) = self.entries.get(&VersionKey::Index(index)) {
            return Ok(Arc::clone(blob));
        }

        let record = self
            .store
            .get_by_index(&self.url, self.scope.as_deref(), index, true)?
            .ok_or_else(|| {
                MonitorError::DocumentHistoryNotAvailable(format!(
                    "{} has no version {}",
                    self.url, index
                ))
            })?;

        let blob = self.load(&record)?;
        self.entries
            .insert(VersionKey::Index(index), Arc::clone(&blob));
        Ok(blob)
    }

    pub fn by_time(&mut self, at: DateTime<Utc>) -> Result<Arc<ContentBlob>, MonitorError> {
        let record = self
            .store
            .get_by_time(&self.url, self.scope.as_deref(), at, true)?
            .ok_or_else(|| {
                MonitorError::DocumentHistoryNotAvailable(format!(
                    "{} was not available at {}",
                    self.url,
                    at.to_rfc3339()
                ))
            })?;

        self.load(&record)
    }

    fn load(&mut self, record: &CheckRecord) -> Result<Arc<ContentBlob>, MonitorError> {
        let content_ref = record.content_ref.clone().ok_or_else(|| {
            MonitorError::DocumentHistoryNotAvailable(format!(
                "check #{} of {} has no content",
                record.id, self.url
            ))
        })?;

        let key = VersionKey::Content(content_ref.clone(), record.content_type.clone());
        if let Some(blob) = self.entries.get(&key) {
            return Ok(Arc::clone(blob));
        }

        debug!("Loading content {} of {}", content_ref, self.url);
        let mut blob = self.store.load_content(&content_ref)?;
        // The blob keeps the type of whoever stored it first
        if let Some(content_type) = &record.content_type {
            blob = blob.with_content_type(content_type);
        }
        let blob = Arc::new(blob);
        self.entries.insert(key, Arc::clone(&blob));
        Ok(blob)
    }

    /// Drop index entries; their meaning shifted when records were appended
    pub fn refresh(&mut self) {
        self.entries
            .retain(|key, _| matches!(key, VersionKey::Content(..)));
    }

    /// Drop everything
    pub fn purge(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
