//! Entry points for monitoring documents
//!
//! A [`Monitor`] is bound to one scope and hands out a [`MonitoredResource`]
//! per URL. The resource owns a version cache for the lifetime of the
//! session and invalidates it after every check.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Url;
use tracing::info;

use crate::config::{DEFAULT_WORKERS, MonitorConfig};
use crate::diff::{self, DiffResult};
use crate::error::MonitorError;
use crate::http::{HttpValidatorClient, ValidatorClient};
use crate::resolver::{BatchOutcome, Resolver, ResolverOptions, check_batch};
use crate::store::{CheckRecord, ContentBlob, ContentStorer, Selector, SqliteStore, VersionCache};

/// Monitor bound to a scope; `None` is the global view
pub struct Monitor<S: ContentStorer> {
    store: Arc<S>,
    resolver: Arc<Resolver<S>>,
    scope: Option<String>,
    workers: usize,
}

impl Monitor<SqliteStore> {
    /// Open the configured database and talk HTTP through reqwest
    pub fn open(config: &MonitorConfig, scope: Option<String>) -> Result<Self, MonitorError> {
        let store = Arc::new(SqliteStore::new(&config.db_path())?);
        let client = HttpValidatorClient::new(config.http.allow_cross_origin_redirect)
            .map_err(|e| MonitorError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self::new(
            store,
            Arc::new(client),
            ResolverOptions::from_config(config),
            scope,
        )
        .with_workers(config.batch.workers))
    }
}

impl<S: ContentStorer> Monitor<S> {
    pub fn new(
        store: Arc<S>,
        client: Arc<dyn ValidatorClient>,
        options: ResolverOptions,
        scope: Option<String>,
    ) -> Self {
        let resolver = Arc::new(Resolver::new(Arc::clone(&store), client, options));
        Self {
            store,
            resolver,
            scope,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Number of concurrent resolutions used by [`Monitor::check_multi`]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn resolver(&self) -> &Resolver<S> {
        &self.resolver
    }

    /// Resource handle for `url`, resolving it first if it has no content yet
    ///
    /// Fails with `DocumentNotAvailable` when the URL has never been
    /// retrieved successfully and the attempt made here failed too.
    pub async fn get(&self, url: &str) -> Result<MonitoredResource<S>, MonitorError> {
        validate_url(url)?;
        let scope = self.scope.as_deref();

        if self.store.count(url, scope, true)? == 0 {
            info!("No stored content for {}, resolving", url);
            self.resolver.resolve(url, scope).await?;

            if self.store.count(url, scope, true)? == 0 {
                return Err(MonitorError::DocumentNotAvailable(url.to_string()));
            }
        }

        Ok(MonitoredResource {
            url: url.to_string(),
            scope: self.scope.clone(),
            store: Arc::clone(&self.store),
            resolver: Arc::clone(&self.resolver),
            versions: VersionCache::new(Arc::clone(&self.store), url, self.scope.clone()),
        })
    }

    /// Resolve every URL once; outcomes are in input order
    pub async fn check_multi(&self, urls: &[String]) -> Vec<BatchOutcome> {
        check_batch(&self.resolver, urls, self.scope.as_deref(), self.workers).await
    }

    /// Whether the scope of this monitor is still unused
    pub fn check_uid(&self) -> Result<bool, MonitorError> {
        let scope = self
            .scope
            .as_deref()
            .ok_or_else(|| MonitorError::Uid("the global view has no uid".to_string()))?;
        Ok(!self.store.scope_in_use(scope)?)
    }
}

fn validate_url(url: &str) -> Result<(), MonitorError> {
    let parsed = Url::parse(url).map_err(|e| MonitorError::InvalidUrl(format!("{}: {}", url, e)))?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(MonitorError::InvalidUrl(format!("{}: missing host", url)));
    }
    Ok(())
}

/// One monitored URL within a scope
pub struct MonitoredResource<S: ContentStorer> {
    url: String,
    scope: Option<String>,
    store: Arc<S>,
    resolver: Arc<Resolver<S>>,
    versions: VersionCache<S>,
}

impl<S: ContentStorer> MonitoredResource<S> {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolve now; true when a new version was stored
    pub async fn check(&mut self) -> Result<bool, MonitorError> {
        let decision = self.resolver.resolve(&self.url, self.scope.as_deref()).await;
        self.versions.refresh();
        Ok(decision?.is_new_version())
    }

    /// Resolve now and return the newest content
    pub async fn get_last_version(&mut self) -> Result<Arc<ContentBlob>, MonitorError> {
        self.check().await?;
        self.versions.by_index(-1)
    }

    pub fn get_version(&mut self, selector: &Selector) -> Result<Arc<ContentBlob>, MonitorError> {
        self.versions.get(selector)
    }

    /// Diff two stored versions
    pub fn get_diff(&mut self, from: &Selector, to: &Selector) -> Result<DiffResult, MonitorError> {
        let old = self.versions.get(from)?;
        let new = self.versions.get(to)?;
        Ok(diff::diff(&old, &new)?)
    }

    /// Time of the newest check, failed ones included
    pub fn last_checked(&self) -> Result<Option<DateTime<Utc>>, MonitorError> {
        Ok(self.store.last_checked(&self.url, self.scope.as_deref())?)
    }

    /// Whether the newest check at or before `at` (default: now) succeeded
    pub fn available(&self, at: Option<DateTime<Utc>>) -> Result<bool, MonitorError> {
        let at = at.unwrap_or_else(Utc::now);
        let record = self
            .store
            .get_by_time(&self.url, self.scope.as_deref(), at, false)?;
        Ok(record.is_some_and(|record| record.response_code.is_success()))
    }

    pub fn history(&self) -> Result<Vec<CheckRecord>, MonitorError> {
        Ok(self.store.history(&self.url, self.scope.as_deref())?)
    }
}
