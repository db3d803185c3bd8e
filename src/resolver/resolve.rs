//! Decide-and-persist algorithm for one URL

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};

use crate::config::{LARGE_DOCUMENT_SIZE, MonitorConfig};
use crate::error::MonitorError;
use crate::http::{FetchError, Method, RequestLimits, ValidatorClient, ValidatorResponse};
use crate::resolver::decision::{ResponseMeta, StoreDecision};
use crate::resolver::locks::KeyedLocks;
use crate::store::storer::ContentStorer;
use crate::store::types::{
    CheckRecord, ContentBlob, ContentId, ContentWrite, NewCheck, ResponseCode,
};

/// Tunables of the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Deadline of each validator call, redirects and body included
    pub timeout: Duration,
    pub max_redirects: usize,
    /// Bodies above this size are refused; `None` accepts everything
    pub max_document_size: Option<usize>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

impl ResolverOptions {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.http.timeout_ms),
            max_redirects: config.http.max_redirects,
            max_document_size: (!config.storage.allow_large_documents)
                .then_some(LARGE_DOCUMENT_SIZE),
        }
    }
}

/// Decides what to store for a URL and appends the resulting record
///
/// Each resolution issues a HEAD first and only downloads the body when
/// neither the ETag nor a Content-MD5 header proves it unchanged. A
/// downloaded body identical to the last one is still stored as
/// `HeaderOnly`, so unchanged documents never grow the blob table.
pub struct Resolver<S: ContentStorer> {
    store: Arc<S>,
    client: Arc<dyn ValidatorClient>,
    locks: KeyedLocks,
    options: ResolverOptions,
}

impl<S: ContentStorer> Resolver<S> {
    pub fn new(store: Arc<S>, client: Arc<dyn ValidatorClient>, options: ResolverOptions) -> Self {
        Self {
            store,
            client,
            locks: KeyedLocks::new(),
            options,
        }
    }

    /// Resolve `url` under `scope` and append exactly one record
    ///
    /// Network failures come back as `StoreDecision::Unreachable`. Errors are
    /// returned only when nothing was written: a refused redirect, an
    /// oversized body, or a store failure.
    pub async fn resolve(
        &self,
        url: &str,
        scope: Option<&str>,
    ) -> Result<StoreDecision, MonitorError> {
        let guard = self.locks.lock(url, scope).await;
        let result = self.resolve_locked(url, scope).await;
        drop(guard);
        self.locks.prune();
        result
    }

    async fn resolve_locked(
        &self,
        url: &str,
        scope: Option<&str>,
    ) -> Result<StoreDecision, MonitorError> {
        let last = self.store.get_by_index(url, scope, -1, true)?;
        let decision = self.decide(url, last.as_ref()).await?;
        self.persist(url, scope, &decision)?;
        info!("Resolved {}: {}", url, decision);
        Ok(decision)
    }

    async fn send(&self, method: Method, url: &str) -> Result<ValidatorResponse, FetchError> {
        debug!("{} {}", method.as_str(), url);
        let limits = RequestLimits {
            max_redirects: self.options.max_redirects,
            timeout: self.options.timeout,
            max_body_size: self.options.max_document_size,
        };
        self.client
            .send(method, url, &HeaderMap::new(), &limits)
            .await
    }

    fn too_large(&self, url: &str, length: usize) -> Option<MonitorError> {
        let limit = self.options.max_document_size?;
        (length > limit).then(|| MonitorError::DocumentTooLarge {
            url: url.to_string(),
            length,
            limit,
        })
    }

    async fn decide(
        &self,
        url: &str,
        last: Option<&CheckRecord>,
    ) -> Result<StoreDecision, MonitorError> {
        let head = match self.send(Method::Head, url).await {
            Ok(response) => response,
            Err(e) if e.is_unreachable() => {
                warn!("HEAD {} failed: {}", url, e);
                return Ok(StoreDecision::Unreachable {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(content_ref) = last.and_then(|last| unchanged_by_headers(&head, last)) {
            debug!("Validators of {} match the last version", url);
            return Ok(header_only(content_ref, &head));
        }

        if let Some(error) = head.content_length().and_then(|length| self.too_large(url, length)) {
            warn!("Not downloading {}: {}", url, error);
            return Err(error);
        }

        let response = match self.send(Method::Get, url).await {
            Ok(response) => response,
            Err(e) if e.is_unreachable() => {
                warn!("GET {} failed although HEAD succeeded: {}", url, e);
                return Ok(StoreDecision::Unreachable {
                    reason: e.to_string(),
                });
            }
            Err(FetchError::BodyTooLarge { length, limit }) => {
                return Err(MonitorError::DocumentTooLarge {
                    url: url.to_string(),
                    length,
                    limit,
                });
            }
            Err(e) => return Err(e.into()),
        };

        // Clients are not obliged to enforce the limit themselves
        if let Some(error) = self.too_large(url, response.body.len()) {
            return Err(error);
        }

        let content_id = ContentId::of(&response.body);
        if last.and_then(|last| last.content_ref.as_ref()) == Some(&content_id) {
            debug!("Body of {} is identical to the last version", url);
            return Ok(header_only(content_id, &response));
        }

        let meta = response_meta(&response);
        let content_type = response.content_type().to_string();
        let aliases = response.alias_urls();
        Ok(StoreDecision::Full {
            content: ContentBlob::new(content_type, response.body, aliases),
            response: meta,
        })
    }

    fn persist(
        &self,
        url: &str,
        scope: Option<&str>,
        decision: &StoreDecision,
    ) -> Result<(), MonitorError> {
        let check = |response_code, final_url, validators, content_type| NewCheck {
            url: url.to_string(),
            final_url,
            scope: scope.map(str::to_string),
            timestamp: Utc::now(),
            response_code,
            validators,
            content_type,
        };

        let (check, content) = match decision {
            StoreDecision::Full { content, response } => (
                check(
                    ResponseCode::Status(response.status),
                    Some(response.final_url.clone()),
                    Some(response.validators.clone()),
                    Some(content.content_type.clone()),
                ),
                ContentWrite::New(content.clone()),
            ),
            StoreDecision::HeaderOnly {
                content_ref,
                response,
                aliases,
            } => (
                check(
                    ResponseCode::Status(response.status),
                    Some(response.final_url.clone()),
                    Some(response.validators.clone()),
                    response.content_type.clone(),
                ),
                ContentWrite::Existing {
                    content_ref: content_ref.clone(),
                    aliases: aliases.clone(),
                },
            ),
            StoreDecision::Unreachable { .. } => {
                (check(ResponseCode::Unreachable, None, None, None), ContentWrite::Nothing)
            }
            StoreDecision::NoOp => return Ok(()),
        };

        let record = self.store.append_check(&check, &content)?;
        debug!("Appended check #{} for {}", record.id, url);
        Ok(())
    }
}

fn response_meta(response: &ValidatorResponse) -> ResponseMeta {
    ResponseMeta {
        status: response.status,
        validators: response.validators(),
        final_url: response.final_url.clone(),
        content_type: response.declared_content_type().map(str::to_string),
    }
}

fn header_only(content_ref: ContentId, response: &ValidatorResponse) -> StoreDecision {
    StoreDecision::HeaderOnly {
        content_ref,
        response: response_meta(response),
        aliases: response.alias_urls(),
    }
}

/// Content of `last` when a successful HEAD proves the body unchanged
fn unchanged_by_headers(head: &ValidatorResponse, last: &CheckRecord) -> Option<ContentId> {
    if !ResponseCode::Status(head.status).is_success() {
        return None;
    }
    let content_ref = last.content_ref.as_ref()?;

    let last_etag = last.validators.as_ref().and_then(|v| v.etag.as_deref());
    if let (Some(etag), Some(last_etag)) = (head.etag(), last_etag) {
        if etag == last_etag {
            return Some(content_ref.clone());
        }
    }

    if head.content_md5().as_deref() == Some(content_ref.md5.as_str()) {
        return Some(content_ref.clone());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::client::MockValidatorClient;
    use crate::store::sqlite::SqliteStore;
    use reqwest::header::{CONTENT_TYPE, HeaderValue};
    use tempfile::TempDir;

    const URL: &str = "http://example.test/a";

    fn create_test_store() -> (TempDir, Arc<SqliteStore>) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(&temp_dir.path().join("test.db")).unwrap();
        (temp_dir, Arc::new(store))
    }

    fn response(headers: &[(&'static str, &str)], body: &[u8]) -> ValidatorResponse {
        let mut map = HeaderMap::new();
        map.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        ValidatorResponse {
            status: 200,
            headers: map,
            body: body.to_vec(),
            final_url: URL.to_string(),
            redirects: vec![],
        }
    }

    fn expect_once(
        client: &mut MockValidatorClient,
        method: Method,
        result: Result<ValidatorResponse, FetchError>,
    ) {
        let mut result = Some(result);
        client
            .expect_send()
            .withf(move |m, _, _, _| *m == method)
            .times(1)
            .returning(move |_, _, _, _| {
                result
                    .take()
                    .unwrap_or_else(|| Err(FetchError::Unreachable("exhausted".to_string())))
            });
    }

    fn resolver(store: &Arc<SqliteStore>, client: MockValidatorClient) -> Resolver<SqliteStore> {
        Resolver::new(Arc::clone(store), Arc::new(client), ResolverOptions::default())
    }

    async fn seed(store: &Arc<SqliteStore>, etag: &str, body: &[u8]) {
        let mut client = MockValidatorClient::new();
        expect_once(&mut client, Method::Head, Ok(response(&[("etag", etag)], b"")));
        expect_once(&mut client, Method::Get, Ok(response(&[("etag", etag)], body)));
        let decision = resolver(store, client).resolve(URL, None).await.unwrap();
        assert!(decision.is_new_version());
    }

    #[tokio::test]
    async fn first_resolution_downloads_full_content() {
        let (_temp_dir, store) = create_test_store();
        let mut client = MockValidatorClient::new();
        expect_once(&mut client, Method::Head, Ok(response(&[("etag", "\"e1\"")], b"")));
        expect_once(
            &mut client,
            Method::Get,
            Ok(response(&[("etag", "\"e1\"")], b"hello\n")),
        );

        let decision = resolver(&store, client).resolve(URL, None).await.unwrap();

        let StoreDecision::Full { content, response: meta } = &decision else {
            panic!("expected full decision, got {decision:?}");
        };
        assert_eq!(content.data, b"hello\n".to_vec());
        assert_eq!(meta.validators.etag.as_deref(), Some("\"e1\""));

        let history = store.history(URL, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content_ref, Some(ContentId::of(b"hello\n")));
        assert_eq!(history[0].final_url.as_deref(), Some(URL));
    }

    #[tokio::test]
    async fn matching_etag_skips_download() {
        let (_temp_dir, store) = create_test_store();
        seed(&store, "\"e1\"", b"hello\n").await;

        let mut client = MockValidatorClient::new();
        expect_once(&mut client, Method::Head, Ok(response(&[("etag", "\"e1\"")], b"")));
        client
            .expect_send()
            .withf(|m, _, _, _| *m == Method::Get)
            .times(0);

        let decision = resolver(&store, client).resolve(URL, None).await.unwrap();

        assert_eq!(decision.kind(), "header-only");
        let history = store.history(URL, None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content_ref, history[1].content_ref);
    }

    #[tokio::test]
    async fn matching_content_md5_skips_download() {
        let (_temp_dir, store) = create_test_store();
        seed(&store, "\"e1\"", b"hello\n").await;

        let mut client = MockValidatorClient::new();
        expect_once(
            &mut client,
            Method::Head,
            Ok(response(
                &[("etag", "\"rotated\""), ("content-md5", "sZRqySSS0jR8YjW00mERhA==")],
                b"",
            )),
        );
        client
            .expect_send()
            .withf(|m, _, _, _| *m == Method::Get)
            .times(0);

        let decision = resolver(&store, client).resolve(URL, None).await.unwrap();

        assert_eq!(decision.kind(), "header-only");
    }

    #[tokio::test]
    async fn identical_body_without_validators_is_deduplicated() {
        let (_temp_dir, store) = create_test_store();
        seed(&store, "\"e1\"", b"hello\n").await;

        let mut client = MockValidatorClient::new();
        expect_once(&mut client, Method::Head, Ok(response(&[], b"")));
        expect_once(&mut client, Method::Get, Ok(response(&[], b"hello\n")));

        let decision = resolver(&store, client).resolve(URL, None).await.unwrap();

        assert_eq!(decision.kind(), "header-only");
        assert_eq!(store.count(URL, None, false).unwrap(), 2);
        let history = store.history(URL, None).unwrap();
        assert_eq!(history[0].content_ref, history[1].content_ref);
    }

    #[tokio::test]
    async fn changed_body_creates_new_version() {
        let (_temp_dir, store) = create_test_store();
        seed(&store, "\"e1\"", b"hello\n").await;

        let mut client = MockValidatorClient::new();
        expect_once(&mut client, Method::Head, Ok(response(&[("etag", "\"e2\"")], b"")));
        expect_once(
            &mut client,
            Method::Get,
            Ok(response(&[("etag", "\"e2\"")], b"hello world\n")),
        );

        let decision = resolver(&store, client).resolve(URL, None).await.unwrap();

        assert!(decision.is_new_version());
        let newest = store.get_by_index(URL, None, -1, true).unwrap().unwrap();
        assert_eq!(newest.content_ref, Some(ContentId::of(b"hello world\n")));
    }

    #[tokio::test]
    async fn unreachable_head_records_failed_check() {
        let (_temp_dir, store) = create_test_store();
        let mut client = MockValidatorClient::new();
        expect_once(
            &mut client,
            Method::Head,
            Err(FetchError::Unreachable("connection refused".to_string())),
        );

        let decision = resolver(&store, client).resolve(URL, None).await.unwrap();

        assert_eq!(decision.kind(), "unreachable");
        let history = store.history(URL, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].response_code, ResponseCode::Unreachable);
        assert_eq!(history[0].validators, None);
        assert_eq!(history[0].content_ref, None);
    }

    #[tokio::test]
    async fn get_failing_after_head_is_unreachable() {
        let (_temp_dir, store) = create_test_store();
        seed(&store, "\"e1\"", b"hello\n").await;

        let mut client = MockValidatorClient::new();
        expect_once(&mut client, Method::Head, Ok(response(&[("etag", "\"e2\"")], b"")));
        expect_once(
            &mut client,
            Method::Get,
            Err(FetchError::Unreachable("reset".to_string())),
        );

        let decision = resolver(&store, client).resolve(URL, None).await.unwrap();

        assert_eq!(decision.kind(), "unreachable");
        assert_eq!(store.count(URL, None, false).unwrap(), 2);
        assert_eq!(store.count(URL, None, true).unwrap(), 1);
    }

    #[tokio::test]
    async fn cross_origin_redirect_is_configuration_error_and_writes_nothing() {
        let (_temp_dir, store) = create_test_store();
        let mut client = MockValidatorClient::new();
        expect_once(
            &mut client,
            Method::Head,
            Err(FetchError::CrossOriginRedirect {
                from: URL.to_string(),
                to: "http://elsewhere.test/a".to_string(),
            }),
        );

        let result = resolver(&store, client).resolve(URL, None).await;

        assert!(matches!(result, Err(MonitorError::Configuration(_))));
        assert_eq!(store.count(URL, None, false).unwrap(), 0);
    }

    #[tokio::test]
    async fn oversized_document_is_refused() {
        let (_temp_dir, store) = create_test_store();
        let mut client = MockValidatorClient::new();
        expect_once(&mut client, Method::Head, Ok(response(&[], b"")));
        expect_once(&mut client, Method::Get, Ok(response(&[], &[b'x'; 32])));
        let options = ResolverOptions {
            max_document_size: Some(16),
            ..ResolverOptions::default()
        };
        let resolver = Resolver::new(Arc::clone(&store), Arc::new(client), options);

        let result = resolver.resolve(URL, None).await;

        assert!(matches!(
            result,
            Err(MonitorError::DocumentTooLarge { length: 32, limit: 16, .. })
        ));
        assert_eq!(store.count(URL, None, false).unwrap(), 0);
    }

    #[tokio::test]
    async fn declared_oversized_document_is_never_downloaded() {
        let (_temp_dir, store) = create_test_store();
        let mut client = MockValidatorClient::new();
        expect_once(
            &mut client,
            Method::Head,
            Ok(response(&[("content-length", "1000000000")], b"")),
        );
        client
            .expect_send()
            .withf(|m, _, _, _| *m == Method::Get)
            .times(0);
        let options = ResolverOptions {
            max_document_size: Some(16),
            ..ResolverOptions::default()
        };
        let resolver = Resolver::new(Arc::clone(&store), Arc::new(client), options);

        let result = resolver.resolve(URL, None).await;

        assert!(matches!(
            result,
            Err(MonitorError::DocumentTooLarge { length: 1_000_000_000, limit: 16, .. })
        ));
        assert_eq!(store.count(URL, None, false).unwrap(), 0);
    }

    #[tokio::test]
    async fn body_limit_is_handed_to_the_client() {
        let (_temp_dir, store) = create_test_store();
        let mut client = MockValidatorClient::new();
        expect_once(&mut client, Method::Head, Ok(response(&[], b"")));
        client
            .expect_send()
            .withf(|m, _, _, limits| *m == Method::Get && limits.max_body_size == Some(16))
            .times(1)
            .returning(|_, _, _, _| Err(FetchError::BodyTooLarge { length: 17, limit: 16 }));
        let options = ResolverOptions {
            max_document_size: Some(16),
            ..ResolverOptions::default()
        };
        let resolver = Resolver::new(Arc::clone(&store), Arc::new(client), options);

        let result = resolver.resolve(URL, None).await;

        assert!(matches!(
            result,
            Err(MonitorError::DocumentTooLarge { length: 17, limit: 16, .. })
        ));
        assert_eq!(store.count(URL, None, false).unwrap(), 0);
    }

    #[tokio::test]
    async fn records_keep_their_own_content_type_for_shared_blobs() {
        let (_temp_dir, store) = create_test_store();
        let html = "http://example.test/b.html";
        let mut client = MockValidatorClient::new();
        expect_once(&mut client, Method::Head, Ok(response(&[], b"")));
        expect_once(&mut client, Method::Get, Ok(response(&[], b"<p>same</p>")));
        let mut as_html = response(&[("content-type", "text/html")], b"<p>same</p>");
        as_html.final_url = html.to_string();
        expect_once(&mut client, Method::Head, Ok(response(&[("content-type", "text/html")], b"")));
        expect_once(&mut client, Method::Get, Ok(as_html));
        let resolver = resolver(&store, client);

        resolver.resolve(URL, None).await.unwrap();
        resolver.resolve(html, None).await.unwrap();

        let plain = store.get_by_index(URL, None, -1, true).unwrap().unwrap();
        let html = store.get_by_index(html, None, -1, true).unwrap().unwrap();
        assert_eq!(plain.content_ref, html.content_ref);
        assert_eq!(plain.content_type.as_deref(), Some("text/plain"));
        assert_eq!(html.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn redirect_sources_become_aliases() {
        let (_temp_dir, store) = create_test_store();
        let mut client = MockValidatorClient::new();
        let mut redirected = response(&[], b"moved\n");
        redirected.final_url = "http://example.test/b".to_string();
        redirected.redirects = vec![URL.to_string()];
        expect_once(&mut client, Method::Head, Ok(response(&[], b"")));
        expect_once(&mut client, Method::Get, Ok(redirected));

        resolver(&store, client).resolve(URL, None).await.unwrap();

        let record = store.get_by_index(URL, None, -1, true).unwrap().unwrap();
        assert_eq!(record.final_url.as_deref(), Some("http://example.test/b"));
        let blob = store
            .load_content(record.content_ref.as_ref().unwrap())
            .unwrap();
        assert!(blob.alias_urls.contains(URL));
        assert!(blob.alias_urls.contains("http://example.test/b"));
    }

    #[tokio::test]
    async fn scopes_keep_separate_histories() {
        let (_temp_dir, store) = create_test_store();
        let mut client = MockValidatorClient::new();
        expect_once(&mut client, Method::Head, Ok(response(&[], b"")));
        expect_once(&mut client, Method::Get, Ok(response(&[], b"hello\n")));

        resolver(&store, client)
            .resolve(URL, Some("alice"))
            .await
            .unwrap();

        assert_eq!(store.count(URL, Some("alice"), false).unwrap(), 1);
        assert_eq!(store.count(URL, None, false).unwrap(), 0);
    }

    #[test]
    fn etag_comparison_requires_successful_head() {
        let mut head = response(&[("etag", "\"e1\"")], b"");
        head.status = 500;
        let last = CheckRecord {
            id: 1,
            url: URL.to_string(),
            final_url: Some(URL.to_string()),
            scope: None,
            timestamp: Utc::now(),
            response_code: ResponseCode::Status(200),
            validators: Some(crate::store::types::Validators {
                etag: Some("\"e1\"".to_string()),
                last_modified: None,
            }),
            content_type: Some("text/plain".to_string()),
            content_ref: Some(ContentId::of(b"hello\n")),
        };

        assert_eq!(unchanged_by_headers(&head, &last), None);
        head.status = 200;
        assert_eq!(unchanged_by_headers(&head, &last), Some(ContentId::of(b"hello\n")));
    }
}
