//! Archive test utilities

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use change_monitor::config::DEFAULT_MAX_REDIRECTS;
use change_monitor::http::HttpValidatorClient;
use change_monitor::monitor::Monitor;
use change_monitor::resolver::ResolverOptions;
use change_monitor::store::SqliteStore;

/// Create a store backed by a fresh database in a temporary directory
///
/// Keep the returned `TempDir` alive for as long as the store is used.
pub fn create_test_store() -> (TempDir, Arc<SqliteStore>) {
    let temp_dir = TempDir::new().unwrap();
    let store = SqliteStore::new(&temp_dir.path().join("archive.db")).unwrap();
    (temp_dir, Arc::new(store))
}

/// Resolver options with a short timeout so unreachable hosts fail fast
pub fn http_options() -> ResolverOptions {
    ResolverOptions {
        timeout: Duration::from_secs(2),
        max_redirects: DEFAULT_MAX_REDIRECTS,
        max_document_size: None,
    }
}

/// Monitor talking real HTTP through reqwest
pub fn create_http_monitor(store: &Arc<SqliteStore>, scope: Option<&str>) -> Monitor<SqliteStore> {
    let client = HttpValidatorClient::new(false).unwrap();
    Monitor::new(
        Arc::clone(store),
        Arc::new(client),
        http_options(),
        scope.map(str::to_string),
    )
}
