use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::MonitorError;

// =============================================================================
// Network-related constants
// =============================================================================

/// Timeout for a single validator request in milliseconds (30 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Maximum number of redirects followed within one request
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// User agent sent with every request
pub const USER_AGENT: &str = "change-monitor";

// =============================================================================
// Storage-related constants
// =============================================================================

/// Size in bytes above which a document counts as "large" (4096 KiB)
pub const LARGE_DOCUMENT_SIZE: usize = 4096 * 1024;

// =============================================================================
// Batch-related constants
// =============================================================================

/// Default number of URLs resolved concurrently by a batch check
pub const DEFAULT_WORKERS: usize = 8;

/// Delay between starting each resolution in a batch (10ms)
pub const FETCH_STAGGER_DELAY_MS: u64 = 10;

/// Monitor configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorConfig {
    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub batch: BatchConfig,
}

/// Validator client configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpConfig {
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    pub max_redirects: usize,
    /// Lets the first redirect hop leave the requested host
    pub allow_cross_origin_redirect: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            allow_cross_origin_redirect: false,
        }
    }
}

/// Content store configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Overrides the default database location
    pub db_path: Option<PathBuf>,
    pub allow_large_documents: bool,
}

/// Batch check configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchConfig {
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a JSON file, or defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            MonitorError::Configuration(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Database location, honouring the configured override
    pub fn db_path(&self) -> PathBuf {
        self.storage.db_path.clone().unwrap_or_else(db_path)
    }
}

/// Returns the path to the data directory for change-monitor.
/// Uses $XDG_DATA_HOME/change-monitor if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/change-monitor,
/// or ./change-monitor if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the database file.
pub fn db_path() -> PathBuf {
    data_dir().join("archive.db")
}

/// Name of the log file inside the data directory, appended to by the CLI
pub const LOG_FILE_NAME: &str = "change-monitor.log";

/// Returns the path to the optional configuration file.
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("change-monitor")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn monitor_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<MonitorConfig>(json!({
            "http": {
                "timeoutMs": 1000
            }
        }))
        .unwrap();

        assert_eq!(result.http.timeout_ms, 1000);
        assert_eq!(result.http.max_redirects, DEFAULT_MAX_REDIRECTS);
        assert_eq!(result.storage, StorageConfig::default());
        assert_eq!(result.batch, BatchConfig::default());
    }

    #[test]
    fn monitor_config_from_full_object_parses_all_fields() {
        let result = serde_json::from_value::<MonitorConfig>(json!({
            "http": {
                "timeoutMs": 5000,
                "maxRedirects": 3,
                "allowCrossOriginRedirect": true
            },
            "storage": {
                "dbPath": "/tmp/archive.db",
                "allowLargeDocuments": true
            },
            "batch": { "workers": 2 }
        }))
        .unwrap();

        assert_eq!(
            result,
            MonitorConfig {
                http: HttpConfig {
                    timeout_ms: 5000,
                    max_redirects: 3,
                    allow_cross_origin_redirect: true,
                },
                storage: StorageConfig {
                    db_path: Some(PathBuf::from("/tmp/archive.db")),
                    allow_large_documents: true,
                },
                batch: BatchConfig { workers: 2 },
            }
        );
    }

    #[test]
    fn load_returns_defaults_when_file_is_missing() {
        let temp_dir = TempDir::new().unwrap();
        let config = MonitorConfig::load(&temp_dir.path().join("missing.json")).unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn load_rejects_malformed_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = MonitorConfig::load(&path);
        assert!(matches!(result, Err(MonitorError::Configuration(_))));
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/change-monitor"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.local/share/change-monitor"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./change-monitor"));
    }
}
