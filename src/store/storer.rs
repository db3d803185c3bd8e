//! Storage trait for check records and content blobs

use chrono::{DateTime, Utc};

use crate::store::error::StoreError;
use crate::store::types::{CheckRecord, ContentBlob, ContentId, ContentWrite, NewCheck};

/// Trait for appending and querying the version history of URLs
///
/// Histories are keyed by `(url, scope)`. Records are only ever appended.
pub trait ContentStorer: Send + Sync + 'static {
    /// Append a check and its content atomically
    ///
    /// Either the whole write (blob, aliases, check) becomes visible, or none of it.
    fn append_check(&self, check: &NewCheck, content: &ContentWrite)
    -> Result<CheckRecord, StoreError>;

    /// Most recent record with `timestamp <= at`
    ///
    /// With `require_content`, only successful records referencing a blob qualify.
    fn get_by_time(
        &self,
        url: &str,
        scope: Option<&str>,
        at: DateTime<Utc>,
        require_content: bool,
    ) -> Result<Option<CheckRecord>, StoreError>;

    /// Record at `index` in ascending chronological order; negative counts from the end
    fn get_by_index(
        &self,
        url: &str,
        scope: Option<&str>,
        index: i64,
        require_content: bool,
    ) -> Result<Option<CheckRecord>, StoreError>;

    /// Number of records in a history
    fn count(&self, url: &str, scope: Option<&str>, require_content: bool)
    -> Result<usize, StoreError>;

    /// All records of a history in ascending chronological order
    fn history(&self, url: &str, scope: Option<&str>) -> Result<Vec<CheckRecord>, StoreError>;

    /// Timestamp of the newest record of any kind
    fn last_checked(
        &self,
        url: &str,
        scope: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Load a blob by content address
    fn load_content(&self, content_ref: &ContentId) -> Result<ContentBlob, StoreError>;

    /// Whether any record was ever written under `scope`
    fn scope_in_use(&self, scope: &str) -> Result<bool, StoreError>;
}
