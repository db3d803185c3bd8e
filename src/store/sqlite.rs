use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, info};

use crate::store::error::StoreError;
use crate::store::storer::ContentStorer;
use crate::store::types::{
    CheckRecord, ContentBlob, ContentId, ContentWrite, NewCheck, ResponseCode, Validators,
};

/// Columns selected for a `CheckRecord`, in the order `map_record` reads them
const RECORD_COLUMNS: &str = r#"
    c.id, c.url, c.final_url, c.scope, c.timestamp, c.response_code,
    c.etag, c.last_modified, c.content_type, b.md5, b.sha1
"#;

/// Extra condition for "successful and has content"
const CONTENT_FILTER: &str =
    "AND c.blob_id IS NOT NULL AND c.response_code IS NOT NULL AND c.response_code < 400";

/// SQLite-backed content store
///
/// `checks` holds one row per observation, `blobs` one row per distinct
/// `(md5, sha1)` and `blob_aliases` the URLs that served each blob.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        info!("Initializing content store at {:?}", db_path);

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        debug!("Database connection established");

        let store = Self {
            conn: Mutex::new(conn),
        };

        store.create_schema()?;
        info!("Content store initialized successfully");

        Ok(store)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                md5 TEXT NOT NULL,
                sha1 TEXT NOT NULL,
                content_type TEXT NOT NULL,
                length INTEGER NOT NULL,
                data BLOB NOT NULL,
                UNIQUE(md5, sha1)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS blob_aliases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                blob_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                FOREIGN KEY (blob_id) REFERENCES blobs(id),
                UNIQUE(blob_id, url)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS checks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                final_url TEXT,
                scope TEXT,
                timestamp INTEGER NOT NULL,
                response_code INTEGER,
                etag TEXT,
                last_modified TEXT,
                content_type TEXT,
                blob_id INTEGER,
                FOREIGN KEY (blob_id) REFERENCES blobs(id)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_checks_key ON checks(url, scope, timestamp, id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_checks_blob_id ON checks(blob_id)",
            [],
        )?;

        debug!("Database schema created successfully");
        Ok(())
    }

    fn map_record(row: &Row<'_>) -> rusqlite::Result<CheckRecord> {
        let timestamp_ms: i64 = row.get(4)?;
        let timestamp = DateTime::from_timestamp_millis(timestamp_ms)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, timestamp_ms))?;

        let validators = Validators {
            etag: row.get(6)?,
            last_modified: row.get(7)?,
        };
        let md5: Option<String> = row.get(9)?;
        let sha1: Option<String> = row.get(10)?;

        Ok(CheckRecord {
            id: row.get(0)?,
            url: row.get(1)?,
            final_url: row.get(2)?,
            scope: row.get(3)?,
            timestamp,
            response_code: ResponseCode::from_sql(row.get(5)?),
            validators: (!validators.is_empty()).then_some(validators),
            content_type: row.get(8)?,
            content_ref: md5.zip(sha1).map(|(md5, sha1)| ContentId { md5, sha1 }),
        })
    }

    fn find_blob_id(tx: &Transaction<'_>, content_ref: &ContentId) -> Result<Option<i64>, StoreError> {
        let id = tx
            .query_row(
                "SELECT id FROM blobs WHERE md5 = ?1 AND sha1 = ?2",
                (&content_ref.md5, &content_ref.sha1),
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn add_aliases<'a>(
        tx: &Transaction<'_>,
        blob_id: i64,
        aliases: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), StoreError> {
        let mut stmt = tx.prepare("INSERT OR IGNORE INTO blob_aliases (blob_id, url) VALUES (?1, ?2)")?;
        for url in aliases {
            stmt.execute((blob_id, url))?;
        }
        Ok(())
    }

    /// Create the blob unless one with the same content address exists
    fn put_blob(tx: &Transaction<'_>, blob: &ContentBlob) -> Result<i64, StoreError> {
        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO blobs (md5, sha1, content_type, length, data)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            (
                &blob.md5,
                &blob.sha1,
                &blob.content_type,
                blob.length as i64,
                &blob.data,
            ),
        )?;

        if inserted > 0 {
            debug!("Stored new blob {} ({} bytes)", blob.content_id(), blob.length);
        } else {
            debug!("Reusing existing blob {}", blob.content_id());
        }

        Self::find_blob_id(tx, &blob.content_id())?
            .ok_or_else(|| StoreError::MissingContent(blob.content_id().to_string()))
    }

    fn query_one(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<CheckRecord>, StoreError> {
        let conn = self.lock_conn()?;
        let record = conn.query_row(sql, params, Self::map_record).optional()?;
        Ok(record)
    }
}

impl ContentStorer for SqliteStore {
    fn append_check(
        &self,
        check: &NewCheck,
        content: &ContentWrite,
    ) -> Result<CheckRecord, StoreError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let blob_id = match content {
            ContentWrite::Nothing => None,
            ContentWrite::Existing {
                content_ref,
                aliases,
            } => {
                let blob_id = Self::find_blob_id(&tx, content_ref)?
                    .ok_or_else(|| StoreError::MissingContent(content_ref.to_string()))?;
                Self::add_aliases(&tx, blob_id, aliases)?;
                Some(blob_id)
            }
            ContentWrite::New(blob) => {
                let blob_id = Self::put_blob(&tx, blob)?;
                Self::add_aliases(&tx, blob_id, &blob.alias_urls)?;
                Some(blob_id)
            }
        };

        // Keep the history non-decreasing even if the wall clock stepped back
        let newest: Option<i64> = tx.query_row(
            "SELECT MAX(timestamp) FROM checks WHERE url = ?1 AND scope IS ?2",
            (&check.url, &check.scope),
            |row| row.get(0),
        )?;
        let timestamp_ms = newest.map_or(check.timestamp.timestamp_millis(), |newest| {
            newest.max(check.timestamp.timestamp_millis())
        });

        let validators = check.validators.clone().unwrap_or_default();
        tx.execute(
            r#"
            INSERT INTO checks
                (url, final_url, scope, timestamp, response_code, etag, last_modified,
                 content_type, blob_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            (
                &check.url,
                &check.final_url,
                &check.scope,
                timestamp_ms,
                check.response_code.to_sql(),
                &validators.etag,
                &validators.last_modified,
                &check.content_type,
                blob_id,
            ),
        )?;
        let id = tx.last_insert_rowid();

        let record = tx.query_row(
            &format!(
                "SELECT {} FROM checks c LEFT JOIN blobs b ON c.blob_id = b.id WHERE c.id = ?1",
                RECORD_COLUMNS
            ),
            [id],
            Self::map_record,
        )?;

        tx.commit()?;

        debug!(
            "Appended check #{} for {} (scope {:?}, response {})",
            record.id, record.url, record.scope, record.response_code
        );
        Ok(record)
    }

    fn get_by_time(
        &self,
        url: &str,
        scope: Option<&str>,
        at: DateTime<Utc>,
        require_content: bool,
    ) -> Result<Option<CheckRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM checks c LEFT JOIN blobs b ON c.blob_id = b.id
            WHERE c.url = ?1 AND c.scope IS ?2 AND c.timestamp <= ?3 {}
            ORDER BY c.timestamp DESC, c.id DESC
            LIMIT 1
            "#,
            RECORD_COLUMNS,
            if require_content { CONTENT_FILTER } else { "" }
        );
        self.query_one(&sql, (url, scope, at.timestamp_millis()))
    }

    fn get_by_index(
        &self,
        url: &str,
        scope: Option<&str>,
        index: i64,
        require_content: bool,
    ) -> Result<Option<CheckRecord>, StoreError> {
        // -1 is the newest record, so negative indices walk the history backwards
        let (order, offset) = if index >= 0 {
            ("ASC", index)
        } else {
            ("DESC", -(index + 1))
        };

        let sql = format!(
            r#"
            SELECT {} FROM checks c LEFT JOIN blobs b ON c.blob_id = b.id
            WHERE c.url = ?1 AND c.scope IS ?2 {}
            ORDER BY c.timestamp {order}, c.id {order}
            LIMIT 1 OFFSET ?3
            "#,
            RECORD_COLUMNS,
            if require_content { CONTENT_FILTER } else { "" }
        );
        self.query_one(&sql, (url, scope, offset))
    }

    fn count(
        &self,
        url: &str,
        scope: Option<&str>,
        require_content: bool,
    ) -> Result<usize, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM checks c WHERE c.url = ?1 AND c.scope IS ?2 {}",
            if require_content { CONTENT_FILTER } else { "" }
        );
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row(&sql, (url, scope), |row| row.get(0))?;
        Ok(count as usize)
    }

    fn history(&self, url: &str, scope: Option<&str>) -> Result<Vec<CheckRecord>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM checks c LEFT JOIN blobs b ON c.blob_id = b.id
            WHERE c.url = ?1 AND c.scope IS ?2
            ORDER BY c.timestamp ASC, c.id ASC
            "#,
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map((url, scope), Self::map_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn last_checked(
        &self,
        url: &str,
        scope: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.lock_conn()?;
        let newest: Option<i64> = conn.query_row(
            "SELECT MAX(timestamp) FROM checks WHERE url = ?1 AND scope IS ?2",
            (url, scope),
            |row| row.get(0),
        )?;
        Ok(newest.and_then(DateTime::from_timestamp_millis))
    }

    fn load_content(&self, content_ref: &ContentId) -> Result<ContentBlob, StoreError> {
        let conn = self.lock_conn()?;

        let blob = conn
            .query_row(
                "SELECT id, content_type, length, data FROM blobs WHERE md5 = ?1 AND sha1 = ?2",
                (&content_ref.md5, &content_ref.sha1),
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((blob_id, content_type, length, data)) = blob else {
            return Err(StoreError::MissingContent(content_ref.to_string()));
        };

        let mut stmt = conn.prepare("SELECT url FROM blob_aliases WHERE blob_id = ?1")?;
        let alias_urls = stmt
            .query_map([blob_id], |row| row.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;

        Ok(ContentBlob {
            content_type,
            length: length as usize,
            md5: content_ref.md5.clone(),
            sha1: content_ref.sha1.clone(),
            data,
            alias_urls,
        })
    }

    fn scope_in_use(&self, scope: &str) -> Result<bool, StoreError> {
        let conn = self.lock_conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM checks WHERE scope = ?1)",
            [scope],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}
