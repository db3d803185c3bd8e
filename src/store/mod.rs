//! Versioned content store
//!
//! Keeps an append-only history of checks per `(url, scope)` and a
//! content-addressed table of bodies shared between checks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────┐
//! │   Resolver   │────▶│ ContentStorer │◀────│ VersionCache │
//! │   (append)   │     │   (SQLite)    │     │ (per session)│
//! └──────────────┘     └───────────────┘     └──────────────┘
//!                              │
//!                              ▼
//!                  checks ──▶ blobs ◀── blob_aliases
//! ```
//!
//! # Modules
//!
//! - [`sqlite`]: SQLite-backed store with schema migrations
//! - [`storer`]: `ContentStorer` trait for appending and querying histories
//! - [`version_cache`]: Read-through cache keyed by index or content identity
//! - [`selector`]: Version selectors (by time or by relative index)
//! - [`types`]: `CheckRecord`, `ContentBlob` and friends
//! - [`error`]: Error types for store operations

pub mod error;
pub mod selector;
pub mod sqlite;
pub mod storer;
pub mod types;
pub mod version_cache;

pub use error::StoreError;
pub use selector::Selector;
pub use sqlite::SqliteStore;
pub use storer::ContentStorer;
pub use types::{CheckRecord, ContentBlob, ContentId, ContentWrite, NewCheck, ResponseCode, Validators};
pub use version_cache::VersionCache;
