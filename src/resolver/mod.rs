//! Resolution of URLs into store decisions
//!
//! A resolution reads the newest version of a history, asks the server the
//! cheapest question that can prove the document unchanged, downloads only
//! when it must, and appends exactly one check record.
//!
//! # Modules
//!
//! - [`resolve`]: `Resolver` and its decide-and-persist algorithm
//! - [`decision`]: `StoreDecision`, the outcome of one resolution
//! - [`locks`]: Per-`(url, scope)` async locks
//! - [`batch`]: Bounded concurrent resolution of many URLs

pub mod batch;
pub mod decision;
pub mod locks;
pub mod resolve;

pub use batch::{BatchOutcome, check_batch};
pub use decision::{ResponseMeta, StoreDecision};
pub use locks::KeyedLocks;
pub use resolve::{Resolver, ResolverOptions};
