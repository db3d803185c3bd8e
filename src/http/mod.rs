//! Validator client layer
//!
//! Sends HEAD/GET requests on behalf of the resolver and reports either a
//! structured response or a failure. Redirects are followed here, inside a
//! single call, so the full redirect chain is known to the caller.
//!
//! # Modules
//!
//! - [`client`]: `ValidatorClient` trait and the request/response types
//! - [`error`]: Error types for fetch operations
//! - [`reqwest_client`]: reqwest-backed implementation

pub mod client;
pub mod error;
pub mod reqwest_client;

pub use client::{Method, RequestLimits, ValidatorClient, ValidatorResponse};
pub use error::FetchError;
pub use reqwest_client::HttpValidatorClient;
