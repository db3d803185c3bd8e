pub mod config;
pub mod diff;
pub mod error;
pub mod http;
pub mod monitor;
pub mod resolver;
pub mod store;
