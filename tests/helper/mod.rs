#![allow(dead_code)]

mod archive;
mod client;

pub use archive::{create_http_monitor, create_test_store, http_options};
pub use client::ScriptedClient;
