//! HTTP API
//!
//! Read-only status endpoints for operators and the `status` CLI command.

mod http;

pub use http::HttpServer;
