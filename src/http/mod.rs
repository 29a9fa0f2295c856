//! HTTP transport layer for JSON-RPC
//!
//! Provides the bounded body reader and the axum endpoints built on it.

pub mod body;
pub mod handlers;
