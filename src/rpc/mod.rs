//! JSON-RPC 2.0 protocol handling
//!
//! Envelope validation, the method registry, response envelopes and the
//! request cycle that ties them together.

pub mod envelope;
pub mod registry;
pub mod response;
pub mod server;
