//! companion-store: encrypted, cache-fronted message persistence.
//!
//! `MessageRepository` reads and writes chat messages against a remote row
//! store, encrypting content with per-user keys and caching decrypted pages
//! in a TTL-bounded local cache.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod kv;
pub mod remote;
pub mod repository;
pub mod telemetry;
