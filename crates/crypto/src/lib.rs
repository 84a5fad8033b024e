//! companion-crypto: client-side key custody and message encryption.
//!
//! Provides per-user symmetric keys held in OS secure storage, AES-256-GCM
//! message envelopes, and the device master key that encrypts the local cache
//! database (SQLCipher).

pub mod cipher;
pub mod error;
pub mod key_manager;
pub mod master_key;
pub mod secure_store;
