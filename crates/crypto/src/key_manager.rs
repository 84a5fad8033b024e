//! Per-user message key custody.
//!
//! One 256-bit key per user identity, created lazily on first use and kept in
//! secure storage under `encryption_key_{userId}`. Deleting the key makes every
//! envelope encrypted under it permanently unreadable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::Engine;
use companion_shared::ids::UserId;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;
use crate::secure_store::SecureStore;

pub(crate) const KEY_SIZE: usize = 32;

/// A 32-byte message key, securely wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MessageKey {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl MessageKey {
    /// Generate a fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut key);
        Self { key }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    fn encode(&self) -> Zeroizing<String> {
        Zeroizing::new(base64::engine::general_purpose::STANDARD.encode(self.key))
    }

    fn decode(encoded: &str) -> Result<Self, CryptoError> {
        let mut bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::KeychainError("malformed message key in keychain".into()))?;
        if bytes.len() != KEY_SIZE {
            bytes.zeroize();
            return Err(CryptoError::KeychainError(
                "malformed message key in keychain".into(),
            ));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self { key })
    }
}

/// Name of the secure-store record holding a user's key.
pub fn key_account(user_id: &UserId) -> String {
    format!("encryption_key_{user_id}")
}

/// Derives, stores, and deletes per-user message keys.
pub struct KeyManager {
    store: Arc<dyn SecureStore>,
    allow_degraded: bool,
    // Serializes get-or-create so two callers never mint different keys.
    create_lock: Mutex<()>,
    degraded_keys: Mutex<HashMap<UserId, MessageKey>>,
}

impl KeyManager {
    /// Key manager that fails hard when secure storage is unavailable.
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self {
            store,
            allow_degraded: false,
            create_lock: Mutex::new(()),
            degraded_keys: Mutex::new(HashMap::new()),
        }
    }

    /// Opt in to degraded mode: when secure storage is unavailable, issue a
    /// random process-local key instead of failing. Envelopes written under a
    /// degraded key are unreadable after the process exits.
    pub fn with_degraded_mode(mut self, allow: bool) -> Self {
        self.allow_degraded = allow;
        self
    }

    /// Return the user's key, creating and storing one if none exists.
    pub fn get_or_create_key(&self, user_id: &UserId) -> Result<MessageKey, CryptoError> {
        let account = key_account(user_id);
        let _guard = self
            .create_lock
            .lock()
            .map_err(|e| CryptoError::KeychainError(format!("key lock poisoned: {e}")))?;

        let existing = match self.store.get_secret(&account) {
            Ok(existing) => existing,
            Err(CryptoError::KeyStoreUnavailable) => return self.degraded_key(user_id),
            Err(e) => return Err(e),
        };

        if let Some(encoded) = existing {
            let encoded = Zeroizing::new(encoded);
            let key = MessageKey::decode(&encoded)?;
            if self.lock_degraded()?.remove(user_id).is_some() {
                tracing::info!(user_id = %user_id, "secure key store recovered, dropped degraded key");
            }
            return Ok(key);
        }

        // A degraded key issued while the store was down is persisted so that
        // envelopes written under it stay readable.
        let pending = self.lock_degraded()?.get(user_id).cloned();
        let promoted = pending.is_some();
        let key = pending.unwrap_or_else(MessageKey::generate);
        match self.store.set_secret(&account, &key.encode()) {
            Ok(()) => {
                self.lock_degraded()?.remove(user_id);
                if promoted {
                    tracing::info!(user_id = %user_id, "stored degraded message key");
                } else {
                    tracing::info!(user_id = %user_id, "created message key");
                }
                Ok(key)
            }
            Err(CryptoError::KeyStoreUnavailable) => self.degraded_key(user_id),
            Err(e) => Err(e),
        }
    }

    /// Delete the user's key. Deleting an absent key succeeds.
    pub fn delete_key(&self, user_id: &UserId) -> Result<(), CryptoError> {
        self.lock_degraded()?.remove(user_id);
        self.store.delete_secret(&key_account(user_id))?;
        tracing::info!(user_id = %user_id, "deleted message key");
        Ok(())
    }

    /// Whether a key exists for the user. Diagnostics only.
    pub fn has_key(&self, user_id: &UserId) -> Result<bool, CryptoError> {
        if self.lock_degraded()?.contains_key(user_id) {
            return Ok(true);
        }
        Ok(self.store.get_secret(&key_account(user_id))?.is_some())
    }

    /// Whether the user is currently served a process-local degraded key.
    pub fn is_degraded(&self, user_id: &UserId) -> bool {
        self.degraded_keys
            .lock()
            .map(|keys| keys.contains_key(user_id))
            .unwrap_or(false)
    }

    fn degraded_key(&self, user_id: &UserId) -> Result<MessageKey, CryptoError> {
        if !self.allow_degraded {
            tracing::error!(user_id = %user_id, "secure key store unavailable");
            return Err(CryptoError::KeyStoreUnavailable);
        }
        tracing::warn!(
            user_id = %user_id,
            "secure key store unavailable, issuing process-local degraded key"
        );
        let mut keys = self.lock_degraded()?;
        Ok(keys
            .entry(user_id.clone())
            .or_insert_with(MessageKey::generate)
            .clone())
    }

    fn lock_degraded(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<UserId, MessageKey>>, CryptoError> {
        self.degraded_keys
            .lock()
            .map_err(|e| CryptoError::KeychainError(format!("degraded key lock poisoned: {e}")))
    }
}
