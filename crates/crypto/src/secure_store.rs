//! Secure credential storage backing key custody.
//!
//! `KeyringSecureStore` talks to the OS keychain (Keychain, Credential
//! Manager, Secret Service). `MemorySecureStore` keeps secrets in process and
//! can simulate an inaccessible keystore.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::CryptoError;

/// Service namespace under which per-user message keys are stored.
pub const MESSAGE_KEYS_SERVICE: &str = "com.companion.messages";

/// A named-secret store scoped to one service namespace.
///
/// `get_secret` returns `Ok(None)` for an absent record; `delete_secret` on an
/// absent record succeeds. Accessibility problems surface as
/// `CryptoError::KeyStoreUnavailable`.
pub trait SecureStore: Send + Sync {
    fn get_secret(&self, account: &str) -> Result<Option<String>, CryptoError>;
    fn set_secret(&self, account: &str, secret: &str) -> Result<(), CryptoError>;
    fn delete_secret(&self, account: &str) -> Result<(), CryptoError>;
}

/// OS keychain store. Records are device-local and never synced.
pub struct KeyringSecureStore {
    service: String,
}

impl KeyringSecureStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry, CryptoError> {
        keyring::Entry::new(&self.service, account).map_err(|e| match e {
            keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
                CryptoError::KeyStoreUnavailable
            }
            other => CryptoError::KeychainError(other.to_string()),
        })
    }
}

impl SecureStore for KeyringSecureStore {
    fn get_secret(&self, account: &str) -> Result<Option<String>, CryptoError> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CryptoError::from(e)),
        }
    }

    fn set_secret(&self, account: &str, secret: &str) -> Result<(), CryptoError> {
        self.entry(account)?
            .set_password(secret)
            .map_err(CryptoError::from)
    }

    fn delete_secret(&self, account: &str) -> Result<(), CryptoError> {
        match self.entry(account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CryptoError::from(e)),
        }
    }
}

/// In-process secret store for tests and hosts without a keychain.
#[derive(Default)]
pub struct MemorySecureStore {
    secrets: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated inaccessibility (e.g. a locked device).
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CryptoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CryptoError::KeyStoreUnavailable)
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, CryptoError> {
        self.secrets
            .lock()
            .map_err(|e| CryptoError::KeychainError(format!("secret map lock poisoned: {e}")))
    }
}

impl SecureStore for MemorySecureStore {
    fn get_secret(&self, account: &str) -> Result<Option<String>, CryptoError> {
        self.check_available()?;
        Ok(self.lock()?.get(account).cloned())
    }

    fn set_secret(&self, account: &str, secret: &str) -> Result<(), CryptoError> {
        self.check_available()?;
        self.lock()?.insert(account.to_string(), secret.to_string());
        Ok(())
    }

    fn delete_secret(&self, account: &str) -> Result<(), CryptoError> {
        self.check_available()?;
        self.lock()?.remove(account);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_get_absent_returns_none() {
        let store = MemorySecureStore::new();
        assert!(store.get_secret("missing").unwrap().is_none());
    }

    #[test]
    fn memory_store_set_then_get() {
        let store = MemorySecureStore::new();
        store.set_secret("a", "secret").unwrap();
        assert_eq!(store.get_secret("a").unwrap().as_deref(), Some("secret"));
    }

    #[test]
    fn memory_store_delete_is_idempotent() {
        let store = MemorySecureStore::new();
        store.set_secret("a", "secret").unwrap();
        store.delete_secret("a").unwrap();
        store.delete_secret("a").unwrap();
        assert!(store.get_secret("a").unwrap().is_none());
    }

    #[test]
    fn memory_store_unavailable_fails_every_operation() {
        let store = MemorySecureStore::new();
        store.set_available(false);
        assert!(matches!(
            store.get_secret("a"),
            Err(CryptoError::KeyStoreUnavailable)
        ));
        assert!(matches!(
            store.set_secret("a", "s"),
            Err(CryptoError::KeyStoreUnavailable)
        ));
        assert!(matches!(
            store.delete_secret("a"),
            Err(CryptoError::KeyStoreUnavailable)
        ));

        store.set_available(true);
        assert!(store.get_secret("a").unwrap().is_none());
    }
}
