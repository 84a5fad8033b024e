//! Error types for the companion-crypto crate.

use thiserror::Error;

/// Errors that can occur during key custody and message encryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The provided key material is invalid (wrong length, malformed, etc.).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Secure storage cannot be reached (device locked, keystore failure).
    #[error("key store unavailable")]
    KeyStoreUnavailable,

    /// OS keychain operation failed for a reason other than availability.
    #[error("keychain error: {0}")]
    KeychainError(String),

    /// The underlying cipher rejected the encryption.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (wrong key, truncated or tampered envelope).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Local database error.
    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<rusqlite::Error> for CryptoError {
    fn from(err: rusqlite::Error) -> Self {
        CryptoError::StorageError(err.to_string())
    }
}

impl From<CryptoError> for companion_shared::error::CompanionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyStoreUnavailable => {
                companion_shared::error::CompanionError::ServiceUnavailable(err.to_string())
            }
            other => companion_shared::error::CompanionError::Crypto(other.to_string()),
        }
    }
}

impl From<keyring::Error> for CryptoError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
                CryptoError::KeyStoreUnavailable
            }
            other => CryptoError::KeychainError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_human_readable() {
        let err = CryptoError::InvalidKey("bad key data".into());
        assert!(err.to_string().contains("bad key data"));

        let err = CryptoError::DecryptionFailed("tag mismatch".into());
        assert!(err.to_string().contains("tag mismatch"));

        let err = CryptoError::KeyStoreUnavailable;
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn from_rusqlite_error_converts_to_storage_error() {
        let rusqlite_err = rusqlite::Error::QueryReturnedNoRows;
        let crypto_err: CryptoError = rusqlite_err.into();
        match crypto_err {
            CryptoError::StorageError(_) => {}
            other => panic!("expected StorageError, got: {other:?}"),
        }
    }

    #[test]
    fn from_keyring_platform_failure_converts_to_unavailable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "test");
        let keyring_err = keyring::Error::PlatformFailure(Box::new(io_err));
        let crypto_err: CryptoError = keyring_err.into();
        match crypto_err {
            CryptoError::KeyStoreUnavailable => {}
            other => panic!("expected KeyStoreUnavailable, got: {other:?}"),
        }
    }

    #[test]
    fn from_keyring_no_storage_access_converts_to_unavailable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let keyring_err = keyring::Error::NoStorageAccess(Box::new(io_err));
        let crypto_err: CryptoError = keyring_err.into();
        assert!(matches!(crypto_err, CryptoError::KeyStoreUnavailable));
    }

    #[test]
    fn from_keyring_other_error_converts_to_keychain_error() {
        let keyring_err = keyring::Error::TooLong("user".into(), 255);
        let crypto_err: CryptoError = keyring_err.into();
        assert!(matches!(crypto_err, CryptoError::KeychainError(_)));
    }

    #[test]
    fn unavailable_maps_to_service_unavailable() {
        let shared: companion_shared::error::CompanionError =
            CryptoError::KeyStoreUnavailable.into();
        assert!(matches!(
            shared,
            companion_shared::error::CompanionError::ServiceUnavailable(_)
        ));

        let shared: companion_shared::error::CompanionError =
            CryptoError::EncryptionFailed("x".into()).into();
        assert!(matches!(
            shared,
            companion_shared::error::CompanionError::Crypto(_)
        ));
    }

    #[test]
    fn all_variants_impl_error() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(CryptoError::InvalidKey("k".into())),
            Box::new(CryptoError::KeyStoreUnavailable),
            Box::new(CryptoError::KeychainError("k".into())),
            Box::new(CryptoError::EncryptionFailed("e".into())),
            Box::new(CryptoError::DecryptionFailed("d".into())),
            Box::new(CryptoError::StorageError("s".into())),
        ];
        for e in &errors {
            let _ = e.to_string();
        }
    }
}
