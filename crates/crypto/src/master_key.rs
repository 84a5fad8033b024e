//! Device master key for the local cache database.
//!
//! The cache holds decrypted message content, so its SQLite file is encrypted
//! with SQLCipher. The 32-byte master key lives in secure storage and is
//! derived into the database key via HKDF-SHA256.

use base64::Engine;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;
use crate::secure_store::SecureStore;

/// Service namespace holding the cache master key.
pub const CACHE_KEYCHAIN_SERVICE: &str = "com.companion.cache";
/// Record name of the cache master key within [`CACHE_KEYCHAIN_SERVICE`].
pub const CACHE_KEYCHAIN_ACCOUNT: &str = "master_key";
const CACHE_DB_KEY_INFO: &[u8] = b"companion-cache-db-v1";

/// A 32-byte master key, securely wiped from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; 32],
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl MasterKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

/// Hex-encoded database encryption key formatted for SQLCipher's `PRAGMA key`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DbEncryptionKey {
    hex: String,
}

impl std::fmt::Debug for DbEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbEncryptionKey")
            .field("hex", &"[REDACTED]")
            .finish()
    }
}

impl DbEncryptionKey {
    /// Returns the full `x'...'` string for use in PRAGMA statements.
    pub fn as_pragma_value(&self) -> &str {
        &self.hex
    }
}

/// Retrieve or generate the cache master key.
///
/// On first run, generates 32 random bytes and stores them. On subsequent
/// runs, retrieves the stored key.
pub fn init_master_key(store: &dyn SecureStore) -> Result<MasterKey, CryptoError> {
    match store.get_secret(CACHE_KEYCHAIN_ACCOUNT)? {
        Some(encoded) => {
            let encoded = Zeroizing::new(encoded);
            let mut bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.as_str())
                .map_err(|_| CryptoError::KeychainError("malformed master key in keychain".into()))?;

            if bytes.len() != 32 {
                bytes.zeroize();
                return Err(CryptoError::KeychainError("malformed master key in keychain".into()));
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            bytes.zeroize();
            Ok(MasterKey { key })
        }
        None => {
            let mut key = [0u8; 32];
            rand::RngCore::fill_bytes(&mut rand::rng(), &mut key);
            let encoded = Zeroizing::new(base64::engine::general_purpose::STANDARD.encode(key));
            store.set_secret(CACHE_KEYCHAIN_ACCOUNT, &encoded)?;
            tracing::info!("created cache master key");
            Ok(MasterKey { key })
        }
    }
}

/// Derive the cache database encryption key from a master key via HKDF-SHA256.
pub fn derive_cache_db_key(master_key: &MasterKey) -> Result<DbEncryptionKey, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, master_key.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(CACHE_DB_KEY_INFO, &mut okm)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let mut hex_str = hex_encode(&okm);
    okm.zeroize();

    let result = DbEncryptionKey {
        hex: format!("x'{hex_str}'"),
    };
    hex_str.zeroize();

    Ok(result)
}

/// Apply a SQLCipher encryption key to a database connection.
///
/// Uses `execute_batch` with the hex literal embedded directly in SQL, because
/// SQLCipher's `x'...'` syntax is a SQL literal that cannot be bound as a parameter.
pub fn apply_encryption_key(
    conn: &rusqlite::Connection,
    db_key: &DbEncryptionKey,
) -> Result<(), CryptoError> {
    // NOTE: a bound parameter would be treated as a passphrase and run
    // through PBKDF2, producing a different key.
    conn.execute_batch(&format!("PRAGMA key = \"{}\";", db_key.as_pragma_value()))?;

    let cipher_version: String = conn
        .pragma_query_value(None, "cipher_version", |row| row.get(0))
        .map_err(|_| CryptoError::StorageError("SQLCipher not available".into()))?;

    if cipher_version.is_empty() {
        return Err(CryptoError::StorageError("SQLCipher not available".into()));
    }

    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}
