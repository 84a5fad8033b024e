//! Key lifecycle integration test for companion-crypto.
//!
//! Exercises key creation, envelope encryption, key deletion on sign-out,
//! and the guarantee that a replacement key cannot read old envelopes.

use std::sync::Arc;

use companion_crypto::cipher;
use companion_crypto::error::CryptoError;
use companion_crypto::key_manager::{key_account, KeyManager};
use companion_crypto::master_key::{derive_cache_db_key, init_master_key};
use companion_crypto::secure_store::{MemorySecureStore, SecureStore};
use companion_shared::ids::UserId;

#[test]
fn full_lifecycle_single_user() {
    let secrets = Arc::new(MemorySecureStore::new());
    let keys = KeyManager::new(secrets.clone());
    let user = UserId::from("u1");

    // -- Step 1: first use creates and stores a key --
    assert!(!keys.has_key(&user).unwrap());
    let key = keys.get_or_create_key(&user).unwrap();
    assert!(secrets.get_secret(&key_account(&user)).unwrap().is_some());

    // -- Step 2: envelopes round-trip and legacy content passes through --
    let envelope = cipher::encrypt("hello", &key).unwrap();
    assert!(cipher::is_encrypted(&envelope));
    let again = keys.get_or_create_key(&user).unwrap();
    assert_eq!(cipher::decrypt(&envelope, &again).unwrap(), "hello");
    assert_eq!(
        cipher::decrypt_content("plain old text", &again).unwrap(),
        "plain old text"
    );

    // -- Step 3: sign-out deletes the key, twice is fine --
    keys.delete_key(&user).unwrap();
    keys.delete_key(&user).unwrap();
    assert!(!keys.has_key(&user).unwrap());

    // -- Step 4: a fresh key cannot read the old envelope --
    let replacement = keys.get_or_create_key(&user).unwrap();
    assert!(matches!(
        cipher::decrypt(&envelope, &replacement),
        Err(CryptoError::DecryptionFailed(_))
    ));
}

#[test]
fn users_never_share_keys() {
    let keys = KeyManager::new(Arc::new(MemorySecureStore::new()));
    let alice = keys.get_or_create_key(&UserId::from("alice")).unwrap();
    let bob = keys.get_or_create_key(&UserId::from("bob")).unwrap();

    let envelope = cipher::encrypt("for alice", &alice).unwrap();
    assert!(cipher::decrypt(&envelope, &bob).is_err());
}

#[test]
fn locked_key_store_fails_hard_unless_degraded_mode() {
    let secrets = Arc::new(MemorySecureStore::new());
    secrets.set_available(false);
    let user = UserId::from("u1");

    let strict = KeyManager::new(secrets.clone());
    assert!(matches!(
        strict.get_or_create_key(&user),
        Err(CryptoError::KeyStoreUnavailable)
    ));

    let lenient = KeyManager::new(secrets).with_degraded_mode(true);
    let key = lenient.get_or_create_key(&user).unwrap();
    assert!(lenient.is_degraded(&user));
    let envelope = cipher::encrypt("x", &key).unwrap();
    let same = lenient.get_or_create_key(&user).unwrap();
    assert_eq!(cipher::decrypt(&envelope, &same).unwrap(), "x");
}

#[test]
fn cache_db_key_is_stable_per_device() {
    let secrets = MemorySecureStore::new();
    let first = derive_cache_db_key(&init_master_key(&secrets).unwrap()).unwrap();
    let second = derive_cache_db_key(&init_master_key(&secrets).unwrap()).unwrap();
    assert_eq!(first.as_pragma_value(), second.as_pragma_value());

    let other_device = MemorySecureStore::new();
    let third = derive_cache_db_key(&init_master_key(&other_device).unwrap()).unwrap();
    assert_ne!(first.as_pragma_value(), third.as_pragma_value());
}
