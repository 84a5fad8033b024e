//! Process-wide handle owning the key manager, cache substrate and remote
//! store. Built once at startup and shared by reference.

use std::path::Path;
use std::sync::Arc;

use companion_crypto::key_manager::KeyManager;
use companion_crypto::master_key::{derive_cache_db_key, init_master_key, CACHE_KEYCHAIN_SERVICE};
use companion_crypto::secure_store::{KeyringSecureStore, SecureStore, MESSAGE_KEYS_SERVICE};
use companion_shared::api::message::Message;
use companion_shared::ids::UserId;

use crate::cache::{CacheStore, Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::RepositoryError;
use crate::kv::{KvError, KvStore, MemoryKvStore, SqliteKvStore};
use crate::remote::{RemoteStore, RestRemoteStore};
use crate::repository::{CacheTtls, MessageRepository};

/// Open the encrypted cache database, falling back to an in-memory substrate
/// when the database or its master key is unavailable. The cache is an
/// optimization; losing it must not stop the app from starting.
pub fn open_cache_substrate(path: &Path, secrets: &dyn SecureStore) -> Arc<dyn KvStore> {
    let opened = init_master_key(secrets)
        .and_then(|mk| derive_cache_db_key(&mk))
        .map_err(KvError::from)
        .and_then(|db_key| SqliteKvStore::open(path, &db_key));

    match opened {
        Ok(kv) => {
            tracing::info!(path = %path.display(), "opened cache database");
            Arc::new(kv)
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "cache database unavailable, using in-memory cache"
            );
            Arc::new(MemoryKvStore::new())
        }
    }
}

pub struct MessagingContext {
    keys: Arc<KeyManager>,
    cache: CacheStore<Vec<Message>>,
    repository: MessageRepository,
}

impl MessagingContext {
    pub fn new(
        keys: Arc<KeyManager>,
        kv: Arc<dyn KvStore>,
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        ttls: CacheTtls,
    ) -> Self {
        let cache = CacheStore::new(kv, clock);
        let repository = MessageRepository::new(remote, keys.clone(), cache.clone(), ttls);
        Self {
            keys,
            cache,
            repository,
        }
    }

    /// Production wiring: OS keychain, encrypted on-disk cache, REST backend.
    pub fn from_config(config: &StoreConfig) -> Result<Self, RepositoryError> {
        let key_store: Arc<dyn SecureStore> =
            Arc::new(KeyringSecureStore::new(MESSAGE_KEYS_SERVICE));
        let keys = Arc::new(KeyManager::new(key_store).with_degraded_mode(config.allow_degraded_keys));

        let cache_secrets = KeyringSecureStore::new(CACHE_KEYCHAIN_SERVICE);
        let kv = open_cache_substrate(&config.cache_db_path, &cache_secrets);

        let remote = RestRemoteStore::new(
            config.remote_url.as_str(),
            config.remote_api_key.as_str(),
            config.request_timeout(),
            config.connect_timeout(),
        )?;

        let ttls = CacheTtls {
            session: config.session_ttl(),
            page: config.page_ttl(),
        };
        Ok(Self::new(keys, kv, Arc::new(remote), Arc::new(SystemClock), ttls))
    }

    pub fn repository(&self) -> &MessageRepository {
        &self.repository
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Clear the cache, then delete the user's message key. Both steps finish
    /// before this returns. Failures are logged; sign-out always completes.
    pub async fn sign_out(&self, user_id: &UserId) {
        self.cache.clear().await;

        let keys = self.keys.clone();
        let owned = user_id.clone();
        match tokio::task::spawn_blocking(move || keys.delete_key(&owned)).await {
            Ok(Ok(())) => tracing::info!(user_id = %user_id, "signed out"),
            Ok(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "failed to delete message key on sign-out")
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "key deletion task failed on sign-out")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::remote::MemoryRemoteStore;
    use companion_crypto::secure_store::MemorySecureStore;
    use companion_shared::api::message::Role;
    use companion_shared::ids::SessionId;

    fn context(secrets: Arc<MemorySecureStore>, kv: Arc<MemoryKvStore>) -> MessagingContext {
        MessagingContext::new(
            Arc::new(KeyManager::new(secrets)),
            kv,
            Arc::new(MemoryRemoteStore::new()),
            Arc::new(ManualClock::default()),
            CacheTtls::default(),
        )
    }

    #[tokio::test]
    async fn sign_out_clears_cache_and_deletes_key() {
        let secrets = Arc::new(MemorySecureStore::new());
        let kv = Arc::new(MemoryKvStore::new());
        kv.set("appLanguage", "tr").await.unwrap();
        let ctx = context(secrets, kv.clone());

        let user = UserId::from("u1");
        let session = SessionId::from("s1");
        ctx.repository()
            .save(&[Message::new(user.clone(), Role::User, "hi")], &session, &user)
            .await
            .unwrap();
        ctx.repository().find_by_session(&session, &user).await.unwrap();
        assert!(ctx.key_manager().has_key(&user).unwrap());

        ctx.sign_out(&user).await;

        assert!(!ctx.key_manager().has_key(&user).unwrap());
        assert_eq!(kv.len(), 1);
        assert_eq!(kv.get("appLanguage").await.unwrap().as_deref(), Some("tr"));
    }

    #[tokio::test]
    async fn sign_out_completes_when_key_store_is_locked() {
        let secrets = Arc::new(MemorySecureStore::new());
        let kv = Arc::new(MemoryKvStore::new());
        let ctx = context(secrets.clone(), kv.clone());
        kv.set("cache_messages_s1_u1", "{}").await.unwrap();

        secrets.set_available(false);
        ctx.sign_out(&UserId::from("u1")).await;
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn cache_substrate_opens_encrypted_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let secrets = MemorySecureStore::new();

        let kv = open_cache_substrate(&path, &secrets);
        kv.set("cache_k", "v").await.unwrap();
        drop(kv);

        let kv = open_cache_substrate(&path, &secrets);
        assert_eq!(kv.get("cache_k").await.unwrap().as_deref(), Some("v"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn cache_substrate_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let secrets = MemorySecureStore::new();
        secrets.set_available(false);

        let kv = open_cache_substrate(&path, &secrets);
        kv.set("cache_k", "v").await.unwrap();
        assert_eq!(kv.get("cache_k").await.unwrap().as_deref(), Some("v"));
        assert!(!path.exists());
    }
}
