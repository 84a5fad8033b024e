//! SQLite-backed KV substrate.
//!
//! On disk the database is encrypted with SQLCipher, since cache values hold
//! decrypted message content.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use companion_crypto::master_key::{apply_encryption_key, DbEncryptionKey};
use rusqlite::{Connection, OptionalExtension};

use super::{KvError, KvStore};

const MIGRATIONS: &[(i32, &str)] = &[(1, MIGRATION_001)];

const MIGRATION_001: &str = "
CREATE TABLE IF NOT EXISTS kv_store (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
";

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )
}

fn run_kv_migrations(conn: &Connection) -> Result<(), KvError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _kv_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _kv_migrations",
        [],
        |row| row.get(0),
    )?;

    for &(version, sql) in MIGRATIONS {
        if version > current_version {
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql)?;
            tx.execute("INSERT INTO _kv_migrations (version) VALUES (?1)", [version])?;
            tx.commit()?;
        }
    }

    Ok(())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// KV substrate persisted in a single SQLite table.
///
/// Statements run on the blocking pool; the connection is never touched from
/// an async worker thread.
pub struct SqliteKvStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKvStore {
    /// Open (or create) an encrypted store at `path`.
    pub fn open(path: &Path, db_key: &DbEncryptionKey) -> Result<Self, KvError> {
        let conn = Connection::open(path)?;
        apply_encryption_key(&conn, db_key)?;
        Self::from_connection(conn)
    }

    /// Unencrypted in-memory store, for tests.
    pub fn open_in_memory() -> Result<Self, KvError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, KvError> {
        configure_connection(&conn)?;
        run_kv_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, KvError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, KvError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| KvError::Storage(format!("kv DB lock poisoned: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(|e| KvError::Storage(format!("kv task failed: {e}")))?
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value: Option<String> = conn
                .query_row("SELECT value FROM kv_store WHERE key = ?1", [&key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                rusqlite::params![key, value, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", [&key])?;
            Ok(())
        })
        .await
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<usize, KvError> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn| {
            // substr comparison avoids LIKE wildcard escaping for `_` in prefixes.
            let removed = conn.execute(
                "DELETE FROM kv_store WHERE substr(key, 1, length(?1)) = ?1",
                [&prefix],
            )?;
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_crypto::master_key::{derive_cache_db_key, init_master_key};
    use companion_crypto::secure_store::MemorySecureStore;

    #[tokio::test]
    async fn set_overwrites_and_get_reads_back() {
        let kv = SqliteKvStore::open_in_memory().unwrap();
        kv.set("k", "v1").await.unwrap();
        kv.set("k", "v2").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v2"));
        assert!(kv.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let kv = SqliteKvStore::open_in_memory().unwrap();
        kv.set("k", "v").await.unwrap();
        kv.remove("k").await.unwrap();
        kv.remove("k").await.unwrap();
        assert!(kv.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prefix_match_treats_underscore_literally() {
        let kv = SqliteKvStore::open_in_memory().unwrap();
        kv.set("cache_a", "1").await.unwrap();
        kv.set("cacheXb", "2").await.unwrap();
        kv.set("appLanguage", "tr").await.unwrap();

        assert_eq!(kv.remove_prefix("cache_").await.unwrap(), 1);
        assert!(kv.get("cache_a").await.unwrap().is_none());
        assert_eq!(kv.get("cacheXb").await.unwrap().as_deref(), Some("2"));
        assert_eq!(kv.get("appLanguage").await.unwrap().as_deref(), Some("tr"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn locked_connection_does_not_stall_runtime() {
        use std::time::{Duration, Instant};

        let kv = Arc::new(SqliteKvStore::open_in_memory().unwrap());
        kv.set("k", "v").await.unwrap();

        let conn = kv.conn.clone();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = conn.lock().unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(300));
        });
        locked_rx.recv().unwrap();

        let reader = {
            let kv = kv.clone();
            tokio::spawn(async move { kv.get("k").await })
        };
        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(start.elapsed() < Duration::from_millis(150));
        assert!(!reader.is_finished());

        assert_eq!(reader.await.unwrap().unwrap().as_deref(), Some("v"));
        holder.join().unwrap();
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_kv_migrations(&conn).unwrap();
        run_kv_migrations(&conn).unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _kv_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn encrypted_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let secrets = MemorySecureStore::new();

        {
            let mk = init_master_key(&secrets).unwrap();
            let db_key = derive_cache_db_key(&mk).unwrap();
            let kv = SqliteKvStore::open(&path, &db_key).unwrap();
            kv.set("cache_messages_s1_u1", "payload").await.unwrap();
        }

        let mk = init_master_key(&secrets).unwrap();
        let db_key = derive_cache_db_key(&mk).unwrap();
        let kv = SqliteKvStore::open(&path, &db_key).unwrap();
        assert_eq!(
            kv.get("cache_messages_s1_u1").await.unwrap().as_deref(),
            Some("payload")
        );
    }

    #[tokio::test]
    async fn encrypted_store_rejects_other_master_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let mk = init_master_key(&MemorySecureStore::new()).unwrap();
            let db_key = derive_cache_db_key(&mk).unwrap();
            let kv = SqliteKvStore::open(&path, &db_key).unwrap();
            kv.set("k", "v").await.unwrap();
        }

        let other = init_master_key(&MemorySecureStore::new()).unwrap();
        let db_key = derive_cache_db_key(&other).unwrap();
        assert!(SqliteKvStore::open(&path, &db_key).is_err());
    }
}
