//! Cache-fronted, encrypted message reads and writes.
//!
//! Reads check the cache first and on a miss fetch rows from the remote store,
//! decrypt them and populate the cache. Writes encrypt, insert, and only then
//! invalidate the session's cache entries.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use companion_crypto::cipher;
use companion_crypto::error::CryptoError;
use companion_crypto::key_manager::{KeyManager, MessageKey};
use companion_shared::api::message::{Message, MessageRow};
use companion_shared::constants::{
    DECRYPTION_FAILED_PLACEHOLDER, DEFAULT_PAGE_TTL, DEFAULT_RECENT_LIMIT, DEFAULT_SESSION_TTL,
    MAX_PAGE_SIZE,
};
use companion_shared::ids::{SessionId, UserId};

use crate::cache::CacheStore;
use crate::error::RepositoryError;
use crate::remote::{MessageQuery, RemoteStore};

/// Cache lifetimes for full-session reads and single pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub session: Duration,
    pub page: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            session: DEFAULT_SESSION_TTL,
            page: DEFAULT_PAGE_TTL,
        }
    }
}

/// Escape `\` and `_` in an id so the `_` separators of a scope stay
/// unambiguous. Ids without either character are used as-is.
fn scope_part(id: &str) -> Cow<'_, str> {
    if id.contains(['\\', '_']) {
        Cow::Owned(id.replace('\\', "\\\\").replace('_', "\\_"))
    } else {
        Cow::Borrowed(id)
    }
}

fn session_scope(session_id: &SessionId, user_id: &UserId) -> String {
    format!(
        "messages_{}_{}",
        scope_part(session_id.as_str()),
        scope_part(user_id.as_str())
    )
}

fn page_scope(session_id: &SessionId, user_id: &UserId, limit: u32, offset: u32) -> String {
    format!("{}_{limit}_{offset}", session_scope(session_id, user_id))
}

fn validate_limit(limit: u32) -> Result<(), RepositoryError> {
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(RepositoryError::invalid_input(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}, got {limit}"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct MessageRepository {
    remote: Arc<dyn RemoteStore>,
    keys: Arc<KeyManager>,
    cache: CacheStore<Vec<Message>>,
    ttls: CacheTtls,
}

impl MessageRepository {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        keys: Arc<KeyManager>,
        cache: CacheStore<Vec<Message>>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            remote,
            keys,
            cache,
            ttls,
        }
    }

    /// Every message of a session, oldest first.
    pub async fn find_by_session(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let scope = session_scope(session_id, user_id);
        if let Some(cached) = self.cache.get(&scope).await {
            tracing::debug!(session_id = %session_id, "session cache hit");
            return Ok(cached);
        }

        let rows = self
            .remote
            .select(&MessageQuery::session(session_id, user_id))
            .await?;
        let messages = self.decrypt_rows(rows, user_id).await?;
        self.cache.set(&scope, &messages, self.ttls.session).await;
        Ok(messages)
    }

    /// One page of a session, oldest first. `limit` must be within
    /// `1..=MAX_PAGE_SIZE`.
    pub async fn find_by_session_paginated(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        validate_limit(limit)?;

        let scope = page_scope(session_id, user_id, limit, offset);
        if let Some(cached) = self.cache.get(&scope).await {
            tracing::debug!(session_id = %session_id, limit, offset, "page cache hit");
            return Ok(cached);
        }

        let query = MessageQuery::session(session_id, user_id).with_range(offset, limit);
        let rows = self.remote.select(&query).await?;
        let messages = self.decrypt_rows(rows, user_id).await?;
        self.cache.set(&scope, &messages, self.ttls.page).await;
        Ok(messages)
    }

    /// The user's latest `limit` messages across all sessions, oldest first.
    ///
    /// Non-critical: any failure is logged and yields an empty list.
    pub async fn find_recent_by_user(&self, user_id: &UserId, limit: u32) -> Vec<Message> {
        let limit = limit.min(MAX_PAGE_SIZE);
        if limit == 0 {
            return Vec::new();
        }

        match self.load_recent(user_id, limit).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "failed to load recent messages");
                Vec::new()
            }
        }
    }

    /// [`find_recent_by_user`](Self::find_recent_by_user) with the default
    /// limit.
    pub async fn find_recent(&self, user_id: &UserId) -> Vec<Message> {
        self.find_recent_by_user(user_id, DEFAULT_RECENT_LIMIT).await
    }

    /// Encrypt and persist `messages` in one batch, then invalidate the
    /// session's cached reads.
    pub async fn save(
        &self,
        messages: &[Message],
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError> {
        if messages.is_empty() {
            return Ok(());
        }

        let key = self.load_key(user_id).await?;
        let rows = messages
            .iter()
            .map(|message| -> Result<MessageRow, CryptoError> {
                Ok(MessageRow {
                    id: message.id,
                    session_id: session_id.clone(),
                    user_id: user_id.clone(),
                    role: message.role,
                    content: cipher::encrypt(&message.content, &key)?,
                    timestamp: message.timestamp,
                })
            })
            .collect::<Result<Vec<_>, CryptoError>>()?;

        self.remote.insert(&rows).await?;
        self.invalidate_session(session_id, user_id).await;
        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            count = rows.len(),
            "saved messages"
        );
        Ok(())
    }

    /// Delete every message of a session, then invalidate its cached reads.
    pub async fn delete_by_session(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError> {
        self.remote.delete(session_id, user_id).await?;
        self.invalidate_session(session_id, user_id).await;
        tracing::info!(session_id = %session_id, user_id = %user_id, "deleted session messages");
        Ok(())
    }

    /// Drop every cached read for every user.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn load_recent(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut rows = self
            .remote
            .select(&MessageQuery::recent(user_id, limit))
            .await?;
        rows.reverse();
        self.decrypt_rows(rows, user_id).await
    }

    async fn invalidate_session(&self, session_id: &SessionId, user_id: &UserId) {
        let scope = session_scope(session_id, user_id);
        self.cache.delete(&scope).await;
        self.cache.delete_prefix(&format!("{scope}_")).await;
    }

    async fn load_key(&self, user_id: &UserId) -> Result<MessageKey, RepositoryError> {
        let keys = self.keys.clone();
        let user_id = user_id.clone();
        let key = tokio::task::spawn_blocking(move || keys.get_or_create_key(&user_id)).await??;
        Ok(key)
    }

    /// Decrypt rows in order. The key is loaded on the first envelope, so a
    /// purely legacy session never touches the key store. A row that fails to
    /// decrypt is replaced by the placeholder.
    async fn decrypt_rows(
        &self,
        rows: Vec<MessageRow>,
        user_id: &UserId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut key: Option<MessageKey> = None;
        let mut messages = Vec::with_capacity(rows.len());

        for row in rows {
            if key.is_none() && cipher::is_encrypted(&row.content) {
                key = Some(self.load_key(user_id).await?);
            }
            let content = match key.as_ref() {
                Some(key) => match cipher::decrypt_content(&row.content, key) {
                    Ok(plaintext) => plaintext,
                    Err(e) => {
                        tracing::warn!(message_id = %row.id, error = %e, "failed to decrypt message");
                        DECRYPTION_FAILED_PLACEHOLDER.to_string()
                    }
                },
                // No envelope seen yet, so this row is legacy plaintext.
                None => row.content,
            };

            messages.push(Message {
                id: row.id,
                content,
                role: row.role,
                timestamp: row.timestamp,
                user_id: row.user_id,
            });
        }
        Ok(messages)
    }
}
