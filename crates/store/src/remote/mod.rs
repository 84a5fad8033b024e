//! The hosted backend's row store, seen only through filtered
//! insert/select/delete.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use companion_shared::api::message::MessageRow;
use companion_shared::ids::{SessionId, UserId};

pub use memory::MemoryRemoteStore;
pub use rest::RestRemoteStore;

/// Failures talking to the remote store.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The request never produced an HTTP response.
    #[error("network error: {message}")]
    Network { message: String, timeout: bool },

    /// The store answered with a non-success status.
    #[error("remote store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("failed to decode remote response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::Http {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            RemoteError::Network {
                message: err.to_string(),
                timeout: err.is_timeout(),
            }
        }
    }
}

/// Timestamp ordering of a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Row filter for [`RemoteStore::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub user_id: UserId,
    /// `None` selects across every session of the user.
    pub session_id: Option<SessionId>,
    pub order: SortOrder,
    /// `(offset, limit)` window applied after ordering.
    pub range: Option<(u32, u32)>,
}

impl MessageQuery {
    /// All rows of one session, oldest first.
    pub fn session(session_id: &SessionId, user_id: &UserId) -> Self {
        Self {
            user_id: user_id.clone(),
            session_id: Some(session_id.clone()),
            order: SortOrder::Ascending,
            range: None,
        }
    }

    /// The newest `limit` rows of a user across sessions, newest first.
    pub fn recent(user_id: &UserId, limit: u32) -> Self {
        Self {
            user_id: user_id.clone(),
            session_id: None,
            order: SortOrder::Descending,
            range: Some((0, limit)),
        }
    }

    pub fn with_range(mut self, offset: u32, limit: u32) -> Self {
        self.range = Some((offset, limit));
        self
    }
}

/// Row-oriented message persistence reachable over the network.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert all rows in one batch.
    async fn insert(&self, rows: &[MessageRow]) -> Result<(), RemoteError>;

    async fn select(&self, query: &MessageQuery) -> Result<Vec<MessageRow>, RemoteError>;

    /// Delete every row of the session belonging to the user.
    async fn delete(&self, session_id: &SessionId, user_id: &UserId) -> Result<(), RemoteError>;
}
