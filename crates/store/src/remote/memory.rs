use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use companion_shared::api::message::MessageRow;
use companion_shared::ids::{SessionId, UserId};

use super::{MessageQuery, RemoteError, RemoteStore, SortOrder};

#[derive(Debug, Clone)]
enum InjectedFailure {
    Status(u16),
    Network { timeout: bool },
}

impl InjectedFailure {
    fn into_error(self) -> RemoteError {
        match self {
            InjectedFailure::Status(status) => RemoteError::Http {
                status,
                body: "injected failure".into(),
            },
            InjectedFailure::Network { timeout } => RemoteError::Network {
                message: "injected network failure".into(),
                timeout,
            },
        }
    }
}

/// In-process remote store with failure injection and call counting.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    rows: Mutex<Vec<MessageRow>>,
    next_failure: Mutex<Option<InjectedFailure>>,
    selects: AtomicUsize,
    inserts: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw row, bypassing encryption.
    pub fn push_row(&self, row: MessageRow) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push(row);
        }
    }

    /// Snapshot of every stored row.
    pub fn rows(&self) -> Vec<MessageRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    /// Make the next call fail with the given HTTP status.
    pub fn fail_next_with_status(&self, status: u16) {
        self.set_failure(InjectedFailure::Status(status));
    }

    /// Make the next call fail before reaching the store.
    pub fn fail_next_with_network_error(&self, timeout: bool) {
        self.set_failure(InjectedFailure::Network { timeout });
    }

    /// Number of `select` calls that reached the store.
    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    /// Number of `insert` calls that reached the store.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    fn set_failure(&self, failure: InjectedFailure) {
        if let Ok(mut next) = self.next_failure.lock() {
            *next = Some(failure);
        }
    }

    fn take_failure(&self) -> Result<(), RemoteError> {
        let failure = self
            .next_failure
            .lock()
            .map_err(|e| RemoteError::Network {
                message: e.to_string(),
                timeout: false,
            })?
            .take();
        match failure {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }

    fn lock_rows(&self) -> Result<std::sync::MutexGuard<'_, Vec<MessageRow>>, RemoteError> {
        self.rows.lock().map_err(|e| RemoteError::Network {
            message: format!("row lock poisoned: {e}"),
            timeout: false,
        })
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn insert(&self, rows: &[MessageRow]) -> Result<(), RemoteError> {
        self.take_failure()?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.lock_rows()?.extend_from_slice(rows);
        Ok(())
    }

    async fn select(&self, query: &MessageQuery) -> Result<Vec<MessageRow>, RemoteError> {
        self.take_failure()?;
        self.selects.fetch_add(1, Ordering::SeqCst);

        let mut matched: Vec<MessageRow> = self
            .lock_rows()?
            .iter()
            .filter(|row| row.user_id == query.user_id)
            .filter(|row| {
                query
                    .session_id
                    .as_ref()
                    .map_or(true, |session| &row.session_id == session)
            })
            .cloned()
            .collect();

        matched.sort_by_key(|row| row.timestamp);
        if query.order == SortOrder::Descending {
            matched.reverse();
        }

        if let Some((offset, limit)) = query.range {
            matched = matched
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
        }
        Ok(matched)
    }

    async fn delete(&self, session_id: &SessionId, user_id: &UserId) -> Result<(), RemoteError> {
        self.take_failure()?;
        self.lock_rows()?
            .retain(|row| !(&row.session_id == session_id && &row.user_id == user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_shared::api::message::Role;
    use companion_shared::ids::MessageId;

    fn row(session: &str, user: &str, content: &str, secs: i64) -> MessageRow {
        MessageRow {
            id: MessageId::new(),
            session_id: SessionId::from(session),
            user_id: UserId::from(user),
            role: Role::User,
            content: content.into(),
            timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn select_filters_orders_and_ranges() {
        let store = MemoryRemoteStore::new();
        store.push_row(row("s1", "u1", "third", 3));
        store.push_row(row("s1", "u1", "first", 1));
        store.push_row(row("s1", "u2", "other user", 2));
        store.push_row(row("s2", "u1", "other session", 2));
        store.push_row(row("s1", "u1", "second", 2));

        let all = store
            .select(&MessageQuery::session(&"s1".into(), &"u1".into()))
            .await
            .unwrap();
        let contents: Vec<_> = all.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);

        let page = store
            .select(&MessageQuery::session(&"s1".into(), &"u1".into()).with_range(1, 1))
            .await
            .unwrap();
        assert_eq!(page[0].content, "second");

        let recent = store
            .select(&MessageQuery::recent(&"u1".into(), 2))
            .await
            .unwrap();
        let contents: Vec<_> = recent.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, ["third", "second"]);
    }

    #[tokio::test]
    async fn delete_removes_only_matching_rows() {
        let store = MemoryRemoteStore::new();
        store.push_row(row("s1", "u1", "a", 1));
        store.push_row(row("s1", "u2", "b", 1));
        store.delete(&"s1".into(), &"u1".into()).await.unwrap();
        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id.as_str(), "u2");
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let store = MemoryRemoteStore::new();
        store.fail_next_with_status(503);
        let err = store
            .select(&MessageQuery::recent(&"u1".into(), 5))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Http { status: 503, .. }));
        assert!(store
            .select(&MessageQuery::recent(&"u1".into(), 5))
            .await
            .is_ok());
        assert_eq!(store.select_count(), 1);
    }
}
