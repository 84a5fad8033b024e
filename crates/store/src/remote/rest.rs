//! PostgREST-style HTTP client for the `messages` table.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use companion_shared::api::message::MessageRow;
use companion_shared::ids::{SessionId, UserId};
use reqwest::{Client, RequestBuilder, Response};

use super::{MessageQuery, RemoteError, RemoteStore, SortOrder};

const MESSAGES_PATH: &str = "/rest/v1/messages";

/// Read a non-success response into [`RemoteError::Http`], keeping the body
/// for diagnostics.
async fn error_from_response(resp: Response) -> RemoteError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    RemoteError::Http { status, body }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

pub struct RestRemoteStore {
    http_client: Client,
    base_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

impl RestRemoteStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| RemoteError::Network {
                message: format!("failed to create HTTP client: {e}"),
                timeout: false,
            })?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: RwLock::new(None),
        })
    }

    /// Set the signed-in user's bearer token. `None` falls back to the API key.
    pub fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.access_token.write() {
            *slot = token;
        }
    }

    fn url(&self) -> String {
        format!("{}{MESSAGES_PATH}", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self
            .access_token
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| self.api_key.clone());
        builder.header("apikey", &self.api_key).bearer_auth(token)
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn insert(&self, rows: &[MessageRow]) -> Result<(), RemoteError> {
        let resp = self
            .authorized(self.http_client.post(self.url()))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        tracing::debug!(count = rows.len(), "inserted message rows");
        Ok(())
    }

    async fn select(&self, query: &MessageQuery) -> Result<Vec<MessageRow>, RemoteError> {
        let order = match query.order {
            SortOrder::Ascending => "timestamp.asc",
            SortOrder::Descending => "timestamp.desc",
        };
        let mut params: Vec<(&str, String)> = vec![
            ("select", "*".to_string()),
            ("user_id", eq(query.user_id.as_str())),
        ];
        if let Some(session_id) = &query.session_id {
            params.push(("session_id", eq(session_id.as_str())));
        }
        params.push(("order", order.to_string()));
        if let Some((offset, limit)) = query.range {
            params.push(("offset", offset.to_string()));
            params.push(("limit", limit.to_string()));
        }

        let resp = self
            .authorized(self.http_client.get(self.url()))
            .query(&params)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let rows: Vec<MessageRow> = resp.json().await?;
        Ok(rows)
    }

    async fn delete(&self, session_id: &SessionId, user_id: &UserId) -> Result<(), RemoteError> {
        let resp = self
            .authorized(self.http_client.delete(self.url()))
            .query(&[
                ("session_id", eq(session_id.as_str())),
                ("user_id", eq(user_id.as_str())),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(())
    }
}
