//! REST backend
//!
//! Talks to a Supabase-compatible deployment:
//! - GoTrue under `/auth/v1` for accounts and sessions
//! - PostgREST under `/rest/v1` for tables and the `is_admin` RPC
//!
//! The current session is held in memory. Auth events are emitted locally
//! whenever this client signs in, signs out or refreshes, and chat
//! subscriptions poll for new rows.

mod auth;
mod chat;
mod store;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

use super::{BackendError, BackendResult};
use crate::models::{AuthEvent, Session};

/// Capacity of the local auth event channel
const CHANNEL_CAPACITY: usize = 64;

/// HTTP plumbing shared by the backend and its polling tasks
#[derive(Clone)]
pub(crate) struct RestClient {
    base: String,
    anon_key: String,
    http: Client,
    session: Arc<RwLock<Option<Session>>>,
}

/// Supabase-compatible backend over HTTP
pub struct RestBackend {
    client: RestClient,
    auth_events: broadcast::Sender<AuthEvent>,
    poll_interval: Duration,
}

impl RestBackend {
    /// Create a backend for the project at `base_url`
    pub fn new(
        base_url: &str,
        anon_key: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> BackendResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("skintrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let (auth_events, _) = broadcast::channel(CHANNEL_CAPACITY);

        Ok(Self {
            client: RestClient {
                base: base_url.trim_end_matches('/').to_string(),
                anon_key: anon_key.to_string(),
                http,
                session: Arc::new(RwLock::new(None)),
            },
            auth_events,
            // tokio intervals must be non-zero
            poll_interval: poll_interval.max(Duration::from_millis(10)),
        })
    }

    fn emit(&self, event: AuthEvent) {
        tracing::debug!("Auth event: {}", event);
        let _ = self.auth_events.send(event);
    }
}

// ============================================================================
// Query building
// ============================================================================

/// PostgREST query string builder.
///
/// Filter values are percent-encoded; operators follow PostgREST syntax
/// (`col=eq.value`, `col=in.(a,b)`).
#[derive(Debug, Default, Clone)]
pub(crate) struct Query {
    parts: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.parts.push(format!("select={}", urlencoding::encode(columns)));
        self
    }

    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.parts.push(format!(
            "{}=eq.{}",
            column,
            urlencoding::encode(&value.to_string())
        ));
        self
    }

    pub fn gt(mut self, column: &str, value: impl Display) -> Self {
        self.parts.push(format!(
            "{}=gt.{}",
            column,
            urlencoding::encode(&value.to_string())
        ));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Display) -> Self {
        self.parts.push(format!(
            "{}=gte.{}",
            column,
            urlencoding::encode(&value.to_string())
        ));
        self
    }

    pub fn in_list<T: Display>(mut self, column: &str, values: &[T]) -> Self {
        let list = values
            .iter()
            .map(|v| urlencoding::encode(&v.to_string()).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        self.parts.push(format!("{}=in.({})", column, list));
        self
    }

    pub fn order(mut self, ordering: &str) -> Self {
        self.parts.push(format!("order={}", ordering));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.parts.push(format!("limit={}", limit));
        self
    }

    fn to_query_string(&self) -> String {
        self.parts.join("&")
    }
}

// ============================================================================
// Requests
// ============================================================================

impl RestClient {
    fn url(&self, path: &str, query: Option<&Query>) -> String {
        match query {
            Some(q) if !q.parts.is_empty() => {
                format!("{}{}?{}", self.base, path, q.to_query_string())
            }
            _ => format!("{}{}", self.base, path),
        }
    }

    /// Bearer token: the session's access token, or the anon key when signed out
    async fn bearer(&self) -> String {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: String,
        body: Option<&B>,
        bearer: Option<String>,
        representation: bool,
    ) -> BackendResult<Response> {
        let bearer = match bearer {
            Some(token) => token,
            None => self.bearer().await,
        };

        let mut request = self
            .http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer);
        if representation {
            request = request.header("Prefer", "return=representation");
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let res = request.send().await.map_err(map_reqwest_error)?;
        if res.status().is_success() {
            Ok(res)
        } else {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            Err(map_status(status, &body))
        }
    }

    /// `GET /rest/v1/<table>` decoded as rows
    pub async fn select<T: DeserializeOwned>(&self, table: &str, query: Query) -> BackendResult<Vec<T>> {
        let url = self.url(&format!("/rest/v1/{}", table), Some(&query));
        let res = self
            .send::<()>(Method::GET, url, None, None, false)
            .await?;
        decode(res).await
    }

    /// First row of a select, if any
    pub async fn select_one<T: DeserializeOwned>(&self, table: &str, query: Query) -> BackendResult<Option<T>> {
        Ok(self.select(table, query.limit(1)).await?.into_iter().next())
    }

    /// `POST /rest/v1/<table>` returning the inserted row
    pub async fn insert<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
    ) -> BackendResult<T> {
        let url = self.url(&format!("/rest/v1/{}", table), None);
        let res = self.send(Method::POST, url, Some(body), None, true).await?;
        let rows: Vec<T> = decode(res).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode(format!("insert into {} returned no rows", table)))
    }

    /// `PATCH /rest/v1/<table>` returning the first updated row
    pub async fn update<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        filter: Query,
        body: &B,
    ) -> BackendResult<T> {
        let url = self.url(&format!("/rest/v1/{}", table), Some(&filter));
        let res = self.send(Method::PATCH, url, Some(body), None, true).await?;
        let rows: Vec<T> = decode(res).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("{} row", table)))
    }

    /// `DELETE /rest/v1/<table>`; `NotFound` when nothing matched
    pub async fn delete(&self, table: &str, filter: Query) -> BackendResult<()> {
        let url = self.url(&format!("/rest/v1/{}", table), Some(&filter));
        let res = self
            .send::<()>(Method::DELETE, url, None, None, true)
            .await?;
        let rows: Vec<serde_json::Value> = decode(res).await?;
        if rows.is_empty() {
            return Err(BackendError::NotFound(format!("{} row", table)));
        }
        Ok(())
    }

    /// `POST /rest/v1/rpc/<function>`
    pub async fn rpc<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        function: &str,
        args: &B,
    ) -> BackendResult<T> {
        let url = self.url(&format!("/rest/v1/rpc/{}", function), None);
        let res = self.send(Method::POST, url, Some(args), None, false).await?;
        decode(res).await
    }

    /// `POST /auth/v1/<path>` with an explicit bearer
    pub async fn auth_post<B: Serialize + ?Sized>(
        &self,
        path_and_query: &str,
        body: &B,
        bearer: Option<String>,
    ) -> BackendResult<Response> {
        let url = self.url(&format!("/auth/v1/{}", path_and_query), None);
        let bearer = bearer.unwrap_or_else(|| self.anon_key.clone());
        self.send(Method::POST, url, Some(body), Some(bearer), false)
            .await
    }
}

async fn decode<T: DeserializeOwned>(res: Response) -> BackendResult<T> {
    res.json::<T>()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))
}

fn map_reqwest_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Transport("request timed out".to_string())
    } else {
        BackendError::Transport(e.to_string())
    }
}

/// Map a non-success response to a backend error
fn map_status(status: StatusCode, body: &str) -> BackendError {
    let message = error_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized,
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::CONFLICT => BackendError::Conflict(message),
        s => BackendError::Http {
            status: s.as_u16(),
            message,
        },
    }
}

/// Pull a readable message out of a GoTrue or PostgREST error body
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}
