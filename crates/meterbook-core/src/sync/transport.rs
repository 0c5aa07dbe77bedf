//! Remote snapshot exchange.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use super::codec::{decode_snapshot, encode_snapshot, DecodedSnapshot};
use crate::error::TransportError;
use crate::models::Snapshot;
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Default timeout for a single pull or push request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Moves whole snapshots to and from the shared group store.
pub trait Transport: Send + Sync + 'static {
    /// Fetch the group's snapshot. `None` means the group has none yet.
    ///
    /// Records that could not be decoded are skipped and returned alongside.
    fn pull(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<Option<DecodedSnapshot>, TransportError>> + Send;

    /// Replace the group's snapshot.
    fn push(
        &self,
        group_id: &str,
        snapshot: &Snapshot,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn pull(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<Option<DecodedSnapshot>, TransportError>> + Send {
        (**self).pull(group_id)
    }

    fn push(
        &self,
        group_id: &str,
        snapshot: &Snapshot,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).push(group_id, snapshot)
    }
}

/// JSON-over-HTTP transport: `GET`/`PUT {endpoint}/groups/{group}/snapshot`.
#[derive(Clone)]
pub struct HttpTransport {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        Ok(Self {
            endpoint,
            token: normalize_text_option(token),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn snapshot_url(&self, group_id: &str) -> Result<String, TransportError> {
        let group_id = group_id.trim();
        if group_id.is_empty() {
            return Err(TransportError::InvalidConfiguration(
                "group id must not be empty".to_string(),
            ));
        }
        Ok(format!(
            "{}/groups/{}/snapshot",
            self.endpoint,
            urlencoding::encode(group_id)
        ))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl Transport for HttpTransport {
    async fn pull(&self, group_id: &str) -> Result<Option<DecodedSnapshot>, TransportError> {
        let url = self.snapshot_url(group_id)?;
        let response = self
            .authorize(self.client.get(&url))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!("Group {} has no snapshot yet", group_id);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_api_error(status, &body));
        }

        let body = response.text().await?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(None);
        }
        decode_snapshot(&body).map(Some)
    }

    async fn push(&self, group_id: &str, snapshot: &Snapshot) -> Result<(), TransportError> {
        let url = self.snapshot_url(group_id)?;
        let body = encode_snapshot(snapshot)?;
        let response = self
            .authorize(self.client.put(&url))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_api_error(status, &body));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> TransportError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|payload| payload.message.or(payload.error))
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            let trimmed = compact_text(body);
            if trimmed.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                trimmed
            }
        });

    TransportError::Api {
        status: status.as_u16(),
        message,
    }
}

fn normalize_endpoint(raw: String) -> Result<String, TransportError> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        TransportError::InvalidConfiguration("endpoint must not be empty".to_string())
    })?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(TransportError::InvalidConfiguration(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

/// In-process group store with failure injection.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    groups: Mutex<BTreeMap<String, Snapshot>>,
    latency: Option<Duration>,
    fail_pulls: AtomicBool,
    fail_pushes: AtomicBool,
    pulls: AtomicUsize,
    pushes: AtomicUsize,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every pull and push by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn seed(&self, group_id: &str, snapshot: Snapshot) {
        if let Ok(mut groups) = self.groups.lock() {
            groups.insert(group_id.to_string(), snapshot);
        }
    }

    #[must_use]
    pub fn remote(&self, group_id: &str) -> Option<Snapshot> {
        self.groups
            .lock()
            .ok()
            .and_then(|groups| groups.get(group_id).cloned())
    }

    pub fn fail_pulls(&self, fail: bool) {
        self.fail_pulls.store(fail, Ordering::SeqCst);
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn unavailable<T>(_: T) -> TransportError {
    TransportError::Unavailable("group store lock poisoned".to_string())
}

impl Transport for MemoryTransport {
    async fn pull(&self, group_id: &str) -> Result<Option<DecodedSnapshot>, TransportError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        if self.fail_pulls.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("simulated pull failure".to_string()));
        }
        let snapshot = self.groups.lock().map_err(unavailable)?.get(group_id).cloned();
        Ok(snapshot.map(|snapshot| DecodedSnapshot {
            snapshot,
            anomalies: Vec::new(),
        }))
    }

    async fn push(&self, group_id: &str, snapshot: &Snapshot) -> Result<(), TransportError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("simulated push failure".to_string()));
        }
        self.groups
            .lock()
            .map_err(unavailable)?
            .insert(group_id.to_string(), snapshot.clone());
        Ok(())
    }
}
