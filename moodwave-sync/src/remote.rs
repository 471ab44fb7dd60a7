//! Remote sync endpoint contract and its HTTP implementation.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::queue::SyncQueueItem;
use async_trait::async_trait;
use moodwave_model::{SyncAction, SyncPayload};
use moodwave_types::SyncItemId;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Why a remote call did not apply the mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The bearer token was rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// Server error, timeout, connection failure or unreadable response.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The remote refused the request for a reason other than auth.
    #[error("remote rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Applies queued mutations to the remote service.
#[async_trait]
pub trait RemoteSyncEndpoint: Send + Sync {
    /// Sends one mutation using `token` as the bearer credential.
    async fn apply(&self, item: &SyncQueueItem, token: &str) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Post,
    Put,
    Delete,
}

/// Verb and path for one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub path: &'static str,
}

impl Route {
    const fn new(method: Method, path: &'static str) -> Self {
        Self { method, path }
    }
}

/// Maps a mutation to its remote verb and path.
///
/// Singletons (daily window, preferences) are upserted with `PUT` for both
/// create and update.
#[must_use]
pub fn route(payload: &SyncPayload, action: SyncAction) -> Route {
    use Method::{Delete, Post, Put};

    match (payload, action) {
        (SyncPayload::MoodEntry(_), SyncAction::Create) => Route::new(Post, "/mood-entries"),
        (SyncPayload::MoodEntry(_), SyncAction::Update) => Route::new(Put, "/mood-entries"),
        (SyncPayload::MoodEntry(_), SyncAction::Delete) => Route::new(Delete, "/mood-entries"),
        (SyncPayload::DailyWindow(_), SyncAction::Create | SyncAction::Update) => {
            Route::new(Put, "/daily-windows")
        }
        (SyncPayload::DailyWindow(_), SyncAction::Delete) => Route::new(Delete, "/daily-windows"),
        (SyncPayload::GeneratedMusic(_), SyncAction::Create) => {
            Route::new(Post, "/generated-music")
        }
        (SyncPayload::GeneratedMusic(_), SyncAction::Update) => {
            Route::new(Put, "/generated-music")
        }
        (SyncPayload::GeneratedMusic(_), SyncAction::Delete) => {
            Route::new(Delete, "/generated-music")
        }
        (SyncPayload::UserPreferences(_), SyncAction::Create | SyncAction::Update) => {
            Route::new(Put, "/user-preferences")
        }
        (SyncPayload::UserPreferences(_), SyncAction::Delete) => {
            Route::new(Delete, "/user-preferences")
        }
    }
}

/// JSON body sent for create and update calls.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody<'a> {
    pub id: &'a SyncItemId,
    #[serde(flatten)]
    pub payload: &'a SyncPayload,
    pub action: SyncAction,
    pub enqueued_at: u64,
}

impl<'a> From<&'a SyncQueueItem> for RequestBody<'a> {
    fn from(item: &'a SyncQueueItem) -> Self {
        Self {
            id: &item.id,
            payload: &item.payload,
            action: item.action,
            enqueued_at: item.enqueued_at,
        }
    }
}

/// [`RemoteSyncEndpoint`] over HTTP.
pub struct HttpSyncEndpoint {
    base_url: String,
    client: Client,
}

impl HttpSyncEndpoint {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RemoteSyncEndpoint for HttpSyncEndpoint {
    async fn apply(&self, item: &SyncQueueItem, token: &str) -> Result<(), RemoteError> {
        let route = route(&item.payload, item.action);
        let url = format!("{}{}", self.base_url, route.path);

        let request = match route.method {
            Method::Post => self.client.post(&url).json(&RequestBody::from(item)),
            Method::Put => self.client.put(&url).json(&RequestBody::from(item)),
            Method::Delete => self
                .client
                .delete(&url)
                .query(&[("id", item.payload.entity_ref())]),
        };

        debug!(item_id = %item.id, ?route, "sending sync item");

        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| RemoteError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(RemoteError::Unauthorized);
        }

        let message = response.text().await.unwrap_or_default();
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            Err(RemoteError::Transient(format!("status {status}: {message}")))
        } else {
            Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}
