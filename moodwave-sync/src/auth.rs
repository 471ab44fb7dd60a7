//! Bearer token supply for the sync engine.

use crate::config::{AuthConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Supplies and renews the bearer token used for remote calls.
#[async_trait]
pub trait AuthTokenProvider: Send + Sync {
    /// The current access token, or `None` if signed out.
    async fn get_token(&self) -> Option<String>;

    /// Obtains a new access token. On success, [`get_token`](Self::get_token)
    /// returns the new token.
    async fn refresh_token(&self) -> SyncResult<()>;
}

#[derive(Clone)]
struct Tokens {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// Token provider holding tokens in memory and refreshing them over HTTP.
///
/// `refresh_token()` posts `{"refreshToken": ...}` to the configured
/// refresh URL and adopts the returned `accessToken` (and `refreshToken`,
/// if rotated).
pub struct HttpTokenProvider {
    refresh_url: String,
    client: Client,
    tokens: RwLock<Option<Tokens>>,
}

impl HttpTokenProvider {
    pub fn new(auth: &AuthConfig, sync: &SyncConfig) -> SyncResult<Self> {
        let client = Client::builder().timeout(sync.request_timeout).build()?;
        let tokens = auth.access_token.clone().map(|access_token| Tokens {
            access_token,
            refresh_token: auth.refresh_token.clone(),
        });

        Ok(Self {
            refresh_url: auth.refresh_url.clone(),
            client,
            tokens: RwLock::new(tokens),
        })
    }

    /// Replaces the held tokens, e.g. after sign-in.
    pub async fn set_tokens(&self, access_token: String, refresh_token: Option<String>) {
        *self.tokens.write().await = Some(Tokens {
            access_token,
            refresh_token,
        });
    }

    /// Forgets all tokens (sign-out).
    pub async fn clear(&self) {
        *self.tokens.write().await = None;
    }

    /// Current refresh token, for persisting across restarts.
    pub async fn current_refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
    }
}

#[async_trait]
impl AuthTokenProvider for HttpTokenProvider {
    async fn get_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    async fn refresh_token(&self) -> SyncResult<()> {
        if self.refresh_url.is_empty() {
            return Err(SyncError::Auth("no refresh URL configured".to_string()));
        }

        let refresh_token = self
            .current_refresh_token()
            .await
            .ok_or_else(|| SyncError::Auth("no refresh token available".to_string()))?;

        debug!("refreshing access token");

        let response = self
            .client
            .post(&self.refresh_url)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::Auth(format!(
                "token refresh rejected with status {}",
                response.status()
            )));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("malformed refresh response: {e}")))?;

        let mut tokens = self.tokens.write().await;
        let rotated = body.refresh_token.or(Some(refresh_token));
        *tokens = Some(Tokens {
            access_token: body.access_token,
            refresh_token: rotated,
        });
        info!("access token refreshed");
        Ok(())
    }
}
