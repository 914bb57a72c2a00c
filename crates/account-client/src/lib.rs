//! Player account client
//!
//! HTTP client for the account service that remembers one flat key/value
//! list per player. It implements [`RemoteSession`] so it can back a
//! [`RemoteBackend`](savestore::RemoteBackend).
//!
//! Protocol:
//!
//! - `GET {base}/player/data` returns `{"data": [[key, value], ...]}`; a
//!   missing or `null` `data` field means the player has no saves yet
//! - `PUT {base}/player/data` replaces the whole list with the same body shape
//!
//! Requests carry the session token as a bearer token.

#![warn(missing_docs)]
#![warn(clippy::all)]

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Response as ReqwestResponse};
use savestore::backend::{self, BackendError, RemoteSession};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Path of the player data endpoint
pub const PLAYER_DATA_PATH: &str = "/player/data";

/// Account client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No session token is set
    #[error("No active account session")]
    NoSession,

    /// Service answered with a non-success status
    #[error("Account service error ({status}): {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },
}

/// Result type for account client operations
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<ClientError> for BackendError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NoSession => BackendError::SessionUnavailable,
            ClientError::Json(e) => BackendError::Serialization(e),
            other => BackendError::Remote(other.to_string()),
        }
    }
}

/// Account client configuration
#[derive(Debug, Clone)]
pub struct AccountClientConfig {
    /// Base service URL
    pub base_url: String,
    /// Session token, if the player is signed in
    pub token: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for AccountClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("gamesave-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl AccountClientConfig {
    /// Create a config for a service URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Default::default() }
    }

    /// Set the session token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    #[serde(default)]
    data: Option<Vec<(String, Value)>>,
}

#[derive(Debug, Serialize)]
struct DataPayload<'a> {
    data: &'a [(String, String)],
}

/// Remote values are usually strings; anything else is kept as JSON text
fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// HTTP client for the player account service
#[derive(Debug, Clone)]
pub struct AccountClient {
    client: ReqwestClient,
    config: AccountClientConfig,
}

impl AccountClient {
    /// Create a new client
    pub fn new(config: AccountClientConfig) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client, config })
    }

    /// Client configuration
    pub fn config(&self) -> &AccountClientConfig {
        &self.config
    }

    /// Whether a session token is set
    pub fn has_session(&self) -> bool {
        self.config.token.is_some()
    }

    fn url(&self) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), PLAYER_DATA_PATH)
    }

    fn token(&self) -> Result<&str> {
        self.config.token.as_deref().ok_or(ClientError::NoSession)
    }

    async fn check(response: ReqwestResponse) -> Result<ReqwestResponse> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status: status.as_u16(), message })
    }

    /// Fetch the player's remembered list
    ///
    /// Returns `None` when the player has no saved data.
    pub async fn fetch_data(&self) -> Result<Option<Vec<(String, String)>>> {
        let token = self.token()?;

        let response = self.client.get(self.url()).bearer_auth(token).send().await?;
        let body = Self::check(response).await?.text().await?;
        let envelope: DataEnvelope = serde_json::from_str(&body)?;

        let data = envelope.data.map(|entries| {
            entries.into_iter().map(|(key, value)| (key, value_to_text(value))).collect::<Vec<_>>()
        });

        tracing::debug!(entries = data.as_ref().map_or(0, Vec::len), "fetched player data");
        Ok(data)
    }

    /// Replace the player's remembered list
    pub async fn store_data(&self, data: &[(String, String)]) -> Result<()> {
        let token = self.token()?;

        let response = self
            .client
            .put(self.url())
            .bearer_auth(token)
            .json(&DataPayload { data })
            .send()
            .await?;
        Self::check(response).await?;

        tracing::debug!(entries = data.len(), "stored player data");
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for AccountClient {
    async fn get_data(&self) -> backend::Result<Option<Vec<(String, String)>>> {
        Ok(self.fetch_data().await?)
    }

    async fn set_data(&self, data: Vec<(String, String)>) -> backend::Result<()> {
        Ok(self.store_data(&data).await?)
    }
}
