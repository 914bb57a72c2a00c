//! Remote account backend
//!
//! The account service stores one flat key/value list per player. The backend
//! keeps an in-process mirror of that list: it is filled by one bulk read at
//! startup, answers single-key reads, and is sent back in full on every bulk
//! write. The mirror only changes after the service has accepted a write, so a
//! failed write never leaves it ahead of the remote copy.

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

use super::{Backend, BackendError, BackendKind, Result};

/// Live account session able to read and replace the player's data list
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Fetch the full remembered list
    ///
    /// `None` means the account has no saved data yet.
    async fn get_data(&self) -> Result<Option<Vec<(String, String)>>>;

    /// Replace the full remembered list in one call
    async fn set_data(&self, data: Vec<(String, String)>) -> Result<()>;
}

/// Fixed-backoff retry policy for remote reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts
    pub max_attempts: usize,
    /// Delay between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_secs(2) }
    }
}

impl RetryPolicy {
    /// Create a policy with the default backoff
    pub fn new(max_attempts: usize) -> Self {
        Self { max_attempts: max_attempts.max(1), ..Default::default() }
    }

    /// Set the delay between attempts
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Run an async operation until it succeeds or the policy is exhausted
///
/// Returns the last error when every attempt fails.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                let remaining = policy.max_attempts.saturating_sub(attempt);
                tracing::warn!(attempt, remaining, error = %err, "remote operation failed");

                if remaining == 0 {
                    return Err(err);
                }

                sleep(policy.backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Backend storing saves in the player's remote account
pub struct RemoteBackend {
    session: Arc<dyn RemoteSession>,
    retry: RetryPolicy,
    mirror: Mutex<Vec<(String, String)>>,
}

impl RemoteBackend {
    /// Create a backend over a live session
    pub fn new(session: Arc<dyn RemoteSession>) -> Self {
        Self { session, retry: RetryPolicy::default(), mirror: Mutex::new(Vec::new()) }
    }

    /// Override the load retry policy
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// The full remembered list as last loaded or accepted by the service
    pub async fn remembered(&self) -> Vec<(String, String)> {
        self.mirror.lock().await.clone()
    }
}

fn upsert(list: &mut Vec<(String, String)>, key: &str, value: &str) {
    match list.iter_mut().find(|(k, _)| k == key) {
        Some(slot) => slot.1 = value.to_string(),
        None => list.push((key.to_string(), value.to_string())),
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn can_defer(&self) -> bool {
        true
    }

    async fn load_all(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let data = retry(&self.retry, || self.session.get_data()).await.map_err(|e| {
            tracing::error!(error = %e, "could not load player data, check the connection");
            BackendError::LoadFailed { attempts: self.retry.max_attempts }
        })?;

        let list = data.unwrap_or_else(|| {
            tracing::warn!("player has no remote data yet");
            Vec::new()
        });

        let matching = list.iter().filter(|(k, _)| k.starts_with(prefix)).cloned().collect();
        *self.mirror.lock().await = list;
        Ok(matching)
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        let mirror = self.mirror.lock().await;
        Ok(mirror.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()))
    }

    async fn write_bulk(&self, entries: &[(String, String)]) -> Result<()> {
        let mut mirror = self.mirror.lock().await;

        let mut candidate = mirror.clone();
        for (key, value) in entries {
            upsert(&mut candidate, key, value);
        }

        self.session.set_data(candidate.clone()).await?;
        tracing::info!(entries = candidate.len(), "saved player data to remote account");

        *mirror = candidate;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.mirror.lock().await.retain(|(k, _)| k != key);
        Ok(())
    }
}
