//! Retry and rate-limit handling around a [`PostingApi`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};

use super::types::{BlobRef, Facet, JobStatus, PostPage, PostRecord, StrongRef};
use super::PostingApi;
use crate::error::ApiError;

/// Retry settings.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause before retrying a network failure.
    pub network_backoff: Duration,
    /// Pause after a 429 without a usable reset header.
    pub rate_limit_fallback: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            network_backoff: Duration::from_secs(2),
            rate_limit_fallback: Duration::from_secs(5),
        }
    }
}

/// Wraps a [`PostingApi`] so every call retries transient failures and
/// waits out rate limits.
///
/// A 429 on any call closes a gate shared by all calls on this instance
/// until the reset time passes.
pub struct ResilientApi<A> {
    inner: A,
    policy: RetryPolicy,
    /// Calls may not start before this instant.
    blocked_until: Mutex<Option<Instant>>,
}

impl<A: PostingApi> ResilientApi<A> {
    #[must_use]
    pub fn new(inner: A) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    #[must_use]
    pub fn with_policy(inner: A, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            blocked_until: Mutex::new(None),
        }
    }

    /// The wrapped API.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Run `op`, retrying per the policy.
    async fn call<T, F, Fut>(&self, name: &'static str, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ApiError>> + Send,
        T: Send,
    {
        let mut retries = 0;
        loop {
            self.wait_for_gate().await;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let rate_limited = match &err {
                ApiError::RateLimited { reset } => Some(self.rate_limit_wait(*reset)),
                e if e.is_transient() => None,
                _ => return Err(err),
            };

            if retries >= self.policy.max_retries {
                tracing::warn!(call = name, retries, error = %err, "Giving up after retries");
                return Err(err);
            }
            retries += 1;

            if let Some(wait) = rate_limited {
                tracing::warn!(
                    call = name,
                    wait_secs = wait.as_secs(),
                    attempt = retries,
                    "Rate limited, pausing all calls"
                );
                self.close_gate(Instant::now() + wait).await;
            } else {
                tracing::warn!(
                    call = name,
                    attempt = retries,
                    error = %err,
                    "Network error, retrying"
                );
                sleep(self.policy.network_backoff).await;
            }
        }
    }

    async fn wait_for_gate(&self) {
        loop {
            let until = *self.blocked_until.lock().await;
            match until {
                Some(t) if t > Instant::now() => sleep_until(t).await,
                _ => return,
            }
        }
    }

    async fn close_gate(&self, until: Instant) {
        let mut blocked = self.blocked_until.lock().await;
        if blocked.is_none_or(|current| current < until) {
            *blocked = Some(until);
        }
    }

    /// Time until `reset`, rounded up to whole seconds (the header's granularity).
    fn rate_limit_wait(&self, reset: Option<DateTime<Utc>>) -> Duration {
        let Some(reset) = reset else {
            return self.policy.rate_limit_fallback;
        };
        let millis = (reset - Utc::now()).num_milliseconds();
        if millis <= 0 {
            return self.policy.rate_limit_fallback.min(Duration::from_secs(1));
        }
        Duration::from_secs((millis as u64).div_ceil(1000))
    }
}

#[async_trait]
impl<A: PostingApi> PostingApi for ResilientApi<A> {
    async fn upload_blob(&self, data: &[u8], mime_type: &str) -> Result<BlobRef, ApiError> {
        self.call("upload_blob", || self.inner.upload_blob(data, mime_type))
            .await
    }

    async fn create_post(&self, post: &PostRecord) -> Result<StrongRef, ApiError> {
        self.call("create_post", || self.inner.create_post(post)).await
    }

    async fn detect_facets(&self, text: &str) -> Result<Vec<Facet>, ApiError> {
        self.call("detect_facets", || self.inner.detect_facets(text))
            .await
    }

    async fn is_email_confirmed(&self) -> Result<bool, ApiError> {
        self.call("is_email_confirmed", || self.inner.is_email_confirmed())
            .await
    }

    async fn service_auth(&self, method: &str, expires_in: Duration) -> Result<String, ApiError> {
        self.call("service_auth", || self.inner.service_auth(method, expires_in))
            .await
    }

    async fn upload_video(
        &self,
        token: &str,
        path: &Path,
        size: u64,
    ) -> Result<JobStatus, ApiError> {
        self.call("upload_video", || self.inner.upload_video(token, path, size))
            .await
    }

    async fn video_job_status(&self, job_id: &str) -> Result<JobStatus, ApiError> {
        self.call("video_job_status", || self.inner.video_job_status(job_id))
            .await
    }

    async fn list_posts(&self, cursor: Option<&str>, limit: u32) -> Result<PostPage, ApiError> {
        self.call("list_posts", || self.inner.list_posts(cursor, limit))
            .await
    }

    async fn delete_post(&self, uri: &str) -> Result<(), ApiError> {
        self.call("delete_post", || self.inner.delete_post(uri)).await
    }
}
