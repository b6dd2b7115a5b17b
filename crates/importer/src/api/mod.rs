//! Destination API (Bluesky / AT Protocol).
//!
//! - [`PostingApi`] is the capability the pipeline calls.
//! - [`XrpcClient`] implements it over HTTP against a PDS.
//! - [`ResilientApi`] wraps any implementation with retry and rate-limit handling.

pub mod facets;
mod resilient;
mod types;
mod xrpc;

pub use resilient::{ResilientApi, RetryPolicy};
pub use types::{
    BlobRef, ByteSlice, CidLink, Embed, ExternalCard, Facet, FacetFeature, ImageEmbed, JobStatus,
    PostPage, PostRecord, RecordEmbed, ReplyRef, StrongRef,
};
pub use xrpc::{XrpcClient, XrpcConfig, DEFAULT_SERVICE, DEFAULT_VIDEO_SERVICE};

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::error::ApiError;

/// Lexicon method a video upload token is scoped to.
pub const UPLOAD_BLOB_METHOD: &str = "com.atproto.repo.uploadBlob";

/// Operations the importer performs against the destination account.
#[async_trait]
pub trait PostingApi: Send + Sync {
    /// Upload binary content and return its blob reference.
    async fn upload_blob(&self, data: &[u8], mime_type: &str) -> Result<BlobRef, ApiError>;

    /// Create a post record.
    async fn create_post(&self, post: &PostRecord) -> Result<StrongRef, ApiError>;

    /// Detect link and mention facets in post text.
    async fn detect_facets(&self, text: &str) -> Result<Vec<Facet>, ApiError>;

    /// Whether the account's email address is confirmed (required for video).
    async fn is_email_confirmed(&self) -> Result<bool, ApiError>;

    /// Issue a short-lived token scoped to one lexicon method.
    async fn service_auth(&self, method: &str, expires_in: Duration) -> Result<String, ApiError>;

    /// Stream a video file to the video service and return the processing job.
    async fn upload_video(&self, token: &str, path: &Path, size: u64)
        -> Result<JobStatus, ApiError>;

    /// Current state of a video processing job.
    async fn video_job_status(&self, job_id: &str) -> Result<JobStatus, ApiError>;

    /// One page of the account's own posts.
    async fn list_posts(&self, cursor: Option<&str>, limit: u32) -> Result<PostPage, ApiError>;

    /// Delete one of the account's posts by AT URI.
    async fn delete_post(&self, uri: &str) -> Result<(), ApiError>;
}

/// A [`PostingApi`] with no connection. Every call fails with
/// [`ApiError::Auth`]; used for simulated runs, which never call the API.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineApi;

impl OfflineApi {
    fn refuse<T>() -> Result<T, ApiError> {
        Err(ApiError::Auth("not connected".to_string()))
    }
}

#[async_trait]
impl PostingApi for OfflineApi {
    async fn upload_blob(&self, _data: &[u8], _mime_type: &str) -> Result<BlobRef, ApiError> {
        Self::refuse()
    }

    async fn create_post(&self, _post: &PostRecord) -> Result<StrongRef, ApiError> {
        Self::refuse()
    }

    async fn detect_facets(&self, _text: &str) -> Result<Vec<Facet>, ApiError> {
        Self::refuse()
    }

    async fn is_email_confirmed(&self) -> Result<bool, ApiError> {
        Self::refuse()
    }

    async fn service_auth(&self, _method: &str, _expires_in: Duration) -> Result<String, ApiError> {
        Self::refuse()
    }

    async fn upload_video(&self, _token: &str, _path: &Path, _size: u64) -> Result<JobStatus, ApiError> {
        Self::refuse()
    }

    async fn video_job_status(&self, _job_id: &str) -> Result<JobStatus, ApiError> {
        Self::refuse()
    }

    async fn list_posts(&self, _cursor: Option<&str>, _limit: u32) -> Result<PostPage, ApiError> {
        Self::refuse()
    }

    async fn delete_post(&self, _uri: &str) -> Result<(), ApiError> {
        Self::refuse()
    }
}
