//! Error types for the import pipeline.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// The archive text could not be decoded at all.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Neither the raw text nor the de-prefixed text is valid JSON.
    #[error("archive is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The document decoded, but is not a list of records.
    #[error("archive must be a JSON array, found {0}")]
    NotAnArray(&'static str),
}

/// A decoded entry does not have the shape of an archived tweet.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Entry is not an object.
    #[error("entry {index} is {found}, expected an object")]
    UnexpectedShape { index: usize, found: &'static str },

    /// `created_at` is missing or unparseable.
    #[error("record {id} has an invalid created_at: {value:?}")]
    InvalidTimestamp { id: String, value: String },

    /// The entry has an ID but its fields have the wrong types.
    #[error("record {id} is malformed: {source}")]
    InvalidRecord {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while selecting records.
#[derive(Debug, Error)]
pub enum SelectError {
    /// An ID was looked up that is not in the record set.
    #[error("record {0} is not in the archive")]
    UnknownRecord(String),
}

/// Errors returned by the destination API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 429; `reset` comes from the `ratelimit-reset` header.
    #[error("rate limited (reset at {reset:?})")]
    RateLimited { reset: Option<DateTime<Utc>> },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Status {
        status: u16,
        error: Option<String>,
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// No usable session.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Local I/O while preparing a request body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Whether the failure is worth retrying after a short pause.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            Self::Network(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                error: None,
                message: e.to_string(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// A single record could not be built or posted.
#[derive(Debug, Error)]
pub enum BuildError {
    /// An attached media file is not in the media directory.
    #[error("media file not found: {}", .0.display())]
    MissingMedia(PathBuf),

    /// Reading a media file failed.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The video file exceeds the upload cap.
    #[error("video {} is {size} bytes, over the {limit} byte limit", .path.display())]
    VideoTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// The video has no mp4 rendition.
    #[error("video has no mp4 variant")]
    NoVideoVariant,

    /// The video service reported a failed job.
    #[error("video processing failed: {0}")]
    VideoJobFailed(String),

    /// The video job did not finish within the polling cap.
    #[error("video job {job_id} still processing after {attempts} polls")]
    VideoJobTimedOut { job_id: String, attempts: u32 },

    /// Destination API call failed after retries.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Select(#[from] SelectError),
}
