//! Importer crate for replaying a Twitter/X archive onto a Bluesky account.
//!
//! This crate provides:
//! - Archive parsing and normalization into typed records
//! - Record selection (date window, quote/retweet/reply filtering, ordering)
//! - Post building with media uploads, link cards, quotes and threads
//! - A retrying, rate-limit aware client for the AT Protocol XRPC API
//! - Bulk deletion of the account's posts

pub mod api;
pub mod arena;
pub mod archive;
pub mod builder;
pub mod config;
pub mod delete;
pub mod error;
pub mod pipeline;
pub mod select;

// Re-export main types
pub use api::{OfflineApi, PostingApi, ResilientApi, RetryPolicy, XrpcClient, XrpcConfig};
pub use arena::{Arena, ImportCandidate};
pub use archive::{ArchiveRecord, Media, MediaKind};
pub use builder::{BuildOptions, PostBuilder, PostOutcome};
pub use config::ImportConfig;
pub use delete::{delete_all_posts, DeleteSummary};
pub use error::{ApiError, BuildError, ImportError, NormalizeError, ParseError, SelectError};
pub use pipeline::{Pipeline, RecordFailure, RunProgress, RunSummary};
pub use select::{DateWindow, Eligibility, Selector};
