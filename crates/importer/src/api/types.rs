//! Bluesky record and response types, shaped after the lexicons.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Reference to a created record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

/// Reference to an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    #[serde(rename = "$type", default = "blob_type")]
    pub kind: String,
    #[serde(rename = "ref")]
    pub link: CidLink,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub size: u64,
}

impl BlobRef {
    /// Build a blob reference from its CID.
    #[must_use]
    pub fn new(cid: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            kind: blob_type(),
            link: CidLink { link: cid.into() },
            mime_type: mime_type.into(),
            size,
        }
    }

    /// CID of the blob.
    #[must_use]
    pub fn cid(&self) -> &str {
        &self.link.link
    }
}

fn blob_type() -> String {
    "blob".to_string()
}

/// `{"$link": "<cid>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidLink {
    #[serde(rename = "$link")]
    pub link: String,
}

/// `app.bsky.feed.post` record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub kind: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(serialize_with = "serialize_datetime")]
    pub created_at: DateTime<Utc>,
}

impl PostRecord {
    /// Lexicon ID of a post record.
    pub const NSID: &'static str = "app.bsky.feed.post";

    #[must_use]
    pub fn new(text: String, created_at: DateTime<Utc>) -> Self {
        Self {
            kind: Self::NSID,
            text,
            facets: Vec::new(),
            embed: None,
            reply: None,
            created_at,
        }
    }
}

fn serialize_datetime<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Thread position of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

/// Post embed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "$type")]
pub enum Embed {
    #[serde(rename = "app.bsky.embed.images")]
    Images { images: Vec<ImageEmbed> },

    #[serde(rename = "app.bsky.embed.video")]
    Video { video: BlobRef },

    #[serde(rename = "app.bsky.embed.external")]
    External { external: ExternalCard },

    #[serde(rename = "app.bsky.embed.record")]
    Record { record: StrongRef },

    #[serde(rename = "app.bsky.embed.recordWithMedia")]
    RecordWithMedia {
        record: RecordEmbed,
        media: Box<Embed>,
    },
}

impl Embed {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Images { .. } => "images",
            Self::Video { .. } => "video",
            Self::External { .. } => "external",
            Self::Record { .. } => "record",
            Self::RecordWithMedia { .. } => "record_with_media",
        }
    }
}

/// Record half of a record-with-media embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordEmbed {
    pub record: StrongRef,
}

/// One image in an images embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEmbed {
    pub alt: String,
    pub image: BlobRef,
}

/// Link preview card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalCard {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<BlobRef>,
}

/// Rich-text annotation over a byte range of the post text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

/// UTF-8 byte range, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },

    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
}

/// `app.bsky.video.defs#jobStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub state: String,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub blob: Option<BlobRef>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl JobStatus {
    pub const COMPLETED: &'static str = "JOB_STATE_COMPLETED";
    pub const FAILED: &'static str = "JOB_STATE_FAILED";

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == Self::COMPLETED
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == Self::FAILED
    }
}

/// One page of the account's posts.
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    pub posts: Vec<StrongRef>,
    pub cursor: Option<String>,
}
