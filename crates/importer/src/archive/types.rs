//! Archive record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One exported tweet, projected onto the fields the importer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// Tweet ID (stable and unique within the archive).
    pub id: String,
    /// When the tweet was posted.
    pub created_at: DateTime<Utc>,
    /// Tweet text as exported (HTML-escaped, with t.co links).
    pub full_text: String,
    /// Screen name of the account this tweet replies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_handle: Option<String>,
    /// ID of the tweet this one replies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_status_id: Option<String>,
    /// URL entities found in the text.
    #[serde(default)]
    pub urls: Vec<UrlEntity>,
    /// Attached media.
    #[serde(default)]
    pub media: Vec<Media>,
}

impl ArchiveRecord {
    /// Create a record with no reply pointers, entities or media.
    #[must_use]
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>, full_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at,
            full_text: full_text.into(),
            reply_to_handle: None,
            reply_to_status_id: None,
            urls: Vec::new(),
            media: Vec::new(),
        }
    }

    /// Whether the first attached media item is a video or animated GIF.
    #[must_use]
    pub fn leads_with_video(&self) -> bool {
        self.media.first().is_some_and(|m| m.kind.is_video())
    }

    /// Look up the expanded form of a shortened URL from the entities.
    #[must_use]
    pub fn expanded_url(&self, short: &str) -> Option<&str> {
        self.urls
            .iter()
            .find(|u| u.url == short)
            .map(|u| u.expanded_url.as_str())
    }
}

/// A shortened URL and the destination it expands to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntity {
    /// The t.co link as it appears in the text.
    pub url: String,
    /// Expanded destination URL.
    pub expanded_url: String,
}

/// Media attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Media type.
    pub kind: MediaKind,
    /// Source URL of the media (the still image for videos).
    pub url: String,
    /// Encoded variants (videos and GIFs only).
    #[serde(default)]
    pub variants: Vec<VideoVariant>,
}

impl Media {
    /// Basename of the source URL, used to find the exported file.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        file_name_of(&self.url)
    }
}

/// Type of media attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image.
    Photo,
    /// Video clip.
    Video,
    /// GIF, exported as a silent mp4.
    AnimatedGif,
}

impl MediaKind {
    /// Parse the archive's `type` string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(Self::Photo),
            "video" => Some(Self::Video),
            "animated_gif" => Some(Self::AnimatedGif),
            _ => None,
        }
    }

    /// Whether the media is uploaded through the video service.
    #[must_use]
    pub const fn is_video(self) -> bool {
        matches!(self, Self::Video | Self::AnimatedGif)
    }
}

/// One encoded rendition of a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoVariant {
    /// Bitrate in bits per second (absent for HLS playlists).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    /// MIME type, e.g. `video/mp4`.
    pub content_type: String,
    /// Variant URL.
    pub url: String,
}

impl VideoVariant {
    /// Basename of the variant URL without query string.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        file_name_of(&self.url)
    }
}

/// Last path segment of a URL, ignoring any query or fragment.
fn file_name_of(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_strips_query() {
        let variant = VideoVariant {
            bitrate: Some(2_176_000),
            content_type: "video/mp4".to_string(),
            url: "https://video.twimg.com/ext_tw_video/1/pu/vid/1280x720/abc.mp4?tag=12".to_string(),
        };
        assert_eq!(variant.file_name(), Some("abc.mp4"));
    }

    #[test]
    fn test_leads_with_video() {
        let mut record = ArchiveRecord::new("1", Utc::now(), "hi");
        assert!(!record.leads_with_video());

        record.media.push(Media {
            kind: MediaKind::AnimatedGif,
            url: "https://pbs.twimg.com/tweet_video_thumb/x.jpg".to_string(),
            variants: Vec::new(),
        });
        assert!(record.leads_with_video());
    }
}
