//! Photo and video resolution against the exported media folder.
//!
//! Exported files are named `<tweet id>-<basename of the media URL>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{BlobRef, ImageEmbed, PostingApi, UPLOAD_BLOB_METHOD};
use crate::archive::{ArchiveRecord, Media, MediaKind, VideoVariant};
use crate::config::{DEFAULT_VIDEO_MAX_POLLS, DEFAULT_VIDEO_POLL_INTERVAL};
use crate::error::BuildError;

/// Images per post.
pub const MAX_IMAGES: usize = 4;

/// Hard cap on video file size (10 GiB).
pub const MAX_VIDEO_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Preferred rendition among the exported variants.
pub const TARGET_VIDEO_BITRATE: u64 = 2_176_000;

pub const VIDEO_MIME: &str = "video/mp4";

/// Video job polling settings.
#[derive(Debug, Clone)]
pub struct VideoPolling {
    /// Pause between status checks.
    pub interval: Duration,
    /// Status checks before giving up.
    pub max_polls: u32,
    /// Lifetime of the upload token.
    pub token_ttl: Duration,
}

impl Default for VideoPolling {
    fn default() -> Self {
        Self {
            interval: DEFAULT_VIDEO_POLL_INTERVAL,
            max_polls: DEFAULT_VIDEO_MAX_POLLS,
            token_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// A photo located on disk, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    pub path: PathBuf,
    pub mime_type: &'static str,
}

/// A video located on disk, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVideo {
    pub path: PathBuf,
    pub size: u64,
}

/// MIME type for a photo URL; only PNG and JPEG are uploaded.
#[must_use]
pub fn image_mime(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// Where the export stores a media file for a record.
#[must_use]
pub fn media_path(media_dir: &Path, record_id: &str, file_name: &str) -> PathBuf {
    media_dir.join(format!("{record_id}-{file_name}"))
}

/// Locate up to four uploadable photos. A listed photo with a supported
/// extension but no file on disk is an error.
pub fn plan_images(record: &ArchiveRecord, media_dir: &Path) -> Result<Vec<LocalImage>, BuildError> {
    let mut images = Vec::new();

    for media in record.media.iter().filter(|m| m.kind == MediaKind::Photo) {
        if images.len() == MAX_IMAGES {
            tracing::debug!(id = %record.id, "More than {MAX_IMAGES} photos, ignoring the rest");
            break;
        }

        let (Some(mime_type), Some(file_name)) = (image_mime(&media.url), media.file_name()) else {
            tracing::debug!(id = %record.id, url = %media.url, "Unsupported image type, skipping");
            continue;
        };

        let path = media_path(media_dir, &record.id, file_name);
        if !path.is_file() {
            return Err(BuildError::MissingMedia(path));
        }
        images.push(LocalImage { path, mime_type });
    }

    Ok(images)
}

/// Upload photos one at a time.
pub async fn upload_images<A: PostingApi + ?Sized>(
    api: &A,
    images: &[LocalImage],
) -> Result<Vec<ImageEmbed>, BuildError> {
    let mut embeds = Vec::with_capacity(images.len());
    for image in images {
        let data = tokio::fs::read(&image.path)
            .await
            .map_err(|source| BuildError::Io {
                path: image.path.clone(),
                source,
            })?;
        let blob = api.upload_blob(&data, image.mime_type).await?;
        tracing::debug!(path = %image.path.display(), cid = blob.cid(), "Uploaded image");
        embeds.push(ImageEmbed {
            alt: String::new(),
            image: blob,
        });
    }
    Ok(embeds)
}

/// The mp4 rendition to upload: the target bitrate, else the best mp4.
#[must_use]
pub fn select_variant(media: &Media) -> Option<&VideoVariant> {
    let mp4 = || media.variants.iter().filter(|v| v.content_type == VIDEO_MIME);
    mp4()
        .find(|v| v.bitrate == Some(TARGET_VIDEO_BITRATE))
        .or_else(|| mp4().max_by_key(|v| v.bitrate.unwrap_or(0)))
}

/// Locate the record's leading video and enforce the size cap.
pub fn plan_video(record: &ArchiveRecord, media_dir: &Path) -> Result<LocalVideo, BuildError> {
    let media = record
        .media
        .first()
        .filter(|m| m.kind.is_video())
        .ok_or(BuildError::NoVideoVariant)?;
    let file_name = select_variant(media)
        .and_then(VideoVariant::file_name)
        .ok_or(BuildError::NoVideoVariant)?;

    let path = media_path(media_dir, &record.id, file_name);
    let size = match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return Err(BuildError::MissingMedia(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BuildError::MissingMedia(path))
        }
        Err(source) => return Err(BuildError::Io { path, source }),
    };

    if size > MAX_VIDEO_BYTES {
        return Err(BuildError::VideoTooLarge {
            path,
            size,
            limit: MAX_VIDEO_BYTES,
        });
    }
    Ok(LocalVideo { path, size })
}

/// Upload a video through the video service and wait for the processed blob.
pub async fn upload_video<A: PostingApi + ?Sized>(
    api: &A,
    video: &LocalVideo,
    polling: &VideoPolling,
) -> Result<BlobRef, BuildError> {
    let token = api
        .service_auth(UPLOAD_BLOB_METHOD, polling.token_ttl)
        .await?;
    let mut status = api.upload_video(&token, &video.path, video.size).await?;
    tracing::info!(job_id = %status.job_id, size = video.size, "Video uploaded, waiting for processing");

    let mut polls = 0;
    loop {
        if let Some(blob) = status.blob.take() {
            return Ok(blob);
        }
        if status.is_failed() {
            let reason = status
                .error
                .or(status.message)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(BuildError::VideoJobFailed(reason));
        }
        if polls >= polling.max_polls {
            return Err(BuildError::VideoJobTimedOut {
                job_id: status.job_id,
                attempts: polls,
            });
        }

        tokio::time::sleep(polling.interval).await;
        polls += 1;
        status = api.video_job_status(&status.job_id).await?;
        tracing::debug!(job_id = %status.job_id, state = %status.state, progress = ?status.progress, "Video job status");
    }
}
