//! End-to-end import runs against the scripted API.

mod common;

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{job, strong_ref, FakeApi};
use importer::api::{BlobRef, Embed, FacetFeature};
use importer::archive::{ArchiveRecord, Media, MediaKind, UrlEntity, VideoVariant};
use importer::builder::{VideoPolling, WebConfig};
use importer::{ImportConfig, ImportError, Pipeline, RunProgress};

fn config(media_dir: &Path) -> ImportConfig {
    ImportConfig {
        media_dir: media_dir.to_path_buf(),
        post_delay: Duration::ZERO,
        video: VideoPolling {
            interval: Duration::from_millis(1),
            max_polls: 3,
            ..VideoPolling::default()
        },
        web: WebConfig {
            cors_proxy: None,
            timeout: Duration::from_secs(2),
            ..WebConfig::default()
        },
        ..ImportConfig::default()
    }
}

fn record(id: &str, day: u32, text: &str) -> ArchiveRecord {
    ArchiveRecord::new(id, Utc.with_ymd_and_hms(2020, 1, day, 12, 0, 0).unwrap(), text)
}

fn photo(name: &str) -> Media {
    Media {
        kind: MediaKind::Photo,
        url: format!("https://pbs.twimg.com/media/{name}"),
        variants: Vec::new(),
    }
}

fn video(name: &str) -> Media {
    Media {
        kind: MediaKind::Video,
        url: "https://pbs.twimg.com/ext_tw_video_thumb/1/pu/img/still.jpg".to_string(),
        variants: vec![VideoVariant {
            bitrate: Some(2_176_000),
            content_type: "video/mp4".to_string(),
            url: format!("https://video.twimg.com/ext_tw_video/1/pu/vid/{name}?tag=12"),
        }],
    }
}

async fn run(
    api: Arc<FakeApi>,
    config: ImportConfig,
    records: Vec<ArchiveRecord>,
) -> (importer::RunSummary, Vec<RunProgress>) {
    let pipeline = Pipeline::new(api, config).unwrap();
    let reports = Mutex::new(Vec::new());
    let summary = pipeline
        .run(records, &CancellationToken::new(), |p| {
            reports.lock().unwrap().push(p.clone());
        })
        .await;
    (summary, reports.into_inner().unwrap())
}

#[tokio::test]
async fn test_photo_post_uploads_image_and_keeps_date() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("42-pic.jpg"), b"\xff\xd8\xff jpeg").unwrap();

    let mut tweet = record("42", 5, "sunset &amp; sea");
    tweet.media.push(photo("pic.jpg"));

    let api = Arc::new(FakeApi::new());
    let (summary, reports) = run(Arc::clone(&api), config(dir.path()), vec![tweet]).await;

    assert_eq!(summary.posted, 1);
    assert!(summary.progress.errors.is_empty());
    assert_eq!(api.uploads.lock().unwrap()[0].1, "image/jpeg");

    let post = &api.posts()[0];
    assert_eq!(post.text, "sunset & sea");
    assert_eq!(post.created_at, Utc.with_ymd_and_hms(2020, 1, 5, 12, 0, 0).unwrap());
    match &post.embed {
        Some(Embed::Images { images }) => assert_eq!(images.len(), 1),
        other => panic!("expected images embed, got {other:?}"),
    }

    let last = reports.last().unwrap();
    assert!(!last.is_processing);
    assert!((last.progress_percent - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_at_most_four_images() {
    let dir = tempfile::tempdir().unwrap();
    let mut tweet = record("7", 1, "album");
    for i in 0..6 {
        std::fs::write(dir.path().join(format!("7-p{i}.png")), b"png").unwrap();
        tweet.media.push(photo(&format!("p{i}.png")));
    }

    let api = Arc::new(FakeApi::new());
    let (summary, _) = run(Arc::clone(&api), config(dir.path()), vec![tweet]).await;

    assert_eq!(summary.posted, 1);
    assert_eq!(api.calls_to("upload_blob"), 4);
    assert!(matches!(&api.posts()[0].embed, Some(Embed::Images { images }) if images.len() == 4));
}

#[tokio::test]
async fn test_missing_photo_is_recorded_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let mut broken = record("1", 1, "where is it");
    broken.media.push(photo("gone.jpg"));
    let fine = record("2", 2, "plain text");

    let api = Arc::new(FakeApi::new());
    let (summary, reports) = run(Arc::clone(&api), config(dir.path()), vec![broken, fine]).await;

    assert_eq!(summary.posted, 1);
    assert_eq!(summary.progress.errors.len(), 1);
    assert_eq!(summary.progress.errors[0].id, "1");
    assert!(summary.progress.errors[0].message.contains("1-gone.jpg"));
    assert_eq!(summary.progress.processed_records, 2);
    // One report per record plus the final one.
    assert_eq!(reports.len(), 3);
}

#[tokio::test]
async fn test_oversized_video_is_rejected_before_upload() {
    let dir = tempfile::tempdir().unwrap();
    let file = File::create(dir.path().join("9-big.mp4")).unwrap();
    file.set_len(11 * 1024 * 1024 * 1024).unwrap();

    let mut tweet = record("9", 1, "long clip");
    tweet.media.push(video("big.mp4"));

    let api = Arc::new(FakeApi::new());
    let (summary, _) = run(Arc::clone(&api), config(dir.path()), vec![tweet]).await;

    assert_eq!(summary.posted, 0);
    assert_eq!(summary.progress.errors.len(), 1);
    assert!(summary.progress.errors[0].message.contains("over the"));
    assert_eq!(api.calls_to("upload_video"), 0);
    assert!((summary.progress.progress_percent - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_video_upload_polls_until_complete() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("3-clip.mp4"), b"mp4 bytes").unwrap();

    let mut tweet = record("3", 1, "watch");
    tweet.media.push(video("clip.mp4"));

    let blob = BlobRef::new("bafyvideo", "video/mp4", 9);
    let api = Arc::new(FakeApi::new().with_video_jobs([
        job("JOB_STATE_CREATED", None),
        job("JOB_STATE_ENCODING", None),
        job("JOB_STATE_COMPLETED", Some(blob.clone())),
    ]));
    let (summary, _) = run(Arc::clone(&api), config(dir.path()), vec![tweet]).await;

    assert_eq!(summary.posted, 1, "errors: {:?}", summary.progress.errors);
    assert_eq!(api.calls_to("service_auth"), 1);
    assert_eq!(api.calls_to("video_job_status"), 2);
    assert_eq!(api.posts()[0].embed, Some(Embed::Video { video: blob }));
}

#[tokio::test]
async fn test_video_job_timeout() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("3-clip.mp4"), b"mp4 bytes").unwrap();

    let mut tweet = record("3", 1, "stuck");
    tweet.media.push(video("clip.mp4"));

    let api = Arc::new(FakeApi::new());
    let (summary, _) = run(Arc::clone(&api), config(dir.path()), vec![tweet]).await;

    assert_eq!(summary.posted, 0);
    assert!(summary.progress.errors[0].message.contains("after 3 polls"));
    assert_eq!(api.calls_to("video_job_status"), 3);
}

#[tokio::test]
async fn test_failed_video_job_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("3-clip.mp4"), b"mp4 bytes").unwrap();

    let mut tweet = record("3", 1, "broken clip");
    tweet.media.push(video("clip.mp4"));

    let mut failed = job("JOB_STATE_FAILED", None);
    failed.error = Some("unsupported codec".to_string());
    let api = Arc::new(FakeApi::new().with_video_jobs([job("JOB_STATE_ENCODING", None), failed]));
    let (summary, _) = run(Arc::clone(&api), config(dir.path()), vec![tweet]).await;

    assert_eq!(summary.posted, 0);
    assert_eq!(summary.progress.errors.len(), 1);
    assert_eq!(summary.progress.errors[0].id, "3");
    assert_eq!(
        summary.progress.errors[0].message,
        "video processing failed: unsupported codec"
    );
    assert_eq!(api.calls_to("video_job_status"), 1);
    assert_eq!(api.calls_to("create_post"), 0);
}

#[tokio::test]
async fn test_video_skipped_without_confirmed_email() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = record("1", 1, "clip one");
    first.media.push(video("a.mp4"));
    let mut second = record("2", 2, "clip two");
    second.media.push(video("b.mp4"));

    let api = Arc::new(FakeApi {
        email_confirmed: false,
        ..FakeApi::default()
    });
    let (summary, _) = run(Arc::clone(&api), config(dir.path()), vec![first, second]).await;

    assert_eq!(summary.skipped_videos, vec!["1", "2"]);
    assert!(summary.progress.errors.is_empty());
    // Checked once per run.
    assert_eq!(api.calls_to("is_email_confirmed"), 1);
    assert_eq!(api.calls_to("upload_video"), 0);
}

#[tokio::test]
async fn test_self_replies_become_a_thread() {
    let dir = tempfile::tempdir().unwrap();
    let root = record("1", 1, "a thread");
    let mut second = record("2", 2, "part two");
    second.reply_to_handle = Some("Me".to_string());
    second.reply_to_status_id = Some("1".to_string());
    let mut third = record("3", 3, "part three");
    third.reply_to_handle = Some("me".to_string());
    third.reply_to_status_id = Some("2".to_string());

    let config = ImportConfig {
        own_handles: vec!["me".to_string()],
        ..config(dir.path())
    };
    let api = Arc::new(FakeApi::new());
    let (summary, _) = run(Arc::clone(&api), config, vec![root, second, third]).await;

    assert_eq!(summary.posted, 3);
    let posts = api.posts();
    assert!(posts[0].reply.is_none());

    let reply = posts[1].reply.as_ref().unwrap();
    assert_eq!(reply.parent, strong_ref("p1"));
    assert_eq!(reply.root, strong_ref("p1"));

    let reply = posts[2].reply.as_ref().unwrap();
    assert_eq!(reply.parent, strong_ref("p2"));
    assert_eq!(reply.root, strong_ref("p1"));
}

#[tokio::test]
async fn test_own_quote_with_photo_embeds_record_with_media() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("2-pic.png"), b"\x89PNG").unwrap();

    let original = record("1", 1, "original thought");
    let mut quote = record("2", 2, "adding a picture");
    quote.urls.push(UrlEntity {
        url: "https://t.co/q".to_string(),
        expanded_url: "https://twitter.com/Me/status/1".to_string(),
    });
    quote.media.push(photo("pic.png"));

    let config = ImportConfig {
        own_handles: vec!["me".to_string()],
        ..config(dir.path())
    };
    let api = Arc::new(FakeApi::new());
    let (summary, _) = run(Arc::clone(&api), config, vec![original, quote]).await;

    assert_eq!(summary.posted, 2, "errors: {:?}", summary.progress.errors);
    let posts = api.posts();
    assert!(posts[0].embed.is_none());

    let embed = posts[1].embed.as_ref().unwrap();
    assert_eq!(embed.kind(), "record_with_media");
    let Embed::RecordWithMedia { record, media } = embed else {
        unreachable!()
    };
    assert_eq!(record.record, strong_ref("p1"));
    assert!(matches!(media.as_ref(), Embed::Images { images } if images.len() == 1));
}

#[tokio::test]
async fn test_facet_failure_falls_back_to_links() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi {
        email_confirmed: true,
        facets_fail: true,
        ..FakeApi::default()
    });
    let config = ImportConfig {
        // No card lookups for this test.
        web: WebConfig {
            oembed_endpoint: "http://127.0.0.1:9/embed".to_string(),
            cors_proxy: None,
            timeout: Duration::from_millis(200),
            ..WebConfig::default()
        },
        ..config(dir.path())
    };
    let (summary, _) = run(
        Arc::clone(&api),
        config,
        vec![record("1", 1, "read http://127.0.0.1:9/post")],
    )
    .await;

    assert_eq!(summary.posted, 1);
    let post = &api.posts()[0];
    assert!(post.embed.is_none());
    assert_eq!(post.facets.len(), 1);
    assert!(matches!(&post.facets[0].features[0], FacetFeature::Link { uri } if uri == "http://127.0.0.1:9/post"));
}

#[tokio::test]
async fn test_simulate_makes_no_calls() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("1-pic.png"), b"png").unwrap();
    std::fs::write(dir.path().join("2-clip.mp4"), b"mp4").unwrap();

    let mut with_photo = record("1", 1, "photo https://t.co/abc");
    with_photo.media.push(photo("pic.png"));
    let mut with_video = record("2", 2, "video");
    with_video.media.push(video("clip.mp4"));
    let plain = record("3", 3, "see https://example.com");

    let config = ImportConfig {
        simulate: true,
        ..config(dir.path())
    };
    let api = Arc::new(FakeApi::new());
    let (summary, reports) = run(Arc::clone(&api), config, vec![with_photo, with_video, plain]).await;

    assert_eq!(api.call_count(), 0);
    assert_eq!(summary.simulated, 3);
    assert!(summary.progress.errors.is_empty());
    assert!((reports.last().unwrap().progress_percent - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_cancel_stops_before_next_record() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi::new());
    let pipeline = Pipeline::new(Arc::clone(&api), config(dir.path())).unwrap();

    let cancel = CancellationToken::new();
    let records = vec![record("1", 1, "one"), record("2", 2, "two"), record("3", 3, "three")];
    let summary = pipeline
        .run(records, &cancel, |p| {
            if p.processed_records == 1 {
                cancel.cancel();
            }
        })
        .await;

    assert!(summary.cancelled);
    assert_eq!(summary.posted, 1);
    assert_eq!(summary.progress.processed_records, 1);
    assert!(!summary.progress.is_processing);
}

#[tokio::test]
async fn test_import_from_archive_text() {
    let dir = tempfile::tempdir().unwrap();
    let entries = json!([
        {"tweet": {"id_str": "1", "created_at": "Wed Jan 01 10:00:00 +0000 2020", "full_text": "RT @a: hi"}},
        {"tweet": {"id_str": "2", "created_at": "Mon Jun 01 10:00:00 +0000 2020", "full_text": "hello"}},
        {"tweet": {
            "id_str": "3",
            "created_at": "Wed Jul 01 10:00:00 +0000 2020",
            "full_text": "quote",
            "entities": {"urls": [{"url": "https://t.co/q", "expanded_url": "https://x.com/h/status/9"}]}
        }}
    ]);
    let raw = format!("window.YTD.tweets.part0 = {entries};");

    let api = Arc::new(FakeApi::new());
    let pipeline = Pipeline::new(Arc::clone(&api), config(dir.path())).unwrap();
    let summary = pipeline
        .import(&raw, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(summary.posted, 1);
    assert_eq!(api.posts()[0].text, "hello");
}

#[tokio::test]
async fn test_malformed_archive_aborts_before_posting() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi::new());
    let pipeline = Pipeline::new(Arc::clone(&api), config(dir.path())).unwrap();

    let err = pipeline
        .import("window.YTD.tweets.part0 = [{", &CancellationToken::new(), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::Parse(_)));
    assert_eq!(api.call_count(), 0);
}
