//! Scripted in-memory `PostingApi` shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use importer::api::{BlobRef, Facet, JobStatus, PostPage, PostRecord, PostingApi, StrongRef};
use importer::ApiError;

/// Records every call and answers from a script.
///
/// Queued failures are returned (one per call, any method) before the
/// method's normal answer.
#[derive(Default)]
pub struct FakeApi {
    pub calls: Mutex<Vec<&'static str>>,
    pub posts: Mutex<Vec<PostRecord>>,
    pub uploads: Mutex<Vec<(usize, String)>>,
    pub failures: Mutex<VecDeque<ApiError>>,
    pub video_jobs: Mutex<VecDeque<JobStatus>>,
    pub remote_posts: Mutex<Vec<StrongRef>>,
    pub email_confirmed: bool,
    pub facets_fail: bool,
    /// Number of upcoming `delete_post` calls that fail.
    pub delete_failures: Mutex<usize>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            email_confirmed: true,
            ..Self::default()
        }
    }

    pub fn fail_with(self, errors: impl IntoIterator<Item = ApiError>) -> Self {
        self.failures.lock().unwrap().extend(errors);
        self
    }

    pub fn with_video_jobs(self, jobs: impl IntoIterator<Item = JobStatus>) -> Self {
        self.video_jobs.lock().unwrap().extend(jobs);
        self
    }

    pub fn with_remote_posts(self, count: usize) -> Self {
        let posts = (0..count).map(|i| strong_ref(&format!("old{i}")));
        self.remote_posts.lock().unwrap().extend(posts);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }

    pub fn posts(&self) -> Vec<PostRecord> {
        self.posts.lock().unwrap().clone()
    }

    fn enter(&self, name: &'static str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(name);
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn strong_ref(rkey: &str) -> StrongRef {
    StrongRef {
        uri: format!("at://did:plc:fake/app.bsky.feed.post/{rkey}"),
        cid: format!("cid-{rkey}"),
    }
}

pub fn job(state: &str, blob: Option<BlobRef>) -> JobStatus {
    JobStatus {
        job_id: "job-1".to_string(),
        state: state.to_string(),
        progress: None,
        blob,
        error: None,
        message: None,
    }
}

pub fn network_error() -> ApiError {
    ApiError::Network("connection reset".to_string())
}

#[async_trait]
impl PostingApi for FakeApi {
    async fn upload_blob(&self, data: &[u8], mime_type: &str) -> Result<BlobRef, ApiError> {
        self.enter("upload_blob")?;
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((data.len(), mime_type.to_string()));
        Ok(BlobRef::new(format!("blob{}", uploads.len()), mime_type, data.len() as u64))
    }

    async fn create_post(&self, post: &PostRecord) -> Result<StrongRef, ApiError> {
        self.enter("create_post")?;
        let mut posts = self.posts.lock().unwrap();
        posts.push(post.clone());
        Ok(strong_ref(&format!("p{}", posts.len())))
    }

    async fn detect_facets(&self, text: &str) -> Result<Vec<Facet>, ApiError> {
        self.enter("detect_facets")?;
        if self.facets_fail {
            return Err(ApiError::Status {
                status: 500,
                error: None,
                message: "facet lookup broke".to_string(),
            });
        }
        Ok(importer::api::facets::link_facets(text))
    }

    async fn is_email_confirmed(&self) -> Result<bool, ApiError> {
        self.enter("is_email_confirmed")?;
        Ok(self.email_confirmed)
    }

    async fn service_auth(&self, _method: &str, _expires_in: Duration) -> Result<String, ApiError> {
        self.enter("service_auth")?;
        Ok("service-token".to_string())
    }

    async fn upload_video(&self, _token: &str, _path: &Path, _size: u64) -> Result<JobStatus, ApiError> {
        self.enter("upload_video")?;
        Ok(self.next_job())
    }

    async fn video_job_status(&self, _job_id: &str) -> Result<JobStatus, ApiError> {
        self.enter("video_job_status")?;
        Ok(self.next_job())
    }

    async fn list_posts(&self, cursor: Option<&str>, limit: u32) -> Result<PostPage, ApiError> {
        self.enter("list_posts")?;
        let remote = self.remote_posts.lock().unwrap();
        let start: usize = cursor.map_or(0, |c| c.parse().unwrap());
        let end = (start + limit as usize).min(remote.len());
        Ok(PostPage {
            posts: remote[start..end].to_vec(),
            cursor: (end < remote.len()).then(|| end.to_string()),
        })
    }

    async fn delete_post(&self, _uri: &str) -> Result<(), ApiError> {
        self.enter("delete_post")?;
        let mut remaining = self.delete_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ApiError::Status {
                status: 400,
                error: Some("InvalidRequest".to_string()),
                message: "cannot delete".to_string(),
            });
        }
        Ok(())
    }
}

impl FakeApi {
    fn next_job(&self) -> JobStatus {
        self.video_jobs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| job("JOB_STATE_ENCODING", None))
    }
}
