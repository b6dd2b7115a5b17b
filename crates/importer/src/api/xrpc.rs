//! HTTP client for a Bluesky PDS and the video service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument};
use url::Url;

use super::facets::{self, Candidate};
use super::types::{BlobRef, Facet, FacetFeature, JobStatus, PostPage, PostRecord, StrongRef};
use super::PostingApi;
use crate::error::ApiError;

/// Default PDS entryway.
pub const DEFAULT_SERVICE: &str = "https://bsky.social";

/// Default video processing service.
pub const DEFAULT_VIDEO_SERVICE: &str = "https://video.bsky.app";

/// Connection settings for [`XrpcClient`].
#[derive(Debug, Clone)]
pub struct XrpcConfig {
    /// PDS base URL.
    pub service: Url,
    /// Video service base URL.
    pub video_service: Url,
    /// Handle or email used to log in.
    pub identifier: String,
    /// App password.
    pub password: String,
    /// Per-request timeout (video uploads excluded).
    pub timeout: Duration,
}

impl XrpcConfig {
    /// Config against the default services.
    pub fn new(identifier: String, password: String) -> Result<Self, url::ParseError> {
        Ok(Self {
            service: Url::parse(DEFAULT_SERVICE)?,
            video_service: Url::parse(DEFAULT_VIDEO_SERVICE)?,
            identifier,
            password,
            timeout: Duration::from_secs(60),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    refresh_jwt: String,
    did: String,
    handle: String,
    #[serde(default)]
    did_doc: Option<DidDocument>,
}

impl Session {
    /// The account's own PDS, falling back to the service logged in against.
    fn pds(&self, fallback: &Url) -> Url {
        self.did_doc
            .as_ref()
            .and_then(DidDocument::pds_endpoint)
            .unwrap_or_else(|| fallback.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DidDocument {
    #[serde(default)]
    service: Vec<DidService>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidService {
    id: String,
    #[serde(default)]
    service_endpoint: Option<String>,
}

impl DidDocument {
    fn pds_endpoint(&self) -> Option<Url> {
        self.service
            .iter()
            .find(|s| s.id.ends_with("#atproto_pds"))
            .and_then(|s| s.service_endpoint.as_deref())
            .and_then(|endpoint| Url::parse(endpoint).ok())
    }
}

#[derive(Debug, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    #[serde(default)]
    email_confirmed: bool,
}

#[derive(Debug, Deserialize)]
struct UploadBlobResponse {
    blob: BlobRef,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResponse {
    job_status: JobStatus,
}

#[derive(Debug, Deserialize)]
struct ResolveHandleResponse {
    did: String,
}

#[derive(Debug, Deserialize)]
struct ListRecordsResponse {
    records: Vec<StrongRef>,
    cursor: Option<String>,
}

/// Authenticated XRPC client.
pub struct XrpcClient {
    http: Client,
    config: XrpcConfig,
    session: RwLock<Session>,
}

impl XrpcClient {
    /// Log in with an app password.
    #[instrument(skip(config), fields(identifier = %config.identifier))]
    pub async fn login(config: XrpcConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(concat!("importer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let response = http
            .post(xrpc_url(&config.service, "com.atproto.server.createSession"))
            .timeout(config.timeout)
            .json(&json!({
                "identifier": config.identifier,
                "password": config.password,
            }))
            .send()
            .await?;

        let session: Session = match check(response).await {
            Ok(r) => r.json().await?,
            Err(ApiError::Status {
                status: 401,
                message,
                ..
            }) => return Err(ApiError::Auth(message)),
            Err(e) => return Err(e),
        };

        info!(
            did = %session.did,
            handle = %session.handle,
            pds = %session.pds(&config.service),
            "Logged in"
        );
        Ok(Self {
            http,
            config,
            session: RwLock::new(session),
        })
    }

    /// DID of the logged-in account.
    pub async fn did(&self) -> String {
        self.session.read().await.did.clone()
    }

    /// Handle of the logged-in account.
    pub async fn handle(&self) -> String {
        self.session.read().await.handle.clone()
    }

    /// XRPC endpoint on the account's PDS.
    async fn url(&self, method: &str) -> Url {
        let pds = self.session.read().await.pds(&self.config.service);
        xrpc_url(&pds, method)
    }

    /// Send an authenticated request, refreshing the session once if the
    /// access token has expired.
    async fn send_authed<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.session.read().await.access_jwt.clone();
        let result = check(
            build(&self.http)
                .timeout(self.config.timeout)
                .bearer_auth(token)
                .send()
                .await?,
        )
        .await;

        match result {
            Err(ApiError::Status {
                status: 400,
                error: Some(ref error),
                ..
            }) if error == "ExpiredToken" => {
                self.refresh_session().await?;
                let token = self.session.read().await.access_jwt.clone();
                check(
                    build(&self.http)
                        .timeout(self.config.timeout)
                        .bearer_auth(token)
                        .send()
                        .await?,
                )
                .await
            }
            other => other,
        }
    }

    async fn refresh_session(&self) -> Result<(), ApiError> {
        let mut session = self.session.write().await;
        debug!(did = %session.did, "Refreshing session");

        let response = self
            .http
            .post(xrpc_url(
                &session.pds(&self.config.service),
                "com.atproto.server.refreshSession",
            ))
            .timeout(self.config.timeout)
            .bearer_auth(&session.refresh_jwt)
            .send()
            .await?;
        let mut refreshed: Session = check(response).await?.json().await?;
        if refreshed.did_doc.is_none() {
            refreshed.did_doc = session.did_doc.take();
        }
        *session = refreshed;
        Ok(())
    }

    async fn resolve_handle(&self, handle: &str) -> Result<Option<String>, ApiError> {
        let url = self.url("com.atproto.identity.resolveHandle").await;
        let response = self
            .http
            .get(url)
            .timeout(self.config.timeout)
            .query(&[("handle", handle)])
            .send()
            .await?;

        match check(response).await {
            Ok(r) => Ok(Some(r.json::<ResolveHandleResponse>().await?.did)),
            Err(ApiError::Status { status: 400, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Audience for service auth: the account PDS's `did:web`.
    async fn service_did(&self) -> String {
        let pds = self.session.read().await.pds(&self.config.service);
        service_did(&pds)
    }
}

#[async_trait]
impl PostingApi for XrpcClient {
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn upload_blob(&self, data: &[u8], mime_type: &str) -> Result<BlobRef, ApiError> {
        let url = self.url("com.atproto.repo.uploadBlob").await;
        let response = self
            .send_authed(|http| {
                http.post(url.clone())
                    .header(header::CONTENT_TYPE, mime_type)
                    .body(data.to_vec())
            })
            .await?;
        Ok(response.json::<UploadBlobResponse>().await?.blob)
    }

    #[instrument(skip(self, post), fields(created_at = %post.created_at))]
    async fn create_post(&self, post: &PostRecord) -> Result<StrongRef, ApiError> {
        let url = self.url("com.atproto.repo.createRecord").await;
        let body = json!({
            "repo": self.did().await,
            "collection": PostRecord::NSID,
            "record": post,
        });
        let response = self
            .send_authed(|http| http.post(url.clone()).json(&body))
            .await?;
        Ok(response.json().await?)
    }

    async fn detect_facets(&self, text: &str) -> Result<Vec<Facet>, ApiError> {
        let mut out = Vec::new();
        for (index, candidate) in facets::detect(text) {
            let feature = match candidate {
                Candidate::Link(uri) => FacetFeature::Link { uri },
                Candidate::Mention(handle) => match self.resolve_handle(&handle).await? {
                    Some(did) => FacetFeature::Mention { did },
                    None => {
                        debug!(handle, "Mention does not resolve, leaving as text");
                        continue;
                    }
                },
            };
            out.push(Facet {
                index,
                features: vec![feature],
            });
        }
        Ok(out)
    }

    async fn is_email_confirmed(&self) -> Result<bool, ApiError> {
        let url = self.url("com.atproto.server.getSession").await;
        let response = self.send_authed(|http| http.get(url.clone())).await?;
        Ok(response.json::<SessionInfo>().await?.email_confirmed)
    }

    async fn service_auth(&self, method: &str, expires_in: Duration) -> Result<String, ApiError> {
        let url = self.url("com.atproto.server.getServiceAuth").await;
        let exp = (Utc::now() + expires_in).timestamp().to_string();
        let aud = self.service_did().await;
        let response = self
            .send_authed(|http| {
                http.get(url.clone())
                    .query(&[("aud", aud.as_str()), ("lxm", method), ("exp", exp.as_str())])
            })
            .await?;
        Ok(response.json::<TokenResponse>().await?.token)
    }

    #[instrument(skip(self, token, path), fields(path = %path.display()))]
    async fn upload_video(
        &self,
        token: &str,
        path: &Path,
        size: u64,
    ) -> Result<JobStatus, ApiError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4")
            .to_string();
        let did = self.did().await;

        let file = tokio::fs::File::open(path).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .http
            .post(xrpc_url(&self.config.video_service, "app.bsky.video.uploadVideo"))
            .query(&[("did", did.as_str()), ("name", name.as_str())])
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "video/mp4")
            .header(header::CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;

        // The service answers 409 with the existing job when the same file
        // was uploaded before.
        if response.status() == StatusCode::CONFLICT {
            let text = response.text().await?;
            return serde_json::from_str::<JobStatus>(&text)
                .map_err(|_| error_from_body(StatusCode::CONFLICT.as_u16(), &text));
        }

        Ok(check(response).await?.json().await?)
    }

    async fn video_job_status(&self, job_id: &str) -> Result<JobStatus, ApiError> {
        let response = self
            .http
            .get(xrpc_url(&self.config.video_service, "app.bsky.video.getJobStatus"))
            .timeout(self.config.timeout)
            .query(&[("jobId", job_id)])
            .send()
            .await?;
        Ok(check(response)
            .await?
            .json::<JobStatusResponse>()
            .await?
            .job_status)
    }

    async fn list_posts(&self, cursor: Option<&str>, limit: u32) -> Result<PostPage, ApiError> {
        let url = self.url("com.atproto.repo.listRecords").await;
        let did = self.did().await;
        let limit = limit.to_string();
        let response = self
            .send_authed(|http| {
                let mut query = vec![
                    ("repo", did.as_str()),
                    ("collection", PostRecord::NSID),
                    ("limit", limit.as_str()),
                ];
                if let Some(c) = cursor {
                    query.push(("cursor", c));
                }
                http.get(url.clone()).query(&query)
            })
            .await?;

        let listed: ListRecordsResponse = response.json().await?;
        Ok(PostPage {
            posts: listed.records,
            cursor: listed.cursor,
        })
    }

    async fn delete_post(&self, uri: &str) -> Result<(), ApiError> {
        let rkey = uri
            .rsplit('/')
            .next()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::Decode(format!("not a record URI: {uri}")))?;
        let url = self.url("com.atproto.repo.deleteRecord").await;
        let body = json!({
            "repo": self.did().await,
            "collection": PostRecord::NSID,
            "rkey": rkey,
        });
        self.send_authed(|http| http.post(url.clone()).json(&body))
            .await?;
        Ok(())
    }
}

fn service_did(pds: &Url) -> String {
    format!("did:web:{}", pds.host_str().unwrap_or("bsky.social"))
}

fn xrpc_url(base: &Url, method: &str) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("/xrpc/{method}"));
    url
}

/// Map non-success responses to [`ApiError`].
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let reset = response
            .headers()
            .get("ratelimit-reset")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        return Err(ApiError::RateLimited { reset });
    }

    let text = response.text().await.unwrap_or_default();
    Err(error_from_body(status.as_u16(), &text))
}

fn error_from_body(status: u16, text: &str) -> ApiError {
    let body = serde_json::from_str::<XrpcErrorBody>(text).ok();
    let error = body.as_ref().and_then(|b| b.error.clone());
    let message = body
        .and_then(|b| b.message)
        .or_else(|| error.clone())
        .unwrap_or_else(|| text.to_string());
    ApiError::Status {
        status,
        error,
        message,
    }
}
