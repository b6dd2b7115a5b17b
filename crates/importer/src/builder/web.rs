//! Plain HTTP fetching for link expansion and preview cards.
//!
//! Everything here is best-effort: callers treat errors as "no data".

use anyhow::{anyhow, Result};
use reqwest::{header, Client};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Public oEmbed proxy.
pub const DEFAULT_OEMBED_ENDPOINT: &str = "https://noembed.com/embed";

/// CORS proxy used when a page refuses a direct fetch.
pub const DEFAULT_CORS_PROXY: &str = "https://corsproxy.io/?url=";

/// Endpoints and limits for web fetches.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// oEmbed endpoint; the target URL is passed as `?url=`.
    pub oembed_endpoint: String,
    /// Prefix the percent-encoded page URL is appended to.
    pub cors_proxy: Option<String>,
    /// Timeout per request.
    pub timeout: Duration,
    /// Largest thumbnail we upload.
    pub max_thumbnail_bytes: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            oembed_endpoint: DEFAULT_OEMBED_ENDPOINT.to_string(),
            cors_proxy: Some(DEFAULT_CORS_PROXY.to_string()),
            timeout: Duration::from_secs(15),
            max_thumbnail_bytes: 1_000_000,
        }
    }
}

/// oEmbed response fields used for cards.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OEmbed {
    pub title: Option<String>,
    pub provider_name: Option<String>,
    pub author_name: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Set by noembed when the provider is unsupported.
    pub error: Option<String>,
}

/// Downloaded binary with its declared content type.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// HTTP client for non-API fetches.
#[derive(Debug, Clone)]
pub struct WebClient {
    client: Client,
    config: WebConfig,
}

impl WebClient {
    pub fn new(config: WebConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("importer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &WebConfig {
        &self.config
    }

    /// Follow redirects from a short link and return the final URL.
    pub async fn expand(&self, short: &str) -> Result<String> {
        let response = self
            .client
            .head(short)
            .send()
            .await
            .map_err(|e| anyhow!("HEAD {short} failed: {e}"))?;
        Ok(response.url().to_string())
    }

    /// Query the oEmbed proxy for a URL.
    pub async fn oembed(&self, url: &str) -> Result<OEmbed> {
        let response = self
            .client
            .get(&self.config.oembed_endpoint)
            .query(&[("url", url)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("oEmbed lookup failed ({status})"));
        }

        let embed: OEmbed = response.json().await?;
        if let Some(error) = embed.error {
            return Err(anyhow!("oEmbed lookup failed: {error}"));
        }
        Ok(embed)
    }

    /// Fetch page HTML, falling back to the CORS proxy.
    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        match self.get_text(url).await {
            Ok(html) => Ok(html),
            Err(direct) => {
                let Some(proxy) = &self.config.cors_proxy else {
                    return Err(direct);
                };
                tracing::debug!(url, error = %direct, "Direct fetch failed, trying proxy");
                let proxied = format!("{proxy}{}", urlencoding::encode(url));
                self.get_text(&proxied).await
            }
        }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} returned {status}"));
        }
        Ok(response.text().await?)
    }

    /// Download a thumbnail, refusing anything over the size cap.
    pub async fn download(&self, url: &str) -> Result<Download> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} returned {status}"));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string());
        let bytes = response.bytes().await?;

        if bytes.len() > self.config.max_thumbnail_bytes {
            return Err(anyhow!(
                "thumbnail is {} bytes, over the {} byte limit",
                bytes.len(),
                self.config.max_thumbnail_bytes
            ));
        }

        Ok(Download {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Host of a URL without a leading `www.`.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_ascii_lowercase())
}
