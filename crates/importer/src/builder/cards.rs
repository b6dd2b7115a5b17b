//! External link preview cards.

use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use url::Url;

use super::web::{host_of, WebClient};
use crate::api::{ExternalCard, PostingApi};
use crate::archive::ArchiveRecord;

/// Hosts resolved through the oEmbed proxy instead of page scraping.
pub const OEMBED_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "m.youtube.com",
    "vimeo.com",
    "soundcloud.com",
    "open.spotify.com",
    "flickr.com",
    "flic.kr",
    "dailymotion.com",
    "ted.com",
];

const PLATFORM_HOSTS: &[&str] = &["twitter.com", "x.com", "mobile.twitter.com", "t.co"];

static ANY_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"']+"#).unwrap());

static OG_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());
static OG_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="description"]"#).unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

/// Page metadata read from HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// Whether a URL points back at the source platform.
#[must_use]
pub fn is_platform_url(url: &str) -> bool {
    host_of(url).is_some_and(|host| PLATFORM_HOSTS.contains(&host.as_str()))
}

/// Whether a URL is resolved through oEmbed.
#[must_use]
pub fn uses_oembed(url: &str) -> bool {
    host_of(url).is_some_and(|host| OEMBED_HOSTS.contains(&host.as_str()))
}

/// First link worth a card: URL entities first, then any URL in the text.
#[must_use]
pub fn first_external_url(record: &ArchiveRecord, cleaned_text: &str) -> Option<String> {
    record
        .urls
        .iter()
        .map(|u| u.expanded_url.as_str())
        .chain(
            ANY_URL
                .find_iter(cleaned_text)
                .map(|m| m.as_str().trim_end_matches(['.', ',', ')', '!', '?', ';', ':'])),
        )
        .find(|u| !is_platform_url(u) && Url::parse(u).is_ok())
        .map(str::to_string)
}

/// Read OpenGraph tags, falling back to `<title>` and the meta description.
/// Relative image URLs are resolved against `page_url`.
#[must_use]
pub fn parse_open_graph(html: &str, page_url: &str) -> PageMeta {
    let document = Html::parse_document(html);
    let content = |selector: &Selector| {
        document
            .select(selector)
            .filter_map(|e| e.value().attr("content"))
            .map(|s| html_escape::decode_html_entities(s.trim()).into_owned())
            .find(|s| !s.is_empty())
    };

    let title = content(&OG_TITLE).or_else(|| {
        document
            .select(&TITLE)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    });
    let description = content(&OG_DESCRIPTION).or_else(|| content(&META_DESCRIPTION));
    let image = content(&OG_IMAGE).and_then(|src| {
        Url::parse(page_url)
            .and_then(|base| base.join(&src))
            .map(String::from)
            .ok()
    });

    PageMeta {
        title,
        description,
        image,
    }
}

/// Build a card for `url`. Returns `None` when nothing usable was found.
pub async fn build_card<A: PostingApi + ?Sized>(
    web: &WebClient,
    api: &A,
    url: &str,
) -> Option<ExternalCard> {
    let meta = match fetch_meta(web, url).await {
        Ok(meta) => meta,
        Err(e) => {
            tracing::debug!(url, error = %e, "No link card");
            return None;
        }
    };

    let thumb = match &meta.image {
        Some(image) => match upload_thumbnail(web, api, image).await {
            Ok(blob) => Some(blob),
            Err(e) => {
                tracing::warn!(url, image, error = %e, "Card thumbnail failed, posting without it");
                None
            }
        },
        None => None,
    };

    Some(ExternalCard {
        uri: url.to_string(),
        title: meta.title.unwrap_or_default(),
        description: meta.description.unwrap_or_default(),
        thumb,
    })
}

async fn fetch_meta(web: &WebClient, url: &str) -> Result<PageMeta> {
    let meta = if uses_oembed(url) {
        let embed = web.oembed(url).await?;
        let description = match (embed.author_name, embed.provider_name) {
            (Some(author), Some(provider)) => Some(format!("{author} on {provider}")),
            (author, provider) => author.or(provider),
        };
        PageMeta {
            title: embed.title,
            description,
            image: embed.thumbnail_url,
        }
    } else {
        let html = web.fetch_html(url).await?;
        parse_open_graph(&html, url)
    };

    if meta.title.is_none() && meta.description.is_none() {
        return Err(anyhow!("page has no title or description"));
    }
    Ok(meta)
}

async fn upload_thumbnail<A: PostingApi + ?Sized>(
    web: &WebClient,
    api: &A,
    image: &str,
) -> Result<crate::api::BlobRef> {
    let download = web.download(image).await?;
    let mime = download
        .content_type
        .filter(|ct| ct.starts_with("image/"))
        .unwrap_or_else(|| "image/jpeg".to_string());
    Ok(api.upload_blob(&download.bytes, &mime).await?)
}
