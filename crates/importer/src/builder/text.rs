//! Post text cleanup: link expansion, entity decoding, length limit.

use regex::Regex;
use std::sync::LazyLock;
use unicode_segmentation::UnicodeSegmentation;

use super::web::WebClient;
use crate::archive::ArchiveRecord;

/// Destination text limit, in graphemes.
pub const MAX_POST_GRAPHEMES: usize = 300;

/// Length kept when truncating, leaving room for the ellipsis.
pub const TRUNCATED_GRAPHEMES: usize = 296;

static SHORT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://t\.co/[A-Za-z0-9]+").unwrap());

/// Photo and video viewer pages; their content is attached as media instead.
static MEDIA_VIEWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|mobile\.)?(?:twitter|x)\.com/[^/]+/status/\d+/(?:photo|video)/\d+")
        .unwrap()
});

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());

/// Produce the destination post text for a record.
///
/// With `web` set, each short link is expanded with a HEAD request; otherwise
/// (and when the request fails) the record's URL entities are used.
pub async fn clean_text(record: &ArchiveRecord, web: Option<&WebClient>) -> String {
    let mut expansions = Vec::new();

    for short in unique_short_links(&record.full_text) {
        let mut expanded = None;
        if let Some(web) = web {
            match web.expand(&short).await {
                Ok(url) if !SHORT_LINK.is_match(&url) => expanded = Some(url),
                Ok(_) => {}
                Err(e) => tracing::debug!(id = %record.id, url = %short, error = %e, "Link expansion failed"),
            }
        }
        let expanded = expanded.or_else(|| record.expanded_url(&short).map(str::to_string));
        if let Some(url) = expanded {
            expansions.push((short, url));
        }
    }

    finish_text(&record.full_text, &expansions)
}

/// Apply expansions, decode entities, strip leftovers, and truncate.
#[must_use]
pub fn finish_text(raw: &str, expansions: &[(String, String)]) -> String {
    let mut text = raw.to_string();
    for (short, expanded) in expansions {
        let replacement = if MEDIA_VIEWER.is_match(expanded) {
            ""
        } else {
            expanded.as_str()
        };
        text = text.replace(short.as_str(), replacement);
    }

    let decoded = html_escape::decode_html_entities(&text);
    let stripped = SHORT_LINK.replace_all(&decoded, "");
    let collapsed = SPACE_RUNS.replace_all(&stripped, " ");
    truncate(collapsed.trim())
}

/// Cut text over the limit down to 296 graphemes plus `...`.
#[must_use]
pub fn truncate(text: &str) -> String {
    if text.graphemes(true).count() <= MAX_POST_GRAPHEMES {
        return text.to_string();
    }
    let kept: String = text.graphemes(true).take(TRUNCATED_GRAPHEMES).collect();
    format!("{kept}...")
}

fn unique_short_links(text: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for m in SHORT_LINK.find_iter(text) {
        if !links.iter().any(|l| l == m.as_str()) {
            links.push(m.as_str().to_string());
        }
    }
    links
}
