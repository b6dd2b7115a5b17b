//! Projection of decoded archive entries onto [`ArchiveRecord`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::parser::kind_of;
use super::types::{ArchiveRecord, Media, MediaKind, UrlEntity, VideoVariant};
use crate::error::NormalizeError;

/// Key wrapping each tweet in the export (`{"tweet": {...}}`).
pub const RECORD_KEY: &str = "tweet";

/// Timestamp format used by the archive, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const ARCHIVE_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Raw tweet as it appears in the export. Only the fields we read.
#[derive(Debug, Deserialize)]
struct RawTweet {
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    full_text: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    in_reply_to_screen_name: Option<String>,
    #[serde(default)]
    in_reply_to_status_id_str: Option<String>,
    #[serde(default)]
    in_reply_to_status_id: Option<Value>,
    #[serde(default)]
    entities: Option<RawEntities>,
    #[serde(default)]
    extended_entities: Option<RawEntities>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntities {
    #[serde(default)]
    urls: Vec<RawUrl>,
    #[serde(default)]
    media: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawUrl {
    #[serde(default, deserialize_with = "null_as_empty")]
    url: String,
    #[serde(default)]
    expanded_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    #[serde(rename = "type", default, deserialize_with = "null_as_empty")]
    kind: String,
    #[serde(default)]
    media_url_https: Option<String>,
    #[serde(default)]
    media_url: Option<String>,
    #[serde(default)]
    video_info: Option<RawVideoInfo>,
}

#[derive(Debug, Deserialize)]
struct RawVideoInfo {
    #[serde(default)]
    variants: Vec<RawVariant>,
}

#[derive(Debug, Deserialize)]
struct RawVariant {
    #[serde(default)]
    bitrate: Option<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    content_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    url: String,
}

/// Normalize decoded entries into typed records, preserving input order.
///
/// Entries without a non-empty string ID are dropped. An entry that has an
/// ID but does not deserialize fails the whole batch.
pub fn normalize(entries: Vec<Value>) -> Result<Vec<ArchiveRecord>, NormalizeError> {
    let total = entries.len();
    let mut records = Vec::with_capacity(total);

    for (index, entry) in entries.into_iter().enumerate() {
        let mut map = match entry {
            Value::Object(map) => map,
            other => {
                return Err(NormalizeError::UnexpectedShape {
                    index,
                    found: kind_of(&other),
                })
            }
        };

        let body = match map.remove(RECORD_KEY) {
            Some(inner @ Value::Object(_)) => inner,
            Some(other) => {
                return Err(NormalizeError::UnexpectedShape {
                    index,
                    found: kind_of(&other),
                })
            }
            None => Value::Object(map),
        };

        let Some(id) = string_id(body.get("id_str")).or_else(|| string_id(body.get("id")))
        else {
            tracing::debug!(index, "Entry has no ID, dropping");
            continue;
        };

        let raw: RawTweet = serde_json::from_value(body)
            .map_err(|source| NormalizeError::InvalidRecord { id: id.clone(), source })?;

        records.push(project(id, raw)?);
    }

    tracing::info!(
        total,
        kept = records.len(),
        dropped = total - records.len(),
        "Normalized archive records"
    );
    Ok(records)
}

fn project(id: String, raw: RawTweet) -> Result<ArchiveRecord, NormalizeError> {
    let created = raw.created_at.unwrap_or_default();
    let Some(created_at) = parse_timestamp(&created) else {
        return Err(NormalizeError::InvalidTimestamp { id, value: created });
    };

    let entities = raw.entities.unwrap_or_default();
    let urls = entities
        .urls
        .into_iter()
        .filter(|u| !u.url.is_empty())
        .map(|u| UrlEntity {
            expanded_url: u.expanded_url.unwrap_or_else(|| u.url.clone()),
            url: u.url,
        })
        .collect();

    let raw_media = match raw.extended_entities {
        Some(ext) if !ext.media.is_empty() => ext.media,
        _ => entities.media,
    };
    let media = raw_media.into_iter().filter_map(project_media).collect();

    let reply_to_status_id = raw
        .in_reply_to_status_id_str
        .filter(|s| !s.is_empty())
        .or_else(|| string_id(raw.in_reply_to_status_id.as_ref()));

    Ok(ArchiveRecord {
        id,
        created_at,
        full_text: raw.full_text.or(raw.text).unwrap_or_default(),
        reply_to_handle: raw.in_reply_to_screen_name.filter(|s| !s.is_empty()),
        reply_to_status_id,
        urls,
        media,
    })
}

fn project_media(raw: RawMedia) -> Option<Media> {
    let Some(kind) = MediaKind::parse(&raw.kind) else {
        tracing::debug!(kind = %raw.kind, "Unknown media type, ignoring");
        return None;
    };
    let url = raw.media_url_https.or(raw.media_url)?;

    let variants = raw
        .video_info
        .map(|info| {
            info.variants
                .into_iter()
                .map(|v| VideoVariant {
                    bitrate: v.bitrate.as_ref().and_then(number_like),
                    content_type: v.content_type,
                    url: v.url,
                })
                .collect()
        })
        .unwrap_or_default();

    Some(Media {
        kind,
        url,
        variants,
    })
}

/// Accept the archive format, RFC 3339, or a bare date (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_str(s, ARCHIVE_TIME_FORMAT) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// IDs are strings in current exports; numeric IDs are kept only when they fit.
fn string_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Exports write `null` where a string was never set.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Bitrates are exported as strings ("2176000").
fn number_like(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
