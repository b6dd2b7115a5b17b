//! Link and mention detection in post text.

use regex::Regex;
use std::sync::LazyLock;

use super::types::{ByteSlice, Facet, FacetFeature};

static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s<>]+").unwrap());

/// `@handle.domain` preceded by start of text, whitespace or `(`.
static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(])(@(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?\.)+[a-zA-Z]{2,})")
        .unwrap()
});

/// Punctuation that usually ends a sentence rather than a URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', '"', '\''];

/// A detected span, before mentions are resolved to DIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Link(String),
    /// Handle without the leading `@`.
    Mention(String),
}

/// Find links and mentions with their UTF-8 byte ranges, in text order.
#[must_use]
pub fn detect(text: &str) -> Vec<(ByteSlice, Candidate)> {
    let mut found: Vec<(ByteSlice, Candidate)> = Vec::new();

    for m in LINK.find_iter(text) {
        let uri = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        found.push((
            ByteSlice {
                byte_start: m.start(),
                byte_end: m.start() + uri.len(),
            },
            Candidate::Link(uri.to_string()),
        ));
    }

    for caps in MENTION.captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        // Mentions inside a link are part of the link.
        if found
            .iter()
            .any(|(s, _)| m.start() >= s.byte_start && m.start() < s.byte_end)
        {
            continue;
        }
        found.push((
            ByteSlice {
                byte_start: m.start(),
                byte_end: m.end(),
            },
            Candidate::Mention(m.as_str()[1..].to_string()),
        ));
    }

    found.sort_by_key(|(s, _)| s.byte_start);
    found
}

/// Facets for the links only; used when mentions cannot be resolved.
#[must_use]
pub fn link_facets(text: &str) -> Vec<Facet> {
    detect(text)
        .into_iter()
        .filter_map(|(index, c)| match c {
            Candidate::Link(uri) => Some(Facet {
                index,
                features: vec![FacetFeature::Link { uri }],
            }),
            Candidate::Mention(_) => None,
        })
        .collect()
}
