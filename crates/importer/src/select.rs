//! Record selection: which archived tweets get imported, and in what order.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use crate::archive::ArchiveRecord;
use crate::error::SelectError;

/// Status URL on the source platform; a tweet linking one is a quote.
pub(crate) static STATUS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|mobile\.)?(?:twitter|x)\.com/([^/]+)/status/(\d+)").unwrap()
});

/// Inclusive date range. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub min: Option<DateTime<Utc>>,
    pub max: Option<DateTime<Utc>>,
}

impl DateWindow {
    /// Window with both bounds open.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    /// Whether `at` falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.min.is_none_or(|min| at >= min) && self.max.is_none_or(|max| at <= max)
    }
}

/// Why a record is (or is not) importable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eligibility {
    Importable,
    /// Links a status on the source platform.
    Quote,
    /// Starts with the `RT ` marker.
    Retweet,
    /// Replies to (or opens with a mention of) another account.
    Reply,
    /// Created outside the date window.
    OutsideWindow,
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Importable => "importable",
            Self::Quote => "quote",
            Self::Retweet => "retweet",
            Self::Reply => "reply",
            Self::OutsideWindow => "outside date window",
        };
        f.write_str(s)
    }
}

/// Whether the record links a status on the source platform.
#[must_use]
pub fn is_quote_record(record: &ArchiveRecord) -> bool {
    record
        .urls
        .iter()
        .any(|u| STATUS_URL.is_match(&u.expanded_url))
}

/// Whether the record quotes a status from an account other than `own_handles`.
fn quotes_other_account(record: &ArchiveRecord, own_handles: &[String]) -> bool {
    record.urls.iter().any(|u| {
        STATUS_URL
            .captures(&u.expanded_url)
            .is_some_and(|c| !is_own_handle(&c[1], own_handles))
    })
}

pub(crate) fn is_own_handle(handle: &str, own_handles: &[String]) -> bool {
    own_handles.iter().any(|own| own.eq_ignore_ascii_case(handle))
}

/// Look a record up by ID and report whether it is a quote.
pub fn is_quote(records: &[ArchiveRecord], id: &str) -> Result<bool, SelectError> {
    records
        .iter()
        .find(|r| r.id == id)
        .map(is_quote_record)
        .ok_or_else(|| SelectError::UnknownRecord(id.to_string()))
}

/// Classify one record. Checks run in a fixed order; the first failing one wins.
#[must_use]
pub fn classify(record: &ArchiveRecord, window: &DateWindow, own_handles: &[String]) -> Eligibility {
    if quotes_other_account(record, own_handles) {
        return Eligibility::Quote;
    }
    if record.full_text.starts_with("RT ") {
        return Eligibility::Retweet;
    }

    let replies_to_other = record
        .reply_to_handle
        .as_deref()
        .is_some_and(|h| !is_own_handle(h, own_handles));
    if replies_to_other || record.full_text.starts_with('@') {
        return Eligibility::Reply;
    }

    if !window.contains(record.created_at) {
        return Eligibility::OutsideWindow;
    }
    Eligibility::Importable
}

/// Filter and order records for import, ascending by creation time.
///
/// Ties keep their input order.
#[must_use]
pub fn select(records: &[ArchiveRecord], window: &DateWindow) -> Vec<ArchiveRecord> {
    Selector::new(*window).importable(records)
}

/// Selection settings beyond the date window.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    window: DateWindow,
    own_handles: Vec<String>,
    ids: Option<HashSet<String>>,
}

impl Selector {
    #[must_use]
    pub fn new(window: DateWindow) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    /// Handles of the importing account; replies to these are kept as threads.
    #[must_use]
    pub fn with_own_handles(mut self, handles: Vec<String>) -> Self {
        self.own_handles = handles
            .into_iter()
            .map(|h| h.trim_start_matches('@').to_string())
            .collect();
        self
    }

    /// Restrict the output to the given record IDs.
    #[must_use]
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.ids = Some(ids.into_iter().collect());
        self
    }

    /// Select importable records, honoring an explicit ID selection.
    pub fn select(&self, records: &[ArchiveRecord]) -> Result<Vec<ArchiveRecord>, SelectError> {
        if let Some(ids) = &self.ids {
            let known: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
            if let Some(missing) = ids.iter().find(|id| !known.contains(id.as_str())) {
                return Err(SelectError::UnknownRecord(missing.clone()));
            }
        }
        Ok(self.importable(records))
    }

    /// Classification of every record, in input order.
    #[must_use]
    pub fn classify_all<'a>(
        &self,
        records: &'a [ArchiveRecord],
    ) -> Vec<(&'a ArchiveRecord, Eligibility)> {
        records
            .iter()
            .map(|r| (r, classify(r, &self.window, &self.own_handles)))
            .collect()
    }

    fn importable(&self, records: &[ArchiveRecord]) -> Vec<ArchiveRecord> {
        let mut selected: Vec<ArchiveRecord> = records
            .iter()
            .filter(|r| self.ids.as_ref().is_none_or(|ids| ids.contains(&r.id)))
            .filter(|r| classify(r, &self.window, &self.own_handles) == Eligibility::Importable)
            .cloned()
            .collect();

        // sort_by_key is stable
        selected.sort_by_key(|r| r.created_at);

        tracing::info!(
            total = records.len(),
            importable = selected.len(),
            "Selected records for import"
        );
        selected
    }
}
