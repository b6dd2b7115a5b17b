//! Twitter/X archive reading.
//!
//! Decodes the `tweets.js` export and projects it onto typed records.

mod normalize;
mod parser;
mod types;

pub use normalize::{normalize, parse_timestamp, RECORD_KEY};
pub use parser::parse;
pub use types::{ArchiveRecord, Media, MediaKind, UrlEntity, VideoVariant};

use crate::error::ImportError;

/// Parse and normalize raw archive text in one step.
pub fn load(raw: &str) -> Result<Vec<ArchiveRecord>, ImportError> {
    let entries = parse(raw)?;
    Ok(normalize(entries)?)
}
