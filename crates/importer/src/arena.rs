//! Candidates for one import run, addressed by stable index.

use std::collections::HashMap;

use crate::api::StrongRef;
use crate::archive::ArchiveRecord;

/// A record being imported, plus the post created for it (if any).
#[derive(Debug, Clone)]
pub struct ImportCandidate {
    pub record: ArchiveRecord,
    pub destination: Option<StrongRef>,
}

/// Ordered candidates with an ID index.
///
/// The post builder only reads from the arena; the run loop is the one
/// writer and records each destination after the post is created.
#[derive(Debug, Default)]
pub struct Arena {
    candidates: Vec<ImportCandidate>,
    by_id: HashMap<String, usize>,
}

impl Arena {
    /// Build an arena in the given (import) order.
    #[must_use]
    pub fn new(records: Vec<ArchiveRecord>) -> Self {
        let by_id = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        let candidates = records
            .into_iter()
            .map(|record| ImportCandidate {
                record,
                destination: None,
            })
            .collect();
        Self { candidates, by_id }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidate at `index`. Panics when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> &ImportCandidate {
        &self.candidates[index]
    }

    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Destination of the candidate with the given record ID.
    #[must_use]
    pub fn destination_of(&self, id: &str) -> Option<&StrongRef> {
        self.index_of(id)
            .and_then(|i| self.candidates[i].destination.as_ref())
    }

    /// Record the post created for the candidate at `index`.
    pub fn set_destination(&mut self, index: usize, destination: StrongRef) {
        self.candidates[index].destination = Some(destination);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImportCandidate> {
        self.candidates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_arena_lookup_and_write_back() {
        let mut arena = Arena::new(vec![
            ArchiveRecord::new("a", Utc::now(), "one"),
            ArchiveRecord::new("b", Utc::now(), "two"),
        ]);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.index_of("b"), Some(1));
        assert!(arena.destination_of("b").is_none());

        arena.set_destination(
            1,
            StrongRef {
                uri: "at://x/app.bsky.feed.post/b".to_string(),
                cid: "cid-b".to_string(),
            },
        );
        assert_eq!(arena.destination_of("b").unwrap().cid, "cid-b");
        assert!(arena.index_of("zzz").is_none());
    }
}
