//! Thread and quote linkage to posts created earlier in the run.

use std::collections::HashSet;

use crate::api::{ReplyRef, StrongRef};
use crate::arena::Arena;
use crate::archive::ArchiveRecord;
use crate::select::{is_own_handle, STATUS_URL};

/// Reply reference for the candidate at `index`.
///
/// Only replies to one of `own_handles` are linked. The parent is the
/// replied-to record; the root is found by following reply pointers up
/// through the arena. Both must already have been posted.
#[must_use]
pub fn resolve_reply(arena: &Arena, index: usize, own_handles: &[String]) -> Option<ReplyRef> {
    let record = &arena.get(index).record;
    let handle = record.reply_to_handle.as_deref()?;
    if !is_own_handle(handle, own_handles) {
        return None;
    }

    let parent_id = record.reply_to_status_id.as_deref()?;
    let parent_index = arena.index_of(parent_id)?;
    let parent = arena.get(parent_index).destination.clone()?;

    let mut root_index = parent_index;
    let mut seen = HashSet::from([index, parent_index]);
    loop {
        let current = &arena.get(root_index).record;
        let up = current
            .reply_to_handle
            .as_deref()
            .filter(|h| is_own_handle(h, own_handles))
            .and(current.reply_to_status_id.as_deref())
            .and_then(|id| arena.index_of(id));
        match up {
            Some(next) if seen.insert(next) => root_index = next,
            Some(_) => {
                tracing::warn!(id = %record.id, "Reply chain loops, using last record reached as root");
                break;
            }
            None => break,
        }
    }

    let root = arena.get(root_index).destination.clone()?;
    Some(ReplyRef { root, parent })
}

/// Post created in this run for an own status the record links to.
#[must_use]
pub fn quoted_record(arena: &Arena, record: &ArchiveRecord, own_handles: &[String]) -> Option<StrongRef> {
    record.urls.iter().find_map(|u| {
        let caps = STATUS_URL.captures(&u.expanded_url)?;
        if !is_own_handle(&caps[1], own_handles) {
            return None;
        }
        arena.destination_of(&caps[2]).cloned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::UrlEntity;
    use chrono::Utc;

    fn strong(id: &str) -> StrongRef {
        StrongRef {
            uri: format!("at://did:plc:me/app.bsky.feed.post/{id}"),
            cid: format!("cid-{id}"),
        }
    }

    fn reply(id: &str, to_handle: &str, to_id: &str) -> ArchiveRecord {
        let mut r = ArchiveRecord::new(id, Utc::now(), "more");
        r.reply_to_handle = Some(to_handle.to_string());
        r.reply_to_status_id = Some(to_id.to_string());
        r
    }

    fn own() -> Vec<String> {
        vec!["me".to_string()]
    }

    #[test]
    fn test_resolves_parent_and_root() {
        let mut arena = Arena::new(vec![
            ArchiveRecord::new("1", Utc::now(), "start"),
            reply("2", "me", "1"),
            reply("3", "ME", "2"),
        ]);
        arena.set_destination(0, strong("1"));
        arena.set_destination(1, strong("2"));

        let linked = resolve_reply(&arena, 2, &own()).unwrap();
        assert_eq!(linked.parent, strong("2"));
        assert_eq!(linked.root, strong("1"));

        let first = resolve_reply(&arena, 1, &own()).unwrap();
        assert_eq!(first.parent, strong("1"));
        assert_eq!(first.root, strong("1"));
    }

    #[test]
    fn test_no_reply_without_destinations_or_own_handle() {
        let mut arena = Arena::new(vec![
            ArchiveRecord::new("1", Utc::now(), "start"),
            reply("2", "me", "1"),
            reply("3", "someone", "1"),
        ]);
        assert!(resolve_reply(&arena, 1, &own()).is_none());

        arena.set_destination(0, strong("1"));
        assert!(resolve_reply(&arena, 2, &own()).is_none());
        assert!(resolve_reply(&arena, 1, &[]).is_none());
    }

    #[test]
    fn test_reply_cycle_terminates() {
        let mut arena = Arena::new(vec![reply("a", "me", "b"), reply("b", "me", "a"), reply("c", "me", "a")]);
        arena.set_destination(0, strong("a"));
        arena.set_destination(1, strong("b"));

        let linked = resolve_reply(&arena, 2, &own()).unwrap();
        assert_eq!(linked.parent, strong("a"));
        assert_eq!(linked.root, strong("b"));
    }

    #[test]
    fn test_quoted_record() {
        let mut quoting = ArchiveRecord::new("2", Utc::now(), "see");
        quoting.urls.push(UrlEntity {
            url: "https://t.co/x".to_string(),
            expanded_url: "https://twitter.com/Me/status/1".to_string(),
        });
        let mut arena = Arena::new(vec![ArchiveRecord::new("1", Utc::now(), "orig"), quoting.clone()]);

        assert!(quoted_record(&arena, &quoting, &own()).is_none());
        arena.set_destination(0, strong("1"));
        assert_eq!(quoted_record(&arena, &quoting, &own()), Some(strong("1")));
        assert!(quoted_record(&arena, &quoting, &[]).is_none());
    }
}
