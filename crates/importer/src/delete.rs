//! Bulk deletion of the account's posts.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::api::PostingApi;
use crate::config::{DELETE_BATCH_SIZE, DELETE_PAGE_SIZE};
use crate::error::ApiError;

/// Result of a bulk delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub deleted: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Delete every post on the account.
///
/// Pages of 50 are listed and deleted in concurrent batches of 10. Failed
/// deletes are counted and skipped. `on_progress` receives the running
/// summary after each batch.
pub async fn delete_all_posts<A, F>(
    api: &A,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<DeleteSummary, ApiError>
where
    A: PostingApi + ?Sized,
    F: FnMut(&DeleteSummary),
{
    let mut summary = DeleteSummary::default();
    let mut cursor: Option<String> = None;

    loop {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let page = api.list_posts(cursor.as_deref(), DELETE_PAGE_SIZE).await?;
        tracing::debug!(posts = page.posts.len(), cursor = ?page.cursor, "Listed posts");

        for batch in page.posts.chunks(DELETE_BATCH_SIZE) {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let results = join_all(batch.iter().map(|post| api.delete_post(&post.uri))).await;
            for (post, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => summary.deleted += 1,
                    Err(e) => {
                        tracing::warn!(uri = %post.uri, error = %e, "Failed to delete post");
                        summary.failed += 1;
                    }
                }
            }
            on_progress(&summary);
        }

        if summary.cancelled {
            break;
        }
        match page.cursor {
            Some(next) if !page.posts.is_empty() => cursor = Some(next),
            _ => break,
        }
    }

    tracing::info!(
        deleted = summary.deleted,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "Bulk delete finished"
    );
    Ok(summary)
}
