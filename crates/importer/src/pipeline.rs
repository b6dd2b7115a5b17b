//! Import pipeline - parse, select, then post each record in order.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::PostingApi;
use crate::arena::Arena;
use crate::archive::{self, ArchiveRecord};
use crate::builder::{PostBuilder, PostOutcome, WebClient};
use crate::config::ImportConfig;
use crate::error::ImportError;

/// A record that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Archive ID of the record.
    pub id: String,
    /// What went wrong.
    pub message: String,
}

/// Progress of a run, reported after every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunProgress {
    pub is_processing: bool,
    pub total_records: usize,
    pub processed_records: usize,
    pub progress_percent: f64,
    pub errors: Vec<RecordFailure>,
}

impl RunProgress {
    fn started(total_records: usize) -> Self {
        Self {
            is_processing: true,
            total_records,
            ..Self::default()
        }
    }

    fn advance(&mut self) {
        self.processed_records += 1;
        self.progress_percent = if self.total_records == 0 {
            100.0
        } else {
            self.processed_records as f64 * 100.0 / self.total_records as f64
        };
    }

    fn finish(&mut self) {
        self.is_processing = false;
        self.progress_percent = 100.0;
    }
}

/// Result of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Final progress, including per-record failures.
    pub progress: RunProgress,
    /// Posts created.
    pub posted: usize,
    /// Records built in simulate mode.
    pub simulated: usize,
    /// IDs of video records deferred because the account cannot upload video.
    pub skipped_videos: Vec<String>,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
}

/// Import pipeline orchestrator.
pub struct Pipeline<A: PostingApi> {
    config: ImportConfig,
    builder: PostBuilder<A>,
}

impl<A: PostingApi> Pipeline<A> {
    /// Create a pipeline posting through `api`.
    pub fn new(api: Arc<A>, config: ImportConfig) -> Result<Self> {
        config.validate()?;
        let web = WebClient::new(config.web.clone())?;
        let builder = PostBuilder::new(api, web, config.build_options());
        Ok(Self { config, builder })
    }

    #[must_use]
    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Parse the archive and select the records to import, in import order.
    pub fn prepare(&self, raw: &str) -> Result<Vec<ArchiveRecord>, ImportError> {
        let records = archive::load(raw)?;
        Ok(self.config.selector().select(&records)?)
    }

    /// Parse, select and import an archive.
    pub async fn import<F>(
        &self,
        raw: &str,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<RunSummary, ImportError>
    where
        F: FnMut(&RunProgress),
    {
        let importable = self.prepare(raw)?;
        Ok(self.run(importable, cancel, on_progress).await)
    }

    /// Post each record in order. Failures are recorded per record and never
    /// stop the run; cancellation is checked before each record.
    pub async fn run<F>(
        &self,
        importable: Vec<ArchiveRecord>,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> RunSummary
    where
        F: FnMut(&RunProgress),
    {
        let mut arena = Arena::new(importable);
        let mut summary = RunSummary {
            progress: RunProgress::started(arena.len()),
            ..RunSummary::default()
        };

        tracing::info!(
            total = arena.len(),
            simulate = self.config.simulate,
            "Starting import"
        );

        for index in 0..arena.len() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    processed = summary.progress.processed_records,
                    total = summary.progress.total_records,
                    "Import cancelled"
                );
                summary.cancelled = true;
                break;
            }

            match self.builder.build(&arena, index).await {
                Ok(PostOutcome::Posted(destination)) => {
                    arena.set_destination(index, destination);
                    summary.posted += 1;
                }
                Ok(PostOutcome::Simulated) => summary.simulated += 1,
                Ok(PostOutcome::SkippedVideo) => {
                    summary.skipped_videos.push(arena.get(index).record.id.clone());
                }
                Err(e) => {
                    let id = arena.get(index).record.id.clone();
                    tracing::error!(id = %id, error = %e, "Failed to import record");
                    summary.progress.errors.push(RecordFailure {
                        id,
                        message: e.to_string(),
                    });
                }
            }

            summary.progress.advance();
            on_progress(&summary.progress);
        }

        if summary.cancelled {
            summary.progress.is_processing = false;
        } else {
            summary.progress.finish();
        }
        on_progress(&summary.progress);

        tracing::info!(
            posted = summary.posted,
            simulated = summary.simulated,
            skipped_videos = summary.skipped_videos.len(),
            errors = summary.progress.errors.len(),
            cancelled = summary.cancelled,
            "Import complete"
        );

        summary
    }
}
