//! Per-record post construction.
//!
//! [`PostBuilder::build`] turns one arena candidate into a destination post:
//! cleaned text, uploaded media or a link card, quote and reply linkage, and
//! facets. It never writes to the arena; the caller records the returned
//! reference.

pub mod cards;
pub mod media;
pub mod reply;
pub mod text;
pub mod web;

pub use media::VideoPolling;
pub use web::{WebClient, WebConfig};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::api::{facets, Embed, PostRecord, PostingApi, RecordEmbed, StrongRef};
use crate::arena::Arena;
use crate::error::BuildError;

/// Settings for building posts.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Folder holding the exported media files.
    pub media_dir: PathBuf,
    /// Handles of the importing account, for thread and quote linkage.
    pub own_handles: Vec<String>,
    /// Pause before each post is created.
    pub post_delay: Duration,
    /// Build everything locally but make no network calls.
    pub simulate: bool,
    pub video: VideoPolling,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("."),
            own_handles: Vec::new(),
            post_delay: crate::config::DEFAULT_POST_DELAY,
            simulate: false,
            video: VideoPolling::default(),
        }
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// The post was created.
    Posted(StrongRef),
    /// Simulated run; nothing was sent.
    Simulated,
    /// Leads with a video but the account cannot upload video.
    SkippedVideo,
}

/// Builds and submits posts for arena candidates.
pub struct PostBuilder<A: PostingApi> {
    api: Arc<A>,
    web: WebClient,
    options: BuildOptions,
    email_confirmed: OnceCell<bool>,
}

impl<A: PostingApi> PostBuilder<A> {
    pub fn new(api: Arc<A>, web: WebClient, options: BuildOptions) -> Self {
        Self {
            api,
            web,
            options,
            email_confirmed: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Build the post for the candidate at `index` and, unless simulating,
    /// create it.
    pub async fn build(&self, arena: &Arena, index: usize) -> Result<PostOutcome, BuildError> {
        let record = &arena.get(index).record;
        let simulate = self.options.simulate;
        let leads_with_video = record.leads_with_video();

        if leads_with_video && !simulate && !self.email_confirmed().await? {
            tracing::warn!(id = %record.id, "Email not confirmed, skipping video post");
            return Ok(PostOutcome::SkippedVideo);
        }

        let web = (!simulate).then_some(&self.web);
        let text = text::clean_text(record, web).await;

        let media_embed = if leads_with_video {
            let video = media::plan_video(record, &self.options.media_dir)?;
            if simulate {
                None
            } else {
                let blob = media::upload_video(self.api.as_ref(), &video, &self.options.video).await?;
                Some(Embed::Video { video: blob })
            }
        } else {
            let images = media::plan_images(record, &self.options.media_dir)?;
            if images.is_empty() || simulate {
                None
            } else {
                let images = media::upload_images(self.api.as_ref(), &images).await?;
                Some(Embed::Images { images })
            }
        };

        let card_embed = match (&media_embed, simulate) {
            (None, false) => match cards::first_external_url(record, &text) {
                Some(url) => cards::build_card(&self.web, self.api.as_ref(), &url)
                    .await
                    .map(|external| Embed::External { external }),
                None => None,
            },
            _ => None,
        };

        let quoted = reply::quoted_record(arena, record, &self.options.own_handles);
        let embed = match (quoted, media_embed.or(card_embed)) {
            (Some(record), Some(media)) => Some(Embed::RecordWithMedia {
                record: RecordEmbed { record },
                media: Box::new(media),
            }),
            (Some(record), None) => Some(Embed::Record { record }),
            (None, media) => media,
        };
        let reply = reply::resolve_reply(arena, index, &self.options.own_handles);

        if simulate {
            tracing::info!(
                id = %record.id,
                text = %text,
                reply = reply.is_some(),
                quote = matches!(embed, Some(Embed::Record { .. } | Embed::RecordWithMedia { .. })),
                "Simulated post"
            );
            return Ok(PostOutcome::Simulated);
        }

        let facets = match self.api.detect_facets(&text).await {
            Ok(facets) => facets,
            Err(e) => {
                tracing::warn!(id = %record.id, error = %e, "Facet detection failed, linking URLs only");
                facets::link_facets(&text)
            }
        };

        let mut post = PostRecord::new(text, record.created_at);
        post.facets = facets;
        post.embed = embed;
        post.reply = reply;

        if !self.options.post_delay.is_zero() {
            tokio::time::sleep(self.options.post_delay).await;
        }

        let created = self.api.create_post(&post).await?;
        tracing::info!(
            id = %record.id,
            uri = %created.uri,
            embed = post.embed.as_ref().map_or("none", Embed::kind),
            "Posted"
        );
        Ok(PostOutcome::Posted(created))
    }

    async fn email_confirmed(&self) -> Result<bool, BuildError> {
        let confirmed = self
            .email_confirmed
            .get_or_try_init(|| self.api.is_email_confirmed())
            .await?;
        Ok(*confirmed)
    }
}
