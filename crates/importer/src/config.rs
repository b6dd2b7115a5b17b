//! Import run configuration.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::builder::{BuildOptions, VideoPolling, WebConfig};
use crate::select::{DateWindow, Selector};

/// Default pause between posts.
pub const DEFAULT_POST_DELAY: Duration = Duration::from_millis(2500);

/// Default pause between video job status checks.
pub const DEFAULT_VIDEO_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Default number of video job status checks before giving up.
pub const DEFAULT_VIDEO_MAX_POLLS: u32 = 400;

/// Page size used when listing posts for deletion.
pub const DELETE_PAGE_SIZE: u32 = 50;

/// Deletes issued concurrently within a page.
pub const DELETE_BATCH_SIZE: usize = 10;

/// Configuration for one import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Folder holding the exported media files.
    pub media_dir: PathBuf,
    /// Only records created inside this window are imported.
    pub window: DateWindow,
    /// Pause before each post.
    pub post_delay: Duration,
    /// Explicit record selection; `None` imports everything eligible.
    pub ids: Option<Vec<String>>,
    /// Handles of the importing account.
    pub own_handles: Vec<String>,
    /// Build posts without sending anything.
    pub simulate: bool,
    /// Video job polling.
    pub video: VideoPolling,
    /// Link expansion and card endpoints.
    pub web: WebConfig,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("."),
            window: DateWindow::unbounded(),
            post_delay: DEFAULT_POST_DELAY,
            ids: None,
            own_handles: Vec::new(),
            simulate: false,
            video: VideoPolling::default(),
            web: WebConfig::default(),
        }
    }
}

impl ImportConfig {
    /// Reject settings that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.window.min, self.window.max) {
            if min > max {
                bail!("minimum date {min} is after maximum date {max}");
            }
        }
        if self.video.max_polls == 0 {
            bail!("video polling needs at least one status check");
        }
        if self.ids.as_ref().is_some_and(Vec::is_empty) {
            bail!("an explicit ID selection must name at least one record");
        }
        Ok(())
    }

    /// Selector for this run.
    #[must_use]
    pub fn selector(&self) -> Selector {
        let selector = Selector::new(self.window).with_own_handles(self.own_handles.clone());
        match &self.ids {
            Some(ids) => selector.with_ids(ids.iter().cloned()),
            None => selector,
        }
    }

    /// Builder settings for this run.
    #[must_use]
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            media_dir: self.media_dir.clone(),
            own_handles: self.own_handles.clone(),
            post_delay: self.post_delay,
            simulate: self.simulate,
            video: self.video.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::parse_timestamp;

    #[test]
    fn test_default_config_is_valid() {
        let config = ImportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.post_delay, Duration::from_millis(2500));
        assert_eq!(config.video.max_polls, 400);
    }

    #[test]
    fn test_rejects_inverted_window() {
        let config = ImportConfig {
            window: DateWindow {
                min: parse_timestamp("2021-01-01"),
                max: parse_timestamp("2020-01-01"),
            },
            ..ImportConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_id_selection() {
        let config = ImportConfig {
            ids: Some(Vec::new()),
            ..ImportConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_options_carry_settings() {
        let config = ImportConfig {
            simulate: true,
            own_handles: vec!["me".to_string()],
            ..ImportConfig::default()
        };
        let options = config.build_options();
        assert!(options.simulate);
        assert_eq!(options.own_handles, vec!["me".to_string()]);
    }
}
