//! Importer CLI - replay a Twitter/X archive onto a Bluesky account.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use importer::api::{
    OfflineApi, PostingApi, ResilientApi, XrpcClient, XrpcConfig, DEFAULT_SERVICE,
};
use importer::archive::{self, parse_timestamp};
use importer::config::ImportConfig;
use importer::delete::delete_all_posts;
use importer::pipeline::{Pipeline, RunProgress, RunSummary};
use importer::select::{DateWindow, Eligibility};

/// Importer CLI - Replay a Twitter/X archive onto Bluesky.
#[derive(Parser)]
#[command(name = "importer")]
#[command(about = "Twitter/X archive to Bluesky importer")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import an archive onto the account
    Import {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Folder holding the exported media (default: tweets_media next to the archive)
        #[arg(long)]
        media_dir: Option<PathBuf>,

        /// Pause between posts, in milliseconds
        #[arg(long, env = "IMPORTER_DELAY_MS", default_value = "2500")]
        delay_ms: u64,

        /// Build every post but send nothing
        #[arg(long)]
        simulate: bool,

        #[command(flatten)]
        account: AccountArgs,
    },

    /// Show which records would be imported, without touching the network
    Preview {
        #[command(flatten)]
        selection: SelectionArgs,

        /// List every importable record
        #[arg(long)]
        list: bool,
    },

    /// Delete every post on the account
    DeleteAll {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,

        #[command(flatten)]
        account: AccountArgs,
    },
}

#[derive(Args)]
pub struct SelectionArgs {
    /// Archive file (tweets.js)
    archive: PathBuf,

    /// Earliest date to import (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    min_date: Option<String>,

    /// Latest date to import, inclusive (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    max_date: Option<String>,

    /// Import only these record IDs (repeatable)
    #[arg(long = "id")]
    ids: Vec<String>,

    /// Your own handle on the source platform; keeps self-replies as threads (repeatable)
    #[arg(long = "own-handle")]
    own_handles: Vec<String>,
}

#[derive(Args)]
pub struct AccountArgs {
    /// Bluesky handle or email
    #[arg(long, env = "BLUESKY_HANDLE")]
    handle: Option<String>,

    /// Bluesky app password
    #[arg(long, env = "BLUESKY_APP_PASSWORD", hide_env_values = true)]
    app_password: Option<String>,

    /// PDS URL
    #[arg(long, env = "BLUESKY_PDS_URL", default_value = DEFAULT_SERVICE)]
    pds_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("importer=debug,info")
    } else {
        EnvFilter::new("importer=info,warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Import {
            selection,
            media_dir,
            delay_ms,
            simulate,
            account,
        } => run_import(selection, media_dir, delay_ms, simulate, account).await,
        Commands::Preview { selection, list } => run_preview(&selection, list),
        Commands::DeleteAll { yes, account } => run_delete_all(yes, account).await,
    }
}

async fn run_import(
    selection: SelectionArgs,
    media_dir: Option<PathBuf>,
    delay_ms: u64,
    simulate: bool,
    account: AccountArgs,
) -> Result<()> {
    let raw = read_archive(&selection.archive)?;
    let media_dir = media_dir.unwrap_or_else(|| default_media_dir(&selection.archive));

    let config = ImportConfig {
        media_dir,
        window: selection.window()?,
        post_delay: Duration::from_millis(delay_ms),
        ids: (!selection.ids.is_empty()).then(|| selection.ids.clone()),
        own_handles: selection.own_handles.clone(),
        simulate,
        ..ImportConfig::default()
    };
    tracing::info!(
        archive = %selection.archive.display(),
        media_dir = %config.media_dir.display(),
        simulate,
        "Starting import"
    );

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let summary = if simulate {
        println!("{} Simulating: nothing will be posted", "ℹ".blue().bold());
        import_with(Arc::new(OfflineApi), config, &raw, &cancel).await?
    } else {
        let api = connect(&account).await?;
        import_with(Arc::new(api), config, &raw, &cancel).await?
    };

    print_summary(&summary);
    Ok(())
}

async fn import_with<A: PostingApi>(
    api: Arc<A>,
    config: ImportConfig,
    raw: &str,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let pipeline = Pipeline::new(api, config)?;
    let importable = pipeline.prepare(raw).context("Failed to read archive")?;

    let bar = ProgressBar::new(importable.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let summary = pipeline
        .run(importable, cancel, |progress: &RunProgress| {
            bar.set_position(progress.processed_records as u64);
            if !progress.errors.is_empty() {
                bar.set_message(format!("{} errors", progress.errors.len()));
            }
        })
        .await;
    bar.finish_and_clear();
    Ok(summary)
}

fn run_preview(selection: &SelectionArgs, list: bool) -> Result<()> {
    let raw = read_archive(&selection.archive)?;
    let records = archive::load(&raw).context("Failed to read archive")?;

    let config = ImportConfig {
        window: selection.window()?,
        ids: (!selection.ids.is_empty()).then(|| selection.ids.clone()),
        own_handles: selection.own_handles.clone(),
        ..ImportConfig::default()
    };
    config.validate()?;
    let selector = config.selector();

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for (_, eligibility) in selector.classify_all(&records) {
        *counts.entry(eligibility.to_string()).or_default() += 1;
    }
    let importable = selector.select(&records)?;

    println!("\n📋 {} records in {}", records.len(), selection.archive.display());
    for (reason, count) in &counts {
        let line = format!("   {reason}: {count}");
        if reason == &Eligibility::Importable.to_string() {
            println!("{}", line.green());
        } else {
            println!("{}", line.bright_black());
        }
    }
    println!("   selected for import: {}", importable.len().to_string().bold());

    if list {
        println!();
        for record in &importable {
            println!(
                "🔖 {} {}  {}",
                record.id,
                record.created_at.format("%Y-%m-%d").to_string().bright_black(),
                preview(&record.full_text)
            );
        }
    }

    Ok(())
}

async fn run_delete_all(yes: bool, account: AccountArgs) -> Result<()> {
    if !yes {
        bail!("delete-all removes every post on the account; pass --yes to confirm");
    }

    let api = connect(&account).await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(120));
    let summary = delete_all_posts(&api, &cancel, |s| {
        spinner.set_message(format!("{} deleted, {} failed", s.deleted, s.failed));
    })
    .await
    .context("Failed to list posts")?;
    spinner.finish_and_clear();

    println!("{} Deleted {} posts", "✓".green().bold(), summary.deleted);
    if summary.failed > 0 {
        println!("{} {} deletes failed", "⚠".yellow().bold(), summary.failed);
    }
    if summary.cancelled {
        println!("{} Cancelled before finishing", "⚠".yellow().bold());
    }
    Ok(())
}

async fn connect(account: &AccountArgs) -> Result<ResilientApi<XrpcClient>> {
    let (Some(handle), Some(password)) = (&account.handle, &account.app_password) else {
        bail!("BLUESKY_HANDLE and BLUESKY_APP_PASSWORD (or --handle/--app-password) are required");
    };

    let mut config = XrpcConfig::new(handle.clone(), password.clone())?;
    config.service = Url::parse(&account.pds_url)
        .with_context(|| format!("Invalid PDS URL: {}", account.pds_url))?;

    let client = XrpcClient::login(config).await.context("Login failed")?;
    println!("{} Logged in as {}", "✓".green().bold(), client.handle().await.cyan());
    Ok(ResilientApi::new(client))
}

fn cancel_on_ctrl_c(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current record");
            cancel.cancel();
        }
    });
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Import Summary");
    println!("   Processed: {}/{}", summary.progress.processed_records, summary.progress.total_records);
    println!("   Posted: {}", summary.posted.to_string().green());
    if summary.simulated > 0 {
        println!("   Simulated: {}", summary.simulated);
    }
    if !summary.skipped_videos.is_empty() {
        println!(
            "   Skipped videos: {} (confirm your email to upload video)",
            summary.skipped_videos.len().to_string().yellow()
        );
        for id in &summary.skipped_videos {
            println!("     - {id}");
        }
    }
    if !summary.progress.errors.is_empty() {
        println!("   Errors: {}", summary.progress.errors.len().to_string().red());
        for failure in &summary.progress.errors {
            eprintln!("     - {}: {}", failure.id, failure.message);
        }
    }
    if summary.cancelled {
        println!("{} Cancelled before finishing", "⚠".yellow().bold());
    }
}

impl SelectionArgs {
    fn window(&self) -> Result<DateWindow> {
        Ok(DateWindow {
            min: self.min_date.as_deref().map(|s| parse_date(s, false)).transpose()?,
            max: self.max_date.as_deref().map(|s| parse_date(s, true)).transpose()?,
        })
    }
}

/// Parse a date bound. A bare `YYYY-MM-DD` upper bound covers the whole day.
fn parse_date(value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    let at = parse_timestamp(value).with_context(|| format!("Invalid date: {value}"))?;
    let bare_date = value.len() == 10;
    if end_of_day && bare_date {
        Ok(at + ChronoDuration::days(1) - ChronoDuration::milliseconds(1))
    } else {
        Ok(at)
    }
}

fn read_archive(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn default_media_dir(archive: &Path) -> PathBuf {
    archive
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("tweets_media")
}

/// Truncate text for preview, respecting UTF-8 character boundaries.
fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 60;

    let line = text.replace('\n', " ");
    if line.chars().count() <= MAX_CHARS {
        line
    } else {
        let truncated: String = line.chars().take(MAX_CHARS).collect();
        format!("{truncated}...")
    }
}
