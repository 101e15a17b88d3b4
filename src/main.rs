use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sitemirror::{Crawler, ScopePolicy, logging::init_logging};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "sitemirror",
    version,
    about = "Mirror a website to disk: every page, image, stylesheet and script"
)]
struct Cli {
    #[arg(value_name = "URL", default_value = "https://books.toscrape.com/")]
    url: String,

    /// Output directory; deleted and recreated before crawling
    #[arg(short, long, value_name = "DIR", default_value = "ScrapedSite")]
    output: PathBuf,

    #[arg(long, value_name = "N", default_value_t = 5)]
    workers: usize,

    #[arg(long, value_name = "N", default_value_t = 5)]
    fetch_concurrency: usize,

    #[arg(long, value_enum, default_value_t = ScopeArg::SameHost)]
    scope: ScopeArg,

    /// Delay before the first completion check
    #[arg(long, value_name = "MS", default_value_t = 5_000)]
    grace_ms: u64,

    #[arg(long, value_name = "MS", default_value_t = 1_000)]
    poll_ms: u64,

    /// Progress line interval; 0 disables progress output
    #[arg(long, value_name = "MS", default_value_t = 2_000)]
    progress_ms: u64,

    /// Per-request timeout; unbounded when omitted
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
enum ScopeArg {
    SameHost,
    Unrestricted,
}

impl From<ScopeArg> for ScopePolicy {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::SameHost => ScopePolicy::SameHost,
            ScopeArg::Unrestricted => ScopePolicy::Unrestricted,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging("info").map_err(|e| anyhow::anyhow!("could not initialize logging: {e}"))?;

    let mut builder = Crawler::builder()
        .workers(cli.workers)
        .fetch_concurrency(cli.fetch_concurrency)
        .scope(cli.scope.into())
        .grace_period(Duration::from_millis(cli.grace_ms))
        .poll_interval(Duration::from_millis(cli.poll_ms));
    if cli.progress_ms > 0 {
        builder = builder.report_progress(Duration::from_millis(cli.progress_ms));
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        builder = builder.request_timeout(Duration::from_millis(timeout_ms));
    }
    let crawler = builder.build().context("invalid crawler configuration")?;

    let cancel_token = CancellationToken::new();
    let handle = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, finishing in-flight fetches");
            handle.cancel();
        }
    });

    let stats = crawler
        .crawl_with_cancellation(&cli.url, &cli.output, cancel_token)
        .await
        .with_context(|| format!("could not mirror {}", cli.url))?;

    println!(
        "\nProcessing finished in {:.1}s, the site can be found at {}.",
        stats.elapsed().as_secs_f64(),
        cli.output.display()
    );
    println!(
        "{} files saved, {} urls failed (see {}).",
        stats.artifacts_saved,
        stats.errors_encountered,
        cli.output.join(sitemirror::ERROR_LOG_FILE).display()
    );

    Ok(())
}
