//! `scrapeless` command-line tool.
//!
//! Every command prints its result as JSON on stdout; logs go to stderr.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scrapeless_client::browser::BrowserOptions;
use scrapeless_client::crawl::{CrawlStatusQuery, ScrapeFormat, ScrapeOptions};
use scrapeless_client::proxies::{generate_session_id, ProxyOptions};
use scrapeless_client::{
    CrawlParams, ExtractParams, JobKind, PollOptions, ScrapeParams, ScrapelessClient,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scrapeless")]
#[command(about = "Scrape, crawl and extract through the Scrapeless platform")]
struct Cli {
    /// Seconds between status checks (never less than 2)
    #[arg(long, global = true, default_value_t = 2)]
    poll_interval: u64,

    /// Give up waiting for a job after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a single URL
    Scrape {
        url: String,
        /// Output formats, e.g. markdown, html, links
        #[arg(long, value_delimiter = ',')]
        formats: Vec<String>,
    },

    /// Scrape several URLs as one job
    BatchScrape {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long)]
        ignore_invalid_urls: bool,
    },

    /// Crawl a site starting from a URL
    Crawl {
        url: String,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        max_depth: Option<u32>,
        /// Submit and print the job id without waiting
        #[arg(long)]
        no_wait: bool,
    },

    /// Extract structured data from URLs
    Extract {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Check the status of a job once
    Status { kind: Kind, id: String },

    /// Wait for a previously submitted job
    Wait { kind: Kind, id: String },

    /// Cancel a crawl job
    Cancel { id: String },

    /// List pages a crawl job failed on
    Errors { id: String },

    /// Print a residential proxy URL
    Proxy {
        #[arg(long, default_value = "ANY")]
        country: String,
        #[arg(long)]
        gateway: String,
        #[arg(long = "type", default_value = "residential")]
        proxy_type: String,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        city: Option<String>,
        /// Sticky session length in minutes
        #[arg(long, default_value_t = 10)]
        session_duration: u32,
    },

    /// Open a scraping browser session and print its WebSocket endpoint
    BrowserUrl {
        #[arg(long)]
        session_name: Option<String>,
        /// Session lifetime in seconds
        #[arg(long)]
        ttl: Option<u32>,
        #[arg(long)]
        proxy_country: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Scrape,
    BatchScrape,
    Crawl,
    Extract,
}

impl From<Kind> for JobKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Scrape => JobKind::Scrape,
            Kind::BatchScrape => JobKind::BatchScrape,
            Kind::Crawl => JobKind::Crawl,
            Kind::Extract => JobKind::Extract,
        }
    }
}

fn parse_formats(raw: &[String]) -> Result<Option<Vec<ScrapeFormat>>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.iter()
        .map(|f| {
            serde_json::from_value(serde_json::Value::String(f.clone()))
                .with_context(|| format!("unknown format {f:?}"))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Poll settings from the global flags. Without `--timeout` the library's
/// default deadline stays in place.
fn poll_options(cli: &Cli) -> PollOptions {
    let mut poll = PollOptions::default().with_interval(Duration::from_secs(cli.poll_interval));
    if let Some(secs) = cli.timeout {
        poll = poll.with_timeout(Some(Duration::from_secs(secs)));
    }
    poll
}

fn print<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scrapeless_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let poll = poll_options(&cli);

    let client = ScrapelessClient::from_env().context("Failed to configure Scrapeless client")?;
    tracing::debug!(base_api_url = %client.config().base_api_url, "client configured");
    let crawl = &client.scraping_crawl;

    match cli.command {
        Commands::Scrape { url, formats } => {
            let params = ScrapeParams {
                options: ScrapeOptions {
                    formats: parse_formats(&formats)?,
                    ..Default::default()
                },
                browser_options: None,
            };
            let doc = crawl.scrape_url(&url, Some(&params), poll).await?;
            print(&doc, cli.pretty)?;
        }
        Commands::BatchScrape {
            urls,
            ignore_invalid_urls,
        } => {
            let result = crawl
                .batch_scrape_urls(&urls, None, ignore_invalid_urls.then_some(true), poll)
                .await?;
            print(&result, cli.pretty)?;
        }
        Commands::Crawl {
            url,
            limit,
            max_depth,
            no_wait,
        } => {
            let params = CrawlParams {
                limit,
                max_depth,
                ..Default::default()
            };
            if no_wait {
                print(&crawl.async_crawl_url(&url, Some(&params)).await?, cli.pretty)?;
            } else {
                print(&crawl.crawl_url(&url, Some(&params), poll).await?, cli.pretty)?;
            }
        }
        Commands::Extract { urls, prompt } => {
            let params = ExtractParams {
                prompt,
                ..Default::default()
            };
            print(&crawl.extract_urls(&urls, Some(&params), poll).await?, cli.pretty)?;
        }
        Commands::Status { kind, id } => {
            let kind = JobKind::from(kind);
            if kind == JobKind::Crawl {
                print(&crawl.check_crawl_status(&id, CrawlStatusQuery::default()).await?, cli.pretty)?;
            } else {
                print(&crawl.job_status(kind, &id).await?, cli.pretty)?;
            }
        }
        Commands::Wait { kind, id } => {
            print(&crawl.wait_for_job(kind.into(), &id, poll).await?, cli.pretty)?;
        }
        Commands::Cancel { id } => {
            print(&crawl.cancel_crawl(&id).await?, cli.pretty)?;
        }
        Commands::Errors { id } => {
            print(&crawl.check_crawl_errors(&id).await?, cli.pretty)?;
        }
        Commands::Proxy {
            country,
            gateway,
            proxy_type,
            state,
            city,
            session_duration,
        } => {
            let url = client.proxies.proxy(&ProxyOptions {
                proxy_type,
                country,
                state,
                city,
                session_duration,
                session_id: generate_session_id(),
                gateway,
            });
            print(&serde_json::json!({ "proxy": url }), cli.pretty)?;
        }
        Commands::BrowserUrl {
            session_name,
            ttl,
            proxy_country,
        } => {
            let options = BrowserOptions {
                session_name,
                session_ttl: ttl,
                proxy_country,
                ..Default::default()
            };
            let session = client.browser.create_session(&options).await?;
            print(&session, cli.pretty)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrapeless_client::crawl::poller::DEFAULT_POLL_TIMEOUT;

    #[test]
    fn test_parse_crawl_flags() {
        let cli = Cli::try_parse_from([
            "scrapeless",
            "crawl",
            "https://example.com",
            "--limit",
            "5",
            "--max-depth",
            "2",
            "--poll-interval",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.poll_interval, 3);
        match cli.command {
            Commands::Crawl { limit, max_depth, no_wait, .. } => {
                assert_eq!(limit, Some(5));
                assert_eq!(max_depth, Some(2));
                assert!(!no_wait);
            }
            _ => panic!("expected crawl"),
        }
    }

    #[test]
    fn test_timeout_flag_overrides_default_deadline_only_when_given() {
        let cli = Cli::try_parse_from(["scrapeless", "wait", "crawl", "c1"]).unwrap();
        let poll = poll_options(&cli);
        assert_eq!(poll.timeout, Some(DEFAULT_POLL_TIMEOUT));
        assert_eq!(poll.timeout, Some(Duration::from_secs(1800)));

        let cli =
            Cli::try_parse_from(["scrapeless", "wait", "crawl", "c1", "--timeout", "90"]).unwrap();
        assert_eq!(poll_options(&cli).timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_parse_formats() {
        let formats = parse_formats(&["markdown".into(), "rawHtml".into()]).unwrap().unwrap();
        assert_eq!(formats, vec![ScrapeFormat::Markdown, ScrapeFormat::RawHtml]);
        assert!(parse_formats(&["pdf".into()]).is_err());
        assert!(parse_formats(&[]).unwrap().is_none());
    }

    #[test]
    fn test_status_kind_values() {
        let cli = Cli::try_parse_from(["scrapeless", "status", "batch-scrape", "b1"]).unwrap();
        match cli.command {
            Commands::Status { kind, id } => {
                assert_eq!(JobKind::from(kind), JobKind::BatchScrape);
                assert_eq!(id, "b1");
            }
            _ => panic!("expected status"),
        }
    }
}
