//! Scrapeless platform REST API client.
//!
//! Covers the scraping crawl API (scrape, batch scrape, crawl, extract),
//! scraping browser sessions, captcha solving, proxies, actors and actor
//! storage. Long-running jobs are submitted once and polled until they reach
//! a terminal status.
//!
//! # Example
//!
//! ```rust,ignore
//! use scrapeless_client::{CrawlParams, PollOptions, ScrapelessClient, ScrapelessConfig};
//!
//! let client = ScrapelessClient::new(ScrapelessConfig::new("your-api-key"))?;
//!
//! let params = CrawlParams {
//!     limit: Some(10),
//!     ..Default::default()
//! };
//! let crawl = client
//!     .scraping_crawl
//!     .crawl_url("https://example.com", Some(&params), PollOptions::default())
//!     .await?;
//! for doc in &crawl.data {
//!     let source = doc.metadata.as_ref().and_then(|m| m.source_url.as_deref());
//!     println!("{}", source.unwrap_or("(unknown)"));
//! }
//! ```

pub mod actor;
pub mod browser;
pub mod captcha;
pub mod cdp;
pub mod client;
pub mod config;
pub mod crawl;
pub mod credentials;
pub mod error;
pub mod proxies;
pub mod scraping;
pub mod storage;
pub mod testing;
pub mod transport;
pub mod universal;

pub use actor::{Actor, ActorContext};
pub use client::ScrapelessClient;
pub use config::{ResolvedConfig, ScrapelessConfig};
pub use credentials::{ApiKey, SecretString};
pub use crawl::{
    CrawlParams, CrawlStatusOutcome, ExtractParams, ExtractResponse, JobKind, JobResponse, JobStatus,
    PollOptions, ScrapeParams, ScrapeResponse, ScrapingCrawl, StatusEnvelope,
};
pub use error::{Result, ScrapelessError};
pub use transport::{ApiReply, ApiRequest, HttpTransport, SharedTransport, Transport};
