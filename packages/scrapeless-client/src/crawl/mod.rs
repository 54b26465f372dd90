//! Scraping crawl API: scrape, batch scrape, crawl and extract jobs.
//!
//! Jobs are submitted once ([`submit`]), polled until terminal
//! ([`poller`]), and shaped into typed responses ([`assembler`]).
//! [`ScrapingCrawl`] ties the pieces together.

pub mod assembler;
pub mod poller;
mod service;
pub mod submit;
pub mod types;

pub use assembler::{
    CrawlStatusOutcome, ExtractResponse, JobResponse, ScrapeResponse, StatusEnvelope,
};
pub use poller::{JobPoller, PollOptions, MIN_POLL_INTERVAL};
pub use service::ScrapingCrawl;
pub use submit::JobSubmitter;
pub use types::{
    CancelResponse, CrawlErrors, CrawlParams, CrawlStatusQuery, Document, DocumentMetadata,
    ExtractParams, JobKind, JobStatus, JobSubmission, ScrapeFormat, ScrapeOptions, ScrapeParams,
    StatusPage,
};
