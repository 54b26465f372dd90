//! Normalizes terminal job bodies into typed responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{Document, JobKind, JobStatus, StatusPage};
use crate::error::{Result, ScrapelessError};

/// Common shape of batch-scrape and crawl results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEnvelope {
    pub success: bool,
    pub status: JobStatus,
    pub total: u64,
    pub completed: u64,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    pub data: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusEnvelope {
    pub fn from_page(page: StatusPage) -> Result<Self> {
        let data = match page.data {
            None | Some(Value::Null) => Vec::new(),
            Some(items @ Value::Array(_)) => serde_json::from_value(items)?,
            Some(other) => {
                return Err(ScrapelessError::Parse(format!(
                    "expected an array of documents, got {other}"
                )))
            }
        };

        Ok(Self {
            success: page.success.unwrap_or(page.error.is_none()),
            status: page.status,
            total: page.total.unwrap_or_default(),
            completed: page.completed.unwrap_or_default(),
            expires_at: page.expires_at.as_deref().and_then(parse_timestamp),
            next: page.next.filter(|n| !n.is_empty()),
            data,
            error: page.error,
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Result of a single-URL scrape: the document plus job status fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub success: bool,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub document: Document,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub success: bool,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Value>,
}

/// A finished job, by kind.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobResponse {
    Scrape(ScrapeResponse),
    BatchScrape(StatusEnvelope),
    Crawl(StatusEnvelope),
    Extract(ExtractResponse),
}

impl JobResponse {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Scrape(_) => JobKind::Scrape,
            Self::BatchScrape(_) => JobKind::BatchScrape,
            Self::Crawl(_) => JobKind::Crawl,
            Self::Extract(_) => JobKind::Extract,
        }
    }
}

/// Shape a status page according to its job kind.
pub fn assemble(kind: JobKind, page: StatusPage) -> Result<JobResponse> {
    Ok(match kind {
        JobKind::Scrape => JobResponse::Scrape(scrape_response(page)?),
        JobKind::BatchScrape => JobResponse::BatchScrape(StatusEnvelope::from_page(page)?),
        JobKind::Crawl => JobResponse::Crawl(StatusEnvelope::from_page(page)?),
        JobKind::Extract => JobResponse::Extract(extract_response(page)),
    })
}

pub fn scrape_response(page: StatusPage) -> Result<ScrapeResponse> {
    // document fields arrive next to the status fields, so they sit in `rest`
    let document: Document = serde_json::from_value(Value::Object(page.rest))?;
    Ok(ScrapeResponse {
        success: page.success.unwrap_or(page.error.is_none()),
        status: page.status,
        warning: page.warning,
        error: page.error,
        document,
    })
}

pub fn extract_response(page: StatusPage) -> ExtractResponse {
    ExtractResponse {
        success: page.success.unwrap_or(page.error.is_none()),
        status: page.status,
        data: page.data,
        warning: page.warning,
        error: page.error,
        sources: page.sources,
    }
}

/// Outcome of a one-shot crawl status check.
///
/// An unsuccessful body that carries an `error` string is handed back as
/// `Failed` rather than raised, so callers can inspect partial results.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CrawlStatusOutcome {
    Ready(StatusEnvelope),
    Failed {
        #[serde(flatten)]
        envelope: StatusEnvelope,
        error: String,
    },
}

impl CrawlStatusOutcome {
    pub fn from_page(page: StatusPage) -> Result<Self> {
        let mut envelope = StatusEnvelope::from_page(page)?;
        match envelope.error.take() {
            Some(error) if !envelope.success => {
                envelope.success = false;
                Ok(Self::Failed { envelope, error })
            }
            error => {
                envelope.error = error;
                Ok(Self::Ready(envelope))
            }
        }
    }

    pub fn envelope(&self) -> &StatusEnvelope {
        match self {
            Self::Ready(envelope) | Self::Failed { envelope, .. } => envelope,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
