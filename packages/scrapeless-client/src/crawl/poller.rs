//! Job status polling.
//!
//! One sequential check/sleep loop per job. Dropping the future returned by
//! [`JobPoller::wait`] stops polling; nothing is shared between jobs.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::types::{JobKind, JobStatus, StatusPage};
use crate::error::{Result, ScrapelessError};
use crate::transport::{ApiRequest, SharedTransport};

/// Shortest pause between two status checks of a crawl job.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default upper bound on how long a job is waited for.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How a job is waited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Requested pause between checks. Values below the floor are raised to it.
    pub interval: Duration,
    /// Give up after this much time. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Give up after this many status checks. `None` means no limit.
    pub max_attempts: Option<u32>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: MIN_POLL_INTERVAL,
            timeout: Some(DEFAULT_POLL_TIMEOUT),
            max_attempts: None,
        }
    }
}

impl PollOptions {
    /// No deadline and no attempt limit.
    pub fn unbounded() -> Self {
        Self {
            timeout: None,
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// The pause actually used: `max(interval, 2s)`.
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_POLL_INTERVAL)
    }
}

/// Sleeps between checks and enforces the deadline and attempt limit.
#[derive(Debug)]
pub(crate) struct Pacer {
    interval: Duration,
    started: Instant,
    deadline: Option<Instant>,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl Pacer {
    pub(crate) fn new(options: &PollOptions, floor: Duration) -> Self {
        let started = Instant::now();
        Self {
            interval: options.interval.max(floor),
            started,
            deadline: options.timeout.map(|t| started + t),
            max_attempts: options.max_attempts,
            attempts: 0,
        }
    }

    /// Record one finished check, then sleep unless a limit has been reached.
    ///
    /// The sleep never runs past the deadline.
    pub(crate) async fn pause(&mut self, job_id: &str) -> Result<()> {
        self.attempts += 1;

        let attempts_spent = self.max_attempts.is_some_and(|max| self.attempts >= max);
        let deadline_passed = self.deadline.is_some_and(|d| Instant::now() >= d);
        if attempts_spent || deadline_passed {
            return Err(self.give_up(job_id));
        }

        let pause = match self.deadline {
            Some(deadline) => self
                .interval
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.interval,
        };
        sleep(pause).await;
        Ok(())
    }

    /// Run one request, cut off at the deadline.
    pub(crate) async fn guard<T, F>(&self, job_id: &str, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(deadline) = self.deadline else {
            return request.await;
        };
        if Instant::now() >= deadline {
            return Err(self.give_up(job_id));
        }
        match timeout_at(deadline, request).await {
            Ok(result) => result,
            Err(_) => Err(self.give_up(job_id)),
        }
    }

    fn give_up(&self, job_id: &str) -> ScrapelessError {
        let elapsed = self.started.elapsed();
        warn!(job_id, attempts = self.attempts, ?elapsed, "giving up on job");
        ScrapelessError::PollTimeout {
            job_id: job_id.to_string(),
            elapsed,
            attempts: self.attempts,
        }
    }

    #[cfg(test)]
    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }
}

/// Waits for crawl-API jobs to finish and gathers their paginated results.
#[derive(Clone)]
pub struct JobPoller {
    transport: SharedTransport,
    options: PollOptions,
}

impl JobPoller {
    pub fn new(transport: SharedTransport, options: PollOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Poll until the job is terminal.
    ///
    /// Completed batch and crawl jobs come back with every result page
    /// merged into `data` and `next` cleared. Failed, cancelled and
    /// unrecognised states are errors.
    pub async fn wait(&self, kind: JobKind, job_id: &str) -> Result<StatusPage> {
        let endpoint = kind.status_endpoint(job_id);
        let mut pacer = Pacer::new(&self.options, MIN_POLL_INTERVAL);

        loop {
            let page = pacer.guard(job_id, self.fetch(&endpoint)).await?;
            match &page.status {
                JobStatus::Completed => {
                    info!(job_id, kind = %kind, "job completed");
                    return self.finish(kind, job_id, page, &pacer).await;
                }
                JobStatus::Running(state) => {
                    debug!(job_id, status = %state, "job still running");
                    pacer.pause(job_id).await?;
                }
                other => {
                    warn!(job_id, status = %other, error = ?page.error, "job did not complete");
                    return Err(ScrapelessError::JobFailed {
                        job_id: job_id.to_string(),
                        status: other.to_string(),
                        error: page.error.clone(),
                    });
                }
            }
        }
    }

    async fn finish(
        &self,
        kind: JobKind,
        job_id: &str,
        mut page: StatusPage,
        pacer: &Pacer,
    ) -> Result<StatusPage> {
        if kind.paginated() {
            let data = self.collect_within(job_id, &page, pacer).await?;
            page.data = Some(Value::Array(data));
            page.next = None;
        } else if kind == JobKind::Extract && page.success == Some(false) {
            return Err(ScrapelessError::JobFailed {
                job_id: job_id.to_string(),
                status: page.status.to_string(),
                error: page.error.clone(),
            });
        }
        Ok(page)
    }

    /// Concatenate `first.data` with every page reachable through `next`.
    ///
    /// Stops at the first fetched page with no items, even when that page
    /// still advertises a cursor, and never follows a cursor while nothing
    /// has been accumulated.
    pub async fn collect_pages(&self, job_id: &str, first: &StatusPage) -> Result<Vec<Value>> {
        let pacer = Pacer::new(&self.options, MIN_POLL_INTERVAL);
        self.collect_within(job_id, first, &pacer).await
    }

    async fn collect_within(
        &self,
        job_id: &str,
        first: &StatusPage,
        pacer: &Pacer,
    ) -> Result<Vec<Value>> {
        let mut items = match &first.data {
            Some(Value::Array(items)) => items.clone(),
            None | Some(Value::Null) => {
                return Err(ScrapelessError::JobDataMissing {
                    job_id: job_id.to_string(),
                })
            }
            Some(other) => {
                return Err(ScrapelessError::Parse(format!(
                    "job {job_id} returned non-array data: {other}"
                )))
            }
        };

        let mut cursor = first.next_cursor().map(str::to_string);
        while let Some(next) = cursor.take() {
            if items.is_empty() {
                break;
            }
            let page = pacer.guard(job_id, self.fetch(&next)).await?;
            let batch = match page.data {
                Some(Value::Array(batch)) => batch,
                _ => Vec::new(),
            };
            if batch.is_empty() {
                debug!(job_id, cursor = %next, "empty result page, stopping");
                break;
            }
            debug!(job_id, fetched = batch.len(), "appending result page");
            items.extend(batch);
            cursor = page.next.filter(|n| !n.is_empty());
        }

        Ok(items)
    }

    async fn fetch(&self, endpoint: &str) -> Result<StatusPage> {
        self.transport.execute(ApiRequest::get(endpoint)).await?.raw()
    }
}
