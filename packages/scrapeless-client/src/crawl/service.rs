use serde_json::{json, Value};
use tracing::{info, instrument};

use super::assembler::{
    assemble, extract_response, scrape_response, CrawlStatusOutcome, ExtractResponse,
    JobResponse, ScrapeResponse, StatusEnvelope,
};
use super::poller::{JobPoller, PollOptions};
use super::submit::{job_body, JobSubmitter};
use super::types::{
    CancelResponse, CrawlErrors, CrawlParams, CrawlStatusQuery, ExtractParams, JobKind,
    JobStatus, JobSubmission, ScrapeParams, StatusPage,
};
use crate::config::ResolvedConfig;
use crate::error::{Result, ScrapelessError};
use crate::transport::{ApiRequest, HttpTransport, SharedTransport};

/// Marks extract submissions made through this SDK.
const EXTRACT_ORIGIN: &str = "api-sdk";

/// Scrape, batch-scrape, crawl and extract jobs.
///
/// The blocking variants (`scrape_url`, `crawl_url`, ...) submit a job and
/// poll it to completion; the `async_*` variants only submit; the `check_*`
/// variants perform a single status request.
#[derive(Clone)]
pub struct ScrapingCrawl {
    transport: SharedTransport,
    submitter: JobSubmitter,
}

impl ScrapingCrawl {
    pub fn new(transport: SharedTransport) -> Self {
        Self {
            submitter: JobSubmitter::new(transport.clone()),
            transport,
        }
    }

    /// Build against the crawl API URL. Requests only time out when a
    /// timeout was configured explicitly.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let transport = HttpTransport::new(
            config.api_key.clone(),
            &config.scraping_crawl_api_url,
            config.crawl_timeout,
            "crawl",
        )?;
        Ok(Self::new(transport.shared()))
    }

    fn poller(&self, options: PollOptions) -> JobPoller {
        JobPoller::new(self.transport.clone(), options)
    }

    async fn fetch_page(&self, request: ApiRequest) -> Result<StatusPage> {
        self.transport.execute(request).await?.raw()
    }

    // ---- scrape -------------------------------------------------------

    /// Scrape one URL and wait for the document.
    #[instrument(skip(self, params))]
    pub async fn scrape_url(
        &self,
        url: &str,
        params: Option<&ScrapeParams>,
        options: PollOptions,
    ) -> Result<ScrapeResponse> {
        let body = job_body(json!({ "url": url }), params)?;
        let id = self.submitter.submit(JobKind::Scrape, body).await?;
        let page = self.poller(options).wait(JobKind::Scrape, &id).await?;
        scrape_response(page)
    }

    pub async fn async_scrape_url(
        &self,
        url: &str,
        params: Option<&ScrapeParams>,
    ) -> Result<JobSubmission> {
        let body = job_body(json!({ "url": url }), params)?;
        self.submitter.submit_raw(JobKind::Scrape, body).await
    }

    pub async fn check_scrape_status(&self, id: &str) -> Result<ScrapeResponse> {
        require_id(id, "scrape")?;
        let page = self
            .fetch_page(ApiRequest::get(JobKind::Scrape.status_endpoint(id)))
            .await?;
        scrape_response(page)
    }

    // ---- batch scrape -------------------------------------------------

    /// Scrape several URLs as one job and wait for every result page.
    #[instrument(skip(self, urls, params), fields(url_count = urls.len()))]
    pub async fn batch_scrape_urls(
        &self,
        urls: &[String],
        params: Option<&ScrapeParams>,
        ignore_invalid_urls: Option<bool>,
        options: PollOptions,
    ) -> Result<StatusEnvelope> {
        let body = batch_body(urls, params, ignore_invalid_urls)?;
        let id = self.submitter.submit(JobKind::BatchScrape, body).await?;
        let page = self.poller(options).wait(JobKind::BatchScrape, &id).await?;
        StatusEnvelope::from_page(page)
    }

    pub async fn async_batch_scrape_urls(
        &self,
        urls: &[String],
        params: Option<&ScrapeParams>,
        ignore_invalid_urls: Option<bool>,
    ) -> Result<JobSubmission> {
        let body = batch_body(urls, params, ignore_invalid_urls)?;
        self.submitter.submit_raw(JobKind::BatchScrape, body).await
    }

    /// One status request; results are not paginated.
    pub async fn check_batch_scrape_status(&self, id: &str) -> Result<StatusEnvelope> {
        require_id(id, "batch scrape")?;
        let page = self
            .fetch_page(ApiRequest::get(JobKind::BatchScrape.status_endpoint(id)))
            .await?;
        StatusEnvelope::from_page(page)
    }

    // ---- crawl --------------------------------------------------------

    /// Crawl from `url` and wait for every result page.
    #[instrument(skip(self, params))]
    pub async fn crawl_url(
        &self,
        url: &str,
        params: Option<&CrawlParams>,
        options: PollOptions,
    ) -> Result<StatusEnvelope> {
        let body = job_body(json!({ "url": url }), params)?;
        let id = self.submitter.submit(JobKind::Crawl, body).await?;
        info!(job_id = %id, "crawl started");
        self.monitor_job_status(&id, options).await
    }

    pub async fn async_crawl_url(
        &self,
        url: &str,
        params: Option<&CrawlParams>,
    ) -> Result<JobSubmission> {
        let body = job_body(json!({ "url": url }), params)?;
        self.submitter.submit_raw(JobKind::Crawl, body).await
    }

    /// Poll a crawl job until it is terminal.
    pub async fn monitor_job_status(&self, id: &str, options: PollOptions) -> Result<StatusEnvelope> {
        require_id(id, "crawl")?;
        let page = self.poller(options).wait(JobKind::Crawl, id).await?;
        StatusEnvelope::from_page(page)
    }

    /// One status check of a crawl job.
    ///
    /// An unsuccessful job with an error message is returned as
    /// [`CrawlStatusOutcome::Failed`] instead of an `Err`.
    pub async fn check_crawl_status(
        &self,
        id: &str,
        query: CrawlStatusQuery,
    ) -> Result<CrawlStatusOutcome> {
        require_id(id, "crawl")?;
        let endpoint = query
            .next_url
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| JobKind::Crawl.status_endpoint(id));
        let request = ApiRequest::get(endpoint)
            .with_optional_query("skip", query.skip)
            .with_optional_query("limit", query.limit);

        let mut page = self.fetch_page(request).await?;
        if query.get_all_data && page.status == JobStatus::Completed && page.data.is_some() {
            let items = self
                .poller(PollOptions::default())
                .collect_pages(id, &page)
                .await?;
            page.data = Some(Value::Array(items));
            page.next = None;
        }
        CrawlStatusOutcome::from_page(page)
    }

    pub async fn check_crawl_errors(&self, id: &str) -> Result<CrawlErrors> {
        require_id(id, "crawl")?;
        let endpoint = format!("{}/errors", JobKind::Crawl.status_endpoint(id));
        self.transport.execute(ApiRequest::get(endpoint)).await?.raw()
    }

    pub async fn cancel_crawl(&self, id: &str) -> Result<CancelResponse> {
        require_id(id, "crawl")?;
        let request = ApiRequest::delete(JobKind::Crawl.status_endpoint(id));
        self.transport.execute(request).await?.raw()
    }

    // ---- extract ------------------------------------------------------

    /// Run an extraction over `urls` and wait for the structured result.
    #[instrument(skip(self, urls, params), fields(url_count = urls.len()))]
    pub async fn extract_urls(
        &self,
        urls: &[String],
        params: Option<&ExtractParams>,
        options: PollOptions,
    ) -> Result<ExtractResponse> {
        let body = extract_body(urls, params)?;
        let id = self.submitter.submit(JobKind::Extract, body).await?;
        let page = self.poller(options).wait(JobKind::Extract, &id).await?;
        Ok(extract_response(page))
    }

    pub async fn async_extract_urls(
        &self,
        urls: &[String],
        params: Option<&ExtractParams>,
    ) -> Result<JobSubmission> {
        let body = extract_body(urls, params)?;
        self.submitter.submit_raw(JobKind::Extract, body).await
    }

    pub async fn get_extract_status(&self, id: &str) -> Result<ExtractResponse> {
        require_id(id, "extract")?;
        let page = self
            .fetch_page(ApiRequest::get(JobKind::Extract.status_endpoint(id)))
            .await?;
        Ok(extract_response(page))
    }

    // ---- any kind -----------------------------------------------------

    /// One status request for a job of any kind.
    pub async fn job_status(&self, kind: JobKind, id: &str) -> Result<JobResponse> {
        require_id(id, kind.as_str())?;
        let page = self.fetch_page(ApiRequest::get(kind.status_endpoint(id))).await?;
        assemble(kind, page)
    }

    /// Poll a job of any kind to completion.
    pub async fn wait_for_job(
        &self,
        kind: JobKind,
        id: &str,
        options: PollOptions,
    ) -> Result<JobResponse> {
        require_id(id, kind.as_str())?;
        let page = self.poller(options).wait(kind, id).await?;
        assemble(kind, page)
    }
}

fn require_id(id: &str, kind: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(ScrapelessError::InvalidArgument(format!("No {kind} ID provided")));
    }
    Ok(())
}

fn batch_body(
    urls: &[String],
    params: Option<&ScrapeParams>,
    ignore_invalid_urls: Option<bool>,
) -> Result<Value> {
    let mut target = json!({ "urls": urls });
    if let Some(ignore) = ignore_invalid_urls {
        target["ignoreInvalidURLs"] = Value::Bool(ignore);
    }
    job_body(target, params)
}

fn extract_body(urls: &[String], params: Option<&ExtractParams>) -> Result<Value> {
    let mut body = job_body(json!({ "urls": urls }), params)?;
    body["origin"] = Value::String(EXTRACT_ORIGIN.to_string());
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use std::sync::Arc;
    use std::time::Duration;

    fn service() -> (Arc<MockTransport>, ScrapingCrawl) {
        let mock = Arc::new(MockTransport::new());
        (mock.clone(), ScrapingCrawl::new(mock))
    }

    #[tokio::test]
    async fn test_empty_id_is_rejected_without_io() {
        let (mock, crawl) = service();
        let err = crawl
            .check_crawl_status("", CrawlStatusQuery::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "invalid argument: No crawl ID provided");
        assert!(crawl.cancel_crawl(" ").await.is_err());
        assert!(crawl.check_scrape_status("").await.is_err());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crawl_url_end_to_end() {
        let (mock, crawl) = service();
        mock.on(
            Method::POST,
            "/api/v1/crawler/crawl",
            json!({"success": true, "id": "c1"}),
        );
        let status = "/api/v1/crawler/crawl/c1";
        mock.on(Method::GET, status, json!({"status": "scraping", "total": 3, "completed": 1}));
        mock.on(
            Method::GET,
            status,
            json!({"status": "completed", "success": true, "total": 3, "completed": 3,
                   "data": [{"markdown": "p1"}], "next": "/api/v1/crawler/crawl/c1?skip=1"}),
        );
        mock.on(
            Method::GET,
            "/api/v1/crawler/crawl/c1?skip=1",
            json!({"status": "completed", "data": [{"markdown": "p2"}, {"markdown": "p3"}]}),
        );

        let params = CrawlParams {
            limit: Some(3),
            ..Default::default()
        };
        let result = crawl
            .crawl_url(
                "https://example.com",
                Some(&params),
                PollOptions::default().with_interval(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.total, 3);
        let pages: Vec<_> = result
            .data
            .iter()
            .map(|d| d.markdown.clone().unwrap())
            .collect();
        assert_eq!(pages, ["p1", "p2", "p3"]);

        let submit = &mock.calls()[0];
        assert_eq!(submit.body.as_ref().unwrap()["limit"], 3);
        let gap = mock.calls()[2].at - mock.calls()[1].at;
        assert!(gap >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_submission_without_id_never_polls() {
        let (mock, crawl) = service();
        mock.on(Method::POST, "/api/v1/crawler/crawl", json!({"success": true}));
        mock.on(Method::POST, "/api/v1/crawler/batch/scrape", json!({"success": true}));

        let err = crawl
            .crawl_url("https://example.com", None, PollOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapelessError::JobStart { status: 400, .. }));

        let err = crawl
            .batch_scrape_urls(&["https://a".into()], None, None, PollOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapelessError::JobStart { status: 400, .. }));

        assert_eq!(mock.call_count(), 2);
        assert!(mock.calls().iter().all(|c| c.method == Method::POST));
    }

    #[tokio::test]
    async fn test_check_crawl_status_query_and_failure() {
        let (mock, crawl) = service();
        mock.on(
            Method::GET,
            "/api/v1/crawler/crawl/c2?skip=10&limit=5",
            json!({"status": "failed", "success": false, "error": "blocked"}),
        );
        let outcome = crawl
            .check_crawl_status(
                "c2",
                CrawlStatusQuery {
                    skip: Some(10),
                    limit: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn test_check_crawl_status_get_all_data() {
        let (mock, crawl) = service();
        mock.on(
            Method::GET,
            "/api/v1/crawler/crawl/c3",
            json!({"status": "completed", "success": true, "data": [{"url": "a"}], "next": "/n2"}),
        );
        mock.on(Method::GET, "/n2", json!({"status": "completed", "data": [{"url": "b"}]}));

        let outcome = crawl
            .check_crawl_status(
                "c3",
                CrawlStatusQuery {
                    get_all_data: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let CrawlStatusOutcome::Ready(env) = outcome else {
            panic!("expected ready");
        };
        assert_eq!(env.data.len(), 2);
        assert!(env.next.is_none());
    }

    #[tokio::test]
    async fn test_extract_body_carries_origin_and_schema() {
        let (mock, crawl) = service();
        mock.on(Method::POST, "/v1/extract", json!({"success": true, "id": "e1"}));
        let params = ExtractParams::default()
            .with_prompt("prices")
            .with_schema(json!({"type": "object"}))
            .unwrap();

        let sub = crawl
            .async_extract_urls(&["https://shop".to_string()], Some(&params))
            .await
            .unwrap();
        assert_eq!(sub.id.as_deref(), Some("e1"));

        let body = mock.last_call().unwrap().body.unwrap();
        assert_eq!(body["origin"], "api-sdk");
        assert_eq!(body["prompt"], "prices");
        assert_eq!(body["schema"]["type"], "object");
        assert_eq!(body["urls"][0], "https://shop");
    }

    #[tokio::test]
    async fn test_batch_body_includes_ignore_flag() {
        let (mock, crawl) = service();
        mock.on(
            Method::POST,
            "/api/v1/crawler/batch/scrape",
            json!({"success": true, "id": "b1", "invalidURLs": ["nope"]}),
        );
        let sub = crawl
            .async_batch_scrape_urls(&["https://a".into(), "nope".into()], None, Some(true))
            .await
            .unwrap();
        assert_eq!(sub.invalid_urls.unwrap(), ["nope"]);
        assert_eq!(
            mock.last_call().unwrap().body.unwrap()["ignoreInvalidURLs"],
            true
        );
    }

    #[tokio::test]
    async fn test_cancel_and_errors() {
        let (mock, crawl) = service();
        mock.on(
            Method::DELETE,
            "/api/v1/crawler/crawl/c4",
            json!({"success": true, "status": "cancelled"}),
        );
        mock.on(
            Method::GET,
            "/api/v1/crawler/crawl/c4/errors",
            json!({"errors": [{"id": "x", "error": "timeout"}], "robotsBlocked": ["https://a/private"]}),
        );

        let cancel = crawl.cancel_crawl("c4").await.unwrap();
        assert!(cancel.success);
        let errors = crawl.check_crawl_errors("c4").await.unwrap();
        assert_eq!(errors.errors[0].error, "timeout");
        assert_eq!(errors.robots_blocked.len(), 1);
    }
}
