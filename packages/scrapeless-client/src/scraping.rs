//! Scraper actor tasks (`/api/v1/scraper`).

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::crawl::poller::{Pacer, PollOptions};
use crate::error::{Result, ScrapelessError};
use crate::transport::{ApiRequest, SharedTransport, WithStatus};

/// Task results are checked at this fixed pace.
pub const SCRAPER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// HTTP status meaning the task has finished and the body is the result.
const TASK_DONE: u16 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingTaskRequest {
    /// Scraper actor, e.g. `scraper.google.search`.
    pub actor: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<TaskProxy>,
    #[serde(rename = "async", default, skip_serializing_if = "Option::is_none")]
    pub run_async: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScrapingTaskRequest {
    pub fn new(actor: impl Into<String>, input: Value) -> Self {
        Self {
            actor: actor.into(),
            input,
            proxy: None,
            run_async: None,
            extra: Map::new(),
        }
    }

    pub fn with_proxy_country(mut self, country: impl Into<String>) -> Self {
        self.proxy = Some(TaskProxy {
            country: country.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProxy {
    pub country: String,
}

/// Acknowledgement of a queued task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapingTask {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub task_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct ScrapingService {
    transport: SharedTransport,
}

impl ScrapingService {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    async fn submit(&self, request: &ScrapingTaskRequest, run_async: bool) -> Result<WithStatus<Value>> {
        let mut body = request.clone();
        body.run_async = Some(run_async);
        let request = ApiRequest::post("/api/v1/scraper/request").with_json(&body)?;
        self.transport.execute(request).await?.with_status()
    }

    /// Queue a task without waiting for it.
    pub async fn create_task(&self, request: &ScrapingTaskRequest) -> Result<WithStatus<ScrapingTask>> {
        let reply = self.submit(request, true).await?;
        Ok(WithStatus {
            status: reply.status,
            data: serde_json::from_value(reply.data)?,
        })
    }

    pub async fn get_task_result<T: DeserializeOwned>(&self, task_id: &str) -> Result<WithStatus<T>> {
        let request = ApiRequest::get(format!("/api/v1/scraper/result/{task_id}"));
        self.transport.execute(request).await?.with_status()
    }

    /// Run a task and return its result.
    ///
    /// A 200 reply is the result itself; any other 2xx carries a task id
    /// whose result is checked once a second until it answers 200.
    pub async fn scrape<T: DeserializeOwned>(
        &self,
        request: &ScrapingTaskRequest,
        options: PollOptions,
    ) -> Result<T> {
        let reply = self.submit(request, false).await?;
        if reply.status == TASK_DONE {
            return Ok(serde_json::from_value(reply.data)?);
        }

        let task: ScrapingTask = serde_json::from_value(reply.data)?;
        if task.task_id.is_empty() {
            return Err(ScrapelessError::JobStart {
                status: reply.status,
                message: "Scraper task accepted without a task id".into(),
            });
        }

        let mut pacer = Pacer::new(&options.with_interval(SCRAPER_POLL_INTERVAL), SCRAPER_POLL_INTERVAL);
        loop {
            pacer.pause(&task.task_id).await?;
            let result: WithStatus<Value> = pacer
                .guard(&task.task_id, self.get_task_result::<Value>(&task.task_id))
                .await?;
            if result.status == TASK_DONE {
                return Ok(serde_json::from_value(result.data)?);
            }
            debug!(task_id = %task.task_id, status = result.status, "scraper task pending");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_task_forces_async() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::POST,
            "/api/v1/scraper/request",
            json!({"message": "queued", "taskId": "st-1"}),
        );
        let service = ScrapingService::new(mock.clone());
        let req = ScrapingTaskRequest::new("scraper.shopee", json!({"url": "https://shop"}))
            .with_proxy_country("US");
        let task = service.create_task(&req).await.unwrap();
        assert_eq!(task.data.task_id, "st-1");

        let body = mock.last_call().unwrap().body.unwrap();
        assert_eq!(body["async"], true);
        assert_eq!(body["proxy"]["country"], "US");
    }

    #[tokio::test]
    async fn test_scrape_returns_immediate_result() {
        let mock = Arc::new(MockTransport::new());
        mock.on(Method::POST, "/api/v1/scraper/request", json!({"items": [1, 2]}));
        let service = ScrapingService::new(mock.clone());
        let result: Value = service
            .scrape(
                &ScrapingTaskRequest::new("scraper.x", json!({})),
                PollOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result["items"], json!([1, 2]));
        assert_eq!(mock.last_call().unwrap().body.unwrap()["async"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrape_polls_until_200() {
        let mock = Arc::new(MockTransport::new());
        mock.on_status(
            Method::POST,
            "/api/v1/scraper/request",
            201,
            json!({"taskId": "st-2"}),
        );
        let path = "/api/v1/scraper/result/st-2";
        mock.on_status(Method::GET, path, 202, json!({"state": "running"}));
        mock.on(Method::GET, path, json!({"title": "done"}));

        let result: Value = ScrapingService::new(mock.clone())
            .scrape(
                &ScrapingTaskRequest::new("scraper.x", json!({})),
                PollOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result["title"], "done");
        assert_eq!(mock.calls_to(Method::GET, path), 2);
    }
}
