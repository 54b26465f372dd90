//! Captcha solving tasks.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::crawl::poller::{Pacer, PollOptions};
use crate::error::{Result, ScrapelessError};
use crate::transport::{ApiRequest, SharedTransport, WithStatus};

/// Result polling runs at this fixed pace.
pub const CAPTCHA_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaTask {
    /// Solver actor, e.g. `captcha.recaptcha`.
    pub actor: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaTaskCreated {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub task_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaResult {
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub create_time: Option<i64>,
    #[serde(default)]
    pub elapsed: Option<u64>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub solution: Option<Value>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub task_id: String,
}

pub struct CaptchaService {
    transport: SharedTransport,
}

impl CaptchaService {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    pub async fn create(&self, task: &CaptchaTask) -> Result<WithStatus<CaptchaTaskCreated>> {
        let request = ApiRequest::post("/api/v1/createTask").with_json(task)?;
        self.transport.execute(request).await?.with_status()
    }

    pub async fn get_result(&self, task_id: &str) -> Result<WithStatus<CaptchaResult>> {
        let request = ApiRequest::get(format!("/api/v1/getTaskResult/{task_id}"));
        self.transport.execute(request).await?.with_status()
    }

    /// Create a task and poll its result once a second until it succeeds.
    pub async fn solve(&self, task: &CaptchaTask, options: PollOptions) -> Result<CaptchaResult> {
        let created = self.create(task).await?.data;
        if created.task_id.is_empty() {
            return Err(ScrapelessError::JobStart {
                status: 400,
                message: "Failed to start captcha task".into(),
            });
        }

        let mut pacer = Pacer::new(&options.with_interval(CAPTCHA_POLL_INTERVAL), CAPTCHA_POLL_INTERVAL);
        loop {
            let result = pacer
                .guard(&created.task_id, self.get_result(&created.task_id))
                .await?
                .data;
            if result.success {
                return Ok(result);
            }
            debug!(task_id = %created.task_id, state = ?result.state, "captcha not solved yet");
            pacer.pause(&created.task_id).await?;
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

    fn task() -> CaptchaTask {
        CaptchaTask {
            actor: "captcha.recaptcha".into(),
            input: json!({"version": "v2", "pageURL": "https://example.com", "siteKey": "k"}),
            proxy: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_solve_polls_every_second() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::POST,
            "/api/v1/createTask",
            json!({"success": true, "taskId": "t1", "state": "idle"}),
        );
        let result_path = "/api/v1/getTaskResult/t1";
        mock.on(Method::GET, result_path, json!({"success": false, "state": "running"}));
        mock.on(Method::GET, result_path, json!({"success": false, "state": "running"}));
        mock.on(
            Method::GET,
            result_path,
            json!({"success": true, "taskId": "t1", "solution": {"token": "abc"}}),
        );

        let solved = CaptchaService::new(mock.clone())
            .solve(&task(), PollOptions::default())
            .await
            .unwrap();
        assert_eq!(solved.solution.unwrap()["token"], "abc");

        let calls = mock.calls();
        assert_eq!(calls.len(), 4);
        let gap = calls[2].at - calls[1].at;
        assert!(gap >= Duration::from_secs(1) && gap < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_solve_respects_attempt_limit() {
        let mock = Arc::new(MockTransport::new());
        mock.on(Method::POST, "/api/v1/createTask", json!({"success": true, "taskId": "t2"}));
        mock.on(Method::GET, "/api/v1/getTaskResult/t2", json!({"success": false}));

        let err = CaptchaService::new(mock)
            .solve(&task(), PollOptions::unbounded().with_max_attempts(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapelessError::PollTimeout { attempts: 2, .. }));
    }
}
