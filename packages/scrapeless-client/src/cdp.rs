//! Scrapeless-specific Chrome DevTools Protocol commands.
//!
//! The scraping browser understands a few extra CDP domains (`Agent`,
//! `Captcha`). [`ScrapelessPage`] wraps any [`CdpSession`] (the connection
//! to one page, provided by whichever CDP client the caller uses) and
//! exposes those commands as typed methods.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use crate::error::{Result, ScrapelessError};

/// Default wait for captcha detection and solving.
pub const DEFAULT_CAPTCHA_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_CAPTCHA_DETECTED: &str = "Captcha.detected";
const EVENT_CAPTCHA_SOLVE_FINISHED: &str = "Captcha.solveFinished";
const EVENT_CAPTCHA_SOLVE_FAILED: &str = "Captcha.solveFailed";

/// A CDP connection to one page.
#[async_trait]
pub trait CdpSession: Send + Sync {
    /// Send a command and return its result object.
    async fn send(&self, method: &str, params: Value) -> Result<Value>;

    /// Resolve with the next event whose name is in `names`.
    async fn wait_event(&self, names: &[&str]) -> Result<(String, Value)>;
}

/// Per-captcha-type solver settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptchaOption {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of captcha commands and events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptchaResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CaptchaResponse {
    fn timed_out(what: &str) -> Self {
        Self {
            success: false,
            message: Some(format!("Timeout waiting for captcha {what}")),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveUrl {
    pub error: Option<String>,
    #[serde(rename = "liveURL")]
    pub live_url: Option<String>,
}

/// The extra commands, as data.
#[derive(Debug, Clone, PartialEq)]
pub enum CdpCommand {
    LiveUrl,
    Click {
        selector: String,
    },
    Type {
        selector: String,
        content: String,
    },
    SetAutoSolve {
        auto_solve: bool,
        options: Option<Vec<CaptchaOption>>,
    },
    Solve {
        detect_timeout: Duration,
        options: Option<Vec<CaptchaOption>>,
    },
}

impl CdpCommand {
    pub fn method(&self) -> &'static str {
        match self {
            Self::LiveUrl => "Agent.liveURL",
            Self::Click { .. } => "Agent.click",
            Self::Type { .. } => "Agent.type",
            Self::SetAutoSolve { .. } => "Captcha.setAutoSolve",
            Self::Solve { .. } => "Captcha.solve",
        }
    }

    /// Command parameters. Captcha options travel as a JSON-encoded string.
    pub fn params(&self) -> Result<Value> {
        Ok(match self {
            Self::LiveUrl => json!({}),
            Self::Click { selector } => json!({ "selector": selector }),
            Self::Type { selector, content } => json!({ "selector": selector, "content": content }),
            Self::SetAutoSolve {
                auto_solve,
                options,
            } => {
                let mut params = json!({ "autoSolve": auto_solve });
                if let Some(options) = options {
                    params["options"] = Value::String(serde_json::to_string(options)?);
                }
                params
            }
            Self::Solve {
                detect_timeout,
                options,
            } => {
                let mut params = json!({ "detectTimeout": detect_timeout.as_millis() as u64 });
                if let Some(options) = options {
                    params["options"] = Value::String(serde_json::to_string(options)?);
                }
                params
            }
        })
    }
}

/// A page on the scraping browser.
pub struct ScrapelessPage<S> {
    session: S,
}

impl<S: CdpSession> ScrapelessPage<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    async fn run(&self, command: CdpCommand) -> Result<Value> {
        let method = command.method();
        debug!(method, "sending CDP command");
        self.session.send(method, command.params()?).await
    }

    /// URL of the live view of this page. Failures are reported in
    /// [`LiveUrl::error`], not as an `Err`.
    pub async fn live_url(&self) -> LiveUrl {
        match self.run(CdpCommand::LiveUrl).await {
            Ok(value) => {
                let text = |key: &str| {
                    value
                        .get(key)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                LiveUrl {
                    error: text("error"),
                    live_url: text("liveURL"),
                }
            }
            Err(e) => {
                error!(error = %e, "live URL lookup failed");
                LiveUrl {
                    error: Some(e.to_string()),
                    live_url: None,
                }
            }
        }
    }

    /// Human-like click on the first element matching `selector`.
    pub async fn real_click(&self, selector: &str) -> Result<()> {
        self.run(CdpCommand::Click {
            selector: selector.to_string(),
        })
        .await
        .map(|_| ())
        .map_err(|e| {
            error!(selector, error = %e, "click failed");
            ScrapelessError::Cdp(format!("Failed to click element \"{selector}\": {e}"))
        })
    }

    /// Human-like typing into the element matching `selector`.
    pub async fn real_fill(&self, selector: &str, text: &str) -> Result<()> {
        self.run(CdpCommand::Type {
            selector: selector.to_string(),
            content: text.to_string(),
        })
        .await
        .map(|_| ())
        .map_err(|e| {
            error!(selector, error = %e, "fill failed");
            ScrapelessError::Cdp(format!("Failed to type text into \"{selector}\": {e}"))
        })
    }

    pub async fn set_auto_solve(
        &self,
        auto_solve: bool,
        options: Option<Vec<CaptchaOption>>,
    ) -> Result<()> {
        self.run(CdpCommand::SetAutoSolve {
            auto_solve,
            options,
        })
        .await
        .map(|_| ())
        .map_err(|e| ScrapelessError::Cdp(format!("Failed to set auto solve: {e}")))
    }

    pub async fn disable_captcha_auto_solve(&self) -> Result<()> {
        self.set_auto_solve(false, None).await.map_err(|e| {
            ScrapelessError::Cdp(format!("Failed to disable captcha auto solve: {e}"))
        })
    }

    /// Ask the browser to detect and solve a captcha on the page now.
    pub async fn solve_captcha(
        &self,
        detect_timeout: Option<Duration>,
        options: Option<Vec<CaptchaOption>>,
    ) -> Result<CaptchaResponse> {
        let value = self
            .run(CdpCommand::Solve {
                detect_timeout: detect_timeout.unwrap_or(DEFAULT_CAPTCHA_TIMEOUT),
                options,
            })
            .await
            .map_err(|e| ScrapelessError::Cdp(format!("Failed to solve captcha: {e}")))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Wait for `Captcha.detected`. Timing out yields an unsuccessful
    /// response, not an error.
    pub async fn wait_captcha_detected(&self, timeout: Option<Duration>) -> Result<CaptchaResponse> {
        self.wait_captcha(&[EVENT_CAPTCHA_DETECTED], timeout, "detected")
            .await
    }

    /// Wait for `Captcha.solveFinished` or `Captcha.solveFailed`.
    pub async fn wait_captcha_solved(&self, timeout: Option<Duration>) -> Result<CaptchaResponse> {
        self.wait_captcha(
            &[EVENT_CAPTCHA_SOLVE_FINISHED, EVENT_CAPTCHA_SOLVE_FAILED],
            timeout,
            "solved",
        )
        .await
    }

    async fn wait_captcha(
        &self,
        events: &[&str],
        timeout: Option<Duration>,
        what: &str,
    ) -> Result<CaptchaResponse> {
        let timeout = timeout.unwrap_or(DEFAULT_CAPTCHA_TIMEOUT);
        debug!(?timeout, "waiting for captcha {what}");
        match tokio::time::timeout(timeout, self.session.wait_event(events)).await {
            Ok(Ok((_, payload))) => Ok(serde_json::from_value(payload)?),
            Ok(Err(e)) => Err(ScrapelessError::Cdp(format!(
                "Failed to wait for captcha {what}: {e}"
            ))),
            Err(_) => Ok(CaptchaResponse::timed_out(what)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCdpSession;

    #[tokio::test]
    async fn test_live_url_maps_fields() {
        let session = MockCdpSession::new()
            .with_result("Agent.liveURL", json!({"liveURL": "https://live/abc"}));
        let page = ScrapelessPage::new(session);
        let live = page.live_url().await;
        assert_eq!(live.live_url.as_deref(), Some("https://live/abc"));
        assert!(live.error.is_none());
    }

    #[tokio::test]
    async fn test_live_url_error_is_captured() {
        let session = MockCdpSession::new().with_failure("Agent.liveURL", "session closed");
        let live = ScrapelessPage::new(session).live_url().await;
        assert!(live.live_url.is_none());
        assert!(live.error.unwrap().contains("session closed"));
    }

    #[tokio::test]
    async fn test_real_fill_sends_content() {
        let page = ScrapelessPage::new(MockCdpSession::new());
        page.real_fill("#email", "me@example.com").await.unwrap();
        let sent = page.session().sent();
        assert_eq!(sent[0].method, "Agent.type");
        assert_eq!(
            sent[0].params,
            json!({"selector": "#email", "content": "me@example.com"})
        );
    }

    #[tokio::test]
    async fn test_click_failure_names_selector() {
        let page = ScrapelessPage::new(MockCdpSession::new().with_failure("Agent.click", "no node"));
        let err = page.real_click("button.buy").await.unwrap_err();
        assert!(err.to_string().contains("button.buy"));
    }

    #[tokio::test]
    async fn test_solve_options_are_json_encoded() {
        let page = ScrapelessPage::new(
            MockCdpSession::new().with_result("Captcha.solve", json!({"success": true})),
        );
        let resp = page
            .solve_captcha(
                None,
                Some(vec![CaptchaOption {
                    kind: "recaptcha".into(),
                    disabled: Some(true),
                    ..Default::default()
                }]),
            )
            .await
            .unwrap();
        assert!(resp.success);

        let params = &page.session().sent()[0].params;
        assert_eq!(params["detectTimeout"], 30_000);
        assert_eq!(params["options"], r#"[{"type":"recaptcha","disabled":true}]"#);
    }

    #[tokio::test]
    async fn test_disable_auto_solve() {
        let page = ScrapelessPage::new(MockCdpSession::new());
        page.disable_captcha_auto_solve().await.unwrap();
        assert_eq!(
            page.session().sent()[0].params,
            json!({"autoSolve": false})
        );
    }

    #[tokio::test]
    async fn test_wait_solved_takes_failed_event() {
        let session = MockCdpSession::new()
            .with_event("Captcha.detected", json!({"success": true}))
            .with_event("Captcha.solveFailed", json!({"success": false, "message": "gave up"}));
        let resp = ScrapelessPage::new(session)
            .wait_captcha_solved(None)
            .await
            .unwrap();
        assert!(!resp.success);
        assert_eq!(resp.message.as_deref(), Some("gave up"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_detected_times_out_softly() {
        let page = ScrapelessPage::new(MockCdpSession::new());
        let resp = page
            .wait_captcha_detected(Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(!resp.success);
        assert_eq!(
            resp.message.as_deref(),
            Some("Timeout waiting for captcha detected")
        );
    }
}
