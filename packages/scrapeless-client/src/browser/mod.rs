//! Scraping browser sessions.
//!
//! [`BrowserService::create`] only builds a connection URL; no request is
//! made until a CDP client dials it. [`BrowserService::create_session`]
//! reserves a session up front and returns a task-specific URL.

mod extension;
mod profiles;

pub use extension::{ExtensionDetail, ExtensionListItem, ExtensionService, UploadedExtension};
pub use profiles::{Profile, ProfileList, ProfileListParams, ProfilesService};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ResolvedConfig;
use crate::error::{Result, ScrapelessError};
use crate::transport::{ApiRequest, HttpTransport, SharedTransport};

pub const DEFAULT_SESSION_TTL: u32 = 180;
pub const DEFAULT_PROXY_COUNTRY: &str = "ANY";

/// Options for a remote browser session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowserOptions {
    #[serde(rename = "sessionName", default, skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    /// Seconds; defaults to 180.
    #[serde(rename = "sessionTTL", default, skip_serializing_if = "Option::is_none")]
    pub session_ttl: Option<u32>,
    #[serde(rename = "sessionRecording", default, skip_serializing_if = "Option::is_none")]
    pub session_recording: Option<bool>,
    /// Defaults to `ANY`. Ignored when `proxy_url` is set.
    #[serde(rename = "proxyCountry", default, skip_serializing_if = "Option::is_none")]
    pub proxy_country: Option<String>,
    #[serde(rename = "proxyURL", default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Value>,
    #[serde(rename = "extensionIds", default, skip_serializing_if = "Option::is_none")]
    pub extension_ids: Option<Vec<String>>,
    #[serde(rename = "profileId", default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(rename = "profilePersist", default, skip_serializing_if = "Option::is_none")]
    pub profile_persist: Option<bool>,
}

impl BrowserOptions {
    /// Query parameters for the browser endpoint, with defaults applied and
    /// empty values dropped.
    pub fn query_pairs(&self, token: &str) -> Vec<(&'static str, String)> {
        let mut pairs: Vec<(&'static str, String)> = vec![("token", token.to_string())];
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                pairs.push((key, v));
            }
        };

        push("sessionName", self.session_name.clone());
        push(
            "sessionTTL",
            Some(self.session_ttl.unwrap_or(DEFAULT_SESSION_TTL).to_string()),
        );
        push("sessionRecording", self.session_recording.map(|b| b.to_string()));
        if self.proxy_url.as_deref().map_or(true, str::is_empty) {
            push(
                "proxyCountry",
                Some(
                    self.proxy_country
                        .clone()
                        .unwrap_or_else(|| DEFAULT_PROXY_COUNTRY.to_string()),
                ),
            );
        }
        push("proxyURL", self.proxy_url.clone());
        push("fingerprint", self.fingerprint.as_ref().map(Value::to_string));
        push("extensionIds", self.extension_ids.as_ref().map(|ids| ids.join(",")));
        push("profileId", self.profile_id.clone());
        push("profilePersist", self.profile_persist.map(|b| b.to_string()));

        pairs
    }
}

/// A browser WebSocket endpoint ready for a CDP client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSession {
    #[serde(rename = "browserWSEndpoint")]
    pub browser_ws_endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionTask {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    task_id: Option<String>,
}

pub struct BrowserService {
    transport: SharedTransport,
    base_url: String,
}

impl BrowserService {
    pub fn new(transport: SharedTransport) -> Self {
        let base_url = transport.base_url().trim_end_matches('/').to_string();
        Self {
            transport,
            base_url,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let transport = HttpTransport::new(
            config.api_key.clone(),
            &config.browser_api_url,
            Some(config.timeout),
            "browser",
        )?;
        Ok(Self::new(transport.shared()))
    }

    /// `ws` for plain-HTTP base URLs, `wss` otherwise, plus the host part.
    fn socket_origin(&self) -> (&'static str, &str) {
        let scheme = if self.base_url.starts_with("http://") {
            "ws"
        } else {
            "wss"
        };
        let host = self
            .base_url
            .split_once("://")
            .map_or(self.base_url.as_str(), |(_, rest)| rest);
        (scheme, host)
    }

    fn encoded_query(&self, options: &BrowserOptions) -> String {
        let pairs = options.query_pairs(self.transport.api_key().expose());
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish()
    }

    /// Build the connection URL for a new session.
    pub fn create(&self, options: &BrowserOptions) -> BrowserSession {
        let (scheme, host) = self.socket_origin();
        BrowserSession {
            browser_ws_endpoint: format!(
                "{scheme}://{host}/api/v2/browser?{}",
                self.encoded_query(options)
            ),
        }
    }

    /// Reserve a session and return its task URL.
    pub async fn create_session(&self, options: &BrowserOptions) -> Result<BrowserSession> {
        let mut request = ApiRequest::get("/api/v2/browser");
        request.query = options
            .query_pairs(self.transport.api_key().expose())
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        let reply = self.transport.execute(request).await.map_err(|e| {
            warn!(error = %e, "browser session request failed");
            ScrapelessError::Api {
                status: e.status_code(),
                message: format!("Failed to create browser session: {e}"),
                trace_id: e.trace_id().map(str::to_string),
            }
        })?;
        let body = reply.body.clone();
        let task: SessionTask = reply.raw()?;

        if !task.success {
            return Err(ScrapelessError::Api {
                status: 500,
                message: format!("Failed to create browser session: {body}"),
                trace_id: None,
            });
        }
        let task_id = task.task_id.filter(|id| !id.is_empty()).ok_or_else(|| {
            ScrapelessError::Api {
                status: 500,
                message: "Failed to create browser session: taskId is missing".into(),
                trace_id: None,
            }
        })?;

        debug!(task_id = %task_id, "browser session reserved");
        let (_, host) = self.socket_origin();
        let token: String =
            url::form_urlencoded::byte_serialize(self.transport.api_key().expose().as_bytes())
                .collect();
        Ok(BrowserSession {
            browser_ws_endpoint: format!("wss://{host}/browser/{task_id}?token={token}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn service(base: &str) -> (Arc<MockTransport>, BrowserService) {
        let mock = Arc::new(MockTransport::with_base_url(base));
        (mock.clone(), BrowserService::new(mock))
    }

    #[test]
    fn test_create_applies_defaults() {
        let (_, browser) = service("https://browser.scrapeless.com");
        let session = browser.create(&BrowserOptions::default());
        assert_eq!(
            session.browser_ws_endpoint,
            "wss://browser.scrapeless.com/api/v2/browser?token=test-api-key&sessionTTL=180&proxyCountry=ANY"
        );
    }

    #[test]
    fn test_create_uses_ws_for_plain_http_and_drops_country_with_proxy_url() {
        let (_, browser) = service("http://localhost:8080");
        let session = browser.create(&BrowserOptions {
            session_name: Some("demo".into()),
            proxy_country: Some("US".into()),
            proxy_url: Some("http://user:pw@proxy:8000".into()),
            fingerprint: Some(json!({"platform": "Windows"})),
            session_recording: Some(true),
            ..Default::default()
        });
        let url = session.browser_ws_endpoint;
        assert!(url.starts_with("ws://localhost:8080/api/v2/browser?"));
        assert!(url.contains("sessionName=demo"));
        assert!(url.contains("sessionRecording=true"));
        assert!(url.contains("proxyURL=http%3A%2F%2Fuser%3Apw%40proxy%3A8000"));
        assert!(url.contains("fingerprint=%7B%22platform%22%3A%22Windows%22%7D"));
        assert!(!url.contains("proxyCountry"));
    }

    #[tokio::test]
    async fn test_create_session_returns_task_url() {
        let (mock, browser) = service("https://browser.scrapeless.com");
        mock.on(
            Method::GET,
            "/api/v2/browser?token=test-api-key&sessionTTL=180&proxyCountry=ANY",
            json!({"success": true, "taskId": "t-77"}),
        );
        let session = browser
            .create_session(&BrowserOptions::default())
            .await
            .unwrap();
        assert_eq!(
            session.browser_ws_endpoint,
            "wss://browser.scrapeless.com/browser/t-77?token=test-api-key"
        );
    }

    #[tokio::test]
    async fn test_create_session_requires_task_id() {
        let (mock, browser) = service("https://browser.scrapeless.com");
        mock.on(
            Method::GET,
            "/api/v2/browser?token=test-api-key&sessionTTL=180&proxyCountry=ANY",
            json!({"success": true}),
        );
        let err = browser
            .create_session(&BrowserOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("taskId is missing"));
    }
}
