//! Universal scraping (web unlocker).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::transport::{ApiRequest, SharedTransport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalScrapingRequest {
    /// Unlocker actor, e.g. `unlocker.webunlocker`.
    pub actor: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UniversalScrapingRequest {
    pub fn new(actor: impl Into<String>, input: Value) -> Self {
        Self {
            actor: actor.into(),
            input,
            proxy: None,
            extra: Map::new(),
        }
    }
}

pub struct UniversalService {
    transport: SharedTransport,
}

impl UniversalService {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    /// Fetch a page through the unlocker. Returns the `data` member of the reply.
    pub async fn scrape(&self, request: &UniversalScrapingRequest) -> Result<Value> {
        let request = ApiRequest::post("/api/v1/unlocker/request").with_json(request)?;
        self.transport.execute(request).await?.unwrap_data()
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
    async fn test_scrape_unwraps_data() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::POST,
            "/api/v1/unlocker/request",
            json!({"code": 200, "data": "<html>ok</html>"}),
        );
        let html = UniversalService::new(mock.clone())
            .scrape(&UniversalScrapingRequest::new(
                "unlocker.webunlocker",
                json!({"url": "https://example.com", "type": "", "js_render": true}),
            ))
            .await
            .unwrap();
        assert_eq!(html, "<html>ok</html>");
        assert_eq!(
            mock.last_call().unwrap().body.unwrap()["actor"],
            "unlocker.webunlocker"
        );
    }
}
