//! HTTP plumbing shared by every service.
//!
//! Services describe a call as an [`ApiRequest`] and hand it to a
//! [`Transport`]. The production transport is [`HttpTransport`] (reqwest);
//! tests swap in `testing::MockTransport`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info_span, warn, Instrument, Span};

use crate::credentials::ApiKey;
use crate::error::{Result, ScrapelessError};

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(MultipartBody),
}

/// Form fields and files for `multipart/form-data` uploads.
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.files.push(FilePart {
            field: field.into(),
            file_name: file_name.into(),
            bytes,
        });
        self
    }

    fn into_form(self) -> reqwest::multipart::Form {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for file in self.files {
            let part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
            form = form.part(file.field, part);
        }
        form
    }
}

/// One API call, independent of how it is sent.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the service base URL, or an absolute `http(s)://` URL.
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Serialize `body` as the JSON payload.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn with_json_value(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn with_multipart(mut self, body: MultipartBody) -> Self {
        self.body = RequestBody::Multipart(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_optional_query<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with_query(key, v),
            None => self,
        }
    }

    /// `endpoint` plus the encoded query string, as it would appear on the wire.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.endpoint.clone();
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.endpoint, sep, encoded)
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiReply {
    pub status: u16,
    pub body: Value,
}

/// Payload paired with the HTTP status it arrived with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithStatus<T> {
    pub status: u16,
    pub data: T,
}

impl ApiReply {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Decode the whole body. Crawl endpoints return bare bodies.
    pub fn raw<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.body)?)
    }

    /// Decode the `data` member. Storage and actor endpoints wrap payloads
    /// in `{ "data": ... }`; a missing member decodes from `null`.
    pub fn unwrap_data<T: DeserializeOwned>(self) -> Result<T> {
        let data = match self.body {
            Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        };
        Ok(serde_json::from_value(data)?)
    }

    /// Decode the whole body and keep the HTTP status next to it.
    pub fn with_status<T: DeserializeOwned>(self) -> Result<WithStatus<T>> {
        let status = self.status;
        Ok(WithStatus {
            status,
            data: serde_json::from_value(self.body)?,
        })
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request. Non-2xx responses come back as [`ScrapelessError::Api`].
    async fn execute(&self, request: ApiRequest) -> Result<ApiReply>;

    fn base_url(&self) -> &str;

    fn api_key(&self) -> &ApiKey;
}

/// Shared handle used by the services.
pub type SharedTransport = Arc<dyn Transport>;

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
    span: Span,
}

impl HttpTransport {
    /// `component` names the tracing span every request runs under.
    pub fn new(
        api_key: ApiKey,
        base_url: impl Into<String>,
        timeout: Option<Duration>,
        component: &'static str,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ScrapelessError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            span: info_span!("scrapeless", component),
        })
    }

    pub fn shared(self) -> SharedTransport {
        Arc::new(self)
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiReply> {
        let url = self.url_for(&request.endpoint);
        let method = request.method.clone();

        async move {
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .header("X-API-Key", self.api_key.expose());
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            builder = match request.body {
                RequestBody::Empty => builder.header(CONTENT_TYPE, "application/json"),
                RequestBody::Json(body) => builder.json(&body),
                RequestBody::Multipart(form) => builder.multipart(form.into_form()),
            };

            let resp = builder.send().await.map_err(|e| {
                warn!(%method, %url, error = %e, "request failed to send");
                ScrapelessError::Network(e.to_string())
            })?;

            let status = resp.status().as_u16();
            let is_json = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.contains("application/json"))
                .unwrap_or(false);
            let text = resp
                .text()
                .await
                .map_err(|e| ScrapelessError::Network(e.to_string()))?;

            let body = if !is_json {
                Value::String(text)
            } else if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text)?
            };

            if !(200..300).contains(&status) {
                let err = api_error(&method, &url, status, &body);
                error!(status, "{}", err);
                return Err(err);
            }

            debug!(%method, %url, status, "request succeeded");
            Ok(ApiReply { status, body })
        }
        .instrument(self.span.clone())
        .await
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_key(&self) -> &ApiKey {
        &self.api_key
    }
}

/// Build the error for a non-2xx response.
///
/// `error` then `msg` in the body replace the default message, a numeric
/// `code` replaces the HTTP status, and `traceId` is appended as
/// `(TraceID: ...)`. The result is prefixed with `Request <METHOD> <url>`.
pub fn api_error(method: &Method, url: &str, status: u16, body: &Value) -> ScrapelessError {
    let mut message = String::new();
    let mut code = status;
    let mut trace_id = None;

    if let Value::Object(map) = body {
        if let Some(e) = map.get("error").and_then(truthy_text) {
            message = e;
        }
        if let Some(m) = map.get("msg").and_then(truthy_text) {
            message = m;
        }
        if let Some(c) = map.get("code").and_then(status_code_from) {
            code = c;
        }
        if let Some(t) = map.get("traceId").and_then(truthy_text) {
            if message.is_empty() {
                message = format!("failed with status {status} (TraceID: {t})");
            } else {
                message.push_str(&format!(" (TraceID: {t})"));
            }
            trace_id = Some(t);
        }
    }

    if message.is_empty() {
        message = format!("failed with status {status}");
    }

    ScrapelessError::Api {
        status: code,
        message: format!("Request {method} {url} {message}"),
        trace_id,
    }
}

fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Platform business codes outside the HTTP range are ignored.
fn status_code_from(value: &Value) -> Option<u16> {
    let n = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (100..=599).contains(&n).then_some(n as u16)
}
