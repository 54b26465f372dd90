//! Test doubles for the transport and CDP seams.
//!
//! `MockTransport` replays scripted replies keyed by `"<METHOD> <path?query>"`
//! and records every request it sees, so poll loops and services can be driven
//! without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio::time::Instant;

use crate::cdp::CdpSession;
use crate::credentials::ApiKey;
use crate::error::{Result, ScrapelessError};
use crate::transport::{api_error, ApiReply, ApiRequest, RequestBody, Transport};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(ApiReply),
    Failure { status: u16, body: Value },
    Offline(String),
    Stall,
}

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    /// Endpoint plus encoded query.
    pub path: String,
    /// JSON body, if one was sent.
    pub body: Option<Value>,
    /// Multipart text fields and file names, if the body was a form.
    pub form_fields: Vec<(String, String)>,
    pub at: Instant,
}

/// Scripted [`Transport`].
///
/// Replies for a key are consumed in order; the last one repeats, so a
/// single `on(...)` answers every matching request.
pub struct MockTransport {
    base_url: String,
    api_key: ApiKey,
    replies: Arc<RwLock<HashMap<String, VecDeque<Scripted>>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_base_url("https://mock.scrapeless.test")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: ApiKey::new("test-api-key"),
            replies: Arc::default(),
            calls: Arc::default(),
        }
    }

    fn key(method: &Method, path: &str) -> String {
        format!("{} {}", method, path)
    }

    fn push(&self, method: Method, path: &str, scripted: Scripted) {
        write(&self.replies)
            .entry(Self::key(&method, path))
            .or_default()
            .push_back(scripted);
    }

    /// Queue a 200 reply with `body`.
    pub fn on(&self, method: Method, path: &str, body: Value) {
        self.push(method, path, Scripted::Reply(ApiReply::new(200, body)));
    }

    /// Queue a reply with an explicit 2xx status.
    pub fn on_status(&self, method: Method, path: &str, status: u16, body: Value) {
        self.push(method, path, Scripted::Reply(ApiReply::new(status, body)));
    }

    /// Queue a non-2xx reply; it surfaces as the transport's API error.
    pub fn on_error(&self, method: Method, path: &str, status: u16, body: Value) {
        self.push(method, path, Scripted::Failure { status, body });
    }

    /// Queue a connection failure.
    pub fn on_network_error(&self, method: Method, path: &str, message: &str) {
        self.push(method, path, Scripted::Offline(message.to_string()));
    }

    /// Queue a request that never completes.
    pub fn on_stall(&self, method: Method, path: &str) {
        self.push(method, path, Scripted::Stall);
    }

    /// Builder form of [`MockTransport::on`].
    pub fn with_reply(self, method: Method, path: &str, body: Value) -> Self {
        self.on(method, path, body);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        read(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        read(&self.calls).len()
    }

    /// Number of recorded requests with this method and path.
    pub fn calls_to(&self, method: Method, path: &str) -> usize {
        read(&self.calls)
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        read(&self.calls).last().cloned()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiReply> {
        let path = request.path_and_query();
        let (body, form_fields) = match &request.body {
            RequestBody::Empty => (None, Vec::new()),
            RequestBody::Json(v) => (Some(v.clone()), Vec::new()),
            RequestBody::Multipart(form) => {
                let mut fields = form.fields.clone();
                fields.extend(
                    form.files
                        .iter()
                        .map(|f| (f.field.clone(), f.file_name.clone())),
                );
                (None, fields)
            }
        };
        write(&self.calls).push(RecordedCall {
            method: request.method.clone(),
            path: path.clone(),
            body,
            form_fields,
            at: Instant::now(),
        });

        let key = Self::key(&request.method, &path);
        let scripted = {
            let mut replies = write(&self.replies);
            match replies.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        let url = format!("{}{}", self.base_url, path);
        match scripted {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Failure { status, body }) => {
                Err(api_error(&request.method, &url, status, &body))
            }
            Some(Scripted::Offline(message)) => Err(ScrapelessError::Network(message)),
            Some(Scripted::Stall) => std::future::pending().await,
            None => Err(api_error(
                &request.method,
                &url,
                404,
                &serde_json::json!({ "error": format!("no scripted reply for {key}") }),
            )),
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_key(&self) -> &ApiKey {
        &self.api_key
    }
}

/// A command sent through [`MockCdpSession`].
#[derive(Debug, Clone)]
pub struct SentCommand {
    pub method: String,
    pub params: Value,
}

/// Scripted [`CdpSession`].
///
/// Commands answer with the registered result (or `{}`); `wait_event`
/// yields queued events in order and otherwise never resolves.
#[derive(Default)]
pub struct MockCdpSession {
    results: Arc<RwLock<HashMap<String, Value>>>,
    failures: Arc<RwLock<HashMap<String, String>>>,
    events: Arc<RwLock<VecDeque<(String, Value)>>>,
    sent: Arc<RwLock<Vec<SentCommand>>>,
}

impl MockCdpSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, method: &str, result: Value) -> Self {
        write(&self.results).insert(method.to_string(), result);
        self
    }

    pub fn with_failure(self, method: &str, message: &str) -> Self {
        write(&self.failures).insert(method.to_string(), message.to_string());
        self
    }

    pub fn with_event(self, name: &str, payload: Value) -> Self {
        write(&self.events).push_back((name.to_string(), payload));
        self
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        read(&self.sent).clone()
    }
}

#[async_trait]
impl CdpSession for MockCdpSession {
    async fn send(&self, method: &str, params: Value) -> Result<Value> {
        write(&self.sent).push(SentCommand {
            method: method.to_string(),
            params,
        });
        if let Some(message) = read(&self.failures).get(method) {
            return Err(ScrapelessError::Cdp(message.clone()));
        }
        Ok(read(&self.results)
            .get(method)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    async fn wait_event(&self, names: &[&str]) -> Result<(String, Value)> {
        let found = {
            let mut events = write(&self.events);
            let position = events
                .iter()
                .position(|(name, _)| names.contains(&name.as_str()));
            position.and_then(|i| events.remove(i))
        };
        match found {
            Some(event) => Ok(event),
            None => std::future::pending().await,
        }
    }
}
