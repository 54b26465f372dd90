//! Job submission.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::types::{JobKind, JobSubmission};
use crate::error::{Result, ScrapelessError};
use crate::transport::{ApiRequest, SharedTransport};

/// Starts crawl-API jobs. Submissions are never retried.
#[derive(Clone)]
pub struct JobSubmitter {
    transport: SharedTransport,
}

impl JobSubmitter {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    /// Submit and return the raw acknowledgement.
    pub async fn submit_raw(&self, kind: JobKind, body: Value) -> Result<JobSubmission> {
        let request = ApiRequest::post(kind.submit_endpoint()).with_json_value(body);
        self.transport.execute(request).await?.raw()
    }

    /// Submit and return the job id.
    ///
    /// Every failure is reported as [`ScrapelessError::JobStart`] carrying the
    /// upstream status. A 2xx reply without a usable string id, including one
    /// that is not a JSON object at all, counts as a 400.
    pub async fn submit(&self, kind: JobKind, body: Value) -> Result<String> {
        let request = ApiRequest::post(kind.submit_endpoint()).with_json_value(body);
        let reply = self.transport.execute(request).await.map_err(|e| {
            warn!(kind = %kind, error = %e, "job submission failed");
            match e {
                ScrapelessError::Api {
                    status, message, ..
                } => ScrapelessError::JobStart { status, message },
                other => ScrapelessError::JobStart {
                    status: other.status_code(),
                    message: other.to_string(),
                },
            }
        })?;

        let id = match &reply.body {
            Value::Object(map) => map.get("id").and_then(Value::as_str).filter(|id| !id.is_empty()),
            _ => None,
        };
        match id {
            Some(id) => {
                debug!(kind = %kind, job_id = %id, "job submitted");
                Ok(id.to_string())
            }
            None => {
                warn!(kind = %kind, status = reply.status, "submission accepted without a job id");
                Err(ScrapelessError::JobStart {
                    status: 400,
                    message: format!("Failed to start {kind} job"),
                })
            }
        }
    }
}

/// Merge a target (`url`, `urls`) with serialized params into one body.
///
/// Params are laid over the target, matching how the platform reads them.
pub fn job_body<P: Serialize>(target: Value, params: Option<&P>) -> Result<Value> {
    let mut body = match target {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Some(params) = params {
        if let Value::Object(extra) = serde_json::to_value(params)? {
            body.extend(extra);
        }
    }
    Ok(Value::Object(body))
}
