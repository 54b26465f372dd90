use serde_json::Value;
use tracing::instrument;

use crate::error::{Result, ScrapelessError};
use crate::transport::{ApiRequest, SharedTransport};

/// Controls the runs of one actor's runners.
pub struct RunnerService {
    transport: SharedTransport,
    actor_id: Option<String>,
}

impl RunnerService {
    pub fn new(transport: SharedTransport, actor_id: Option<String>) -> Self {
        Self {
            transport,
            actor_id: actor_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn set_actor_id(&mut self, actor_id: impl Into<String>) {
        self.actor_id = Some(actor_id.into()).filter(|id| !id.is_empty());
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    /// Stop `run_id` on `runner_id`. Needs an actor id; no request is sent
    /// without one.
    #[instrument(skip(self))]
    pub async fn abort_run(&self, runner_id: &str, run_id: &str) -> Result<Value> {
        let actor_id = self
            .actor_id
            .as_deref()
            .ok_or_else(|| ScrapelessError::Config("Actor ID not set, cannot abort Runner".into()))?;
        let request = ApiRequest::delete(format!("/actors/{actor_id}/runners/{runner_id}/runs/{run_id}"));
        self.transport.execute(request).await?.unwrap_data()
    }
}
