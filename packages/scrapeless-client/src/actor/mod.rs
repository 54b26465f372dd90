//! Actor runs and builds (`/api/v1/actors`), the runner control endpoint,
//! and the [`Actor`] runtime used by code running inside an actor.

mod runner;
mod runtime;

pub use runner::RunnerService;
pub use runtime::{Actor, ActorContext};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::error::Result;
use crate::storage::{Pagination, PaginationParams};
use crate::transport::{ApiRequest, SharedTransport};

const ACTORS: &str = "/api/v1/actors";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRunOptions {
    #[serde(rename = "CPU", default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunActorRequest {
    pub input: Value,
    #[serde(default)]
    pub run_options: ActorRunOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRun {
    #[serde(default)]
    pub actor_id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub run_options: Option<ActorRunOptions>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorBuild {
    #[serde(default)]
    pub build_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

pub struct ActorService {
    transport: SharedTransport,
}

impl ActorService {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    #[instrument(skip(self, request))]
    pub async fn run(&self, actor_id: &str, request: &RunActorRequest) -> Result<Value> {
        let request = ApiRequest::post(format!("{ACTORS}/{actor_id}/runs")).with_json(request)?;
        self.transport.execute(request).await?.unwrap_data()
    }

    pub async fn get_run_info(&self, run_id: &str) -> Result<ActorRun> {
        let request = ApiRequest::get(format!("{ACTORS}/runs/{run_id}"));
        self.transport.execute(request).await?.unwrap_data()
    }

    #[instrument(skip(self))]
    pub async fn abort_run(&self, actor_id: &str, run_id: &str) -> Result<Value> {
        let request = ApiRequest::delete(format!("{ACTORS}/{actor_id}/runs/{run_id}"));
        self.transport.execute(request).await?.unwrap_data()
    }

    pub async fn build(&self, actor_id: &str) -> Result<Value> {
        let request = ApiRequest::post(format!("{ACTORS}/{actor_id}/builds"));
        self.transport.execute(request).await?.unwrap_data()
    }

    pub async fn get_build_status(&self, actor_id: &str, build_id: &str) -> Result<ActorBuild> {
        let request = ApiRequest::get(format!("{ACTORS}/{actor_id}/builds/{build_id}"));
        self.transport.execute(request).await?.unwrap_data()
    }

    pub async fn abort_build(&self, actor_id: &str, build_id: &str) -> Result<Value> {
        let request = ApiRequest::delete(format!("{ACTORS}/{actor_id}/builds/{build_id}"));
        self.transport.execute(request).await?.unwrap_data()
    }

    pub async fn get_run_list(&self, params: &PaginationParams) -> Result<Pagination<ActorRun>> {
        let request = params.apply(ApiRequest::get(format!("{ACTORS}/runs")));
        self.transport.execute(request).await?.unwrap_data()
    }
}
