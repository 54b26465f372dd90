use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

use super::{CommonResponse, Dataset, DatasetListParams, DatasetStore, Pagination, PaginationParams};
use crate::error::Result;
use crate::transport::{ApiRequest, SharedTransport};

const DATASET: &str = "/api/v1/dataset";

/// Datasets over HTTP (`/api/v1/dataset`).
pub struct DatasetStorage {
    transport: SharedTransport,
}

impl DatasetStorage {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.transport.execute(request).await?.unwrap_data()
    }
}

#[async_trait]
impl DatasetStore for DatasetStorage {
    async fn list_datasets(&self, params: &DatasetListParams) -> Result<Pagination<Dataset>> {
        let request = params
            .pagination
            .apply(ApiRequest::get(DATASET))
            .with_optional_query("actorId", params.actor_id.as_deref())
            .with_optional_query("runId", params.run_id.as_deref());
        self.call(request).await
    }

    async fn get_dataset(&self, dataset_id: &str) -> Result<Dataset> {
        self.call(ApiRequest::get(format!("{DATASET}/{dataset_id}"))).await
    }

    #[instrument(skip(self))]
    async fn create_dataset(&self, name: &str) -> Result<Dataset> {
        self.call(ApiRequest::post(DATASET).with_json_value(json!({ "name": name })))
            .await
    }

    async fn update_dataset(&self, dataset_id: &str, name: &str) -> Result<Dataset> {
        let request =
            ApiRequest::put(format!("{DATASET}/{dataset_id}")).with_json_value(json!({ "name": name }));
        self.call(request).await
    }

    async fn del_dataset(&self, dataset_id: &str) -> Result<CommonResponse> {
        self.call(ApiRequest::delete(format!("{DATASET}/{dataset_id}")))
            .await
    }

    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn add_items(&self, dataset_id: &str, items: &[Value]) -> Result<CommonResponse> {
        let request = ApiRequest::post(format!("{DATASET}/{dataset_id}/items"))
            .with_json_value(json!({ "items": items }));
        self.call(request).await
    }

    async fn get_items(&self, dataset_id: &str, params: &PaginationParams) -> Result<Pagination<Value>> {
        let request = params.apply(ApiRequest::get(format!("{DATASET}/{dataset_id}/items")));
        self.call(request).await
    }
}
