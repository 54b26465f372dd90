use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{CommonResponse, CreateQueue, Pagination, PaginationParams, PushMessage, PushResponse, Queue, QueueMessage, QueueRef, UpdateQueue};
use crate::error::Result;
use crate::transport::{ApiRequest, SharedTransport};

const QUEUE: &str = "/api/v1/queue";

/// Message queues over HTTP (`/api/v1/queue`).
pub struct QueueStorage {
    transport: SharedTransport,
}

impl QueueStorage {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.transport.execute(request).await?.unwrap_data()
    }

    pub async fn list(&self, params: &PaginationParams) -> Result<Pagination<Queue>> {
        self.call(params.apply(ApiRequest::get(format!("{QUEUE}/queues"))))
            .await
    }

    pub async fn create(&self, queue: &CreateQueue) -> Result<QueueRef> {
        self.call(ApiRequest::post(QUEUE).with_json(queue)?).await
    }

    /// Look a queue up by name, or by id when one is given.
    pub async fn get(&self, name: &str, queue_id: Option<&str>) -> Result<Queue> {
        let request = ApiRequest::get(QUEUE)
            .with_query("name", name)
            .with_query("id", queue_id.unwrap_or_default());
        self.call(request).await
    }

    pub async fn update(&self, queue_id: &str, update: &UpdateQueue) -> Result<Value> {
        self.call(ApiRequest::put(format!("{QUEUE}/{queue_id}")).with_json(update)?)
            .await
    }

    pub async fn delete(&self, queue_id: &str) -> Result<CommonResponse> {
        self.call(ApiRequest::delete(format!("{QUEUE}/{queue_id}")))
            .await
    }

    pub async fn push(&self, queue_id: &str, message: &PushMessage) -> Result<PushResponse> {
        self.call(ApiRequest::post(format!("{QUEUE}/{queue_id}/push")).with_json(message)?)
            .await
    }

    /// Pull up to `limit` messages (the platform accepts 1 to 100).
    pub async fn pull(&self, queue_id: &str, limit: Option<u32>) -> Result<Vec<QueueMessage>> {
        let request = ApiRequest::get(format!("{QUEUE}/{queue_id}/pull"))
            .with_optional_query("limit", limit.filter(|l| *l > 0));
        let messages: Option<Vec<QueueMessage>> = self.call(request).await?;
        Ok(messages.unwrap_or_default())
    }

    pub async fn ack(&self, queue_id: &str, msg_id: &str) -> Result<CommonResponse> {
        self.call(ApiRequest::post(format!("{QUEUE}/{queue_id}/ack/{msg_id}")))
            .await
    }
}
