use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{BulkSetResponse, CommonResponse, KvItem, KvNamespace, KvStore, KvValue, Pagination, PaginationParams};
use crate::error::Result;
use crate::transport::{ApiRequest, SharedTransport};

const KV: &str = "/api/v1/kv";

/// Key-value namespaces over HTTP (`/api/v1/kv`).
pub struct KvStorage {
    transport: SharedTransport,
}

impl KvStorage {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.transport.execute(request).await?.unwrap_data()
    }
}

#[async_trait]
impl KvStore for KvStorage {
    async fn list_namespaces(&self, params: &PaginationParams) -> Result<Pagination<KvNamespace>> {
        self.call(params.apply(ApiRequest::get(format!("{KV}/namespaces"))))
            .await
    }

    async fn create_namespace(&self, name: &str) -> Result<KvNamespace> {
        let request = ApiRequest::post(format!("{KV}/namespaces")).with_json_value(json!({ "name": name }));
        self.call(request).await
    }

    async fn get_namespace(&self, namespace_id: &str) -> Result<KvNamespace> {
        self.call(ApiRequest::get(format!("{KV}/{namespace_id}"))).await
    }

    async fn del_namespace(&self, namespace_id: &str) -> Result<CommonResponse> {
        self.call(ApiRequest::delete(format!("{KV}/{namespace_id}"))).await
    }

    async fn rename_namespace(&self, namespace_id: &str, name: &str) -> Result<CommonResponse> {
        let request =
            ApiRequest::put(format!("{KV}/{namespace_id}/rename")).with_json_value(json!({ "name": name }));
        self.call(request).await
    }

    async fn list_keys(&self, namespace_id: &str, params: &PaginationParams) -> Result<Pagination<KvItem>> {
        let request = ApiRequest::get(format!("{KV}/{namespace_id}/keys"))
            .with_query("page", params.page)
            .with_query("pageSize", params.page_size);
        self.call(request).await
    }

    async fn del_value(&self, namespace_id: &str, key: &str) -> Result<CommonResponse> {
        self.call(ApiRequest::delete(format!("{KV}/{namespace_id}/{key}"))).await
    }

    async fn bulk_set_value(&self, namespace_id: &str, values: &[KvValue]) -> Result<BulkSetResponse> {
        let request =
            ApiRequest::post(format!("{KV}/{namespace_id}/bulk")).with_json_value(json!({ "Items": values }));
        self.call(request).await
    }

    async fn bulk_del_value(&self, namespace_id: &str, keys: &[String]) -> Result<CommonResponse> {
        let request =
            ApiRequest::post(format!("{KV}/{namespace_id}/bulk")).with_json_value(json!({ "keys": keys }));
        self.call(request).await
    }

    async fn set_value(&self, namespace_id: &str, value: &KvValue) -> Result<CommonResponse> {
        let request = ApiRequest::put(format!("{KV}/{namespace_id}/key")).with_json(value)?;
        self.call(request).await
    }

    async fn get_value(&self, namespace_id: &str, key: &str) -> Result<String> {
        let value: Value = self.call(ApiRequest::get(format!("{KV}/{namespace_id}/{key}"))).await?;
        Ok(match value {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        })
    }
}
