use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{Collection, CreateCollection, DocOpResponse, Pagination, PaginationParams, ScoredDoc, VectorDoc, VectorQuery};
use crate::error::Result;
use crate::transport::{ApiRequest, SharedTransport};

const VECTOR: &str = "/api/v1/vector";

/// Vector collections over HTTP (`/api/v1/vector`).
pub struct VectorStorage {
    transport: SharedTransport,
}

impl VectorStorage {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.transport.execute(request).await?.unwrap_data()
    }

    pub async fn list_collections(&self, params: &PaginationParams) -> Result<Pagination<Collection>> {
        self.call(params.apply(ApiRequest::get(VECTOR))).await
    }

    pub async fn create_collection(&self, collection: &CreateCollection) -> Result<Collection> {
        self.call(ApiRequest::post(VECTOR).with_json(collection)?).await
    }

    pub async fn update_collection(&self, id: &str, name: &str, description: Option<&str>) -> Result<Value> {
        let request = ApiRequest::put(format!("{VECTOR}/{id}"))
            .with_json_value(json!({ "name": name, "description": description }));
        self.call(request).await
    }

    pub async fn del_collection(&self, id: &str) -> Result<Value> {
        self.call(ApiRequest::delete(format!("{VECTOR}/{id}"))).await
    }

    pub async fn get_collection(&self, id: &str) -> Result<Collection> {
        self.call(ApiRequest::get(format!("{VECTOR}/{id}"))).await
    }

    pub async fn create_docs(&self, collection_id: &str, docs: &[VectorDoc]) -> Result<DocOpResponse> {
        let request =
            ApiRequest::post(format!("{VECTOR}/{collection_id}/docs")).with_json_value(json!({ "docs": docs }));
        self.call(request).await
    }

    pub async fn update_docs(&self, collection_id: &str, docs: &[VectorDoc]) -> Result<DocOpResponse> {
        let request =
            ApiRequest::put(format!("{VECTOR}/{collection_id}/docs")).with_json_value(json!({ "docs": docs }));
        self.call(request).await
    }

    pub async fn upsert_docs(&self, collection_id: &str, docs: &[VectorDoc]) -> Result<DocOpResponse> {
        let request = ApiRequest::post(format!("{VECTOR}/{collection_id}/docs/upsert"))
            .with_json_value(json!({ "docs": docs }));
        self.call(request).await
    }

    pub async fn del_docs(&self, collection_id: &str, ids: &[String]) -> Result<DocOpResponse> {
        let request =
            ApiRequest::delete(format!("{VECTOR}/{collection_id}/docs")).with_json_value(json!({ "ids": ids }));
        self.call(request).await
    }

    /// Nearest-neighbour search.
    pub async fn query_docs(&self, collection_id: &str, query: &VectorQuery) -> Result<Vec<ScoredDoc>> {
        let request = ApiRequest::post(format!("{VECTOR}/{collection_id}/docs/query")).with_json(query)?;
        self.call(request).await
    }

    /// Documents keyed by id; the `ids` query parameter repeats once per id.
    pub async fn query_docs_by_ids(&self, collection_id: &str, ids: &[String]) -> Result<HashMap<String, ScoredDoc>> {
        let request = ids
            .iter()
            .fold(ApiRequest::get(format!("{VECTOR}/{collection_id}/docs")), |req, id| {
                req.with_query("ids", id)
            });
        self.call(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_query_by_ids_repeats_param() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::GET,
            "/api/v1/vector/c1/docs?ids=a&ids=b",
            json!({"data": {"a": {"id": "a", "content": "x"}, "b": {"id": "b"}}}),
        );
        let docs = VectorStorage::new(mock)
            .query_docs_by_ids("c1", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs["a"].content.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_del_docs_sends_ids_in_body() {
        let mock = Arc::new(MockTransport::new());
        mock.on(Method::DELETE, "/api/v1/vector/c1/docs", json!({"data": {"ids": ["a"]}}));
        let res = VectorStorage::new(mock.clone())
            .del_docs("c1", &["a".to_string()])
            .await
            .unwrap();
        assert_eq!(res.ids, vec!["a"]);
        assert_eq!(mock.last_call().unwrap().body.unwrap(), json!({"ids": ["a"]}));
    }

    #[tokio::test]
    async fn test_query_docs_posts_top_k() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::POST,
            "/api/v1/vector/c1/docs/query",
            json!({"data": [{"id": "a", "score": 0.9}]}),
        );
        let hits = VectorStorage::new(mock.clone())
            .query_docs(
                "c1",
                &VectorQuery {
                    vector: vec![0.1, 0.2],
                    top_k: 3,
                    include_vector: None,
                    filter: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits[0].score, Some(0.9));
        assert_eq!(mock.last_call().unwrap().body.unwrap()["topK"], 3);
    }
}
