//! Actor storage: datasets, key-value namespaces, object buckets, queues and
//! vector collections.
//!
//! Datasets and key-value namespaces sit behind the [`DatasetStore`] and
//! [`KvStore`] traits so actors can run against the HTTP services or the
//! on-disk doubles in [`local`] without changing code.

mod dataset;
mod kv;
pub mod local;
mod object;
mod queue;
pub mod types;
mod vector;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::transport::SharedTransport;

pub use dataset::DatasetStorage;
pub use kv::KvStorage;
pub use object::{ObjectStorage, ObjectUpload};
pub use queue::QueueStorage;
pub use types::*;
pub use vector::VectorStorage;

#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn list_datasets(&self, params: &DatasetListParams) -> Result<Pagination<Dataset>>;

    async fn get_dataset(&self, dataset_id: &str) -> Result<Dataset>;

    async fn create_dataset(&self, name: &str) -> Result<Dataset>;

    async fn update_dataset(&self, dataset_id: &str, name: &str) -> Result<Dataset>;

    async fn del_dataset(&self, dataset_id: &str) -> Result<CommonResponse>;

    /// Append JSON objects to the dataset.
    async fn add_items(&self, dataset_id: &str, items: &[Value]) -> Result<CommonResponse>;

    async fn get_items(&self, dataset_id: &str, params: &PaginationParams) -> Result<Pagination<Value>>;
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn list_namespaces(&self, params: &PaginationParams) -> Result<Pagination<KvNamespace>>;

    async fn create_namespace(&self, name: &str) -> Result<KvNamespace>;

    async fn get_namespace(&self, namespace_id: &str) -> Result<KvNamespace>;

    async fn del_namespace(&self, namespace_id: &str) -> Result<CommonResponse>;

    async fn rename_namespace(&self, namespace_id: &str, name: &str) -> Result<CommonResponse>;

    /// `params.desc` is ignored; keys list in key order.
    async fn list_keys(&self, namespace_id: &str, params: &PaginationParams) -> Result<Pagination<KvItem>>;

    async fn del_value(&self, namespace_id: &str, key: &str) -> Result<CommonResponse>;

    async fn bulk_set_value(&self, namespace_id: &str, values: &[KvValue]) -> Result<BulkSetResponse>;

    async fn bulk_del_value(&self, namespace_id: &str, keys: &[String]) -> Result<CommonResponse>;

    async fn set_value(&self, namespace_id: &str, value: &KvValue) -> Result<CommonResponse>;

    /// The stored value, or an empty string when the key is missing or expired.
    async fn get_value(&self, namespace_id: &str, key: &str) -> Result<String>;
}

/// All storage services over one transport.
pub struct StorageService {
    pub dataset: DatasetStorage,
    pub kv: KvStorage,
    pub object: ObjectStorage,
    pub queue: QueueStorage,
    pub vector: VectorStorage,
}

impl StorageService {
    pub fn new(transport: SharedTransport) -> Self {
        Self {
            dataset: DatasetStorage::new(transport.clone()),
            kv: KvStorage::new(transport.clone()),
            object: ObjectStorage::new(transport.clone()),
            queue: QueueStorage::new(transport.clone()),
            vector: VectorStorage::new(transport),
        }
    }
}
