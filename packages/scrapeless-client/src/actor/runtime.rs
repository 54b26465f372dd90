use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::RunnerService;
use crate::browser::BrowserService;
use crate::captcha::CaptchaService;
use crate::config::{EnvKey, ResolvedConfig, ScrapelessConfig};
use crate::credentials::ApiKey;
use crate::error::{Result, ScrapelessError};
use crate::proxies::ProxiesService;
use crate::storage::{
    Bucket, BucketListParams, BucketPage, BulkSetResponse, CommonResponse, CreateBucket, CreateQueue, Dataset,
    DatasetListParams, DatasetStore, KvItem, KvNamespace, KvStore, KvValue, ObjectPage, ObjectUpload,
    ObjectUploaded, Pagination, PaginationParams, PushMessage, PushResponse, Queue, QueueMessage, QueueRef,
    StorageService, UpdateQueue,
};
use crate::transport::{HttpTransport, SharedTransport};

/// Identity and storage bindings the platform injects into an actor's
/// environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorContext {
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub actor_id: Option<String>,
    pub run_id: Option<String>,
    /// Raw `SCRAPELESS_INPUT`.
    pub input: Option<String>,
    pub dataset_id: Option<String>,
    pub kv_namespace_id: Option<String>,
    pub bucket_id: Option<String>,
    pub queue_id: Option<String>,
}

impl ActorContext {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| key.get())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(EnvKey) -> Option<String>,
    {
        let get = |key| lookup(key).filter(|v| !v.is_empty());
        Self {
            user_id: get(EnvKey::UserId),
            team_id: get(EnvKey::TeamId),
            actor_id: get(EnvKey::ActorId),
            run_id: get(EnvKey::RunId),
            input: get(EnvKey::Input),
            dataset_id: get(EnvKey::DatasetId),
            kv_namespace_id: get(EnvKey::KvNamespaceId),
            bucket_id: get(EnvKey::BucketId),
            queue_id: get(EnvKey::QueueId),
        }
    }
}

fn bound(id: Option<&str>, key: EnvKey) -> Result<&str> {
    id.ok_or_else(|| ScrapelessError::Config(format!("{} is not set", key.var_name())))
}

/// Services for code running inside an actor, with the run's default
/// dataset, namespace, bucket and queue already bound.
pub struct Actor {
    context: ActorContext,
    pub runner: RunnerService,
    pub storage: StorageService,
    pub browser: BrowserService,
    pub captcha: CaptchaService,
    pub proxy: ProxiesService,
}

impl Actor {
    /// Load `.env`, then read both the client settings and the run bindings
    /// from the environment.
    pub fn from_env() -> Result<Self> {
        let config = ScrapelessConfig::from_env()?;
        Self::from_config(&config, ActorContext::from_env())
    }

    pub fn from_config(config: &ResolvedConfig, context: ActorContext) -> Result<Self> {
        let http = |url: &str, component: &'static str| -> Result<SharedTransport> {
            Ok(HttpTransport::new(config.api_key.clone(), url, Some(config.timeout), component)?.shared())
        };
        debug!(
            actor_id = context.actor_id.as_deref().unwrap_or_default(),
            run_id = context.run_id.as_deref().unwrap_or_default(),
            "actor runtime configured"
        );
        Ok(Self {
            runner: RunnerService::new(http(&config.actor_api_url, "actor.runner")?, context.actor_id.clone()),
            storage: StorageService::new(http(&config.storage_api_url, "storage")?),
            browser: BrowserService::from_config(config)?,
            captcha: CaptchaService::new(http(&config.base_api_url, "captcha")?),
            proxy: ProxiesService::new(config.api_key.clone()),
            context,
        })
    }

    /// Every service over one transport.
    pub fn with_transport(transport: SharedTransport, api_key: ApiKey, context: ActorContext) -> Self {
        Self {
            runner: RunnerService::new(transport.clone(), context.actor_id.clone()),
            storage: StorageService::new(transport.clone()),
            browser: BrowserService::new(transport.clone()),
            captcha: CaptchaService::new(transport),
            proxy: ProxiesService::new(api_key),
            context,
        }
    }

    pub fn context(&self) -> &ActorContext {
        &self.context
    }

    /// The run input. JSON is parsed; anything else comes back as a string.
    pub fn input(&self) -> Result<Value> {
        let raw = bound(self.context.input.as_deref(), EnvKey::Input)?;
        Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
    }

    pub fn input_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.input()?)?)
    }

    fn dataset_id(&self) -> Result<&str> {
        bound(self.context.dataset_id.as_deref(), EnvKey::DatasetId)
    }

    fn namespace_id(&self) -> Result<&str> {
        bound(self.context.kv_namespace_id.as_deref(), EnvKey::KvNamespaceId)
    }

    fn bucket_id(&self) -> Result<&str> {
        bound(self.context.bucket_id.as_deref(), EnvKey::BucketId)
    }

    fn queue_id(&self) -> Result<&str> {
        bound(self.context.queue_id.as_deref(), EnvKey::QueueId)
    }

    // Datasets

    pub async fn list_datasets(&self, params: &DatasetListParams) -> Result<Pagination<Dataset>> {
        self.storage.dataset.list_datasets(params).await
    }

    pub async fn add_items(&self, items: &[Value]) -> Result<CommonResponse> {
        self.storage.dataset.add_items(self.dataset_id()?, items).await
    }

    pub async fn get_items(&self, params: &PaginationParams) -> Result<Pagination<Value>> {
        self.storage.dataset.get_items(self.dataset_id()?, params).await
    }

    pub async fn update_dataset(&self, name: &str) -> Result<Dataset> {
        self.storage.dataset.update_dataset(self.dataset_id()?, name).await
    }

    pub async fn delete_dataset(&self) -> Result<CommonResponse> {
        self.storage.dataset.del_dataset(self.dataset_id()?).await
    }

    // Key-value

    pub async fn list_namespaces(&self, params: &PaginationParams) -> Result<Pagination<KvNamespace>> {
        self.storage.kv.list_namespaces(params).await
    }

    pub async fn create_namespace(&self, name: &str) -> Result<KvNamespace> {
        self.storage.kv.create_namespace(name).await
    }

    pub async fn get_namespace(&self) -> Result<KvNamespace> {
        self.storage.kv.get_namespace(self.namespace_id()?).await
    }

    pub async fn delete_namespace(&self) -> Result<CommonResponse> {
        self.storage.kv.del_namespace(self.namespace_id()?).await
    }

    pub async fn rename_namespace(&self, name: &str) -> Result<CommonResponse> {
        self.storage.kv.rename_namespace(self.namespace_id()?, name).await
    }

    pub async fn list_keys(&self, params: &PaginationParams) -> Result<Pagination<KvItem>> {
        self.storage.kv.list_keys(self.namespace_id()?, params).await
    }

    pub async fn delete_value(&self, key: &str) -> Result<CommonResponse> {
        self.storage.kv.del_value(self.namespace_id()?, key).await
    }

    pub async fn bulk_set_value(&self, values: &[KvValue]) -> Result<BulkSetResponse> {
        self.storage.kv.bulk_set_value(self.namespace_id()?, values).await
    }

    pub async fn bulk_del_value(&self, keys: &[String]) -> Result<CommonResponse> {
        self.storage.kv.bulk_del_value(self.namespace_id()?, keys).await
    }

    pub async fn set_value(&self, value: &KvValue) -> Result<CommonResponse> {
        self.storage.kv.set_value(self.namespace_id()?, value).await
    }

    pub async fn get_value(&self, key: &str) -> Result<String> {
        self.storage.kv.get_value(self.namespace_id()?, key).await
    }

    // Objects

    pub async fn list_buckets(&self, params: &BucketListParams) -> Result<BucketPage> {
        self.storage.object.list_buckets(params).await
    }

    pub async fn create_bucket(&self, bucket: &CreateBucket) -> Result<Bucket> {
        self.storage.object.create_bucket(bucket).await
    }

    pub async fn delete_bucket(&self) -> Result<CommonResponse> {
        self.storage.object.delete_bucket(self.bucket_id()?).await
    }

    pub async fn get_bucket(&self) -> Result<Bucket> {
        self.storage.object.get_bucket(self.bucket_id()?).await
    }

    pub async fn list_objects(&self, page: u32, page_size: u32, search: Option<&str>) -> Result<ObjectPage> {
        self.storage.object.list(self.bucket_id()?, page, page_size, search).await
    }

    pub async fn get_object(&self, object_id: &str) -> Result<Value> {
        self.storage.object.get(self.bucket_id()?, object_id).await
    }

    pub async fn put_object(&self, upload: ObjectUpload) -> Result<ObjectUploaded> {
        self.storage.object.put(self.bucket_id()?, upload).await
    }

    pub async fn delete_object(&self, object_id: &str) -> Result<CommonResponse> {
        self.storage.object.delete(self.bucket_id()?, object_id).await
    }

    // Queues

    pub async fn list_queues(&self, params: &PaginationParams) -> Result<Pagination<Queue>> {
        self.storage.queue.list(params).await
    }

    pub async fn create_queue(&self, queue: &CreateQueue) -> Result<QueueRef> {
        self.storage.queue.create(queue).await
    }

    /// Look up `name`, scoped to the bound queue id.
    pub async fn get_queue(&self, name: &str) -> Result<Queue> {
        self.storage.queue.get(name, self.context.queue_id.as_deref()).await
    }

    pub async fn update_queue(&self, update: &UpdateQueue) -> Result<Value> {
        self.storage.queue.update(self.queue_id()?, update).await
    }

    pub async fn delete_queue(&self) -> Result<CommonResponse> {
        self.storage.queue.delete(self.queue_id()?).await
    }

    pub async fn push_message(&self, message: &PushMessage) -> Result<PushResponse> {
        self.storage.queue.push(self.queue_id()?, message).await
    }

    pub async fn pull_message(&self, limit: Option<u32>) -> Result<Vec<QueueMessage>> {
        self.storage.queue.pull(self.queue_id()?, limit).await
    }

    pub async fn ack_message(&self, msg_id: &str) -> Result<CommonResponse> {
        self.storage.queue.ack(self.queue_id()?, msg_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    fn context(pairs: &[(EnvKey, &str)]) -> ActorContext {
        let pairs: Vec<(EnvKey, String)> = pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        ActorContext::from_lookup(move |key| {
            pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone())
        })
    }

    fn actor(pairs: &[(EnvKey, &str)]) -> (Arc<MockTransport>, Actor) {
        let mock = Arc::new(MockTransport::new());
        let actor = Actor::with_transport(mock.clone(), ApiKey::new("k"), context(pairs));
        (mock, actor)
    }

    #[test]
    fn test_context_reads_every_binding() {
        let ctx = context(&[
            (EnvKey::ActorId, "a1"),
            (EnvKey::RunId, "r1"),
            (EnvKey::DatasetId, "d1"),
            (EnvKey::KvNamespaceId, "ns1"),
            (EnvKey::BucketId, "b1"),
            (EnvKey::QueueId, "q1"),
            (EnvKey::TeamId, ""),
        ]);
        assert_eq!(ctx.actor_id.as_deref(), Some("a1"));
        assert_eq!(ctx.run_id.as_deref(), Some("r1"));
        assert_eq!(ctx.dataset_id.as_deref(), Some("d1"));
        assert_eq!(ctx.kv_namespace_id.as_deref(), Some("ns1"));
        assert_eq!(ctx.bucket_id.as_deref(), Some("b1"));
        assert_eq!(ctx.queue_id.as_deref(), Some("q1"));
        assert_eq!(ctx.team_id, None);
    }

    #[test]
    fn test_input_parses_json_and_falls_back_to_text() {
        let (_, json_input) = actor(&[(EnvKey::Input, r#"{"url": "https://example.com", "depth": 2}"#)]);
        assert_eq!(json_input.input().unwrap(), json!({"url": "https://example.com", "depth": 2}));

        #[derive(Deserialize)]
        struct Input {
            url: String,
            depth: u32,
        }
        let typed: Input = json_input.input_as().unwrap();
        assert_eq!(typed.url, "https://example.com");
        assert_eq!(typed.depth, 2);

        let (_, text_input) = actor(&[(EnvKey::Input, "just some words")]);
        assert_eq!(text_input.input().unwrap(), Value::String("just some words".into()));

        let (_, no_input) = actor(&[]);
        let err = no_input.input().unwrap_err();
        assert!(err.to_string().contains("SCRAPELESS_INPUT"));
    }

    #[tokio::test]
    async fn test_add_items_goes_to_bound_dataset() {
        let (mock, actor) = actor(&[(EnvKey::DatasetId, "env-dataset")]);
        mock.on(
            Method::POST,
            "/api/v1/dataset/env-dataset/items",
            json!({"data": {"success": true}}),
        );
        let res = actor.add_items(&[json!({"title": "a"})]).await.unwrap();
        assert!(res.success);
        assert_eq!(mock.last_call().unwrap().body.unwrap(), json!({"items": [{"title": "a"}]}));
    }

    #[tokio::test]
    async fn test_unbound_storage_fails_before_any_request() {
        let (mock, actor) = actor(&[]);
        let err = actor.get_value("k").await.unwrap_err();
        assert!(matches!(err, ScrapelessError::Config(ref m) if m.contains("SCRAPELESS_KV_NAMESPACE_ID")));
        assert!(actor.pull_message(Some(1)).await.is_err());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_runner_takes_actor_id_from_context() {
        let (mock, actor) = actor(&[(EnvKey::ActorId, "a1")]);
        mock.on(Method::DELETE, "/actors/a1/runners/rn/runs/r1", json!({"data": true}));
        assert_eq!(actor.runner.abort_run("rn", "r1").await.unwrap(), true);
    }
}
