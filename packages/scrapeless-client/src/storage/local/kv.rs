use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    list_files, missing_as_not_found, read_all_metadata, read_json, require, require_id, write_json,
    METADATA_FILE,
};
use crate::error::{Result, ScrapelessError};
use crate::storage::{
    BulkSetResponse, CommonResponse, KvItem, KvNamespace, KvStore, KvValue, Pagination, PaginationParams,
    StorageStats,
};

/// Namespace that holds the actor's `INPUT` record.
const DEFAULT_NAMESPACE: &str = "default";
const INPUT_KEY: &str = "INPUT";

/// Longer expirations are clamped to a century.
const MAX_EXPIRATION_SECS: i64 = 100 * 365 * 24 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceMeta {
    id: String,
    name: String,
    #[serde(default)]
    actor_id: String,
    #[serde(default)]
    run_id: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

/// One key file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredKey {
    namespace_id: String,
    key: String,
    value: String,
    /// Seconds; 0 never expires.
    #[serde(default)]
    expiration: u64,
    #[serde(default)]
    expire_at: Option<DateTime<Utc>>,
    size: u64,
}

impl StoredKey {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_some_and(|at| at < now)
    }
}

/// Key-value namespaces as directories of `<key>.json` files.
#[derive(Debug, Clone)]
pub struct LocalKvStorage {
    dir: PathBuf,
}

impl LocalKvStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn namespace_dir(&self, namespace_id: &str) -> Result<PathBuf> {
        require_id(namespace_id, "namespaceId")?;
        Ok(self.dir.join(namespace_id))
    }

    fn key_path(&self, namespace_id: &str, key: &str) -> Result<PathBuf> {
        require_id(key, "key")?;
        Ok(self.namespace_dir(namespace_id)?.join(format!("{key}.json")))
    }

    async fn live_keys(&self, namespace_id: &str) -> Result<Vec<StoredKey>> {
        let dir = self.namespace_dir(namespace_id)?;
        let files = list_files(&dir, |n| n.ends_with(".json") && n != METADATA_FILE).await?;
        let now = Utc::now();
        let mut keys = Vec::with_capacity(files.len());
        for name in files {
            // Foreign files (the raw INPUT record, partial writes) are skipped.
            if let Ok(stored) = read_json::<StoredKey>(&dir.join(name)).await {
                if !stored.is_expired(now) {
                    keys.push(stored);
                }
            }
        }
        Ok(keys)
    }

    async fn with_stats(&self, meta: NamespaceMeta) -> KvNamespace {
        let keys = self.live_keys(&meta.id).await.unwrap_or_default();
        KvNamespace {
            stats: StorageStats {
                count: keys.len() as u64,
                size: keys.iter().map(|k| k.size).sum(),
            },
            id: meta.id,
            name: meta.name,
            actor_id: meta.actor_id,
            run_id: meta.run_id,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
        }
    }

    async fn load_meta(&self, namespace_id: &str) -> Result<NamespaceMeta> {
        let path = self.namespace_dir(namespace_id)?.join(METADATA_FILE);
        missing_as_not_found(read_json(&path).await, || format!("namespace {namespace_id}"))
    }
}

#[async_trait]
impl KvStore for LocalKvStorage {
    async fn list_namespaces(&self, params: &PaginationParams) -> Result<Pagination<KvNamespace>> {
        let mut all: Vec<NamespaceMeta> = read_all_metadata(&self.dir).await?;
        all.sort_by_key(|m| m.created_at);
        if params.desc == Some(true) {
            all.reverse();
        }
        let page = Pagination::slice(all, params.page, params.page_size);
        let mut items = Vec::with_capacity(page.items.len());
        for meta in page.items {
            items.push(self.with_stats(meta).await);
        }
        Ok(Pagination {
            items,
            total: page.total,
            total_page: page.total_page,
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn create_namespace(&self, name: &str) -> Result<KvNamespace> {
        require(name, "Namespace name")?;
        let existing: Vec<NamespaceMeta> = read_all_metadata(&self.dir).await?;
        if existing.iter().any(|m| m.name == name) {
            return Err(ScrapelessError::InvalidArgument(
                "The name of the namespace already exists".into(),
            ));
        }
        let now = Utc::now();
        let meta = NamespaceMeta {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            actor_id: String::new(),
            run_id: String::new(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        let dir = self.namespace_dir(&meta.id)?;
        tokio::fs::create_dir_all(&dir).await?;
        write_json(&dir.join(METADATA_FILE), &meta).await?;
        Ok(self.with_stats(meta).await)
    }

    async fn get_namespace(&self, namespace_id: &str) -> Result<KvNamespace> {
        let meta = self.load_meta(namespace_id).await?;
        Ok(self.with_stats(meta).await)
    }

    async fn del_namespace(&self, namespace_id: &str) -> Result<CommonResponse> {
        let Ok(dir) = self.namespace_dir(namespace_id) else {
            return Ok(CommonResponse::failed());
        };
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(CommonResponse::ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CommonResponse::ok()),
            Err(_) => Ok(CommonResponse::failed()),
        }
    }

    async fn rename_namespace(&self, namespace_id: &str, name: &str) -> Result<CommonResponse> {
        if namespace_id.is_empty() || name.is_empty() {
            return Ok(CommonResponse::failed());
        }
        let Ok(mut meta) = self.load_meta(namespace_id).await else {
            return Ok(CommonResponse::failed());
        };
        meta.name = name.to_string();
        meta.updated_at = Some(Utc::now());
        write_json(&self.namespace_dir(namespace_id)?.join(METADATA_FILE), &meta).await?;
        Ok(CommonResponse::ok())
    }

    async fn list_keys(&self, namespace_id: &str, params: &PaginationParams) -> Result<Pagination<KvItem>> {
        let keys = match self.live_keys(namespace_id).await {
            Ok(keys) => keys,
            Err(ScrapelessError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Pagination::empty(params.page.max(1), params.page_size.max(1)))
            }
            Err(e) => return Err(e),
        };
        let items: Vec<KvItem> = keys
            .into_iter()
            .map(|k| KvItem { key: k.key, size: k.size })
            .collect();
        Ok(Pagination::slice(items, params.page, params.page_size))
    }

    async fn del_value(&self, namespace_id: &str, key: &str) -> Result<CommonResponse> {
        require_id(namespace_id, "namespaceId")?;
        if key == "metadata" {
            return Ok(CommonResponse::failed());
        }
        let Ok(path) = self.key_path(namespace_id, key) else {
            return Ok(CommonResponse::failed());
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(CommonResponse::ok()),
            Err(_) => Ok(CommonResponse::failed()),
        }
    }

    async fn bulk_set_value(&self, namespace_id: &str, values: &[KvValue]) -> Result<BulkSetResponse> {
        require_id(namespace_id, "namespaceId")?;
        let mut response = BulkSetResponse::default();
        for value in values {
            match self.set_value(namespace_id, value).await {
                Ok(res) if res.success => response.successful_key_count += 1,
                _ => response.unsuccessful_keys.push(value.key.clone()),
            }
        }
        Ok(response)
    }

    async fn bulk_del_value(&self, namespace_id: &str, keys: &[String]) -> Result<CommonResponse> {
        require_id(namespace_id, "namespaceId")?;
        if keys.is_empty() {
            return Ok(CommonResponse::failed());
        }
        for key in keys {
            self.del_value(namespace_id, key).await?;
        }
        Ok(CommonResponse::ok())
    }

    async fn set_value(&self, namespace_id: &str, value: &KvValue) -> Result<CommonResponse> {
        require_id(namespace_id, "namespaceId")?;
        if value.value.is_empty() || value.key == "metadata" {
            return Ok(CommonResponse::failed());
        }
        if namespace_id == DEFAULT_NAMESPACE && value.key == INPUT_KEY {
            return Ok(CommonResponse::failed());
        }
        let now = Utc::now();
        let expiration = value.expiration.unwrap_or(0);
        let expire_at = (expiration > 0)
            .then(|| {
                let secs = i64::try_from(expiration).unwrap_or(i64::MAX).min(MAX_EXPIRATION_SECS);
                now.checked_add_signed(Duration::seconds(secs))
            })
            .flatten();
        let stored = StoredKey {
            namespace_id: namespace_id.to_string(),
            key: value.key.clone(),
            value: value.value.clone(),
            expiration,
            expire_at,
            size: value.value.len() as u64,
        };
        let Ok(path) = self.key_path(namespace_id, &value.key) else {
            return Ok(CommonResponse::failed());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_json(&path, &stored).await?;
        Ok(CommonResponse::ok())
    }

    async fn get_value(&self, namespace_id: &str, key: &str) -> Result<String> {
        let path = self.key_path(namespace_id, key)?;
        if namespace_id == DEFAULT_NAMESPACE && key == INPUT_KEY {
            return Ok(tokio::fs::read_to_string(path).await.unwrap_or_default());
        }
        match read_json::<StoredKey>(&path).await {
            Ok(stored) if !stored.is_expired(Utc::now()) => Ok(stored.value),
            _ => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalKvStorage) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalKvStorage::new(dir.path().join("kv_stores"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_set_get_and_stats() {
        let (_tmp, store) = store();
        let ns = store.create_namespace("cache").await.unwrap();
        assert!(store.set_value(&ns.id, &KvValue::new("a", "hello")).await.unwrap().success);
        assert_eq!(store.get_value(&ns.id, "a").await.unwrap(), "hello");

        let ns = store.get_namespace(&ns.id).await.unwrap();
        assert_eq!(ns.stats, StorageStats { count: 1, size: 5 });
    }

    #[tokio::test]
    async fn test_rejects_reserved_and_empty() {
        let (_tmp, store) = store();
        let ns = store.create_namespace("n").await.unwrap();
        assert!(!store.set_value(&ns.id, &KvValue::new("metadata", "x")).await.unwrap().success);
        assert!(!store.set_value(&ns.id, &KvValue::new("k", "")).await.unwrap().success);
        assert!(!store.set_value("default", &KvValue::new("INPUT", "{}")).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_expired_key_reads_as_missing() {
        let (_tmp, store) = store();
        let ns = store.create_namespace("n").await.unwrap();
        let stale = StoredKey {
            namespace_id: ns.id.clone(),
            key: "old".into(),
            value: "v".into(),
            expiration: 1,
            expire_at: Some(Utc::now() - Duration::seconds(10)),
            size: 1,
        };
        write_json(&store.key_path(&ns.id, "old").unwrap(), &stale).await.unwrap();
        store.set_value(&ns.id, &KvValue::new("fresh", "v").expiring_in(3600)).await.unwrap();

        assert_eq!(store.get_value(&ns.id, "old").await.unwrap(), "");
        let keys = store.list_keys(&ns.id, &PaginationParams::default()).await.unwrap();
        assert_eq!(keys.items, vec![KvItem { key: "fresh".into(), size: 1 }]);
    }

    #[tokio::test]
    async fn test_zero_expiration_never_expires() {
        let (_tmp, store) = store();
        let ns = store.create_namespace("n").await.unwrap();
        store.set_value(&ns.id, &KvValue::new("k", "v").expiring_in(0)).await.unwrap();
        let stored: StoredKey = read_json(&store.key_path(&ns.id, "k").unwrap()).await.unwrap();
        assert!(stored.expire_at.is_none());
        assert_eq!(store.get_value(&ns.id, "k").await.unwrap(), "v");
    }

    #[tokio::test]
    async fn test_bulk_set_reports_failures() {
        let (_tmp, store) = store();
        let ns = store.create_namespace("n").await.unwrap();
        let res = store
            .bulk_set_value(&ns.id, &[KvValue::new("a", "1"), KvValue::new("", "2")])
            .await
            .unwrap();
        assert_eq!(res.successful_key_count, 1);
        assert_eq!(res.unsuccessful_keys, vec![String::new()]);

        assert!(store.bulk_del_value(&ns.id, &["a".to_string()]).await.unwrap().success);
        assert_eq!(store.get_value(&ns.id, "a").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_default_input_is_read_raw() {
        let (_tmp, store) = store();
        let path = store.key_path("default", "INPUT").unwrap();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, r#"{"url":"https://example.com"}"#).await.unwrap();
        assert_eq!(
            store.get_value("default", "INPUT").await.unwrap(),
            r#"{"url":"https://example.com"}"#
        );
    }

    #[tokio::test]
    async fn test_namespace_and_key_cannot_leave_the_root() {
        let (tmp, store) = store();
        let ns = store.create_namespace("n").await.unwrap();

        assert!(!store.set_value(&ns.id, &KvValue::new("../../outside", "x")).await.unwrap().success);
        assert!(matches!(
            store.set_value("..", &KvValue::new("k", "x")).await.unwrap_err(),
            ScrapelessError::InvalidArgument(_)
        ));
        assert!(matches!(
            store.get_value(&ns.id, "../metadata").await.unwrap_err(),
            ScrapelessError::InvalidArgument(_)
        ));
        assert!(!store.del_namespace("../kv_stores").await.unwrap().success);
        assert!(store.dir().exists());
        assert!(!tmp.path().join("outside.json").exists());
    }

    #[tokio::test]
    async fn test_corrupt_namespace_metadata_is_a_parse_error() {
        let (_tmp, store) = store();
        let ns = store.create_namespace("n").await.unwrap();
        std::fs::write(store.dir().join(&ns.id).join(METADATA_FILE), b"][").unwrap();
        assert!(matches!(
            store.get_namespace(&ns.id).await.unwrap_err(),
            ScrapelessError::Parse(_)
        ));
    }

    #[tokio::test]
    async fn test_rename_and_duplicate_names() {
        let (_tmp, store) = store();
        let ns = store.create_namespace("a").await.unwrap();
        assert!(store.create_namespace("a").await.is_err());
        assert!(store.rename_namespace(&ns.id, "b").await.unwrap().success);
        assert_eq!(store.get_namespace(&ns.id).await.unwrap().name, "b");
        assert!(!store.rename_namespace("ghost", "c").await.unwrap().success);
    }
}
