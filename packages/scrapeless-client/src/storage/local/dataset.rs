use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{
    list_files, missing_as_not_found, read_all_metadata, read_json, require, require_id, write_json,
    METADATA_FILE,
};
use crate::error::{Result, ScrapelessError};
use crate::storage::{CommonResponse, Dataset, DatasetListParams, DatasetStore, Pagination, PaginationParams, StorageStats};

/// Item files are `00000001.json`, `00000002.json`, ...
fn item_index(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(".json")?;
    if stem.len() != 8 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Datasets as directories of numbered JSON files.
#[derive(Debug, Clone)]
pub struct LocalDatasetStorage {
    dir: PathBuf,
}

impl LocalDatasetStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn dataset_dir(&self, dataset_id: &str) -> Result<PathBuf> {
        require_id(dataset_id, "datasetId")?;
        Ok(self.dir.join(dataset_id))
    }

    async fn load(&self, dataset_id: &str) -> Result<Dataset> {
        let path = self.dataset_dir(dataset_id)?.join(METADATA_FILE);
        missing_as_not_found(read_json(&path).await, || format!("dataset {dataset_id}"))
    }
}

#[async_trait]
impl DatasetStore for LocalDatasetStorage {
    async fn list_datasets(&self, params: &DatasetListParams) -> Result<Pagination<Dataset>> {
        let mut all: Vec<Dataset> = read_all_metadata(&self.dir).await?;
        all.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        if params.pagination.desc == Some(true) {
            all.reverse();
        }
        Ok(Pagination::slice(all, params.pagination.page, params.pagination.page_size))
    }

    async fn get_dataset(&self, dataset_id: &str) -> Result<Dataset> {
        self.load(dataset_id).await
    }

    async fn create_dataset(&self, name: &str) -> Result<Dataset> {
        require(name, "name")?;
        let existing: Vec<Dataset> = read_all_metadata(&self.dir).await?;
        if existing.iter().any(|d| d.name == name) {
            return Err(ScrapelessError::InvalidArgument(
                "The name of the dataset already exists".into(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let dir = self.dataset_dir(&id)?;
        tokio::fs::create_dir_all(&dir).await?;
        let now = Utc::now();
        let dataset = Dataset {
            id,
            name: name.to_string(),
            actor_id: None,
            run_id: None,
            fields: Some(Vec::new()),
            created_at: Some(now),
            updated_at: Some(now),
            stats: StorageStats::default(),
        };
        write_json(&dir.join(METADATA_FILE), &dataset).await?;
        debug!(dataset_id = %dataset.id, name, "created local dataset");
        Ok(dataset)
    }

    async fn update_dataset(&self, dataset_id: &str, name: &str) -> Result<Dataset> {
        require(name, "name")?;
        let mut dataset = self.load(dataset_id).await?;
        dataset.name = name.to_string();
        dataset.updated_at = Some(Utc::now());
        write_json(&self.dataset_dir(dataset_id)?.join(METADATA_FILE), &dataset).await?;
        Ok(dataset)
    }

    async fn del_dataset(&self, dataset_id: &str) -> Result<CommonResponse> {
        match tokio::fs::remove_dir_all(self.dataset_dir(dataset_id)?).await {
            Ok(()) => Ok(CommonResponse::ok().with_message("dataset deleted successfully")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(CommonResponse::ok().with_message("dataset deleted successfully"))
            }
            Err(e) => Ok(CommonResponse::failed().with_message(e.to_string())),
        }
    }

    async fn add_items(&self, dataset_id: &str, items: &[Value]) -> Result<CommonResponse> {
        let mut dataset = match self.load(dataset_id).await {
            Ok(d) => d,
            Err(ScrapelessError::NotFound(_)) => {
                return Ok(CommonResponse::failed().with_message("Dataset not found"))
            }
            Err(e) => return Err(e),
        };
        let dir = self.dataset_dir(dataset_id)?;
        let next = list_files(&dir, |n| item_index(n).is_some())
            .await?
            .iter()
            .filter_map(|n| item_index(n))
            .max()
            .unwrap_or(0)
            + 1;

        let mut fields: BTreeSet<String> = dataset.fields.take().unwrap_or_default().into_iter().collect();
        let mut added_bytes = 0u64;
        for (offset, item) in items.iter().enumerate() {
            if let Value::Object(map) = item {
                fields.extend(map.keys().cloned());
            }
            let bytes = serde_json::to_vec_pretty(item)?;
            added_bytes += bytes.len() as u64;
            let path = dir.join(format!("{:08}.json", next + offset as u64));
            tokio::fs::write(path, bytes).await?;
        }

        dataset.fields = Some(fields.into_iter().collect());
        dataset.stats.count += items.len() as u64;
        dataset.stats.size += added_bytes;
        dataset.updated_at = Some(Utc::now());
        write_json(&dir.join(METADATA_FILE), &dataset).await?;
        Ok(CommonResponse::ok().with_message("Items added"))
    }

    async fn get_items(&self, dataset_id: &str, params: &PaginationParams) -> Result<Pagination<Value>> {
        let dir = self.dataset_dir(dataset_id)?;
        let files = match list_files(&dir, |n| item_index(n).is_some()).await {
            Ok(files) => files,
            Err(ScrapelessError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Pagination::empty(params.page.max(1), params.page_size.max(1)))
            }
            Err(e) => return Err(e),
        };
        let mut items = Vec::with_capacity(files.len());
        for name in files {
            items.push(read_json(&dir.join(name)).await?);
        }
        Ok(Pagination::slice(items, params.page, params.page_size))
    }
}
