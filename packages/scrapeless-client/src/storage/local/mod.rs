//! On-disk storage double for running actors offline.
//!
//! One directory per dataset or namespace and one JSON file per record under
//! a root directory. Single writer, no indexes, no locking: it mirrors the
//! HTTP services' behavior closely enough for local runs and tests, and is
//! not a storage engine.

mod dataset;
mod kv;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, ScrapelessError};

pub use dataset::LocalDatasetStorage;
pub use kv::LocalKvStorage;

pub const DEFAULT_STORAGE_DIR: &str = "./storage";

const METADATA_FILE: &str = "metadata.json";

/// Root of the on-disk stores.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_DIR)
    }
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset(&self) -> LocalDatasetStorage {
        LocalDatasetStorage::new(self.root.join("datasets"))
    }

    pub fn kv(&self) -> LocalKvStorage {
        LocalKvStorage::new(self.root.join("kv_stores"))
    }
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ScrapelessError::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}

/// Ids and keys become path components, so anything that could name a
/// location outside the store's directory is refused.
fn require_id(value: &str, what: &str) -> Result<()> {
    require(value, what)?;
    if value == "." || value.contains("..") || value.contains(['/', '\\']) {
        return Err(ScrapelessError::InvalidArgument(format!(
            "{what} must not contain path separators or '..'"
        )));
    }
    Ok(())
}

/// Maps a missing file to [`ScrapelessError::NotFound`]; unreadable or
/// corrupt files keep their own error.
fn missing_as_not_found<T>(result: Result<T>, what: impl FnOnce() -> String) -> Result<T> {
    match result {
        Err(ScrapelessError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ScrapelessError::NotFound(what()))
        }
        other => other,
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Metadata of every subdirectory of `dir` that has a readable
/// `metadata.json`. A missing `dir` yields nothing.
async fn read_all_metadata<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if let Ok(meta) = read_json(&entry.path().join(METADATA_FILE)).await {
            out.push(meta);
        }
    }
    Ok(out)
}

/// Sorted names of the regular files in `dir` that satisfy `keep`.
async fn list_files(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if keep(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
