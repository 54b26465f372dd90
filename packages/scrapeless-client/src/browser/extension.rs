use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapelessError};
use crate::transport::{ApiRequest, MultipartBody, SharedTransport};

const VALID_SUFFIXES: &[&str] = &[".zip"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedExtension {
    pub extension_id: String,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionListItem {
    pub extension_id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionDetail {
    pub extension_id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub manifest_name: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
struct Ack {
    #[serde(default)]
    success: bool,
}

/// Browser extensions, uploaded as `.zip` archives.
pub struct ExtensionService {
    transport: SharedTransport,
}

impl ExtensionService {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    pub async fn upload(&self, file_path: &Path, name: &str) -> Result<UploadedExtension> {
        let (file_name, bytes) = read_archive(file_path).await?;
        let form = MultipartBody::new()
            .file("file", file_name, bytes)
            .text("name", name);
        let request = ApiRequest::post("/browser/extensions/upload").with_multipart(form);
        Ok(self.transport.execute(request).await?.with_status()?.data)
    }

    pub async fn update(
        &self,
        extension_id: &str,
        file_path: &Path,
        name: Option<&str>,
    ) -> Result<bool> {
        let (file_name, bytes) = read_archive(file_path).await?;
        let mut form = MultipartBody::new().file("file", file_name, bytes);
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            form = form.text("name", name);
        }
        let request =
            ApiRequest::put(format!("/browser/extensions/{extension_id}")).with_multipart(form);
        let ack: Ack = self.transport.execute(request).await?.with_status()?.data;
        Ok(ack.success)
    }

    pub async fn get(&self, extension_id: &str) -> Result<ExtensionDetail> {
        let request = ApiRequest::get(format!("/browser/extensions/{extension_id}"));
        Ok(self.transport.execute(request).await?.with_status()?.data)
    }

    pub async fn list(&self) -> Result<Vec<ExtensionListItem>> {
        let request = ApiRequest::get("/browser/extensions/list");
        Ok(self.transport.execute(request).await?.with_status()?.data)
    }

    pub async fn delete(&self, extension_id: &str) -> Result<bool> {
        let request = ApiRequest::delete(format!("/browser/extensions/{extension_id}"));
        let ack: Ack = self.transport.execute(request).await?.with_status()?.data;
        Ok(ack.success)
    }
}

/// File name of an accepted archive, or an error naming the bad suffix.
fn archive_file_name(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ScrapelessError::InvalidArgument(format!("not a file path: {}", path.display()))
        })?;
    let suffix = file_name
        .rfind('.')
        .map(|i| file_name[i..].to_lowercase())
        .unwrap_or_default();
    if !VALID_SUFFIXES.contains(&suffix.as_str()) {
        return Err(ScrapelessError::InvalidArgument(format!(
            "Invalid file suffix: {suffix}. Supported suffixes: {}",
            VALID_SUFFIXES.join(", ")
        )));
    }
    Ok(file_name.to_string())
}

async fn read_archive(path: &Path) -> Result<(String, Vec<u8>)> {
    let file_name = archive_file_name(path)?;
    let bytes = tokio::fs::read(path).await?;
    Ok((file_name, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_only_zip_archives_accepted() {
        assert_eq!(
            archive_file_name(Path::new("/tmp/ext/Adblock.ZIP")).unwrap(),
            "Adblock.ZIP"
        );
        let err = archive_file_name(Path::new("/tmp/ext/adblock.crx")).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("Invalid file suffix: .crx"));
    }

    #[tokio::test]
    async fn test_upload_sends_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.zip");
        std::fs::write(&path, b"PK\x03\x04").unwrap();

        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::POST,
            "/browser/extensions/upload",
            json!({"extensionId": "x1", "name": "helper"}),
        );
        let ext = ExtensionService::new(mock.clone());
        let uploaded = ext.upload(&path, "helper").await.unwrap();
        assert_eq!(uploaded.extension_id, "x1");

        let fields = mock.last_call().unwrap().form_fields;
        assert!(fields.contains(&("name".to_string(), "helper".to_string())));
        assert!(fields.contains(&("file".to_string(), "helper.zip".to_string())));
    }

    #[tokio::test]
    async fn test_bad_suffix_makes_no_request() {
        let mock = Arc::new(MockTransport::new());
        let ext = ExtensionService::new(mock.clone());
        assert!(ext.upload(Path::new("ext.tar.gz"), "x").await.is_err());
        assert_eq!(mock.call_count(), 0);
    }
}
