use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;

use super::{Bucket, BucketListParams, BucketPage, CommonResponse, CreateBucket, ObjectPage, ObjectUploaded};
use crate::error::{Result, ScrapelessError};
use crate::transport::{ApiRequest, MultipartBody, SharedTransport};

const OBJECT: &str = "/api/v1/object";

/// Object buckets over HTTP (`/api/v1/object`).
pub struct ObjectStorage {
    transport: SharedTransport,
}

/// Upload source plus the run it belongs to.
#[derive(Debug, Clone, Default)]
pub struct ObjectUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub actor_id: Option<String>,
    pub run_id: Option<String>,
}

impl ObjectUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            ..Default::default()
        }
    }

    /// Read the file at `path`, keeping its file name.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ScrapelessError::InvalidArgument(format!("not a file path: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(file_name, bytes))
    }
}

impl ObjectStorage {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.transport.execute(request).await?.unwrap_data()
    }

    pub async fn list_buckets(&self, params: &BucketListParams) -> Result<BucketPage> {
        let request = params
            .pagination
            .apply(ApiRequest::get(format!("{OBJECT}/buckets")))
            .with_optional_query("actor", params.actor.as_deref())
            .with_optional_query("runId", params.run_id.as_deref());
        self.call(request).await
    }

    pub async fn create_bucket(&self, bucket: &CreateBucket) -> Result<Bucket> {
        self.call(ApiRequest::post(format!("{OBJECT}/buckets")).with_json(bucket)?)
            .await
    }

    pub async fn delete_bucket(&self, bucket_id: &str) -> Result<CommonResponse> {
        self.call(ApiRequest::delete(format!("{OBJECT}/buckets/{bucket_id}")))
            .await
    }

    pub async fn get_bucket(&self, bucket_id: &str) -> Result<Bucket> {
        self.call(ApiRequest::get(format!("{OBJECT}/buckets/{bucket_id}")))
            .await
    }

    /// Objects in a bucket, optionally filtered by a search term.
    pub async fn list(&self, bucket_id: &str, page: u32, page_size: u32, search: Option<&str>) -> Result<ObjectPage> {
        let request = ApiRequest::get(format!("{OBJECT}/buckets/{bucket_id}/objects"))
            .with_query("page", page)
            .with_query("pageSize", page_size)
            .with_optional_query("search", search);
        self.call(request).await
    }

    /// Raw object content. Non-JSON objects come back as a string.
    pub async fn get(&self, bucket_id: &str, object_id: &str) -> Result<Value> {
        let reply = self
            .transport
            .execute(ApiRequest::get(format!("{OBJECT}/buckets/{bucket_id}/{object_id}")))
            .await?;
        Ok(reply.body)
    }

    #[instrument(skip(self, upload), fields(file = %upload.file_name, bytes = upload.bytes.len()))]
    pub async fn put(&self, bucket_id: &str, upload: ObjectUpload) -> Result<ObjectUploaded> {
        let mut form = MultipartBody::new().file("file", upload.file_name, upload.bytes);
        if let Some(actor_id) = upload.actor_id {
            form = form.text("actorId", actor_id);
        }
        if let Some(run_id) = upload.run_id {
            form = form.text("runId", run_id);
        }
        let request = ApiRequest::post(format!("{OBJECT}/buckets/{bucket_id}/object")).with_multipart(form);
        self.call(request).await
    }

    pub async fn delete(&self, bucket_id: &str, object_id: &str) -> Result<CommonResponse> {
        self.call(ApiRequest::delete(format!("{OBJECT}/buckets/{bucket_id}/{object_id}")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_sends_form_fields() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::POST,
            "/api/v1/object/buckets/b1/object",
            json!({"data": {"success": true, "size": 5, "object_id": "o1"}}),
        );
        let mut upload = ObjectUpload::new("hello.txt", b"hello".to_vec());
        upload.run_id = Some("r1".into());
        let res = ObjectStorage::new(mock.clone()).put("b1", upload).await.unwrap();
        assert_eq!(res.object_id, "o1");

        let fields = mock.last_call().unwrap().form_fields;
        assert!(fields.contains(&("runId".to_string(), "r1".to_string())));
        assert!(fields.contains(&("file".to_string(), "hello.txt".to_string())));
    }

    #[tokio::test]
    async fn test_list_objects_with_search() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::GET,
            "/api/v1/object/buckets/b1/objects?page=1&pageSize=20&search=png",
            json!({"data": {"objects": [{"id": "o1", "filename": "a.png"}], "total": 1}}),
        );
        let page = ObjectStorage::new(mock)
            .list("b1", 1, 20, Some("png"))
            .await
            .unwrap();
        assert_eq!(page.objects[0].filename, "a.png");
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, [1u8, 2, 3]).await.unwrap();
        let upload = ObjectUpload::from_path(&path).await.unwrap();
        assert_eq!(upload.file_name, "data.bin");
        assert_eq!(upload.bytes, vec![1, 2, 3]);
    }
}
