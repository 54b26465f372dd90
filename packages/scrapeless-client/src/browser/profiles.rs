use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;
use crate::transport::{ApiRequest, SharedTransport};

const PROFILES_PATH: &str = "/browser/profiles";

/// A persisted browser profile (cookies, storage, cache).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub profile_id: String,
    pub name: String,
    #[serde(default)]
    pub last_modify_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileList {
    #[serde(default)]
    pub docs: Vec<Profile>,
    #[serde(default)]
    pub total_docs: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub total_pages: u64,
    #[serde(default)]
    pub page: u64,
}

#[derive(Debug, Clone)]
pub struct ProfileListParams {
    pub page: u32,
    pub page_size: u32,
    /// Substring filter on the profile name.
    pub name: Option<String>,
}

impl Default for ProfileListParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
            name: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Deleted {
    #[serde(default)]
    success: bool,
}

pub struct ProfilesService {
    transport: SharedTransport,
}

impl ProfilesService {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    pub async fn create(&self, name: &str) -> Result<Profile> {
        let request = ApiRequest::post(PROFILES_PATH).with_json_value(json!({ "name": name }));
        Ok(self.transport.execute(request).await?.with_status()?.data)
    }

    pub async fn delete(&self, profile_id: &str) -> Result<bool> {
        let request = ApiRequest::delete(format!("{PROFILES_PATH}/{profile_id}"));
        let deleted: Deleted = self.transport.execute(request).await?.with_status()?.data;
        Ok(deleted.success)
    }

    pub async fn get(&self, profile_id: &str) -> Result<Profile> {
        let request = ApiRequest::get(format!("{PROFILES_PATH}/{profile_id}"));
        Ok(self.transport.execute(request).await?.with_status()?.data)
    }

    pub async fn list(&self, params: &ProfileListParams) -> Result<ProfileList> {
        let request = ApiRequest::get(PROFILES_PATH)
            .with_query("page", params.page)
            .with_query("pageSize", params.page_size)
            .with_optional_query("s", params.name.as_deref());
        Ok(self.transport.execute(request).await?.with_status()?.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_list_sends_name_filter() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::GET,
            "/browser/profiles?page=2&pageSize=5&s=shop",
            json!({"docs": [{"profileId": "p1", "name": "shop-a", "count": 3}],
                   "totalDocs": 1, "limit": 5, "totalPages": 1, "page": 2}),
        );
        let profiles = ProfilesService::new(mock);
        let list = profiles
            .list(&ProfileListParams {
                page: 2,
                page_size: 5,
                name: Some("shop".into()),
            })
            .await
            .unwrap();
        assert_eq!(list.docs[0].profile_id, "p1");
        assert_eq!(list.total_docs, 1);
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::POST,
            "/browser/profiles",
            json!({"profileId": "p9", "name": "checkout", "createdAt": "2026-01-02T03:04:05Z"}),
        );
        mock.on(Method::DELETE, "/browser/profiles/p9", json!({"success": true}));
        let profiles = ProfilesService::new(mock.clone());

        let created = profiles.create("checkout").await.unwrap();
        assert_eq!(created.profile_id, "p9");
        assert!(created.created_at.is_some());
        assert!(profiles.delete("p9").await.unwrap());
        assert_eq!(mock.calls()[0].body.as_ref().unwrap()["name"], "checkout");
    }
}
