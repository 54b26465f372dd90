//! Client configuration.
//!
//! Explicit values set on [`ScrapelessConfig`] win; anything left unset is
//! read from the environment (and a `.env` file, when present) before
//! falling back to the platform defaults.

use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::credentials::ApiKey;
use crate::error::{Result, ScrapelessError};

pub const DEFAULT_BASE_API_URL: &str = "https://api.scrapeless.com";
pub const DEFAULT_ACTOR_API_URL: &str = "https://actor.scrapeless.com";
pub const DEFAULT_STORAGE_API_URL: &str = "https://storage.scrapeless.com";
pub const DEFAULT_BROWSER_API_URL: &str = "https://browser.scrapeless.com";
pub const DEFAULT_CRAWL_API_URL: &str = "https://api.scrapeless.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Environment variables understood by the SDK.
///
/// The runtime identity variables (`ActorId`, `RunId`, storage ids, ...) are
/// injected by the platform when code runs inside an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKey {
    ApiKey,
    BaseApiUrl,
    ActorApiUrl,
    StorageApiUrl,
    BrowserApiUrl,
    CrawlApiUrl,
    TimeoutMs,
    UserId,
    TeamId,
    ActorId,
    RunId,
    Input,
    DatasetId,
    KvNamespaceId,
    BucketId,
    QueueId,
}

impl EnvKey {
    pub fn var_name(self) -> &'static str {
        match self {
            Self::ApiKey => "SCRAPELESS_API_KEY",
            Self::BaseApiUrl => "SCRAPELESS_BASE_API_URL",
            Self::ActorApiUrl => "SCRAPELESS_ACTOR_API_URL",
            Self::StorageApiUrl => "SCRAPELESS_STORAGE_API_URL",
            Self::BrowserApiUrl => "SCRAPELESS_BROWSER_API_URL",
            Self::CrawlApiUrl => "SCRAPELESS_CRAWL_API_URL",
            Self::TimeoutMs => "SCRAPELESS_TIMEOUT_MS",
            Self::UserId => "SCRAPELESS_USER_ID",
            Self::TeamId => "SCRAPELESS_TEAM_ID",
            Self::ActorId => "SCRAPELESS_ACTOR_ID",
            Self::RunId => "SCRAPELESS_RUN_ID",
            Self::Input => "SCRAPELESS_INPUT",
            Self::DatasetId => "SCRAPELESS_DATASET_ID",
            Self::KvNamespaceId => "SCRAPELESS_KV_NAMESPACE_ID",
            Self::BucketId => "SCRAPELESS_BUCKET_ID",
            Self::QueueId => "SCRAPELESS_QUEUE_ID",
        }
    }

    /// Read the variable; empty values count as unset.
    pub fn get(self) -> Option<String> {
        env::var(self.var_name()).ok().filter(|v| !v.is_empty())
    }

    pub fn get_or(self, default: &str) -> String {
        self.get().unwrap_or_else(|| default.to_string())
    }
}

/// User-facing configuration. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct ScrapelessConfig {
    pub api_key: Option<String>,
    pub base_api_url: Option<String>,
    pub actor_api_url: Option<String>,
    pub storage_api_url: Option<String>,
    pub browser_api_url: Option<String>,
    pub scraping_crawl_api_url: Option<String>,
    pub timeout: Option<Duration>,
}

/// Configuration with every value settled.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api_key: ApiKey,
    pub base_api_url: String,
    pub actor_api_url: String,
    pub storage_api_url: String,
    pub browser_api_url: String,
    pub scraping_crawl_api_url: String,
    /// Request timeout for every service except crawl.
    pub timeout: Duration,
    /// Crawl requests only time out when a timeout was configured explicitly.
    pub crawl_timeout: Option<Duration>,
}

impl ScrapelessConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    pub fn with_base_api_url(mut self, url: impl Into<String>) -> Self {
        self.base_api_url = Some(url.into());
        self
    }

    pub fn with_actor_api_url(mut self, url: impl Into<String>) -> Self {
        self.actor_api_url = Some(url.into());
        self
    }

    pub fn with_storage_api_url(mut self, url: impl Into<String>) -> Self {
        self.storage_api_url = Some(url.into());
        self
    }

    pub fn with_browser_api_url(mut self, url: impl Into<String>) -> Self {
        self.browser_api_url = Some(url.into());
        self
    }

    pub fn with_scraping_crawl_api_url(mut self, url: impl Into<String>) -> Self {
        self.scraping_crawl_api_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Load `.env` (if present) and resolve everything from the environment.
    pub fn from_env() -> Result<ResolvedConfig> {
        let _ = dotenv();
        Self::default().resolve()
    }

    /// Fill unset fields from the process environment.
    pub fn resolve(self) -> Result<ResolvedConfig> {
        self.resolve_with(|key| key.get())
    }

    /// Fill unset fields using `lookup` instead of the process environment.
    pub fn resolve_with<F>(self, lookup: F) -> Result<ResolvedConfig>
    where
        F: Fn(EnvKey) -> Option<String>,
    {
        let pick = |explicit: Option<String>, key: EnvKey, default: &str| {
            explicit
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(key))
                .unwrap_or_else(|| default.to_string())
        };

        let api_key = self
            .api_key
            .filter(|k| !k.is_empty())
            .or_else(|| lookup(EnvKey::ApiKey))
            .ok_or_else(|| {
                ScrapelessError::Config(
                    "API key is required - either pass it in config or set SCRAPELESS_API_KEY environment variable"
                        .into(),
                )
            })?;

        let env_timeout = match lookup(EnvKey::TimeoutMs) {
            Some(raw) => Some(raw.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| {
                ScrapelessError::Config(format!("SCRAPELESS_TIMEOUT_MS must be a number of milliseconds, got {raw:?}"))
            })?),
            None => None,
        };
        let explicit_timeout = self.timeout.or(env_timeout);

        Ok(ResolvedConfig {
            api_key: ApiKey::new(api_key),
            base_api_url: pick(self.base_api_url, EnvKey::BaseApiUrl, DEFAULT_BASE_API_URL),
            actor_api_url: pick(self.actor_api_url, EnvKey::ActorApiUrl, DEFAULT_ACTOR_API_URL),
            storage_api_url: pick(
                self.storage_api_url,
                EnvKey::StorageApiUrl,
                DEFAULT_STORAGE_API_URL,
            ),
            browser_api_url: pick(
                self.browser_api_url,
                EnvKey::BrowserApiUrl,
                DEFAULT_BROWSER_API_URL,
            ),
            scraping_crawl_api_url: pick(
                self.scraping_crawl_api_url,
                EnvKey::CrawlApiUrl,
                DEFAULT_CRAWL_API_URL,
            ),
            timeout: explicit_timeout.unwrap_or(DEFAULT_TIMEOUT),
            crawl_timeout: explicit_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(EnvKey, &str)]) -> impl Fn(EnvKey) -> Option<String> {
        let map: HashMap<&'static str, String> = pairs
            .iter()
            .map(|(k, v)| (k.var_name(), v.to_string()))
            .collect();
        move |key| map.get(key.var_name()).cloned()
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = ScrapelessConfig::default()
            .resolve_with(lookup_from(&[]))
            .unwrap_err();
        assert!(matches!(err, ScrapelessError::Config(_)));
        assert!(err.to_string().contains("SCRAPELESS_API_KEY"));
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = ScrapelessConfig::new("key")
            .resolve_with(lookup_from(&[]))
            .unwrap();
        assert_eq!(cfg.api_key.expose(), "key");
        assert_eq!(cfg.base_api_url, DEFAULT_BASE_API_URL);
        assert_eq!(cfg.actor_api_url, DEFAULT_ACTOR_API_URL);
        assert_eq!(cfg.storage_api_url, DEFAULT_STORAGE_API_URL);
        assert_eq!(cfg.browser_api_url, DEFAULT_BROWSER_API_URL);
        assert_eq!(cfg.scraping_crawl_api_url, DEFAULT_CRAWL_API_URL);
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
        assert_eq!(cfg.crawl_timeout, None);
    }

    #[test]
    fn test_explicit_values_beat_environment() {
        let cfg = ScrapelessConfig::new("explicit")
            .with_scraping_crawl_api_url("http://localhost:9000")
            .resolve_with(lookup_from(&[
                (EnvKey::ApiKey, "from-env"),
                (EnvKey::CrawlApiUrl, "http://env-host"),
                (EnvKey::StorageApiUrl, "http://storage-env"),
            ]))
            .unwrap();
        assert_eq!(cfg.api_key.expose(), "explicit");
        assert_eq!(cfg.scraping_crawl_api_url, "http://localhost:9000");
        assert_eq!(cfg.storage_api_url, "http://storage-env");
    }

    #[test]
    fn test_timeout_from_environment() {
        let cfg = ScrapelessConfig::default()
            .resolve_with(lookup_from(&[
                (EnvKey::ApiKey, "k"),
                (EnvKey::TimeoutMs, "1500"),
            ]))
            .unwrap();
        assert_eq!(cfg.timeout, Duration::from_millis(1500));
        assert_eq!(cfg.crawl_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let err = ScrapelessConfig::new("k")
            .resolve_with(lookup_from(&[(EnvKey::TimeoutMs, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ScrapelessError::Config(_)));
    }
}
