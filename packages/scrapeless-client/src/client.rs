//! Entry point that owns one instance of every service.

use crate::actor::ActorService;
use crate::browser::{BrowserService, ExtensionService, ProfilesService};
use crate::captcha::CaptchaService;
use crate::config::{ResolvedConfig, ScrapelessConfig};
use crate::crawl::ScrapingCrawl;
use crate::error::Result;
use crate::proxies::ProxiesService;
use crate::scraping::ScrapingService;
use crate::storage::StorageService;
use crate::transport::{HttpTransport, SharedTransport};
use crate::universal::UniversalService;

pub struct ScrapelessClient {
    config: ResolvedConfig,
    pub actor: ActorService,
    pub browser: BrowserService,
    pub profiles: ProfilesService,
    pub extension: ExtensionService,
    pub storage: StorageService,
    pub scraping: ScrapingService,
    pub universal: UniversalService,
    pub captcha: CaptchaService,
    pub proxies: ProxiesService,
    pub scraping_crawl: ScrapingCrawl,
}

impl ScrapelessClient {
    /// Resolve `config` against the environment and build every service.
    ///
    /// Fails with a configuration error when no API key is available.
    pub fn new(config: ScrapelessConfig) -> Result<Self> {
        Self::from_resolved(config.resolve()?)
    }

    /// Like [`ScrapelessClient::new`] with an empty config, after loading `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_resolved(ScrapelessConfig::from_env()?)
    }

    pub fn from_resolved(config: ResolvedConfig) -> Result<Self> {
        let http = |url: &str, component: &'static str| -> Result<SharedTransport> {
            Ok(HttpTransport::new(config.api_key.clone(), url, Some(config.timeout), component)?.shared())
        };

        let base = &config.base_api_url;
        let client = Self {
            actor: ActorService::new(http(&config.actor_api_url, "actor")?),
            browser: BrowserService::from_config(&config)?,
            profiles: ProfilesService::new(http(base, "browser.profiles")?),
            extension: ExtensionService::new(http(base, "browser.extension")?),
            storage: StorageService::new(http(&config.storage_api_url, "storage")?),
            scraping: ScrapingService::new(http(base, "scraping")?),
            universal: UniversalService::new(http(base, "universal")?),
            captcha: CaptchaService::new(http(base, "captcha")?),
            proxies: ProxiesService::new(config.api_key.clone()),
            scraping_crawl: ScrapingCrawl::from_config(&config)?,
            config,
        };
        Ok(client)
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapelessError;
    use std::time::Duration;

    #[test]
    fn test_missing_key_is_config_error() {
        let err = ScrapelessConfig::default()
            .resolve_with(|_| None)
            .and_then(ScrapelessClient::from_resolved)
            .err()
            .unwrap();
        assert!(matches!(err, ScrapelessError::Config(_)));
    }

    #[test]
    fn test_builds_every_service_from_config() {
        let config = ScrapelessConfig::new("k")
            .with_base_api_url("http://localhost:9000")
            .with_timeout(Duration::from_secs(5))
            .resolve_with(|_| None)
            .unwrap();
        let client = ScrapelessClient::from_resolved(config).unwrap();
        assert_eq!(client.config().base_api_url, "http://localhost:9000");
        assert_eq!(client.config().crawl_timeout, Some(Duration::from_secs(5)));
    }
}
