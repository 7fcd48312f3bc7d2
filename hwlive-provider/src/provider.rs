//! Huawei Cloud Live provider
//!
//! Holds the configuration, one shared HTTP client and a per-region cache
//! of service clients. A cached client carries the project ID of its
//! region, so IAM is asked at most once per region.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hwlive_core::path_search::path_search;
use hwlive_core::provider::{ProviderError, ProviderResult};
use hwlive_core::resource::ResourceId;
use log::{debug, info};
use serde_json::Value as Json;
use tokio::sync::Mutex;

use crate::client::ServiceClient;
use crate::config::{Config, ConfigError};
use crate::error::ClientError;
use crate::signer::Signer;

const LIVE_SERVICE: &str = "live";
const IAM_SERVICE: &str = "iam";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct LiveProvider {
    config: Config,
    http: reqwest::Client,
    clients: Mutex<HashMap<String, Arc<ServiceClient>>>,
}

impl LiveProvider {
    /// Create a provider from a validated configuration
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        debug!("Provider configured: {:?}", config);

        Ok(Self {
            config,
            http,
            clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Region of a resource: its own `region` attribute, else the provider's
    pub fn region_or_default<'a>(&'a self, region: Option<&'a str>) -> &'a str {
        match region {
            Some(region) if !region.is_empty() => region,
            _ => &self.config.region,
        }
    }

    /// Live client for `region`, created on first use
    ///
    /// The cache is not held during the IAM lookup, so regions resolve
    /// concurrently. When two lookups race, the first client stored wins.
    pub async fn live_client(&self, region: &str) -> Result<Arc<ServiceClient>, ClientError> {
        if let Some(client) = self.clients.lock().await.get(region) {
            return Ok(Arc::clone(client));
        }

        let project_id = match self.configured_project_id(region) {
            Some(project_id) => project_id.to_string(),
            None => self.lookup_project_id(region).await?,
        };
        let client = Arc::new(self.service_client(LIVE_SERVICE, region, &project_id)?);

        let mut clients = self.clients.lock().await;
        let cached = clients.entry(region.to_string()).or_insert(client);
        Ok(Arc::clone(cached))
    }

    /// [`live_client`](Self::live_client) with failures attributed to a resource
    pub(crate) async fn client_for(
        &self,
        id: &ResourceId,
        region: &str,
    ) -> ProviderResult<Arc<ServiceClient>> {
        self.live_client(region).await.map_err(|e| {
            ProviderError::new(format!("error creating Live client for region {}", region))
                .for_resource(id.clone())
                .with_cause(e)
        })
    }

    fn configured_project_id(&self, region: &str) -> Option<&str> {
        if region != self.config.region {
            return None;
        }
        self.config.project_id.as_deref().filter(|p| !p.is_empty())
    }

    fn service_client(
        &self,
        service: &str,
        region: &str,
        project_id: &str,
    ) -> Result<ServiceClient, ClientError> {
        let client = ServiceClient::new(
            self.http.clone(),
            &self.config.endpoint(service, region),
            region,
            project_id,
            Signer::new(&self.config.access_key, &self.config.secret_key),
        )?;
        Ok(client
            .with_security_token(self.config.security_token.clone())
            .with_max_retries(self.config.max_retries()))
    }

    /// Project ID of the project named after `region`
    async fn lookup_project_id(&self, region: &str) -> Result<String, ClientError> {
        let iam = self.service_client(IAM_SERVICE, region, "")?;
        let body = iam.get("v3/projects", &[("name", region)]).await?;
        match path_search("projects|[0].id", &body) {
            Some(Json::String(project_id)) => {
                info!("Resolved project {} for region {}", project_id, region);
                Ok(project_id)
            }
            _ => Err(ClientError::NotFound(format!(
                "no IAM project named {}",
                region
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_requires_credentials() {
        assert!(LiveProvider::new(Config::new("cn-north-4", "", "")).is_err());
        assert!(LiveProvider::new(Config::new("cn-north-4", "ak", "sk")).is_ok());
    }

    #[test]
    fn region_falls_back_to_provider() {
        let provider = LiveProvider::new(Config::new("cn-north-4", "ak", "sk")).unwrap();
        assert_eq!(provider.region_or_default(None), "cn-north-4");
        assert_eq!(provider.region_or_default(Some("")), "cn-north-4");
        assert_eq!(provider.region_or_default(Some("ap-southeast-1")), "ap-southeast-1");
    }

    #[test]
    fn configured_project_applies_to_provider_region_only() {
        let provider =
            LiveProvider::new(Config::new("cn-north-4", "ak", "sk").with_project_id("p1")).unwrap();
        assert_eq!(provider.configured_project_id("cn-north-4"), Some("p1"));
        assert_eq!(provider.configured_project_id("ap-southeast-1"), None);
    }

    #[tokio::test]
    async fn clients_are_cached_per_region() {
        let provider = LiveProvider::new(
            Config::new("cn-north-4", "ak", "sk")
                .with_project_id("p1")
                .with_endpoint("live", "http://127.0.0.1:9"),
        )
        .unwrap();
        let first = provider.live_client("cn-north-4").await.unwrap();
        let second = provider.live_client("cn-north-4").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.project_id(), "p1");
    }
}
