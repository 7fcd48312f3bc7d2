//! Provider configuration
//!
//! Settings come from the `provider` block of the configuration file.
//! Anything left unset there is taken from the environment, using the
//! same variable names as the Huawei Cloud CLI tooling.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";
pub const DEFAULT_MAX_RETRIES: usize = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 20 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting '{name}' (set it in the provider block or via {env})")]
    Missing { name: &'static str, env: &'static str },

    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Operation timeouts, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub create: u64,
    pub update: u64,
    pub delete: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_TIMEOUT_SECS,
            update: DEFAULT_TIMEOUT_SECS,
            delete: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Timeouts {
    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create)
    }

    pub fn update(&self) -> Duration {
        Duration::from_secs(self.update)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete)
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub region: String,
    pub access_key: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_token: Option<String>,
    /// Project of `region`; other regions are looked up through IAM
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud: Option<String>,
    /// Service name to endpoint URL overrides
    pub endpoints: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
    pub timeouts: Timeouts,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("region", &self.region)
            .field("access_key", &mask(&self.access_key))
            .field("secret_key", &mask(&self.secret_key))
            .field("security_token", &self.security_token.as_deref().map(mask))
            .field("project_id", &self.project_id)
            .field("cloud", &self.cloud())
            .field("endpoints", &self.endpoints)
            .field("max_retries", &self.max_retries())
            .field("insecure", &self.insecure())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "***" }
}

impl Config {
    pub fn new(region: impl Into<String>, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            ..Default::default()
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_endpoint(mut self, service: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(service.into(), url.into());
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Fill unset fields from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Fill unset fields using `lookup` to read variables
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(key))
                .find(|value| !value.is_empty())
        };

        fill(&mut self.region, first(&["HW_REGION_NAME", "OS_REGION_NAME"]));
        fill(&mut self.access_key, first(&["HW_ACCESS_KEY", "OS_ACCESS_KEY"]));
        fill(&mut self.secret_key, first(&["HW_SECRET_KEY", "OS_SECRET_KEY"]));

        if self.security_token.is_none() {
            self.security_token = first(&["HW_SECURITY_TOKEN"]);
        }
        if self.project_id.is_none() {
            self.project_id = first(&["HW_PROJECT_ID", "OS_PROJECT_ID"]);
        }
        if self.cloud.is_none() {
            self.cloud = first(&["HW_CLOUD"]);
        }
        if self.max_retries.is_none()
            && let Some(value) = first(&["HW_MAX_RETRIES"])
        {
            let retries = value.parse().map_err(|_| ConfigError::Invalid {
                key: "HW_MAX_RETRIES",
                value: value.clone(),
            })?;
            self.max_retries = Some(retries);
        }
        if self.insecure.is_none()
            && let Some(value) = first(&["HW_INSECURE"])
        {
            let insecure = match value.to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "HW_INSECURE",
                        value,
                    });
                }
            };
            self.insecure = Some(insecure);
        }
        Ok(())
    }

    /// Check that credentials and a region are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.is_empty() {
            return Err(ConfigError::Missing {
                name: "region",
                env: "HW_REGION_NAME",
            });
        }
        if self.access_key.is_empty() {
            return Err(ConfigError::Missing {
                name: "access_key",
                env: "HW_ACCESS_KEY",
            });
        }
        if self.secret_key.is_empty() {
            return Err(ConfigError::Missing {
                name: "secret_key",
                env: "HW_SECRET_KEY",
            });
        }
        Ok(())
    }

    pub fn cloud(&self) -> &str {
        self.cloud.as_deref().unwrap_or(DEFAULT_CLOUD)
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn insecure(&self) -> bool {
        self.insecure.unwrap_or(false)
    }

    /// Base URL of `service` in `region`, always ending with `/`
    pub fn endpoint(&self, service: &str, region: &str) -> String {
        let url = match self.endpoints.get(service) {
            Some(url) => url.clone(),
            None => format!("https://{}.{}.{}/", service, region, self.cloud()),
        };
        if url.ends_with('/') {
            url
        } else {
            format!("{}/", url)
        }
    }
}

fn fill(field: &mut String, value: Option<String>) {
    if field.is_empty()
        && let Some(value) = value
    {
        *field = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.cloud(), "myhuaweicloud.com");
        assert_eq!(config.max_retries(), 5);
        assert!(!config.insecure());
        assert_eq!(config.timeouts.create(), Duration::from_secs(1200));
    }

    #[test]
    fn environment_fills_unset_fields_only() {
        let mut config = Config {
            region: "cn-north-4".to_string(),
            ..Default::default()
        };
        config
            .apply_env_with(env(&[
                ("HW_REGION_NAME", "ap-southeast-1"),
                ("OS_ACCESS_KEY", "ak"),
                ("HW_SECRET_KEY", "sk"),
                ("HW_PROJECT_ID", "project"),
                ("HW_MAX_RETRIES", "2"),
                ("HW_INSECURE", "true"),
            ]))
            .unwrap();

        assert_eq!(config.region, "cn-north-4");
        assert_eq!(config.access_key, "ak");
        assert_eq!(config.secret_key, "sk");
        assert_eq!(config.project_id.as_deref(), Some("project"));
        assert_eq!(config.max_retries(), 2);
        assert!(config.insecure());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn hw_variables_take_precedence_over_os() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[("HW_ACCESS_KEY", "hw"), ("OS_ACCESS_KEY", "os")]))
            .unwrap();
        assert_eq!(config.access_key, "hw");
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env_with(env(&[("HW_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "HW_MAX_RETRIES", .. }));
    }

    #[test]
    fn validate_requires_credentials() {
        let config = Config::new("cn-north-4", "", "sk");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing { name: "access_key", .. })
        ));
        assert!(Config::new("", "ak", "sk").validate().is_err());
    }

    #[test]
    fn endpoints_use_overrides_with_trailing_slash() {
        let config = Config::new("cn-north-4", "ak", "sk").with_endpoint("live", "http://localhost:8080");
        assert_eq!(config.endpoint("live", "cn-north-4"), "http://localhost:8080/");
        assert_eq!(
            config.endpoint("iam", "cn-north-4"),
            "https://iam.cn-north-4.myhuaweicloud.com/"
        );
    }

    #[test]
    fn deserializes_partial_provider_block() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "region": "cn-north-4",
            "endpoints": {"live": "https://live.example.com"},
            "timeouts": {"create": 60}
        }))
        .unwrap();
        assert_eq!(config.region, "cn-north-4");
        assert_eq!(config.timeouts.create(), Duration::from_secs(60));
        assert_eq!(config.timeouts.delete(), Duration::from_secs(1200));
        assert!(!format!("{:?}", Config::new("r", "ak", "secret")).contains("secret\""));
    }
}
