use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::connector::auth::Credentials;
use crate::connector::constants::{CONFIG_PATH_ENV, DEFAULT_MAX_CONCURRENT, DEFAULT_TIMEOUT};
use crate::connector::error::ConfigError;

/// Dispatch settings applied to every connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Upper bound on concurrently running drain workers.
    pub max_concurrent: usize,
    /// Default timeout for a single request.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ConnectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Credentials entry for one service.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceCredentials {
    pub service_id: String,
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ServiceCredentials {
    /// A token wins; otherwise both user and password are required.
    pub fn credentials(&self) -> Option<Credentials> {
        if let Some(token) = self.token.as_deref().filter(|token| !token.is_empty()) {
            return Some(Credentials::token(token));
        }

        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() => {
                Some(Credentials::basic(user, password))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("service_id", &self.service_id)
            .field("url", &self.url)
            .field("user", &self.user)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// JSON credentials file: dispatch settings plus the service list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsFile {
    #[serde(default)]
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub services: Vec<ServiceCredentials>,
}

impl CredentialsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read credentials file: {}", path.display()))?;
        Self::parse(&raw)
            .with_context(|| format!("invalid credentials file: {}", path.display()))
    }

    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .with_context(|| format!("{CONFIG_PATH_ENV} is not set"))?;
        Self::load(Path::new(path.trim()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: CredentialsFile =
            serde_json::from_str(raw).context("failed to decode credentials json")?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connector.validate()?;

        let mut seen = HashSet::new();
        for service in &self.services {
            if !seen.insert(service.service_id.as_str()) {
                return Err(ConfigError::DuplicateService(service.service_id.clone()));
            }
        }
        Ok(())
    }

    pub fn find(&self, service_id: &str) -> Option<&ServiceCredentials> {
        self.services
            .iter()
            .find(|service| service.service_id == service_id)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
