use std::time::Duration;

pub(crate) const TARGET: &str = "connector";
pub(crate) const REGISTRY_TARGET: &str = "connector_registry";

pub(crate) const DEFAULT_MAX_CONCURRENT: usize = 5;
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const ERROR_BODY_SNIPPET_LIMIT: usize = 512;
pub(crate) const CONFIG_PATH_ENV: &str = "CLOUDSDK_CONFIG";
