use bytes::Bytes;
use thiserror::Error;

/// Transport failure; the drain worker turns it into a failed `Response`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP status {status}")]
    Status { status: u16, body: Bytes },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid form field: {0}")]
    InvalidForm(String),
    #[error("transfer task failed: {0}")]
    Worker(String),
}

/// The service could not be resolved to a URL and credentials.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no credentials configured for service `{0}`")]
    UnknownService(String),
    #[error("service `{service_id}` has an invalid url `{url}`: {reason}")]
    InvalidUrl {
        service_id: String,
        url: String,
        reason: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("duplicate credentials for service `{0}`")]
    DuplicateService(String),
}
