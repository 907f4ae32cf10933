//! 按目标端点排队、限流并分发 HTTP 请求的 connector 层。

mod constants;
mod registry;
mod runtime;

pub mod auth;
pub mod config;
pub mod error;
pub mod form;
pub mod request;
pub mod resolver;
pub mod transport;

pub use auth::Credentials;
pub use config::{ConnectorConfig, CredentialsFile, ServiceCredentials};
pub use error::{ConfigError, ResolveError, TransportError};
pub use form::{Form, FormValue};
pub use registry::{ConnectorRegistry, DestinationKey};
pub use request::{Callback, Method, ParamValue, Request, Response};
pub use resolver::{ConfigResolver, Destination, Resolver, StaticResolver};
pub use runtime::{Connector, PendingResponse};
pub use transport::{TransferRequest, TransferResponse, Transport, UreqTransport};

#[cfg(test)]
mod tests;
