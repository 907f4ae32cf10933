//! CloudSDK Core Library
//!
//! This crate provides the request-dispatch layer shared by the cloud service
//! wrappers (speech, translation, tone analysis, dialog): per-endpoint
//! connectors with FIFO queues, bounded concurrent transfers, timeouts and
//! authentication, plus tracing-based telemetry.

pub mod connector;
pub mod telemetry;

pub use connector::{
    Connector, ConnectorConfig, ConnectorRegistry, Credentials, Destination, DestinationKey, Form,
    Method, PendingResponse, Request, Resolver, Response,
};
