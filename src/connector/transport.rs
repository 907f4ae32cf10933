use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::connector::constants::TARGET;
use crate::connector::error::TransportError;
use crate::connector::request::Method;

/// A fully assembled transfer: URL, headers and body.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

impl TransferRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransferRequest) -> Result<TransferResponse, TransportError>;
}

/// Blocking ureq transport run on tokio's blocking pool. DELETE uses the same path as every other verb.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::with_agent(ureq::AgentBuilder::new().build())
    }

    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn execute(&self, request: TransferRequest) -> Result<TransferResponse, TransportError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || execute_blocking(&agent, request))
            .await
            .map_err(|err| TransportError::Worker(err.to_string()))?
    }
}

fn execute_blocking(
    agent: &ureq::Agent,
    request: TransferRequest,
) -> Result<TransferResponse, TransportError> {
    debug!(
        target: TARGET,
        method = request.method.as_str(),
        url = %request.url,
        "starting blocking transfer"
    );

    // The same deadline bounds the blocking call, so an abandoned wait does not leak the thread.
    let mut call = agent
        .request(request.method.as_str(), &request.url)
        .timeout(request.timeout);
    for (name, value) in &request.headers {
        call = call.set(name, value);
    }

    let result = match &request.body {
        Some(body) => call.send_bytes(body),
        None => call.call(),
    };

    match result {
        Ok(response) => read_response(response),
        Err(ureq::Error::Status(status, response)) => {
            let body = read_response(response)
                .map(|transfer| transfer.body)
                .unwrap_or_default();
            Err(TransportError::Status { status, body })
        }
        Err(ureq::Error::Transport(err)) => Err(TransportError::Network(err.to_string())),
    }
}

fn read_response(response: ureq::Response) -> Result<TransferResponse, TransportError> {
    let status = response.status();
    let headers = response
        .headers_names()
        .into_iter()
        .filter_map(|name| {
            let value = response.header(&name)?.to_string();
            Some((name, value))
        })
        .collect();

    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|err| TransportError::Network(format!("failed to read response body: {err}")))?;

    Ok(TransferResponse {
        status,
        headers,
        body: Bytes::from(body),
    })
}
