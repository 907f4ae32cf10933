
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};

use super::{
    Connector, ConnectorConfig, Destination, Request, Response, TransferRequest, TransferResponse,
    Transport, TransportError,
};

pub(super) type Completions = mpsc::UnboundedSender<(String, Response)>;

/// Records every transfer; optionally blocks on a gate until the test releases it.
#[derive(Default)]
pub(super) struct RecordingTransport {
    gate: Option<Arc<Semaphore>>,
    log: Option<Arc<Mutex<Vec<String>>>>,
    calls: Mutex<Vec<TransferRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingTransport {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub(super) fn logging(log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            log: Some(log),
            ..Self::default()
        }
    }

    pub(super) fn calls(&self) -> Vec<TransferRequest> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub(super) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, request: TransferRequest) -> Result<TransferResponse, TransportError> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(request.clone());
        if let Some(log) = &self.log {
            log.lock()
                .expect("log lock poisoned")
                .push(format!("start {}", request.url));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(TransferResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "text/plain".into())],
            body: Bytes::from(request.url),
        })
    }
}

/// A transfer that never completes.
#[derive(Default)]
pub(super) struct HangingTransport {
    started: AtomicUsize,
}

impl HangingTransport {
    pub(super) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for HangingTransport {
    async fn execute(&self, _request: TransferRequest) -> Result<TransferResponse, TransportError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Returns the same result for every transfer.
pub(super) struct FixedTransport {
    result: Result<TransferResponse, TransportError>,
}

impl FixedTransport {
    pub(super) fn new(result: Result<TransferResponse, TransportError>) -> Self {
        Self { result }
    }
}

#[async_trait]
impl Transport for FixedTransport {
    async fn execute(&self, _request: TransferRequest) -> Result<TransferResponse, TransportError> {
        self.result.clone()
    }
}

/// Panics inside `execute` for one endpoint path and answers 200 for the rest.
pub(super) struct PanickingTransport {
    path: &'static str,
}

impl PanickingTransport {
    pub(super) fn on(path: &'static str) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Transport for PanickingTransport {
    async fn execute(&self, request: TransferRequest) -> Result<TransferResponse, TransportError> {
        if request.url.ends_with(self.path) {
            panic!("malformed request");
        }
        Ok(TransferResponse {
            status: 200,
            headers: Vec::new(),
            body: Bytes::new(),
        })
    }
}

pub(super) fn connector_with(
    transport: Arc<dyn Transport>,
    max_concurrent: usize,
    timeout: Duration,
) -> Arc<Connector> {
    Connector::new(
        Destination::new("https://stt.example.com/api"),
        &ConnectorConfig {
            max_concurrent,
            timeout,
        },
        transport,
        tokio::runtime::Handle::current(),
    )
}

pub(super) fn collect(tx: &Completions) -> impl FnOnce(&Request, &Response) + Send + 'static {
    let tx = tx.clone();
    move |request: &Request, response: &Response| {
        let _ = tx.send((request.function().to_string(), response.clone()));
    }
}

pub(super) async fn wait_for_calls(transport: &RecordingTransport, count: usize) {
    for _ in 0..1_000 {
        if transport.calls().len() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("transport never saw {count} calls");
}

pub(super) async fn wait_until_idle(connector: &Connector) {
    for _ in 0..1_000 {
        if connector.active_workers() == 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("connector workers did not exit");
}
