mod handle;
mod state;
pub(crate) mod util;
mod worker;

pub use handle::PendingResponse;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::connector::auth::Credentials;
use crate::connector::config::ConnectorConfig;
use crate::connector::constants::TARGET;
use crate::connector::request::{Request, Response};
use crate::connector::resolver::Destination;
use crate::connector::transport::Transport;

use self::handle::CancelToken;
use self::state::{QueueState, QueuedRequest};
use self::worker::DrainWorker;

/// Dispatcher for one destination: a FIFO queue drained by a bounded number of workers.
pub struct Connector {
    url: String,
    credentials: Option<Credentials>,
    headers: Vec<(String, String)>,
    max_concurrent: usize,
    timeout: Duration,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    state: Mutex<QueueState>,
}

impl Connector {
    /// `destination.url` is the full endpoint URL. Workers are spawned on `runtime`.
    pub fn new(
        destination: Destination,
        config: &ConnectorConfig,
        transport: Arc<dyn Transport>,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            url: destination.url,
            credentials: destination.credentials,
            headers: destination.headers,
            max_concurrent: config.max_concurrent.max(1),
            timeout: config.timeout,
            transport,
            runtime,
            state: Mutex::new(QueueState::default()),
        })
    }

    /// Enqueues and returns immediately. The result is delivered only through the request callback.
    pub fn send(self: &Arc<Self>, request: Request) -> bool {
        self.enqueue(QueuedRequest::new(request));
        true
    }

    /// Same queue path as `send`, plus a handle that can be awaited or cancelled.
    pub fn submit(self: &Arc<Self>, request: Request) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let cancel = CancelToken::new();
        self.enqueue(QueuedRequest::with_reply(request, cancel.clone(), tx));
        PendingResponse::new(rx, cancel)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn active_workers(&self) -> usize {
        self.lock_state().active()
    }

    pub fn queued(&self) -> usize {
        self.lock_state().queued()
    }

    pub(crate) fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub(crate) fn static_headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn next_or_retire(&self) -> Option<QueuedRequest> {
        self.lock_state().next_or_retire()
    }

    fn enqueue(self: &Arc<Self>, item: QueuedRequest) {
        if item.request.has_conflicting_payload() {
            warn!(
                target: TARGET,
                url = %self.url,
                function = item.request.function(),
                "request carries both a body and form fields; sending form fields only"
            );
        }

        let start_worker = self.lock_state().push(item, self.max_concurrent);

        if start_worker {
            debug!(target: TARGET, url = %self.url, "starting drain worker");
            self.spawn_worker();
        }
    }

    /// Called by a worker that stopped before draining the queue. Its slot passes to a fresh
    /// worker while requests remain.
    pub(crate) fn replace_worker(self: &Arc<Self>) {
        let respawn = self.lock_state().hand_over();
        if respawn {
            warn!(target: TARGET, url = %self.url, "replacing stopped drain worker");
            self.spawn_worker();
        }
    }

    /// Called when a worker is dropped before it ever ran, which only happens once the runtime
    /// has shut down. Nothing will drain the queue again, so every queued request fails now.
    pub(crate) fn abandon_queue(&self) {
        let abandoned = self.lock_state().abandon();
        if abandoned.is_empty() {
            return;
        }

        warn!(
            target: TARGET,
            url = %self.url,
            count = abandoned.len(),
            "runtime shut down; failing queued requests"
        );
        for item in abandoned {
            let message = format!(
                "connector runtime is shut down: {} {}{}",
                item.request.method(),
                self.url,
                item.request.function()
            );
            item.complete(Response::failed(message, Duration::ZERO));
        }
    }

    // A runtime that has shut down drops the worker on the spot; its drop guard then fails the
    // queue through `abandon_queue`. The state lock must not be held here.
    fn spawn_worker(self: &Arc<Self>) {
        self.runtime.spawn(DrainWorker::new(Arc::clone(self)).run());
    }

    // Nothing panics while the lock is held, so a poisoned guard still holds a consistent queue.
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("url", &self.url)
            .field("credentials", &self.credentials)
            .field("max_concurrent", &self.max_concurrent)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
