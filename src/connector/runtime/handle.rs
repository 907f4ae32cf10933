use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Notify};

use crate::connector::request::Response;

#[derive(Clone, Default)]
pub(crate) struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Handle returned by `Connector::submit`; resolves exactly once.
pub struct PendingResponse {
    rx: oneshot::Receiver<Response>,
    cancel: CancelToken,
}

impl PendingResponse {
    pub(crate) fn new(rx: oneshot::Receiver<Response>, cancel: CancelToken) -> Self {
        Self { rx, cancel }
    }

    /// Cancels a queued or in-flight request. Completed requests are unaffected.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn wait(self) -> Response {
        match self.rx.await {
            Ok(response) => response,
            Err(_) => Response::failed(
                "connector dropped the request before completion",
                Duration::ZERO,
            ),
        }
    }
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
