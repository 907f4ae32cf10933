use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{error, warn};

use crate::connector::constants::TARGET;
use crate::connector::request::{Callback, Request, Response};

use super::handle::CancelToken;

/// A request waiting in (or taken from) a connector queue, together with its completion targets.
///
/// The callback is detached from the request at enqueue time. Completion runs at most once:
/// either through [`QueuedRequest::complete`] or, if the entry is dropped first, with a
/// synthesized failure.
pub(crate) struct QueuedRequest {
    pub(crate) request: Request,
    pub(crate) cancel: CancelToken,
    callback: Option<Callback>,
    reply: Option<oneshot::Sender<Response>>,
}

impl QueuedRequest {
    pub(crate) fn new(request: Request) -> Self {
        Self::build(request, CancelToken::new(), None)
    }

    pub(crate) fn with_reply(
        request: Request,
        cancel: CancelToken,
        reply: oneshot::Sender<Response>,
    ) -> Self {
        Self::build(request, cancel, Some(reply))
    }

    fn build(
        mut request: Request,
        cancel: CancelToken,
        reply: Option<oneshot::Sender<Response>>,
    ) -> Self {
        let callback = request.take_callback();
        Self {
            request,
            cancel,
            callback,
            reply,
        }
    }

    pub(crate) fn complete(mut self, response: Response) {
        self.deliver(response);
    }

    fn deliver(&mut self, response: Response) {
        if let Some(callback) = self.callback.take() {
            let request = &self.request;
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(request, &response)));
            if outcome.is_err() {
                error!(
                    target: TARGET,
                    function = request.function(),
                    "request callback panicked"
                );
            }
        }

        if let Some(reply) = self.reply.take() {
            let _ = reply.send(response);
        }
    }
}

impl Drop for QueuedRequest {
    fn drop(&mut self) {
        if self.callback.is_none() && self.reply.is_none() {
            return;
        }

        let method = self.request.method();
        warn!(
            target: TARGET,
            method = method.as_str(),
            function = self.request.function(),
            "request dropped before completion"
        );
        let message = format!(
            "request abandoned before completion: {method} {}",
            self.request.function()
        );
        self.deliver(Response::failed(message, Duration::ZERO));
    }
}

/// Queue and active worker count share one lock, so enqueue and retire decisions are atomic.
#[derive(Default)]
pub(crate) struct QueueState {
    pending: VecDeque<QueuedRequest>,
    active: usize,
}

impl QueueState {
    /// Enqueues; reserves a worker slot and returns true while below the cap.
    pub(crate) fn push(&mut self, item: QueuedRequest, max_concurrent: usize) -> bool {
        self.pending.push_back(item);
        if self.active < max_concurrent {
            self.active += 1;
            true
        } else {
            false
        }
    }

    /// Pops the next request; on an empty queue the caller's slot is released.
    pub(crate) fn next_or_retire(&mut self) -> Option<QueuedRequest> {
        let next = self.pending.pop_front();
        if next.is_none() {
            self.active = self.active.saturating_sub(1);
        }
        next
    }

    /// For a worker that stopped mid-drain. Returns true when its slot stays reserved for a
    /// replacement worker.
    pub(crate) fn hand_over(&mut self) -> bool {
        if self.pending.is_empty() {
            self.active = self.active.saturating_sub(1);
            false
        } else {
            true
        }
    }

    /// Releases the caller's slot and takes every queued request.
    pub(crate) fn abandon(&mut self) -> Vec<QueuedRequest> {
        self.active = self.active.saturating_sub(1);
        self.pending.drain(..).collect()
    }

    pub(crate) fn active(&self) -> usize {
        self.active
    }

    pub(crate) fn queued(&self) -> usize {
        self.pending.len()
    }
}
