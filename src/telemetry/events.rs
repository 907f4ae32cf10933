use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) const TARGET: &str = "telemetry::connector";
pub(crate) const EVENT_REQUEST_COMPLETED: &str = "request_completed";

#[derive(Debug, Serialize)]
pub struct RequestCompletedEvent<'a> {
    pub url: &'a str,
    pub function: &'a str,
    pub method: &'static str,
    pub success: bool,
    pub status: Option<u16>,
    pub elapsed_ms: u64,
}

pub fn record_request_completed(
    url: &str,
    function: &str,
    method: &'static str,
    success: bool,
    status: Option<u16>,
    elapsed: Duration,
) {
    let event = RequestCompletedEvent {
        url,
        function,
        method,
        success,
        status,
        elapsed_ms: duration_to_ms(elapsed),
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_REQUEST_COMPLETED,
            url = event.url,
            function = event.function,
            method = event.method,
            success = event.success,
            status = ?event.status,
            elapsed_ms = event.elapsed_ms,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_REQUEST_COMPLETED,
            %err,
            "failed to encode request completion event"
        ),
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
