use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, warn};
use url::form_urlencoded::byte_serialize;
use url::Url;

use crate::connector::auth::AUTHORIZATION_HEADER;
use crate::connector::constants::TARGET;
use crate::connector::error::TransportError;
use crate::connector::form::encode_multipart;
use crate::connector::request::{Method, Request, Response};
use crate::connector::transport::{TransferRequest, TransferResponse};
use crate::telemetry::events::record_request_completed;

use super::handle::CancelToken;
use super::state::QueuedRequest;
use super::util::{body_snippet, join_path, merge_header};
use super::Connector;

const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Takes requests from a connector queue and runs them until the queue is empty.
///
/// Holds one of the connector's worker slots. If the worker is dropped without retiring
/// (its task unwound or the runtime shut down), the slot is handed to a replacement or the
/// queue is failed, so queued requests never wait on a worker that no longer exists.
pub(crate) struct DrainWorker {
    connector: Arc<Connector>,
    started: bool,
    retired: bool,
}

impl DrainWorker {
    pub(crate) fn new(connector: Arc<Connector>) -> Self {
        Self {
            connector,
            started: false,
            retired: false,
        }
    }

    pub(crate) async fn run(mut self) {
        self.started = true;
        let mut processed: usize = 0;

        while let Some(item) = self.connector.next_or_retire() {
            self.process(item).await;
            processed += 1;
        }
        self.retired = true;

        debug!(
            target: TARGET,
            url = %self.connector.url(),
            processed,
            "drain worker idle, exiting"
        );
    }

    async fn process(&self, item: QueuedRequest) {
        let started = Instant::now();
        let method = item.request.method();

        let prepared = if item.cancel.is_cancelled() {
            Err(Response::failed(
                format!(
                    "request cancelled before transfer: {method} {}",
                    item.request.function()
                ),
                Duration::ZERO,
            ))
        } else {
            self.prepare(&item.request, started)
        };

        let response = match prepared {
            Ok(transfer) => self.transfer(method, transfer, item.cancel.clone(), started).await,
            Err(response) => response,
        };

        record_request_completed(
            self.connector.url(),
            item.request.function(),
            method.as_str(),
            response.success,
            response.status,
            response.elapsed,
        );

        item.complete(response);
    }

    fn prepare(&self, request: &Request, started: Instant) -> Result<TransferRequest, Response> {
        let deadline = request.timeout().unwrap_or_else(|| self.connector.timeout());

        build_transfer(&self.connector, request, deadline).map_err(|err| {
            warn!(
                target: TARGET,
                url = %self.connector.url(),
                function = request.function(),
                %err,
                "failed to build transfer"
            );
            Response::failed(
                format!(
                    "{} {}{} failed: {err}",
                    request.method(),
                    self.connector.url(),
                    request.function()
                ),
                started.elapsed(),
            )
        })
    }

    async fn transfer(
        &self,
        method: Method,
        transfer: TransferRequest,
        cancel: CancelToken,
        started: Instant,
    ) -> Response {
        let url = transfer.url.clone();
        let deadline = transfer.timeout;
        let execute =
            AssertUnwindSafe(self.connector.transport().execute(transfer)).catch_unwind();

        let result = tokio::select! {
            result = timeout(deadline, execute) => result,
            _ = cancel.cancelled() => {
                debug!(target: TARGET, %url, "request cancelled during transfer");
                return Response::failed(
                    format!("request cancelled: {method} {url}"),
                    started.elapsed(),
                );
            }
        };

        match result {
            Err(_) => {
                warn!(
                    target: TARGET,
                    method = method.as_str(),
                    %url,
                    ?deadline,
                    "request timed out"
                );
                Response::failed(
                    format!("request timed out after {deadline:?}: {method} {url}"),
                    started.elapsed(),
                )
            }
            Ok(Err(panic)) => {
                let cause = format!("transport panicked: {}", panic_message(&*panic));
                error!(target: TARGET, method = method.as_str(), %url, "{cause}");
                Response::failed(describe_failure(method, &url, &cause, &[]), started.elapsed())
            }
            Ok(Ok(Ok(transfer))) if (200..300).contains(&transfer.status) => {
                Response::succeeded(transfer, started.elapsed())
            }
            Ok(Ok(Ok(TransferResponse { status, body, .. })))
            | Ok(Ok(Err(TransportError::Status { status, body }))) => {
                let cause = format!("HTTP status {status}");
                let message = describe_failure(method, &url, &cause, &body);
                warn!(target: TARGET, status, "{message}");
                Response::failed(message, started.elapsed()).with_status(status, body)
            }
            Ok(Ok(Err(err))) => {
                let message = describe_failure(method, &url, &err.to_string(), &[]);
                warn!(target: TARGET, "{message}");
                Response::failed(message, started.elapsed())
            }
        }
    }
}

impl Drop for DrainWorker {
    fn drop(&mut self) {
        if self.retired {
            return;
        }

        if self.started {
            error!(
                target: TARGET,
                url = %self.connector.url(),
                "drain worker stopped before the queue was empty"
            );
            self.connector.replace_worker();
        } else {
            self.connector.abandon_queue();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Builds the URL, merges headers and encodes the body.
pub(crate) fn build_transfer(
    connector: &Connector,
    request: &Request,
    deadline: Duration,
) -> Result<TransferRequest, TransportError> {
    let url = build_url(connector.url(), request)?;

    let mut headers = Vec::new();
    for (name, value) in connector.static_headers() {
        merge_header(&mut headers, name, value);
    }
    for (name, value) in request.headers() {
        merge_header(&mut headers, name, value);
    }

    let body = if !request.forms().is_empty() {
        let encoded = encode_multipart(request.forms())?;
        merge_header(&mut headers, CONTENT_TYPE_HEADER, &encoded.content_type);
        Some(encoded.body)
    } else {
        request.body().cloned()
    };

    if let Some(credentials) = connector.credentials() {
        merge_header(&mut headers, AUTHORIZATION_HEADER, &credentials.authorization());
    }

    Ok(TransferRequest {
        method: request.method(),
        url,
        headers,
        body: body.or_else(|| needs_empty_body(request.method()).then(Bytes::new)),
        timeout: deadline,
    })
}

// POST/PUT without payload still send an explicit empty body.
fn needs_empty_body(method: Method) -> bool {
    matches!(method, Method::Post | Method::Put)
}

fn build_url(base: &str, request: &Request) -> Result<String, TransportError> {
    let joined = join_path(base, request.function());
    let mut url = Url::parse(&joined)
        .map_err(|err| TransportError::InvalidUrl(format!("{joined}: {err}")))?;

    if !request.parameters().is_empty() {
        let mut query = url.query().map(str::to_owned).unwrap_or_default();
        for (key, value) in request.parameters() {
            if !query.is_empty() {
                query.push('&');
            }
            query.extend(byte_serialize(key.as_bytes()));
            query.push('=');
            query.extend(byte_serialize(&value.to_bytes()));
        }
        url.set_query(Some(&query));
    }

    Ok(url.into())
}

fn describe_failure(method: Method, url: &str, cause: &str, body: &[u8]) -> String {
    match body_snippet(body) {
        Some(snippet) => format!("{method} {url} failed: {cause}; response: {snippet}"),
        None => format!("{method} {url} failed: {cause}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::auth::Credentials;
    use crate::connector::config::ConnectorConfig;
    use crate::connector::form::Form;
    use crate::connector::resolver::Destination;
    use crate::connector::transport::Transport;
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn execute(&self, _request: TransferRequest) -> Result<TransferResponse, TransportError> {
            Err(TransportError::Network("unused".into()))
        }
    }

    fn connector(destination: Destination) -> Arc<Connector> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime builds");
        Connector::new(
            destination,
            &ConnectorConfig::default(),
            Arc::new(NullTransport),
            runtime.handle().clone(),
        )
    }

    #[test]
    fn headers_merge_static_then_request_then_authorization() {
        let connector = connector(
            Destination::new("https://tts.example.com/api/v1/synthesize")
                .with_credentials(Credentials::token("secret"))
                .with_header("Accept", "audio/wav")
                .with_header("X-Opt-Out", "1"),
        );
        let request = Request::get("")
            .with_header("accept", "audio/ogg")
            .with_header("Authorization", "Bearer caller");

        let transfer = build_transfer(&connector, &request, Duration::from_secs(1)).expect("transfer");
        assert_eq!(transfer.header("Accept"), Some("audio/ogg"));
        assert_eq!(transfer.header("X-Opt-Out"), Some("1"));
        assert_eq!(transfer.header("Authorization"), Some("Bearer secret"));
        assert_eq!(
            transfer.headers.iter().filter(|(name, _)| name.eq_ignore_ascii_case("accept")).count(),
            1
        );
    }

    #[test]
    fn parameters_are_form_urlencoded() {
        let connector = connector(Destination::new("https://lt.example.com/api"));
        let request = Request::get("/v2/translate?version=2017")
            .with_parameter("text", "hello world & more")
            .with_parameter("count", 3)
            .with_parameter("raw", vec![0xff_u8, b'a']);

        let transfer = build_transfer(&connector, &request, Duration::from_secs(1)).expect("transfer");
        assert_eq!(
            transfer.url,
            "https://lt.example.com/api/v2/translate?version=2017&text=hello+world+%26+more&count=3&raw=%FFa"
        );
    }

    #[test]
    fn forms_take_precedence_over_body() {
        let connector = connector(Destination::new("https://stt.example.com/api"));
        let request = Request::new("/v1/recognize")
            .with_body(Bytes::from_static(b"raw"))
            .with_form(Form::text("model", "narrowband"));

        let transfer = build_transfer(&connector, &request, Duration::from_secs(1)).expect("transfer");
        assert_eq!(transfer.method, Method::Post);
        let content_type = transfer.header("content-type").expect("content type");
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        let body = transfer.body.expect("body");
        assert!(!body.starts_with(b"raw"));
        assert!(String::from_utf8_lossy(&body).contains("narrowband"));
    }

    #[test]
    fn post_without_payload_sends_empty_body() {
        let connector = connector(Destination::new("https://dialog.example.com/api"));
        let transfer = build_transfer(&connector, &Request::post("/v1/session"), Duration::from_secs(1))
            .expect("transfer");
        assert_eq!(transfer.body, Some(Bytes::new()));

        let transfer = build_transfer(&connector, &Request::delete("/v1/session/1"), Duration::from_secs(1))
            .expect("transfer");
        assert_eq!(transfer.body, None);
    }

    #[test]
    fn invalid_url_is_reported() {
        let connector = connector(Destination::new("not a url"));
        let err = build_transfer(&connector, &Request::get("/x"), Duration::from_secs(1))
            .expect_err("invalid url");
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }

    #[test]
    fn failure_description_includes_snippet() {
        let message = describe_failure(Method::Get, "https://a.example.com", "HTTP status 500", b"boom");
        assert_eq!(message, "GET https://a.example.com failed: HTTP status 500; response: boom");
    }
}
