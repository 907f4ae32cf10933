use std::borrow::Cow;
use std::time::Duration;

use bytes::Bytes;

use crate::connector::form::Form;
use crate::connector::transport::TransferResponse;

/// Completion callback, invoked exactly once per request.
pub type Callback = Box<dyn FnOnce(&Request, &Response) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query parameter value: a scalar or raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Binary(Bytes),
}

impl ParamValue {
    pub(crate) fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            ParamValue::Text(text) => Cow::Borrowed(text.as_bytes()),
            ParamValue::Integer(value) => Cow::Owned(value.to_string().into_bytes()),
            ParamValue::Float(value) => Cow::Owned(value.to_string().into_bytes()),
            ParamValue::Bool(value) => Cow::Borrowed(if *value { b"true" } else { b"false" }),
            ParamValue::Binary(bytes) => Cow::Borrowed(bytes.as_ref()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(value.into())
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Integer(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Bytes> for ParamValue {
    fn from(value: Bytes) -> Self {
        ParamValue::Binary(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        ParamValue::Binary(value.into())
    }
}

/// One outbound call. Ownership moves into the connector queue on enqueue.
pub struct Request {
    function: String,
    method: Option<Method>,
    parameters: Vec<(String, ParamValue)>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    forms: Vec<Form>,
    timeout: Option<Duration>,
    callback: Option<Callback>,
}

impl Request {
    pub fn new<F: Into<String>>(function: F) -> Self {
        Self {
            function: function.into(),
            method: None,
            parameters: Vec::new(),
            headers: Vec::new(),
            body: None,
            forms: Vec::new(),
            timeout: None,
            callback: None,
        }
    }

    pub fn get<F: Into<String>>(function: F) -> Self {
        Self::new(function).with_method(Method::Get)
    }

    pub fn post<F: Into<String>>(function: F) -> Self {
        Self::new(function).with_method(Method::Post)
    }

    pub fn delete<F: Into<String>>(function: F) -> Self {
        Self::new(function).with_method(Method::Delete)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_parameter<K: Into<String>, V: Into<ParamValue>>(mut self, key: K, value: V) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_form(mut self, form: Form) -> Self {
        self.forms.push(form);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Request, &Response) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    /// Unless set explicitly: POST when a body or form fields are present, GET otherwise.
    pub fn method(&self) -> Method {
        self.method.unwrap_or(if self.body.is_some() || !self.forms.is_empty() {
            Method::Post
        } else {
            Method::Get
        })
    }

    pub fn parameters(&self) -> &[(String, ParamValue)] {
        &self.parameters
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn forms(&self) -> &[Form] {
        &self.forms
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn has_conflicting_payload(&self) -> bool {
        self.body.is_some() && !self.forms.is_empty()
    }

    pub(crate) fn take_callback(&mut self) -> Option<Callback> {
        self.callback.take()
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("function", &self.function)
            .field("method", &self.method())
            .field("parameters", &self.parameters)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("forms", &self.forms.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Outcome of one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub success: bool,
    /// Present and non-empty only on failure.
    pub error: Option<String>,
    pub body: Bytes,
    pub elapsed: Duration,
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
}

impl Response {
    pub(crate) fn succeeded(transfer: TransferResponse, elapsed: Duration) -> Self {
        Self {
            success: true,
            error: None,
            body: transfer.body,
            elapsed,
            status: Some(transfer.status),
            headers: transfer.headers,
        }
    }

    pub(crate) fn failed<E: Into<String>>(error: E, elapsed: Duration) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error.push_str("request failed");
        }
        Self {
            success: false,
            error: Some(error),
            body: Bytes::new(),
            elapsed,
            status: None,
            headers: Vec::new(),
        }
    }

    pub(crate) fn with_status(mut self, status: u16, body: Bytes) -> Self {
        self.status = Some(status);
        self.body = body;
        self
    }

    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
