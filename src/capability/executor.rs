//! HTTP execution of `OpenAPI` operations
//!
//! [`HttpExecutor`] turns `(operation, arguments)` into exactly one HTTP
//! request and hands it to an injected [`HttpTransport`]:
//!
//! - path arguments are substituted into the path template, one URL path
//!   segment each (percent-encoded)
//! - query arguments are appended (arrays repeat the key)
//! - header arguments become headers, cookie arguments one `Cookie` header
//! - body arguments are reassembled into the JSON request body
//!
//! Absent optional arguments are omitted, never sent as `null`. The
//! executor does not retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::debug;
use url::Url;

use super::definition::{Arguments, ParameterLocation, ParameterSpec};
use super::openapi::OperationDescriptor;
use super::schema::{BodyEncoding, SynthesizedSchema};
use crate::{Error, Result};

/// Base URL used for in-process backends
pub const IN_PROCESS_BASE_URL: &str = "http://localhost";

/// Maximum number of body characters kept in a backend error
const ERROR_BODY_LIMIT: usize = 500;

/// One outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Upper-case method
    pub method: String,
    /// Full URL including query
    pub url: Url,
    /// Headers in insertion order
    pub headers: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
}

/// Raw backend response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Body bytes
    pub body: Bytes,
}

impl HttpResponse {
    /// Returns `true` for 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as (lossy) UTF-8
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body as JSON; empty body is `null`, non-JSON is a string
    #[must_use]
    pub fn into_value(self) -> Value {
        if self.body.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(&self.body).unwrap_or_else(|_| Value::String(self.text()))
    }

    /// Capability result: the body for 2xx, [`Error::Backend`] otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] carrying the status and (truncated) body.
    pub fn into_result(self) -> Result<Value> {
        if self.is_success() {
            return Ok(self.into_value());
        }
        let body: String = self.text().chars().take(ERROR_BODY_LIMIT).collect();
        Err(Error::Backend {
            status: Some(self.status),
            message: format!("backend returned HTTP {}", self.status),
            body: (!body.is_empty()).then_some(body),
        })
    }
}

// ============================================================================
// Transports
// ============================================================================

/// Asynchronous HTTP client used by the executor
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// Send one request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] when no response was received.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Network transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::backend(format!("Invalid HTTP method '{}': {e}", request.method)))?;

        let mut builder = self.client.request(method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::backend(format!("Request failed: {e}")))?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::backend(format!("Failed to read response body: {e}")))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Dispatches requests straight into an in-process `axum` application,
/// without a socket.
#[derive(Clone)]
pub struct InProcessTransport {
    router: Router,
}

impl InProcessTransport {
    /// Wrap an application
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

impl std::fmt::Debug for InProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InProcessTransport")
    }
}

#[async_trait]
impl HttpTransport for InProcessTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = axum::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let body = match request.body {
            Some(ref value) => {
                builder = builder.header("content-type", "application/json");
                axum::body::Body::from(serde_json::to_vec(value)?)
            }
            None => axum::body::Body::empty(),
        };
        let http_request = builder
            .body(body)
            .map_err(|e| Error::backend(format!("Invalid request: {e}")))?;

        let response = self
            .router
            .clone()
            .oneshot(http_request)
            .await
            .unwrap_or_else(|never| match never {});

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| Error::backend(format!("Failed to read response body: {e}")))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn collect_headers(headers: &axum::http::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

// ============================================================================
// Executor
// ============================================================================

/// An operation together with its synthesized parameters
#[derive(Debug, Clone)]
pub struct BoundOperation {
    /// Source operation
    pub operation: Arc<OperationDescriptor>,
    /// Declared parameters (path, query, header, cookie, body)
    pub parameters: Vec<ParameterSpec>,
    /// Body reassembly rule
    pub body: BodyEncoding,
}

impl BoundOperation {
    /// Bind an operation to its synthesized schema
    #[must_use]
    pub fn new(operation: Arc<OperationDescriptor>, schema: SynthesizedSchema) -> Self {
        Self {
            operation,
            parameters: schema.parameters,
            body: schema.body,
        }
    }

    fn at(&self, location: ParameterLocation) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters
            .iter()
            .filter(move |p| p.location == location)
    }
}

/// Sends bound operations to one backend
pub struct HttpExecutor {
    base_url: Url,
    transport: Arc<dyn HttpTransport>,
}

impl HttpExecutor {
    /// Executor for `base_url` using `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `base_url` is not an absolute URL.
    pub fn new(base_url: &str, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Base URL '{base_url}' cannot carry a path"
            )));
        }
        Ok(Self {
            base_url,
            transport,
        })
    }

    /// Executor sending over the network with `reqwest`.
    ///
    /// # Errors
    ///
    /// See [`Self::new`] and [`ReqwestTransport::new`].
    pub fn reqwest(base_url: &str, timeout: Duration) -> Result<Self> {
        Self::new(base_url, Arc::new(ReqwestTransport::new(timeout)?))
    }

    /// Executor dispatching into an in-process application.
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn in_process(router: Router) -> Result<Self> {
        Self::new(IN_PROCESS_BASE_URL, Arc::new(InProcessTransport::new(router)))
    }

    /// Backend base URL
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the request for `op` without sending it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when a path argument is missing,
    /// or substitutes to an empty, `.` or `..` segment.
    pub fn build_request(&self, op: &BoundOperation, args: &Arguments) -> Result<HttpRequest> {
        let descriptor = &op.operation;
        let mut url = self.base_url.clone();

        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                Error::Config(format!("Base URL '{}' cannot carry a path", self.base_url))
            })?;
            segments.pop_if_empty();
            for segment in descriptor.path.trim_start_matches('/').split('/') {
                segments.push(&substitute_segment(descriptor, segment, args)?);
            }
        }

        let query: Vec<(String, String)> = op
            .at(ParameterLocation::Query)
            .filter_map(|p| args.get(&p.name).map(|v| (p, v)))
            .flat_map(|(p, value)| match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| (p.name.clone(), value_to_string(item)))
                    .collect::<Vec<_>>(),
                other => vec![(p.name.clone(), value_to_string(other))],
            })
            .collect();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut headers: Vec<(String, String)> = op
            .at(ParameterLocation::Header)
            .filter_map(|p| args.get(&p.name).map(|v| (p.name.clone(), value_to_string(v))))
            .collect();

        let cookies: Vec<String> = op
            .at(ParameterLocation::Cookie)
            .filter_map(|p| {
                args.get(&p.name)
                    .map(|v| format!("{}={}", p.name, value_to_string(v)))
            })
            .collect();
        if !cookies.is_empty() {
            headers.push(("cookie".to_string(), cookies.join("; ")));
        }

        let body_required = descriptor
            .request_body
            .as_ref()
            .is_some_and(|b| b.required);
        let body = match op.body {
            BodyEncoding::None => None,
            BodyEncoding::Whole(ref name) => args.get(name).cloned(),
            BodyEncoding::Fields(ref fields) => {
                let object: Map<String, Value> = fields
                    .iter()
                    .filter_map(|f| args.get(f).map(|v| (f.clone(), v.clone())))
                    .collect();
                (!object.is_empty() || body_required).then_some(Value::Object(object))
            }
        };

        Ok(HttpRequest {
            method: descriptor.method.clone(),
            url,
            headers,
            body,
        })
    }

    /// Build and send one request. The response is returned whatever its
    /// status; see [`HttpResponse::into_result`].
    ///
    /// # Errors
    ///
    /// Request building errors, or [`Error::Backend`] from the transport.
    pub async fn execute(&self, op: &BoundOperation, args: &Arguments) -> Result<HttpResponse> {
        let request = self.build_request(op, args)?;
        debug!(
            operation = %op.operation.id(),
            method = %request.method,
            url = %request.url,
            "Sending backend request"
        );
        let response = self.transport.send(request).await?;
        debug!(operation = %op.operation.id(), status = response.status, "Backend responded");
        Ok(response)
    }

    /// Like [`Self::execute`], but abandons the request when `cancel`
    /// fires. The in-flight request future is dropped, which aborts it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] on cancellation.
    pub async fn execute_with_cancel(
        &self,
        op: &BoundOperation,
        args: &Arguments,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(operation = %op.operation.id(), "Backend request cancelled");
                Err(Error::Cancelled)
            }
            result = self.execute(op, args) => result,
        }
    }
}

impl std::fmt::Debug for HttpExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExecutor")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Replace every `{name}` in one path segment with its argument value
fn substitute_segment(op: &OperationDescriptor, segment: &str, args: &Arguments) -> Result<String> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        let value = args.get(name).ok_or_else(|| {
            Error::InvalidArguments(format!(
                "operation '{}' is missing path argument '{name}'",
                op.id()
            ))
        })?;
        out.push_str(&rest[..start]);
        out.push_str(&value_to_string(value));
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    // URL parsing collapses these into a different path
    if out != segment && matches!(out.as_str(), "" | "." | "..") {
        return Err(Error::InvalidArguments(format!(
            "operation '{}' path segment '{segment}' would become '{out}'",
            op.id()
        )));
    }
    Ok(out)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
