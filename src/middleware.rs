//! Request and response logging middleware.
//!
//! Every request that is not excluded produces two events on the configured
//! [`Logger`]:
//!
//! 1. `Incoming Request`, carrying the request metadata
//! 2. `Completed Request`, carrying the same metadata plus status, latency and
//!    response size
//!
//! Both share one correlation ID and one [`RequestLogContext`], which lives on
//! the stack of a single call. Nothing per-request is stored on the shared
//! [`RequestInterceptor`].

use std::any::Any;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, to_bytes},
    extract::{ConnectInfo, Query, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use nanoid::nanoid;
use tracing::Instrument;

use crate::encoder::keys;
use crate::error::Error;
use crate::event::LogEvent;
use crate::level::Level;
use crate::logger::Logger;
use crate::template::MessageTemplate;
use crate::value::{Properties, PropertyValue};

pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");
pub const FORWARDED_HOST_HEADER: HeaderName = HeaderName::from_static("x-forwarded-host");

pub const INCOMING_REQUEST: &str = "Incoming Request";
pub const COMPLETED_REQUEST: &str = "Completed Request";

/// Largest request body captured by default, the same as axum's
/// `DefaultBodyLimit`.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Middleware configuration.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Paths that are passed through without logging. Matched exactly
    /// against the request path, without the query string.
    pub routes_to_be_excluded: HashSet<String>,
    /// Request bodies with a larger `Content-Length` are passed through
    /// unread and logged as a null `RequestBody`.
    pub max_body_bytes: usize,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self { routes_to_be_excluded: HashSet::new(), max_body_bytes: DEFAULT_MAX_BODY_BYTES }
    }
}

impl LoggingOptions {
    /// Options excluding `routes`. Each route must be an absolute path.
    pub fn excluding<I, S>(routes: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut routes_to_be_excluded = HashSet::new();
        for route in routes {
            let route = route.into();
            if !route.starts_with('/') {
                return Err(Error::Config(format!("excluded route `{route}` must start with `/`")));
            }
            routes_to_be_excluded.insert(route);
        }
        Ok(Self { routes_to_be_excluded, ..Self::default() })
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.routes_to_be_excluded.contains(path)
    }
}

/// Properties shared by the two events of one request.
///
/// Adds are idempotent: the first value stored under a key wins.
#[derive(Debug, Default)]
pub struct RequestLogContext {
    properties: Properties,
}

impl RequestLogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, value: impl Into<PropertyValue>) {
        self.properties.try_add(key, value);
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

/// The logging middleware. Share one instance across all requests.
pub struct RequestInterceptor {
    logger: Logger,
    options: LoggingOptions,
}

impl RequestInterceptor {
    pub fn new(logger: Logger, options: LoggingOptions) -> Self {
        Self { logger, options }
    }

    /// Logs one exchange around `next`.
    ///
    /// The handler receives the request with its body intact, an
    /// `X-Correlation-ID` header, and a [`Logger`] extension bound to that ID.
    /// If the handler panics, `Completed Request` is still emitted at
    /// [`Level::Error`] with status 500 before the panic continues.
    pub async fn handle(&self, mut req: Request, next: Next) -> Response {
        if self.options.is_excluded(req.uri().path()) {
            return next.run(req).await;
        }

        let started = Instant::now();
        let mut context = RequestLogContext::new();
        let correlation_id = resolve_correlation_id(req.headers_mut());

        let capture = capture_request(req, &correlation_id, self.options.max_body_bytes, &mut context);
        let mut req = match capture.await {
            Ok(req) => req,
            Err(response) => return response,
        };
        self.logger.write_properties(Level::Information, INCOMING_REQUEST, context.properties());

        let scoped = self.logger.for_context(keys::CORRELATION_ID, correlation_id.as_str());
        req.extensions_mut().insert(scoped);

        let span = tracing::info_span!("request", CorrelationId = %correlation_id);
        let outcome = AssertUnwindSafe(next.run(req).instrument(span))
            .catch_unwind()
            .await;

        match outcome {
            Ok(response) => {
                let (response, bytes) = buffer_response(response).await;
                add_response_properties(&mut context, response.status(), started.elapsed(), bytes);
                self.logger.write_properties(Level::Information, COMPLETED_REQUEST, context.properties());
                response
            }
            Err(panic) => {
                add_response_properties(&mut context, StatusCode::INTERNAL_SERVER_ERROR, started.elapsed(), 0);
                let event = LogEvent::new(
                    Level::Error,
                    MessageTemplate::parse(COMPLETED_REQUEST),
                    context.properties().clone(),
                )
                .with_exception(panic_message(panic.as_ref()));
                self.logger.write_event(event);
                drop(context);
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// `axum::middleware::from_fn_with_state` entry point.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use axum::{Router, middleware, routing::get};
/// use reqlog::logger::Logger;
/// use reqlog::middleware::{LoggingOptions, RequestInterceptor, log_requests};
///
/// let interceptor = Arc::new(RequestInterceptor::new(Logger::silent(), LoggingOptions::default()));
/// let app: Router = Router::new()
///     .route("/", get(|| async { "ok" }))
///     .layer(middleware::from_fn_with_state(interceptor, log_requests));
/// ```
pub async fn log_requests(
    State(interceptor): State<Arc<RequestInterceptor>>,
    req: Request,
    next: Next,
) -> Response {
    interceptor.handle(req, next).await
}

/// Reads `X-Correlation-ID`, generating and inserting one when it is missing,
/// empty, or not valid header text.
fn resolve_correlation_id(headers: &mut HeaderMap) -> String {
    if let Some(value) = headers.get(&CORRELATION_ID_HEADER) {
        match value.to_str() {
            Ok(id) if !id.is_empty() => return id.to_owned(),
            Ok(_) => {}
            Err(_) => tracing::debug!(
                header = ?value,
                "X-Correlation-ID is not visible ASCII, replacing it with a generated ID"
            ),
        }
    }

    let id = nanoid!();
    // nanoid's alphabet is always valid header text.
    if let Ok(value) = HeaderValue::from_str(&id) {
        headers.insert(CORRELATION_ID_HEADER, value);
    }
    id
}

/// Fills the request-phase properties. The body, when read, is put back on
/// the returned request unchanged. Bodies declared larger than
/// `max_body_bytes` are left unread.
async fn capture_request(
    req: Request,
    correlation_id: &str,
    max_body_bytes: usize,
    context: &mut RequestLogContext,
) -> Result<Request, Response> {
    let (parts, body) = req.into_parts();
    let headers = &parts.headers;

    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let within_limit = usize::try_from(content_length).is_ok_and(|len| len <= max_body_bytes);
    let (body, request_body) = if content_length == 0 {
        (body, None)
    } else if !within_limit {
        tracing::debug!(correlation_id, content_length, max_body_bytes, "request body too large to log");
        (body, None)
    } else {
        let bytes = to_bytes(body, max_body_bytes).await.map_err(|e| {
            tracing::error!(correlation_id, "failed to read request body: {e}");
            (StatusCode::BAD_REQUEST, "Failed to read request body").into_response()
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        (Body::from(bytes), Some(text))
    };

    let query = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();
    let query = (!query.is_empty()).then(|| query_value(query));

    let ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| map_to_ipv4(addr.ip()).to_string());

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()));

    context.add(keys::HAS_HTTP_REQUEST, true);
    context.add(keys::CORRELATION_ID, correlation_id);
    context.add(keys::METHOD, parts.method.as_str());
    context.add(keys::URL, parts.uri.path());
    context.add(keys::REQUEST_BODY, request_body);
    context.add(keys::QUERY, query);
    context.add(keys::SCHEME, parts.uri.scheme_str().unwrap_or("http"));
    context.add(keys::CONTENT_TYPE, header_text(headers, &header::CONTENT_TYPE));
    context.add(keys::PROTOCOL, format!("{:?}", parts.version));
    context.add(keys::IP, ip);
    context.add(keys::HOSTNAME, host.as_deref().and_then(remove_port));
    context.add(keys::FORWARDED_HOSTNAME, header_text(headers, &FORWARDED_HOST_HEADER));
    context.add(keys::USER_AGENT, header_text(headers, &header::USER_AGENT));

    Ok(Request::from_parts(parts, body))
}

fn add_response_properties(
    context: &mut RequestLogContext,
    status: StatusCode,
    elapsed: Duration,
    bytes: u64,
) {
    context.add(keys::HAS_HTTP_RESPONSE, true);
    context.add(keys::STATUS_CODE, status.as_u16());
    context.add(keys::RESPONSE_TIME, response_time(elapsed));
    context.add(keys::RESPONSE_BYTES, bytes);
}

/// Collects the response body and re-installs it unchanged. The byte count is
/// the declared `Content-Length` when present, else the buffered size.
async fn buffer_response(response: Response) -> (Response, u64) {
    let (parts, body) = response.into_parts();
    let declared = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    match to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            let count = declared.unwrap_or(bytes.len() as u64);
            (Response::from_parts(parts, Body::from(bytes)), count)
        }
        Err(e) => {
            tracing::error!("failed to read response body: {e}");
            (StatusCode::BAD_GATEWAY.into_response(), 0)
        }
    }
}

/// Whole elapsed milliseconds divided by 1000.
///
/// Sub-millisecond precision is dropped before the division; existing log
/// consumers expect exactly this value.
pub fn response_time(elapsed: Duration) -> f64 {
    elapsed.as_millis() as f64 / 1000.0
}

/// Header value as text; missing, empty, or non-UTF-8 values are `None`.
fn header_text(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Query pairs as a sequence of `{"Key":..,"Value":..}` structures.
fn query_value(pairs: Vec<(String, String)>) -> PropertyValue {
    PropertyValue::Sequence(
        pairs
            .into_iter()
            .map(|(key, value)| {
                PropertyValue::Structure(vec![
                    ("Key".to_owned(), key.into()),
                    ("Value".to_owned(), value.into()),
                ])
            })
            .collect(),
    )
}

/// IPv4 presentation of a peer address. IPv6 peers keep their low 32 bits,
/// so an IPv4-mapped address yields the original IPv4 address.
pub fn map_to_ipv4(ip: IpAddr) -> Ipv4Addr {
    match ip {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => {
            let [.., a, b, c, d] = v6.octets();
            Ipv4Addr::new(a, b, c, d)
        }
    }
}

/// Host without its `:port` suffix. Bracketed IPv6 literals keep their
/// brackets. Empty hosts are `None`.
pub fn remove_port(host: &str) -> Option<String> {
    if host.is_empty() {
        return None;
    }
    if host.starts_with('[') {
        if let Some(end) = host.find(']') {
            return Some(host[..=end].to_owned());
        }
    }
    host.split(':').next().map(str::to_owned)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    format!("handler panicked: {detail}")
}
