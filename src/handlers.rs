//! Demo API handlers.
//!
//! A tiny customers API used by the `reqlog` binary and the integration
//! tests. Handlers log through the [`Logger`] extension the interceptor
//! binds to each request's correlation ID.

use axum::{
    Extension,
    body::Bytes,
    extract::Path,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::logger::Logger;
use crate::middleware::CORRELATION_ID_HEADER;

/// `GET /api/v1/customers`
pub async fn list_customers(log: Option<Extension<Logger>>) -> Response {
    let log = request_logger(log);
    log.debug("Listing customers", vec![]);
    json(StatusCode::OK, r#"[{"Id":1,"Name":"Foo"}]"#.to_owned())
}

/// `GET /api/v1/customers/{id}`
pub async fn get_customer(Path(id): Path<u64>, log: Option<Extension<Logger>>) -> Response {
    let log = request_logger(log);
    if id != 1 {
        log.information("Customer {Id} not found", vec![id.into()]);
        return StatusCode::NOT_FOUND.into_response();
    }
    json(StatusCode::OK, format!(r#"{{"Id":{id},"Name":"Foo"}}"#))
}

/// `POST /api/v1/customers`
///
/// Echoes the received body back with `201 Created`, which lets callers check
/// that the body reached the handler untouched.
pub async fn create_customer(log: Option<Extension<Logger>>, body: Bytes) -> Response {
    let log = request_logger(log);
    if body.is_empty() {
        log.warning("Rejected empty customer payload", vec![]);
        return StatusCode::BAD_REQUEST.into_response();
    }
    log.information("Creating customer from {Bytes} bytes", vec![body.len().into()]);
    let mut response = (StatusCode::CREATED, body).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// `GET /api/v1/correlation`: returns the correlation ID the handler saw.
pub async fn echo_correlation_id(headers: HeaderMap) -> Response {
    let id = headers
        .get(&CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    (StatusCode::OK, id).into_response()
}

/// `POST /api/v1/fail`: always panics; shows the failure path of the
/// interceptor.
pub async fn fail() -> StatusCode {
    panic!("demo handler failure")
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// The correlation-bound logger, or a silent one on routes the interceptor
/// skips.
fn request_logger(log: Option<Extension<Logger>>) -> Logger {
    log.map_or_else(Logger::silent, |Extension(log)| log)
}

fn json(status: StatusCode, body: String) -> Response {
    let mut response = (status, body).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
