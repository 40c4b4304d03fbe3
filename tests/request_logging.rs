//! Integration tests for the request logging middleware

use axum::{
    Router,
    body::{Body, to_bytes},
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
};
use reqlog::{
    encoder::{EventEncoder, keys},
    handlers,
    level::Level,
    logger::Logger,
    middleware::{
        COMPLETED_REQUEST, DEFAULT_MAX_BODY_BYTES, INCOMING_REQUEST, LoggingOptions, RequestInterceptor,
        log_requests,
    },
    sink::MemorySink,
    value::PropertyValue,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::catch_panic::CatchPanicLayer;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/51.0.2704.103 Safari/537.36";
const FORWARDED_HOSTNAME: &str = "id42.example-cdn.com";

async fn panicking_handler() -> StatusCode {
    panic!("handler exploded")
}

/// Reads the whole body without axum's default limit and returns its length.
async fn count_bytes(body: Body) -> String {
    to_bytes(body, usize::MAX).await.unwrap().len().to_string()
}

/// Starts the demo routes behind the interceptor; returns the address and the
/// sink collecting every event.
async fn spawn_app(options: LoggingOptions) -> (SocketAddr, MemorySink) {
    let sink = MemorySink::new();
    let logger = Logger::builder().sink(sink.clone()).build();
    let interceptor = Arc::new(RequestInterceptor::new(logger, options));

    let app = Router::new()
        .route("/api/v1/customers", get(handlers::list_customers).post(handlers::create_customer))
        .route("/api/v1/customers/{id}", get(handlers::get_customer))
        .route("/api/v1/correlation", get(handlers::echo_correlation_id))
        .route("/api/v1/ten", get(|| async { "0123456789" }))
        .route("/api/v1/explode", post(panicking_handler))
        .route("/api/v1/upload", post(count_bytes))
        .route("/health", get(handlers::health))
        .layer(axum_middleware::from_fn_with_state(interceptor, log_requests))
        .layer(CatchPanicLayer::new());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    (addr, sink)
}

fn text<'a>(event: &'a reqlog::LogEvent, key: &str) -> Option<&'a str> {
    event.property(key).and_then(PropertyValue::as_str)
}

fn is_null(event: &reqlog::LogEvent, key: &str) -> bool {
    event.property(key).is_some_and(PropertyValue::is_null)
}

#[tokio::test]
async fn test_excluded_route_is_not_logged() {
    let (addr, sink) = spawn_app(LoggingOptions::excluding(["/health"]).unwrap()).await;

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_get_request_without_query_params() {
    let (addr, sink) = spawn_app(LoggingOptions::default()).await;
    let correlation_id = "3f2c7a4e-9b1d-4c55-8e0f-6a7b8c9d0e1f";

    let response = reqwest::Client::new()
        .get(format!("http://{}/api/v1/customers", addr))
        .header("X-Correlation-ID", correlation_id)
        .header("X-Forwarded-Host", FORWARDED_HOSTNAME)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].render_message(), INCOMING_REQUEST);
    assert_eq!(events[1].render_message(), COMPLETED_REQUEST);

    let incoming = &events[0];
    assert!(incoming.property(keys::HAS_HTTP_RESPONSE).is_none());

    let completed = &events[1];
    assert_eq!(text(completed, keys::METHOD), Some("GET"));
    assert_eq!(text(completed, keys::URL), Some("/api/v1/customers"));
    assert!(is_null(completed, keys::REQUEST_BODY));
    assert!(is_null(completed, keys::QUERY));
    assert!(is_null(completed, keys::CONTENT_TYPE));
    assert_eq!(text(completed, keys::CORRELATION_ID), Some(correlation_id));
    assert_eq!(text(completed, keys::SCHEME), Some("http"));
    assert_eq!(text(completed, keys::PROTOCOL), Some("HTTP/1.1"));
    assert_eq!(text(completed, keys::USER_AGENT), Some(USER_AGENT));
    assert_eq!(text(completed, keys::HOSTNAME), Some("127.0.0.1"));
    assert_eq!(text(completed, keys::FORWARDED_HOSTNAME), Some(FORWARDED_HOSTNAME));
    assert_eq!(text(completed, keys::IP), Some("127.0.0.1"));
    assert_eq!(completed.property(keys::STATUS_CODE).and_then(PropertyValue::as_u64), Some(200));
    assert!(completed.property(keys::RESPONSE_TIME).and_then(PropertyValue::as_f64).is_some());
}

#[tokio::test]
async fn test_get_request_with_query_params() {
    let (addr, sink) = spawn_app(LoggingOptions::default()).await;

    let response = reqwest::get(format!("http://{}/api/v1/customers/1?Name=Foo", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = sink.events();
    let completed = &events[1];
    assert_eq!(text(completed, keys::URL), Some("/api/v1/customers/1"));
    assert!(!is_null(completed, keys::QUERY));

    let line: serde_json::Value =
        serde_json::from_str(&EventEncoder::new().encode(completed)).unwrap();
    assert_eq!(line["Http"]["Request"]["Path"], "/api/v1/customers/1");
    assert_eq!(line["Http"]["Request"]["Query"][0]["Key"], "Name");
    assert_eq!(line["Http"]["Request"]["Query"][0]["Value"], "Foo");
}

#[tokio::test]
async fn test_post_request_body_is_logged_and_forwarded() {
    let (addr, sink) = spawn_app(LoggingOptions::default()).await;
    let body = r#"{"Id":1}"#;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/v1/customers", addr))
        .header("content-type", "application/json; charset=utf-8")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    // The handler echoes what it received.
    assert_eq!(response.text().await.unwrap(), body);

    let events = sink.events();
    let completed = &events[1];
    assert_eq!(text(completed, keys::METHOD), Some("POST"));
    assert_eq!(text(completed, keys::REQUEST_BODY), Some(body));
    assert_eq!(text(completed, keys::CONTENT_TYPE), Some("application/json; charset=utf-8"));
    assert!(is_null(completed, keys::QUERY));

    let line: serde_json::Value =
        serde_json::from_str(&EventEncoder::new().encode(completed)).unwrap();
    assert_eq!(line["Http"]["Request"]["Body"], body);
}

#[tokio::test]
async fn test_oversized_body_is_passed_through_but_not_logged() {
    let (addr, sink) = spawn_app(LoggingOptions::default()).await;
    let size = DEFAULT_MAX_BODY_BYTES + 1024;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/v1/upload", addr))
        .header("content-type", "application/octet-stream")
        .body("x".repeat(size))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), size.to_string());

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert!(is_null(&events[0], keys::REQUEST_BODY));
    assert!(is_null(&events[1], keys::REQUEST_BODY));
    assert_eq!(text(&events[1], keys::CONTENT_TYPE), Some("application/octet-stream"));
}

#[tokio::test]
async fn test_body_over_configured_limit_still_reaches_handler() {
    let options = LoggingOptions::default().with_max_body_bytes(4);
    let (addr, sink) = spawn_app(options).await;
    let body = r#"{"Id":1}"#;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/v1/customers", addr))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.text().await.unwrap(), body);

    let events = sink.events();
    let completed = events.last().unwrap();
    assert!(is_null(completed, keys::REQUEST_BODY));
    assert_eq!(text(completed, keys::CONTENT_TYPE), Some("application/json"));
}

#[tokio::test]
async fn test_empty_agent_and_forwarded_host_are_null() {
    let (addr, sink) = spawn_app(LoggingOptions::default()).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/api/v1/customers", addr))
        .header("User-Agent", "")
        .header("X-Forwarded-Host", "")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = sink.events();
    let line: serde_json::Value =
        serde_json::from_str(&EventEncoder::new().encode(&events[1])).unwrap();
    assert!(line["Http"]["Request"]["UserAgent"].is_null());
    assert!(line["Host"]["ForwardedHostname"].is_null());
    assert_eq!(line["Host"]["Hostname"], "127.0.0.1");
}

#[tokio::test]
async fn test_missing_correlation_id_is_generated_and_propagated() {
    let (addr, sink) = spawn_app(LoggingOptions::default()).await;

    let response = reqwest::get(format!("http://{}/api/v1/correlation", addr)).await.unwrap();
    let seen_by_handler = response.text().await.unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 2);
    let incoming_id = text(&events[0], keys::CORRELATION_ID).unwrap();
    let completed_id = text(&events[1], keys::CORRELATION_ID).unwrap();
    assert!(!incoming_id.is_empty());
    assert_eq!(incoming_id, completed_id);
    assert_eq!(seen_by_handler, incoming_id);
}

#[tokio::test]
async fn test_response_is_captured_and_forwarded_unchanged() {
    let (addr, sink) = spawn_app(LoggingOptions::default()).await;

    let response = reqwest::get(format!("http://{}/api/v1/ten", addr)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "0123456789");

    let events = sink.events();
    let line: serde_json::Value =
        serde_json::from_str(&EventEncoder::new().encode(&events[1])).unwrap();
    assert_eq!(line["Http"]["Response"]["StatusCode"], 200);
    assert_eq!(line["Http"]["Response"]["Bytes"], 10);
    assert!(line["Http"]["Response"]["ResponseTime"].is_number());
    assert_eq!(line["Host"]["Ip"], "127.0.0.1");
}

#[tokio::test]
async fn test_error_status_is_logged() {
    let (addr, sink) = spawn_app(LoggingOptions::default()).await;

    let response = reqwest::get(format!("http://{}/api/v1/customers/7", addr)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let events = sink.events();
    // The handler's own event lands between the two request events.
    assert_eq!(events.len(), 3);
    assert_eq!(events[1].render_message(), "Customer 7 not found");
    assert_eq!(text(&events[1], keys::CORRELATION_ID), text(&events[0], keys::CORRELATION_ID));
    assert_eq!(events[2].property(keys::STATUS_CODE).and_then(PropertyValue::as_u64), Some(404));
}

#[tokio::test]
async fn test_panicking_handler_still_completes_log() {
    let (addr, sink) = spawn_app(LoggingOptions::default()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/v1/explode", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    let completed = &events[1];
    assert_eq!(completed.level(), Level::Error);
    assert_eq!(completed.render_message(), COMPLETED_REQUEST);
    assert_eq!(completed.property(keys::STATUS_CODE).and_then(PropertyValue::as_u64), Some(500));
    assert!(completed.exception().unwrap().contains("handler exploded"));
}

#[tokio::test]
async fn test_concurrent_requests_do_not_share_properties() {
    let (addr, sink) = spawn_app(LoggingOptions::default()).await;
    let client = reqwest::Client::new();

    let requests = (0..16).map(|i| {
        let client = client.clone();
        async move {
            client
                .get(format!("http://{}/api/v1/customers/1?n={}", addr, i))
                .header("X-Correlation-ID", format!("req-{i}"))
                .send()
                .await
                .unwrap()
        }
    });
    let responses = futures::future::join_all(requests).await;
    assert!(responses.iter().all(|r| r.status() == StatusCode::OK));

    let events = sink.events();
    assert_eq!(events.len(), 32);
    for i in 0..16 {
        let id = format!("req-{i}");
        let mine: Vec<_> = events
            .iter()
            .filter(|e| text(e, keys::CORRELATION_ID) == Some(id.as_str()))
            .collect();
        assert_eq!(mine.len(), 2, "two events for {id}");
        assert_eq!(mine[0].render_message(), INCOMING_REQUEST);
        assert_eq!(mine[1].render_message(), COMPLETED_REQUEST);

        let line: serde_json::Value =
            serde_json::from_str(&EventEncoder::new().encode(mine[1])).unwrap();
        assert_eq!(line["Http"]["Request"]["Query"][0]["Value"], i.to_string());
    }
}
