//! Demo API server with JSON request logging.
//!
//! Every request outside the excluded routes produces an `Incoming Request`
//! and a `Completed Request` JSON line on stdout (or colored lines on stderr
//! with `--pretty`).

use axum::{
    Router, middleware,
    routing::{get, post},
};
use reqlog::{
    cli::Cli,
    colors::PrettySink,
    handlers,
    layer,
    logger::Logger,
    middleware::{RequestInterceptor, log_requests},
    sink::{WriterSink, open_log_file},
};
use std::{fs::File, net::SocketAddr, sync::Arc};
use tower_http::catch_panic::CatchPanicLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Cli = argh::from_env();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "reqlog=info".into());

    // Handler-side `tracing` output and request events share destinations.
    let log_file = args.log_file.as_deref().map(open_log_file).transpose()?;
    let tracing_file = log_file.as_ref().map(File::try_clone).transpose()?;
    layer::subscriber(filter, args.pretty, tracing_file).init();

    let mut logger = Logger::builder();
    logger = if args.pretty { logger.sink(PrettySink) } else { logger.sink(WriterSink::stdout()) };
    if let Some(file) = log_file {
        logger = logger.sink(WriterSink::new(file));
    }

    let interceptor = Arc::new(RequestInterceptor::new(logger.build(), args.logging_options()?));

    let app = Router::new()
        .route("/api/v1/customers", get(handlers::list_customers).post(handlers::create_customer))
        .route("/api/v1/customers/{id}", get(handlers::get_customer))
        .route("/api/v1/correlation", get(handlers::echo_correlation_id))
        .route("/health", get(handlers::health))
        .route("/api/v1/fail", post(handlers::fail))
        .layer(middleware::from_fn_with_state(interceptor, log_requests))
        .layer(CatchPanicLayer::new());

    info!("Server running on: http://{}", args.bind);

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
