//! reqlog - HTTP request/response logging middleware with a fixed-schema
//! JSON line encoder.

pub mod cli;
pub mod colors;
pub mod encoder;
pub mod error;
pub mod event;
pub mod handlers;
pub mod layer;
pub mod level;
pub mod logger;
pub mod middleware;
pub mod sink;
pub mod template;
pub mod value;

pub use encoder::EventEncoder;
pub use error::Error;
pub use event::LogEvent;
pub use level::Level;
pub use logger::Logger;
pub use middleware::{LoggingOptions, RequestInterceptor, log_requests};
