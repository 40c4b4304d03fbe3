//! `tracing` integration.
//!
//! [`JsonLineLayer`] renders `tracing` events with the same [`EventEncoder`]
//! used for request events. Fields recorded on enclosing spans become event
//! properties, innermost span first, so a handler running inside the
//! interceptor's request span logs with that request's `CorrelationId`.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::sync::Mutex;

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

use crate::encoder::EventEncoder;
use crate::event::LogEvent;
use crate::level::Level;
use crate::template::MessageTemplate;
use crate::value::{Properties, PropertyValue, Scalar};

/// Field name carrying an error's text on a `tracing` event.
pub const EXCEPTION_FIELD: &str = "exception";

/// A `tracing_subscriber` layer writing one JSON line per event.
pub struct JsonLineLayer<W> {
    encoder: EventEncoder,
    make_writer: W,
}

impl JsonLineLayer<fn() -> std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout)
    }
}

impl<W> JsonLineLayer<W>
where
    W: for<'w> MakeWriter<'w> + 'static,
{
    pub fn new(make_writer: W) -> Self {
        Self { encoder: EventEncoder::new(), make_writer }
    }
}

/// The process subscriber.
///
/// `tracing` output goes where request events go: colored `fmt` lines on
/// stderr when `pretty`, JSON lines on stdout otherwise, and JSON lines
/// appended to `log_file` when one is given.
pub fn subscriber(filter: EnvFilter, pretty: bool, log_file: Option<File>) -> impl Subscriber + Send + Sync {
    let console_pretty = pretty.then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let console_json = (!pretty).then(JsonLineLayer::stdout);
    let file_json = log_file.map(|file| JsonLineLayer::new(Mutex::new(file)));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_pretty)
        .with(console_json)
        .with(file_json)
}

/// Span fields, stored in the span's extensions.
struct SpanProperties(Properties);

#[derive(Default)]
struct PropertyVisitor {
    properties: Properties,
    message: Option<String>,
    exception: Option<String>,
}

impl PropertyVisitor {
    fn put(&mut self, field: &Field, value: PropertyValue) {
        match field.name() {
            "message" => self.message = value.as_str().map(str::to_owned),
            EXCEPTION_FIELD => self.exception = value.as_str().map(str::to_owned),
            name => self.properties.insert(name, value),
        }
    }
}

impl Visit for PropertyVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut text = value.to_string();
        let mut source = value.source();
        while let Some(cause) = source {
            text.push_str(&format!("\n ---> {cause}"));
            source = cause.source();
        }
        self.put(field, PropertyValue::Scalar(Scalar::Str(text)));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}").into());
    }
}

impl<S, W> Layer<S> for JsonLineLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = PropertyVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanProperties(visitor.properties));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = PropertyVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        if let Some(SpanProperties(properties)) = extensions.get_mut::<SpanProperties>() {
            for (key, value) in visitor.properties.iter() {
                properties.insert(key, value.clone());
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = PropertyVisitor::default();
        event.record(&mut visitor);

        let mut properties = visitor.properties;
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(SpanProperties(span_properties)) = span.extensions().get::<SpanProperties>() {
                    for (key, value) in span_properties.iter() {
                        properties.try_add(key, value.clone());
                    }
                }
            }
        }

        let level = Level::from(*event.metadata().level());
        let template = MessageTemplate::literal(visitor.message.unwrap_or_default());
        let mut log_event = LogEvent::new(level, template, properties);
        if let Some(exception) = visitor.exception {
            log_event = log_event.with_exception(exception);
        }

        let line = self.encoder.encode(&log_event);
        let mut writer = self.make_writer.make_writer_for(event.metadata());
        // Nowhere left to report a failed log write.
        let _ = writer.write_all(line.as_bytes());
    }
}
