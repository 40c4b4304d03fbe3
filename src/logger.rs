//! Structured logger that dispatches [`LogEvent`]s to sinks.
//!
//! A [`Logger`] is cheap to clone. [`Logger::for_context`] returns a copy
//! with an extra bound property; bound properties are added to every event
//! written through that copy unless the event already has one with the same
//! name. This is how a correlation ID set once at the edge of a request
//! follows every log call made while handling it.

use std::sync::Arc;

use crate::event::LogEvent;
use crate::level::Level;
use crate::sink::Sink;
use crate::template::MessageTemplate;
use crate::value::{Properties, PropertyValue};

struct Pipeline {
    minimum_level: Level,
    sinks: Vec<Box<dyn Sink>>,
}

/// Handle used to write events.
#[derive(Clone)]
pub struct Logger {
    pipeline: Arc<Pipeline>,
    context: Properties,
}

/// Builder for [`Logger`]. Defaults to [`Level::Information`] and no sinks.
pub struct LoggerBuilder {
    minimum_level: Level,
    sinks: Vec<Box<dyn Sink>>,
}

impl LoggerBuilder {
    pub fn minimum_level(mut self, level: Level) -> Self {
        self.minimum_level = level;
        self
    }

    pub fn sink(mut self, sink: impl Sink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn build(self) -> Logger {
        Logger {
            pipeline: Arc::new(Pipeline { minimum_level: self.minimum_level, sinks: self.sinks }),
            context: Properties::new(),
        }
    }
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder { minimum_level: Level::Information, sinks: Vec::new() }
    }

    /// A logger that drops everything.
    pub fn silent() -> Self {
        Self::builder().build()
    }

    /// A copy of this logger with `key` bound to `value`.
    pub fn for_context(&self, key: &str, value: impl Into<PropertyValue>) -> Logger {
        let mut context = self.context.clone();
        context.insert(key, value);
        Logger { pipeline: Arc::clone(&self.pipeline), context }
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.pipeline.minimum_level && !self.pipeline.sinks.is_empty()
    }

    /// Writes `template` with positional `args` bound to its holes.
    pub fn write(&self, level: Level, template: &str, args: Vec<PropertyValue>) {
        if !self.is_enabled(level) {
            return;
        }
        let template = MessageTemplate::parse(template);
        let properties = template.bind(args);
        self.dispatch(LogEvent::new(level, template, properties));
    }

    /// Writes `template` carrying an explicit property bag.
    pub fn write_properties(&self, level: Level, template: &str, properties: &Properties) {
        if !self.is_enabled(level) {
            return;
        }
        let event = LogEvent::new(level, MessageTemplate::parse(template), properties.clone());
        self.dispatch(event);
    }

    /// Writes a fully built event.
    pub fn write_event(&self, event: LogEvent) {
        if self.is_enabled(event.level()) {
            self.dispatch(event);
        }
    }

    pub fn debug(&self, template: &str, args: Vec<PropertyValue>) {
        self.write(Level::Debug, template, args);
    }

    pub fn information(&self, template: &str, args: Vec<PropertyValue>) {
        self.write(Level::Information, template, args);
    }

    pub fn warning(&self, template: &str, args: Vec<PropertyValue>) {
        self.write(Level::Warning, template, args);
    }

    /// Writes an error-level event with `error` attached as its exception.
    pub fn error(&self, error: &anyhow::Error, template: &str, args: Vec<PropertyValue>) {
        if !self.is_enabled(Level::Error) {
            return;
        }
        let template = MessageTemplate::parse(template);
        let properties = template.bind(args);
        self.dispatch(LogEvent::new(Level::Error, template, properties).with_error(error));
    }

    fn dispatch(&self, mut event: LogEvent) {
        for (key, value) in self.context.iter() {
            event.add_property_if_absent(key, value.clone());
        }
        for sink in &self.pipeline.sinks {
            if let Err(e) = sink.emit(&event) {
                tracing::warn!("log sink failed: {e}");
            }
        }
    }
}
