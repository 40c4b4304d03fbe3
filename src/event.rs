//! The captured log event.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::level::Level;
use crate::template::MessageTemplate;
use crate::value::{Properties, PropertyValue};

/// One log event as handed to sinks.
#[derive(Debug, Clone)]
pub struct LogEvent {
    level: Level,
    timestamp: SystemTime,
    template: MessageTemplate,
    exception: Option<String>,
    properties: Properties,
}

impl LogEvent {
    /// An event stamped with the current time.
    pub fn new(level: Level, template: MessageTemplate, properties: Properties) -> Self {
        Self {
            level,
            timestamp: SystemTime::now(),
            template,
            exception: None,
            properties,
        }
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attaches an error. The text keeps the whole `Caused by` chain and the
    /// backtrace when one was captured.
    pub fn with_error(mut self, error: &anyhow::Error) -> Self {
        self.exception = Some(format!("{error:?}"));
        self
    }

    pub fn with_exception(mut self, text: impl Into<String>) -> Self {
        self.exception = Some(text.into());
        self
    }

    /// Adds a property unless the event already carries one with that name.
    pub fn add_property_if_absent(&mut self, key: &str, value: PropertyValue) {
        self.properties.try_add(key, value);
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Milliseconds since the Unix epoch; instants before the epoch count
    /// as negative.
    pub fn unix_millis(&self) -> i64 {
        match self.timestamp.duration_since(UNIX_EPOCH) {
            Ok(after) => after.as_millis() as i64,
            Err(before) => -(before.duration().as_millis() as i64),
        }
    }

    /// The template rendered against this event's properties.
    pub fn render_message(&self) -> String {
        self.template.render(&self.properties)
    }

    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}
