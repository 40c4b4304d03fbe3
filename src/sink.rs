//! Log sinks: where encoded events end up.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::encoder::EventEncoder;
use crate::error::Error;
use crate::event::LogEvent;

/// A destination for log events.
///
/// Sinks are shared across concurrent requests and must serialize their own
/// writes.
pub trait Sink: Send + Sync {
    fn emit(&self, event: &LogEvent) -> Result<(), Error>;
}

/// Writes each event as one JSON line to any [`Write`] target.
pub struct WriterSink<W> {
    encoder: EventEncoder,
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { encoder: EventEncoder::new(), writer: Mutex::new(writer) }
    }
}

impl WriterSink<io::Stdout> {
    /// JSON lines on standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

/// Opens `path` for appending, creating it if missing.
///
/// The handle can be cloned with [`File::try_clone`] to share one log file
/// between a [`WriterSink`] and a `tracing` layer; clones append through the
/// same open file.
pub fn open_log_file(path: &Path) -> Result<File, Error> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn emit(&self, event: &LogEvent) -> Result<(), Error> {
        let line = self.encoder.encode(event);
        // Only the write is under the lock.
        let mut writer = self.writer.lock().map_err(|_| Error::Poisoned)?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// Collects events in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of everything emitted so far, oldest first.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// The collected events rendered by [`EventEncoder`].
    pub fn lines(&self) -> Vec<String> {
        let encoder = EventEncoder::new();
        self.events().iter().map(|event| encoder.encode(event)).collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }
}

impl Sink for MemorySink {
    fn emit(&self, event: &LogEvent) -> Result<(), Error> {
        self.events.lock().map_err(|_| Error::Poisoned)?.push(event.clone());
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn emit(&self, event: &LogEvent) -> Result<(), Error> {
        (**self).emit(event)
    }
}
