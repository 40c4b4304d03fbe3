//! Colored console output for local development.

use std::io::{self, Write};

use owo_colors::{AnsiColors, DynColors, OwoColorize, Style};

use crate::encoder::keys;
use crate::error::Error;
use crate::event::LogEvent;
use crate::level::Level;
use crate::sink::Sink;

/// 32 visually distinct ANSI colors for correlation ID coloring
///
/// Standard and bright variants, repeated to fill the palette.
const COLORS: [AnsiColors; 32] = [
    AnsiColors::Red,
    AnsiColors::Green,
    AnsiColors::Yellow,
    AnsiColors::Blue,
    AnsiColors::Magenta,
    AnsiColors::Cyan,
    AnsiColors::BrightRed,
    AnsiColors::BrightGreen,
    AnsiColors::BrightYellow,
    AnsiColors::BrightBlue,
    AnsiColors::BrightMagenta,
    AnsiColors::BrightCyan,
    AnsiColors::Red,
    AnsiColors::Green,
    AnsiColors::Yellow,
    AnsiColors::Blue,
    AnsiColors::Magenta,
    AnsiColors::Cyan,
    AnsiColors::BrightRed,
    AnsiColors::BrightGreen,
    AnsiColors::BrightYellow,
    AnsiColors::BrightBlue,
    AnsiColors::BrightMagenta,
    AnsiColors::BrightCyan,
    AnsiColors::Red,
    AnsiColors::Green,
    AnsiColors::Yellow,
    AnsiColors::Blue,
    AnsiColors::Magenta,
    AnsiColors::Cyan,
    AnsiColors::BrightRed,
    AnsiColors::BrightGreen,
];

/// Deterministically maps a correlation ID to one of the 32 colors, so both
/// lines of one request share a color.
pub fn get_color_for_id(id: &str) -> AnsiColors {
    let hash = id
        .chars()
        .fold(0u32, |acc, c| acc.wrapping_mul(31).wrapping_add(c as u32));
    COLORS[(hash % 32) as usize]
}

/// `[id]` wrapped in the ID's color.
pub fn colored_id(id: &str) -> String {
    let color = get_color_for_id(id);
    let style = Style::new().color(DynColors::Ansi(color));
    format!("[{}]", id).style(style).to_string()
}

fn colored_level(level: Level) -> String {
    let name = level.as_str();
    match level {
        Level::Verbose | Level::Debug => name.dimmed().to_string(),
        Level::Information => name.green().to_string(),
        Level::Warning => name.yellow().to_string(),
        Level::Error | Level::Fatal => name.red().bold().to_string(),
    }
}

/// One human-readable line per event:
///
/// ```text
/// [V1StGXR8_Z5jdHi6B-myT] Information Incoming Request → GET /api/v1/customers
/// [V1StGXR8_Z5jdHi6B-myT] Information Completed Request ← 200 (0.004, 10 bytes)
/// ```
pub fn pretty_line(event: &LogEvent) -> String {
    let id = event
        .property(keys::CORRELATION_ID)
        .and_then(|v| v.as_str())
        .map(colored_id)
        .unwrap_or_else(|| "[-]".dimmed().to_string());
    let mut line = format!("{} {} {}", id, colored_level(event.level()), event.render_message());

    let text = |key: &str| event.property(key).and_then(|v| v.as_str()).unwrap_or("-");
    if event.property(keys::HAS_HTTP_RESPONSE).is_some() {
        let status = event.property(keys::STATUS_CODE).and_then(|v| v.as_u64()).unwrap_or(0);
        let time = event.property(keys::RESPONSE_TIME).and_then(|v| v.as_f64()).unwrap_or(0.0);
        let bytes = event.property(keys::RESPONSE_BYTES).and_then(|v| v.as_u64()).unwrap_or(0);
        line.push_str(&format!(" ← {status} ({time}, {bytes} bytes)"));
    } else if event.property(keys::HAS_HTTP_REQUEST).is_some() {
        line.push_str(&format!(" → {} {}", text(keys::METHOD), text(keys::URL)));
    }
    if let Some(exception) = event.exception() {
        line.push('\n');
        line.push_str(exception);
    }
    line
}

/// Writes [`pretty_line`]s to standard error.
#[derive(Debug, Default)]
pub struct PrettySink;

impl Sink for PrettySink {
    fn emit(&self, event: &LogEvent) -> Result<(), Error> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{}", pretty_line(event))?;
        Ok(())
    }
}
